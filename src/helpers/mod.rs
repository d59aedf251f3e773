//! Low-level format plumbing shared by both workbook adapters.

pub(crate) mod biff12;
pub(crate) mod source;
pub(crate) mod string;
pub(crate) mod xml;
pub(crate) mod zip;
