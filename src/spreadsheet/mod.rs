//! Workbook adapters: the cell sources feeding the column builder.
//!
//! Both formats live in an OPC ZIP package and share the workbook/worksheet
//! relationship scheme; they differ in how parts are tokenized (XML events
//! vs. BIFF12 records). Adapters emit `(row, col, RawCell)` in row-major
//! order into a [`CellSink`] and resolve the shared-strings table eagerly
//! once per read.

pub(crate) mod cell;
pub(crate) mod xlsb;
pub(crate) mod xlsx;

use crate::error::SheetFrameError;
use crate::helpers::source::{open_package, ByteSource, PackageFormat};
use crate::helpers::xml::{XmlNodeHelper, XmlReader};
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::RawCell;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufRead;
use std::ops::ControlFlow;
use zip::ZipArchive;

/// Which worksheet to read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SheetSelector {
    /// Zero-based position in workbook order.
    Index(usize),
    /// Exact sheet name.
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

/// The workbook-level deduplicated string table, read-only after load.
#[derive(Debug, Default)]
pub(crate) struct SharedStrings(Vec<String>);

impl SharedStrings {
    pub(crate) fn new(strings: Vec<String>) -> SharedStrings {
        SharedStrings(strings)
    }

    pub(crate) fn get(&self, index: u64) -> Option<&str> {
        self.0.get(index as usize).map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Receives the row-major cell stream of one worksheet. `Break` stops the
/// adapter early (row limit reached).
pub(crate) trait CellSink {
    fn cell(
        &mut self,
        row: usize,
        col: usize,
        cell: RawCell,
    ) -> Result<ControlFlow<()>, SheetFrameError>;
}

/// A workbook opened from a byte source, with its sheet catalog and styles
/// already parsed.
pub(crate) trait Workbook {
    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Whether serial dates count from the 1904 epoch.
    fn date1904(&self) -> bool;

    /// Loads the whole shared-strings table.
    fn load_shared_strings(&mut self) -> Result<SharedStrings, SheetFrameError>;

    /// Streams one worksheet's cells into the sink.
    fn stream_sheet(
        &mut self,
        selector: &SheetSelector,
        sink: &mut dyn CellSink,
    ) -> Result<(), SheetFrameError>;
}

/// Opens a workbook, deciding the format from the package content.
pub(crate) fn open_workbook(
    source: ByteSource,
) -> Result<Box<dyn Workbook>, SheetFrameError> {
    let (zip, format) = open_package(source)?;
    match format {
        PackageFormat::Xlsx => Ok(Box::new(xlsx::XlsxWorkbook::open(zip)?)),
        PackageFormat::Xlsb => Ok(Box::new(xlsb::XlsbWorkbook::open(zip)?)),
    }
}

/// Resolves a selector against the sheet catalog, yielding (name, part path).
pub(crate) fn resolve_sheet(
    sheets: &[(String, String)],
    selector: &SheetSelector,
) -> Result<(String, String), SheetFrameError> {
    let found = match selector {
        SheetSelector::Index(index) => sheets.get(*index),
        SheetSelector::Name(name) => sheets.iter().find(|(sheet, _)| sheet == name),
    };
    found.cloned().ok_or_else(|| match selector {
        SheetSelector::Index(index) => SheetFrameError::SheetNotFound(format!("#{index}")),
        SheetSelector::Name(name) => SheetFrameError::SheetNotFound(name.clone()),
    })
}

/// Loads worksheet relationships from a `.rels` part, mapping relationship
/// ids to part paths. The relationship catalog is XML in both formats.
pub(crate) fn load_relationships<RS: std::io::Read + std::io::Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
) -> Result<HashMap<String, String>, SheetFrameError> {
    let mut reader = zip
        .xml_part(path)?
        .ok_or_else(|| SheetFrameError::Format(format!("missing package part '{path}'")))?;
    let mut relationships = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == b"Relationship" => {
            let id = event.attribute("Id")?.map(|id| id.to_string());
            let kind = event.attribute("Type")?.map(|kind| kind.to_string());
            let target = event.attribute("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id, to_package_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Normalizes a relationship target to a package-absolute part path.
pub(crate) fn to_package_path(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("/xl/") {
        format!("xl/{stripped}")
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Reads string content until `end_tag` closes, skipping phonetic runs and
/// resolving entity references. Shared by the shared-strings and inline
/// string paths of the XML format.
pub(crate) fn read_xml_string<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: &[u8],
    text_by_default: bool,
) -> Result<String, SheetFrameError> {
    use crate::helpers::xml::XmlTextHelper;

    let mut in_phonetic = false;
    let mut in_text = text_by_default;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name().as_ref() == end_tag => break,
        Event::Start(event) if event.name().as_ref() == b"rPh" => in_phonetic = true,
        Event::End(event) if event.name().as_ref() == b"rPh" => in_phonetic = false,
        Event::Start(event) if !in_phonetic && event.name().as_ref() == b"t" => in_text = true,
        Event::End(event) if in_text && event.name().as_ref() == b"t" => in_text = false,
        Event::Text(event) if in_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if in_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if in_text => text.push_entity_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_resolution() {
        let sheets = vec![
            ("Data".to_string(), "xl/worksheets/sheet1.xml".to_string()),
            ("Extra".to_string(), "xl/worksheets/sheet2.xml".to_string()),
        ];
        let (name, path) = resolve_sheet(&sheets, &SheetSelector::Index(1)).unwrap();
        assert_eq!((name.as_str(), path.as_str()), ("Extra", "xl/worksheets/sheet2.xml"));

        let (name, _) = resolve_sheet(&sheets, &SheetSelector::Name("Data".to_string())).unwrap();
        assert_eq!(name, "Data");

        assert!(matches!(
            resolve_sheet(&sheets, &SheetSelector::Index(5)),
            Err(SheetFrameError::SheetNotFound(_))
        ));
        assert!(matches!(
            resolve_sheet(&sheets, &SheetSelector::Name("data".to_string())),
            Err(SheetFrameError::SheetNotFound(_))
        ));
    }

    #[test]
    fn package_path_normalization() {
        assert_eq!(to_package_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_package_path("/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_package_path("xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
    }
}
