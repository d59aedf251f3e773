//! BIFF12 record stream reader for the Excel binary workbook format (.xlsb).
//!
//! Records are framed as a 7-bit-continued record id (1-2 bytes), a
//! 7-bit-continued payload size (1-4 bytes), and the payload itself. Wide
//! strings inside payloads are a u32 character count followed by UTF-16LE
//! code units.

use crate::error::SheetFrameError;
use crate::helpers::string::{le_f64, le_u16, le_u32, le_usize};
use encoding_rs::UTF_16LE;
use std::io::BufRead;

/// Streaming reader over a BIFF12 part. The payload of the current record is
/// kept in an internal buffer that field accessors index into.
pub(crate) struct RecordReader<R: BufRead> {
    reader: R,
    pub(crate) payload: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    pub(crate) fn new(reader: R) -> RecordReader<R> {
        RecordReader {
            reader,
            payload: vec![0; 1024],
        }
    }

    /// Reads one byte, or None at end of stream.
    fn next_byte(&mut self) -> Result<Option<u8>, SheetFrameError> {
        let mut byte = [0u8; 1];
        loop {
            return match self.reader.read(&mut byte) {
                Ok(0) => Ok(None),
                Ok(_) => Ok(Some(byte[0])),
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(error) => Err(error.into()),
            };
        }
    }

    /// Reads a 7-bit continued integer of at most `limit` bytes. The high bit
    /// of each byte marks continuation. Returns None at a clean end of
    /// stream before the first byte.
    fn varint(&mut self, limit: usize) -> Result<Option<usize>, SheetFrameError> {
        let mut value = 0usize;
        for index in 0..limit {
            let byte = match self.next_byte()? {
                Some(byte) => byte,
                None if index == 0 => return Ok(None),
                None => {
                    return Err(SheetFrameError::Format(
                        "truncated record header".to_string(),
                    ))
                }
            };
            value += ((byte & 0x7F) as usize) << (7 * index);
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(Some(value))
    }

    /// Advances to the next record, filling the payload buffer. Returns the
    /// record id, or None once the part is exhausted.
    pub(crate) fn next_record(&mut self) -> Result<Option<u16>, SheetFrameError> {
        let id = match self.varint(2)? {
            Some(id) => id as u16,
            None => return Ok(None),
        };
        let size = self
            .varint(4)?
            .ok_or_else(|| SheetFrameError::Format("truncated record header".to_string()))?;
        if size > self.payload.len() {
            self.payload = vec![0u8; size];
        }
        self.reader.read_exact(&mut self.payload[..size])?;
        Ok(Some(id))
    }

    /// Skips forward until a record with the given id is current, ignoring
    /// everything between `skips` bracket pairs on the way.
    pub(crate) fn skip_to_with(
        &mut self,
        target: u16,
        skips: &[(u16, u16)],
    ) -> Result<(), SheetFrameError> {
        let mut expected = target;
        loop {
            let id = self.next_record()?.ok_or_else(|| {
                SheetFrameError::Format(format!("record {target:#06x} not found"))
            })?;
            if id == expected && expected == target {
                return Ok(());
            } else if id == expected {
                expected = target;
            } else if let Some((_, closing)) = skips.iter().find(|(opening, _)| id == *opening) {
                expected = *closing;
            }
        }
    }

    pub(crate) fn skip_to(&mut self, target: u16) -> Result<(), SheetFrameError> {
        self.skip_to_with(target, &[])
    }

    /// Decodes a wide string at the given payload offset, returning the
    /// string and the offset just past it.
    pub(crate) fn utf16_at(&self, at: usize) -> Result<(String, usize), SheetFrameError> {
        let start = at + 4;
        let chars = le_usize(&self.payload[at..start]);
        let end = start + chars * 2;
        if self.payload.len() < end {
            return Err(SheetFrameError::Format(format!(
                "string field needs {end} bytes, record has {}",
                self.payload.len()
            )));
        }
        let (value, _, _) = UTF_16LE.decode(&self.payload[start..end]);
        Ok((value.into_owned(), end))
    }

    pub(crate) fn u16_at(&self, at: usize) -> u16 {
        le_u16(&self.payload[at..at + 2])
    }

    pub(crate) fn u32_at(&self, at: usize) -> u32 {
        le_u32(&self.payload[at..at + 4])
    }

    pub(crate) fn f64_at(&self, at: usize) -> f64 {
        le_f64(&self.payload[at..at + 8])
    }

    pub(crate) fn usize_at(&self, at: usize) -> usize {
        le_usize(&self.payload[at..at + 4])
    }

    /// Cell style index: 3 bytes, zero-extended.
    pub(crate) fn style_at(&self, at: usize) -> usize {
        u32::from_le_bytes([
            self.payload[at],
            self.payload[at + 1],
            self.payload[at + 2],
            0,
        ]) as usize
    }
}
