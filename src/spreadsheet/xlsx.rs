//! Adapter for the packaged-XML workbook format (.xlsx, .xlsm).

use crate::error::SheetFrameError;
use crate::helpers::source::ByteSource;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::{
    builtin_format_is_temporal, custom_format_is_temporal, error_code_from_text, parse_reference,
    RawCell,
};
use crate::spreadsheet::{
    load_relationships, read_xml_string, resolve_sheet, CellSink, SharedStrings, SheetSelector,
    Workbook,
};
use quick_xml::events::Event;
use std::collections::HashMap;
use tracing::{debug, warn};
use zip::ZipArchive;

pub(crate) struct XlsxWorkbook {
    zip: ZipArchive<ByteSource>,
    /// Per-xf-index temporal flags from the styles part.
    temporal_styles: Vec<bool>,
    /// (sheet name, part path) in workbook order.
    sheets: Vec<(String, String)>,
    date1904: bool,
}

/// How a cell's value attribute set says the value is encoded.
#[derive(Copy, Clone)]
enum CellForm {
    Number { temporal: bool },
    Shared,
    Inline,
    Bool,
    Error,
}

impl XlsxWorkbook {
    pub(crate) fn open(mut zip: ZipArchive<ByteSource>) -> Result<XlsxWorkbook, SheetFrameError> {
        let (sheets, date1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            return Err(SheetFrameError::Format("workbook has no sheets".to_string()));
        }
        let temporal_styles = load_styles(&mut zip)?;
        Ok(XlsxWorkbook {
            zip,
            temporal_styles,
            sheets,
            date1904,
        })
    }
}

impl Workbook for XlsxWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn date1904(&self) -> bool {
        self.date1904
    }

    fn load_shared_strings(&mut self) -> Result<SharedStrings, SheetFrameError> {
        let mut strings = Vec::new();
        let mut reader = match self.zip.xml_part("xl/sharedStrings.xml")? {
            Some(reader) => reader,
            None => return Ok(SharedStrings::default()),
        };
        match_xml_events!(reader => {
            Event::Start(event) if event.name().as_ref() == b"si" => {
                strings.push(read_xml_string(&mut reader, b"si", false)?);
            }
        });
        Ok(SharedStrings::new(strings))
    }

    fn stream_sheet(
        &mut self,
        selector: &SheetSelector,
        sink: &mut dyn CellSink,
    ) -> Result<(), SheetFrameError> {
        let (sheet_name, part) = resolve_sheet(&self.sheets, selector)?;
        // The zip reader holds a mutable borrow of self for the whole scan;
        // a copy of the style flags keeps cell decoding independent of it.
        let temporal_styles = self.temporal_styles.clone();
        let mut reader = self
            .zip
            .xml_part(&part)?
            .ok_or_else(|| SheetFrameError::Format(format!("missing worksheet part '{part}'")))?;

        // Fallback counters for producers that omit `r` attributes.
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut pending: Option<(usize, CellForm)> = None;
        let mut value: Option<String> = None;

        let style_is_temporal =
            |index: usize| temporal_styles.get(index).copied().unwrap_or(false);

        match_xml_events!(reader => {
            Event::Start(event) if event.name().as_ref() == b"row" => {
                row = event
                    .attribute("r")?
                    .and_then(|r| r.parse::<usize>().ok())
                    .map(|r| r.saturating_sub(1))
                    .unwrap_or(row_count);
                col_count = 0;
            }
            Event::End(event) if event.name().as_ref() == b"row" => {
                row_count = row + 1;
            }
            Event::Start(event) if event.name().as_ref() == b"c" => {
                let col = match event.attribute("r")?.as_deref().and_then(parse_reference) {
                    Some((cell_row, cell_col)) => {
                        row = cell_row;
                        cell_col
                    }
                    None => col_count,
                };
                col_count = col + 1;

                let form = match event.attribute("t")?.as_deref() {
                    Some("s") => CellForm::Shared,
                    Some("inlineStr") | Some("str") | Some("d") => CellForm::Inline,
                    Some("b") => CellForm::Bool,
                    Some("e") => CellForm::Error,
                    _ => {
                        let style = event
                            .attribute("s")?
                            .and_then(|s| s.parse::<usize>().ok())
                            .unwrap_or(0);
                        CellForm::Number {
                            temporal: style_is_temporal(style),
                        }
                    }
                };
                pending = Some((col, form));
                value = None;
            }
            Event::Start(event) if pending.is_some() && event.name().as_ref() == b"is" => {
                value = Some(read_xml_string(&mut reader, b"is", false)?);
            }
            Event::Start(event) if pending.is_some() && event.name().as_ref() == b"v" => {
                value = Some(read_xml_string(&mut reader, b"v", true)?);
            }
            Event::End(event) if event.name().as_ref() == b"c" => {
                if let Some((col, form)) = pending.take() {
                    let cell = decode_cell(&sheet_name, row, col, form, value.take());
                    if sink.cell(row, col, cell)?.is_break() {
                        return Ok(());
                    }
                }
            }
        });

        Ok(())
    }
}

/// Builds a raw cell from the captured form and value text. Cells that carry
/// a style but no value, and values that fail to decode, are recovered as
/// blanks rather than failing the read.
fn decode_cell(
    sheet: &str,
    row: usize,
    col: usize,
    form: CellForm,
    value: Option<String>,
) -> RawCell {
    let value = match value {
        Some(value) => value,
        None => {
            debug!(sheet, row, col, "cell has a style but no value, treating as blank");
            return RawCell::Blank;
        }
    };
    match form {
        CellForm::Number { temporal } => match value.parse::<f64>() {
            Ok(number) => RawCell::Number {
                value: number,
                temporal,
            },
            Err(_) => {
                warn!(sheet, row, col, %value, "unparseable numeric cell, treating as blank");
                RawCell::Blank
            }
        },
        CellForm::Shared => match value.parse::<u64>() {
            Ok(index) => RawCell::SharedStringRef(index),
            Err(_) => {
                warn!(sheet, row, col, %value, "unparseable shared-string index, treating as blank");
                RawCell::Blank
            }
        },
        CellForm::Inline => RawCell::InlineString(value),
        CellForm::Bool => RawCell::Boolean(value == "1" || value.eq_ignore_ascii_case("true")),
        CellForm::Error => match error_code_from_text(&value) {
            Some(code) => RawCell::ErrorCode(code),
            None => RawCell::InlineString(value),
        },
    }
}

/// Parses workbook.xml: the sheet catalog (resolved through relationships)
/// and the serial-date epoch flag.
fn load_workbook(
    zip: &mut ZipArchive<ByteSource>,
) -> Result<(Vec<(String, String)>, bool), SheetFrameError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip
        .xml_part("xl/workbook.xml")?
        .ok_or_else(|| SheetFrameError::Format("missing package part 'xl/workbook.xml'".to_string()))?;
    let mut sheets = Vec::new();
    let mut date1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name().as_ref() == b"sheet" => {
            let mut name = None;
            let mut id = None;
            for result in event.attributes() {
                let attribute = result?;
                match attribute.key.local_name().as_ref() {
                    b"name" => name = Some(attribute.unescape_value()?.to_string()),
                    b"id" => id = Some(attribute.unescape_value()?.to_string()),
                    _ => (),
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&id) {
                    sheets.push((name, path.clone()));
                }
            }
        }
        Event::Start(event) if event.name().as_ref() == b"workbookPr" => {
            date1904 = event
                .attribute("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, date1904))
}

/// Parses styles.xml into per-xf temporal flags: custom `numFmt` codes are
/// scanned for date letters, everything else falls back to the built-in id
/// table.
fn load_styles(zip: &mut ZipArchive<ByteSource>) -> Result<Vec<bool>, SheetFrameError> {
    let mut reader = match zip.xml_part("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats: HashMap<u32, bool> = HashMap::new();
    let mut in_cell_xfs = false;
    let mut format_ids: Vec<u32> = Vec::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name().as_ref() == b"numFmt" => {
            let id = event.attribute("numFmtId")?.and_then(|id| id.parse::<u32>().ok());
            let code = event.attribute("formatCode")?;
            if let Some((id, code)) = id.zip(code) {
                custom_formats.insert(id, custom_format_is_temporal(&code));
            }
        }
        Event::Start(event) if event.name().as_ref() == b"cellXfs" => in_cell_xfs = true,
        Event::End(event) if event.name().as_ref() == b"cellXfs" => in_cell_xfs = false,
        Event::Start(event) if in_cell_xfs && event.name().as_ref() == b"xf" => {
            let id = event
                .attribute("numFmtId")?
                .and_then(|id| id.parse::<u32>().ok())
                .unwrap_or(0);
            format_ids.push(id);
        }
    });

    Ok(format_ids
        .into_iter()
        .map(|id| {
            custom_formats
                .get(&id)
                .copied()
                .or_else(|| builtin_format_is_temporal(id))
                .unwrap_or(false)
        })
        .collect())
}
