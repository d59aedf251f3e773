//! Adapter for the binary record workbook format (.xlsb).

use crate::error::SheetFrameError;
use crate::helpers::source::ByteSource;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::cell::{
    builtin_format_is_temporal, custom_format_is_temporal, rk_to_f64, RawCell,
};
use crate::spreadsheet::{
    load_relationships, resolve_sheet, CellSink, SharedStrings, SheetSelector, Workbook,
};
use std::collections::HashMap;
use zip::ZipArchive;

// BIFF12 record ids used by this adapter.
const BRT_ROW_HDR: u16 = 0;
const BRT_CELL_BLANK: u16 = 1;
const BRT_CELL_RK: u16 = 2;
const BRT_CELL_ERROR: u16 = 3;
const BRT_CELL_BOOL: u16 = 4;
const BRT_CELL_REAL: u16 = 5;
const BRT_CELL_ST: u16 = 6;
const BRT_CELL_ISST: u16 = 7;
const BRT_FMLA_STRING: u16 = 8;
const BRT_FMLA_NUM: u16 = 9;
const BRT_FMLA_BOOL: u16 = 10;
const BRT_FMLA_ERROR: u16 = 11;
const BRT_SST_ITEM: u16 = 19;
const BRT_FRT_BEGIN: u16 = 35;
const BRT_FRT_END: u16 = 36;
const BRT_FMT: u16 = 44;
const BRT_XF: u16 = 47;
const BRT_CELL_R_STRING: u16 = 62;
const BRT_END_BUNDLE_SHS: u16 = 144;
const BRT_BEGIN_SHEET_DATA: u16 = 145;
const BRT_END_SHEET_DATA: u16 = 146;
const BRT_WB_PROP: u16 = 153;
const BRT_BUNDLE_SH: u16 = 156;
const BRT_BEGIN_SST: u16 = 159;
const BRT_BEGIN_FMTS: u16 = 615;
const BRT_BEGIN_CELL_XFS: u16 = 617;

pub(crate) struct XlsbWorkbook {
    zip: ZipArchive<ByteSource>,
    /// Per-xf-index temporal flags from styles.bin.
    temporal_styles: Vec<bool>,
    /// (sheet name, part path) in workbook order.
    sheets: Vec<(String, String)>,
    date1904: bool,
}

impl XlsbWorkbook {
    pub(crate) fn open(mut zip: ZipArchive<ByteSource>) -> Result<XlsbWorkbook, SheetFrameError> {
        let (sheets, date1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            return Err(SheetFrameError::Format("workbook has no sheets".to_string()));
        }
        let temporal_styles = load_styles(&mut zip)?;
        Ok(XlsbWorkbook {
            zip,
            temporal_styles,
            sheets,
            date1904,
        })
    }
}

impl Workbook for XlsbWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn date1904(&self) -> bool {
        self.date1904
    }

    fn load_shared_strings(&mut self) -> Result<SharedStrings, SheetFrameError> {
        let mut reader = match self.zip.record_part("xl/sharedStrings.bin")? {
            Some(reader) => reader,
            None => return Ok(SharedStrings::default()),
        };
        reader.skip_to(BRT_BEGIN_SST)?;
        let count = reader.usize_at(4);
        let mut strings = Vec::with_capacity(count);
        for _ in 0..count {
            reader.skip_to_with(BRT_SST_ITEM, &[(BRT_FRT_BEGIN, BRT_FRT_END)])?;
            let (string, _) = reader.utf16_at(1)?;
            strings.push(string);
        }
        Ok(SharedStrings::new(strings))
    }

    fn stream_sheet(
        &mut self,
        selector: &SheetSelector,
        sink: &mut dyn CellSink,
    ) -> Result<(), SheetFrameError> {
        let (_, part) = resolve_sheet(&self.sheets, selector)?;
        let temporal_styles = self.temporal_styles.clone();
        let mut reader = self
            .zip
            .record_part(&part)?
            .ok_or_else(|| SheetFrameError::Format(format!("missing worksheet part '{part}'")))?;
        reader.skip_to(BRT_BEGIN_SHEET_DATA)?;

        let mut row = 0usize;
        while let Some(id) = reader.next_record()? {
            match id {
                BRT_END_SHEET_DATA => break,
                BRT_ROW_HDR => row = reader.usize_at(0),
                BRT_CELL_BLANK
                | BRT_CELL_RK
                | BRT_CELL_ERROR
                | BRT_CELL_BOOL
                | BRT_CELL_REAL
                | BRT_CELL_ST
                | BRT_CELL_ISST
                | BRT_FMLA_STRING
                | BRT_FMLA_NUM
                | BRT_FMLA_BOOL
                | BRT_FMLA_ERROR
                | BRT_CELL_R_STRING => {
                    let col = reader.usize_at(0);
                    let temporal = temporal_styles
                        .get(reader.style_at(4))
                        .copied()
                        .unwrap_or(false);
                    let cell = match id {
                        BRT_CELL_RK if temporal => RawCell::Number {
                            value: rk_to_f64(reader.u32_at(8)),
                            temporal: true,
                        },
                        BRT_CELL_RK => RawCell::RkNumber(reader.u32_at(8)),
                        BRT_CELL_REAL | BRT_FMLA_NUM => RawCell::Number {
                            value: reader.f64_at(8),
                            temporal,
                        },
                        BRT_CELL_ST | BRT_FMLA_STRING => {
                            RawCell::InlineString(reader.utf16_at(8)?.0)
                        }
                        // One flag byte precedes the rich-string text.
                        BRT_CELL_R_STRING => RawCell::InlineString(reader.utf16_at(9)?.0),
                        BRT_CELL_ISST => RawCell::SharedStringRef(reader.u32_at(8) as u64),
                        BRT_CELL_BOOL | BRT_FMLA_BOOL => {
                            RawCell::Boolean(reader.payload[8] != 0)
                        }
                        BRT_CELL_ERROR | BRT_FMLA_ERROR => RawCell::ErrorCode(reader.payload[8]),
                        _ => RawCell::Blank,
                    };
                    if sink.cell(row, col, cell)?.is_break() {
                        return Ok(());
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }
}

/// Parses workbook.bin: the bundled sheet catalog (resolved through the XML
/// relationships part) and the serial-date epoch flag.
fn load_workbook(
    zip: &mut ZipArchive<ByteSource>,
) -> Result<(Vec<(String, String)>, bool), SheetFrameError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.bin.rels")?;
    let mut reader = zip
        .record_part("xl/workbook.bin")?
        .ok_or_else(|| SheetFrameError::Format("missing package part 'xl/workbook.bin'".to_string()))?;
    let mut sheets = Vec::new();
    let mut date1904 = false;
    while let Some(id) = reader.next_record()? {
        match id {
            BRT_END_BUNDLE_SHS => break,
            BRT_BUNDLE_SH => {
                let (rel_id, after) = reader.utf16_at(8)?;
                if let Some(path) = relationships.get(&rel_id) {
                    let (name, _) = reader.utf16_at(after)?;
                    sheets.push((name, path.clone()));
                }
            }
            BRT_WB_PROP => date1904 = reader.payload[0] & 0x1 != 0,
            _ => (),
        }
    }
    Ok((sheets, date1904))
}

/// Parses styles.bin into per-xf temporal flags, mirroring the XML styles
/// part: custom format codes first, built-in id table as fallback.
fn load_styles(zip: &mut ZipArchive<ByteSource>) -> Result<Vec<bool>, SheetFrameError> {
    let mut reader = match zip.record_part("xl/styles.bin")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats: HashMap<u32, bool> = HashMap::new();
    let mut format_ids: Vec<u32> = Vec::new();
    while let Some(id) = reader.next_record()? {
        match id {
            BRT_BEGIN_FMTS => {
                for _ in 0..reader.usize_at(0) {
                    reader.skip_to(BRT_FMT)?;
                    let format_id = reader.u16_at(0) as u32;
                    let (code, _) = reader.utf16_at(2)?;
                    custom_formats.insert(format_id, custom_format_is_temporal(&code));
                }
            }
            BRT_BEGIN_CELL_XFS => {
                for _ in 0..reader.usize_at(0) {
                    reader.skip_to(BRT_XF)?;
                    format_ids.push(reader.u16_at(2) as u32);
                }
                break;
            }
            _ => (),
        }
    }

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
