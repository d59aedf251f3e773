//! Workbook byte sources and container format detection.
//!
//! Inputs are a filesystem path or an in-memory buffer. The format is decided
//! by the bytes themselves, never the file name: both XLSX and XLSB are ZIP
//! packages, distinguished by which workbook part the package carries.

use crate::error::SheetFrameError;
use crate::helpers::zip::ZipHelper;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use zip::ZipArchive;

/// ZIP local-file header.
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Compound File Binary header, the container of legacy and encrypted
/// workbooks. Rejected up front so they do not surface as ZIP errors.
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Debug)]
pub(crate) enum ByteSource {
    File(BufReader<File>),
    Memory(Cursor<Vec<u8>>),
}

impl ByteSource {
    pub(crate) fn open(path: &Path) -> Result<ByteSource, SheetFrameError> {
        Ok(ByteSource::File(BufReader::new(File::open(path)?)))
    }

    pub(crate) fn from_bytes(bytes: Vec<u8>) -> ByteSource {
        ByteSource::Memory(Cursor::new(bytes))
    }

    /// Reads the leading magic bytes and rewinds.
    fn magic(&mut self) -> Result<[u8; 8], SheetFrameError> {
        let mut magic = [0u8; 8];
        let mut filled = 0;
        while filled < magic.len() {
            match self.read(&mut magic[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        self.seek(SeekFrom::Start(0))?;
        Ok(magic)
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ByteSource::File(reader) => reader.read(buf),
            ByteSource::Memory(reader) => reader.read(buf),
        }
    }
}

impl Seek for ByteSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            ByteSource::File(reader) => reader.seek(pos),
            ByteSource::Memory(reader) => reader.seek(pos),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PackageFormat {
    Xlsx,
    Xlsb,
}

/// Opens the source as a ZIP package and decides which workbook format it
/// carries.
pub(crate) fn open_package(
    mut source: ByteSource,
) -> Result<(ZipArchive<ByteSource>, PackageFormat), SheetFrameError> {
    let magic = source.magic()?;
    if magic == CFB_SIGNATURE {
        return Err(SheetFrameError::Format(
            "compound-file container (legacy or password-protected workbook)".to_string(),
        ));
    }
    if magic[..4] != ZIP_SIGNATURE {
        return Err(SheetFrameError::Format(
            "not a ZIP-packaged workbook".to_string(),
        ));
    }

    let mut zip = ZipArchive::new(source)?;
    let format = if zip.part("xl/workbook.bin")?.is_some() {
        PackageFormat::Xlsb
    } else if zip.part("xl/workbook.xml")?.is_some() {
        PackageFormat::Xlsx
    } else {
        return Err(SheetFrameError::Format(
            "ZIP package has no workbook part".to_string(),
        ));
    };
    Ok((zip, format))
}
