//! ZIP archive access for the OPC containers both workbook formats share.

use crate::error::SheetFrameError;
use crate::helpers::biff12::RecordReader;
use crate::helpers::xml::XmlReader;
use std::io::{BufReader, Read, Seek};
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Part lookup and reader construction on top of a `ZipArchive`.
///
/// Part names are matched case-insensitively with backslashes normalized,
/// since real-world producers disagree on both.
pub(crate) trait ZipHelper<RS: Read + Seek> {
    fn part(&mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetFrameError>;

    fn xml_part(
        &mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetFrameError>;

    fn record_part(
        &mut self,
        name: &str,
    ) -> Result<Option<RecordReader<BufReader<ZipFile<'_, RS>>>>, SheetFrameError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn part(&mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetFrameError> {
        let pattern = name.replace('\\', "/");
        let path = self
            .file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn xml_part(
        &mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetFrameError> {
        Ok(self
            .part(name)?
            .map(|file| XmlReader::new(BufReader::new(file))))
    }

    fn record_part(
        &mut self,
        name: &str,
    ) -> Result<Option<RecordReader<BufReader<ZipFile<'_, RS>>>>, SheetFrameError> {
        Ok(self
            .part(name)?
            .map(|file| RecordReader::new(BufReader::new(file))))
    }
}
