//! Reading the raw transaction export from disk.

use std::borrow::Cow;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{IgacError, Result};

const FIELD_SEPARATOR: u8 = b';';
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The raw bytes of one input file, read once.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl SourceFile {
    /// Read a transaction export from disk.
    ///
    /// Fails with `FileNotFound` if the path does not exist and with
    /// `EmptyFile` if it holds nothing but whitespace.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IgacError::FileNotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        Self::from_bytes(path, bytes)
    }

    /// Wrap bytes already in memory; `path` is only used for messages.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<Self> {
        let path = path.into();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(IgacError::EmptyFile(path));
        }
        Ok(Self { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode as UTF-8, falling back to Latin-1 when the bytes are not valid UTF-8.
    pub fn decode(&self) -> Cow<'_, str> {
        decode_text(&self.bytes)
    }

    /// Parse the file into a DataFrame with every column as String dtype.
    /// Trims whitespace from column names.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let text = self.decode();
        let cursor = Cursor::new(text.as_bytes().to_vec());

        let mut df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0)) // all columns as String
            .map_parse_options(|opts| {
                opts.with_separator(FIELD_SEPARATOR)
                    .with_truncate_ragged_lines(true)
            })
            .into_reader_with_file_handle(cursor)
            .finish()?;

        let trimmed: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        df.set_column_names(trimmed.as_slice())?;

        if df.height() == 0 {
            return Err(IgacError::EmptyFile(self.path.clone()));
        }

        info!(
            path = %self.path.display(),
            records = df.height(),
            columns = df.width(),
            "Loaded transaction export"
        );
        Ok(df)
    }
}

/// Decode bytes as UTF-8 (BOM stripped), or as Latin-1 if that fails.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(err) => {
            debug!(error = %err, "Input is not valid UTF-8, decoding as Latin-1");
            // Latin-1 maps each byte to the code point of the same value.
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_is_decoded_as_is() {
        let text = decode_text("BOGOTÁ;1".as_bytes());
        assert!(matches!(text, Cow::Borrowed(_)));
        assert_eq!(text, "BOGOTÁ;1");
    }

    #[test]
    fn invalid_utf8_falls_back_to_latin1() {
        // "BOGOTÁ" encoded as Latin-1.
        let bytes = b"BOGOT\xC1";
        assert_eq!(decode_text(bytes), "BOGOTÁ");
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFFECHA"), "FECHA");
    }

    #[test]
    fn whitespace_only_input_is_empty() {
        let err = SourceFile::from_bytes("blank.csv", b" \n\r\n".to_vec()).unwrap_err();
        assert!(matches!(err, IgacError::EmptyFile(_)));
    }

    #[test]
    fn header_only_input_is_empty() {
        let source = SourceFile::from_bytes("header.csv", b"FECHA;VALOR\n".to_vec()).unwrap();
        let err = source.to_frame().unwrap_err();
        assert!(matches!(err, IgacError::EmptyFile(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = SourceFile::read("definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, IgacError::FileNotFound(_)));
        assert!(err.is_fatal_load_error());
    }

    #[test]
    fn reads_semicolon_separated_strings() {
        let source = SourceFile::from_bytes(
            "mem.csv",
            b" FECHA ;VALOR;MUNICIPIO\n01/02/2023;1.500,00;CALI\n;0;\n".to_vec(),
        )
        .unwrap();
        let df = source.to_frame().unwrap();

        assert_eq!(df.get_column_names_str(), vec!["FECHA", "VALOR", "MUNICIPIO"]);
        assert_eq!(df.height(), 2);
        let valor = df.column("VALOR").unwrap().str().unwrap();
        assert_eq!(valor.get(0), Some("1.500,00"));
        assert_eq!(valor.get(1), Some("0"));
        let fecha = df.column("FECHA").unwrap().str().unwrap();
        assert_eq!(fecha.get(1), None);
    }

    #[test]
    fn latin1_file_is_readable() {
        let source =
            SourceFile::from_bytes("latin1.csv", b"FECHA;MUNICIPIO\n01/02/2023;BOGOT\xC1\n".to_vec())
                .unwrap();
        let df = source.to_frame().unwrap();
        let municipio = df.column("MUNICIPIO").unwrap().str().unwrap();
        assert_eq!(municipio.get(0), Some("BOGOTÁ"));
    }
}
