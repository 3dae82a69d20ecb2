//! Export Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while rendering chapters or running the converter
#[derive(Error, Debug)]
pub enum ExportError {
    /// Reading or writing an export file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The book has no chapters to export
    #[error("Book {book_id} has no chapters to export")]
    EmptyBook { book_id: String },

    /// The converter executable could not be started
    #[error("Converter not found: {program}")]
    ConverterNotFound { program: String },

    /// The converter ran but exited unsuccessfully
    #[error("Conversion to {format} failed ({status}): {stderr}")]
    ConversionFailed {
        format: String,
        status: String,
        stderr: String,
    },

    /// Unknown export format name
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn empty_book(book_id: impl Into<String>) -> Self {
        Self::EmptyBook {
            book_id: book_id.into(),
        }
    }

    pub fn conversion_failed(
        format: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ConversionFailed {
            format: format.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }
}
