//! Book Export
//!
//! Renders the nested chapter tree to HTML and hands the files to an
//! external converter for EPUB, PDF or single-file HTML output.

mod backend;
mod error;
pub mod html;

pub use backend::{ConversionBackend, ConversionRequest, PandocBackend};
pub use error::ExportError;
pub use html::{heading_tag, render_book_html, render_chapter_html, slugify, write_chapter_files};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output formats supported by the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Epub,
    Pdf,
    Html,
}

impl ExportFormat {
    /// File extension of the converted output
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Pdf => "pdf",
            Self::Html => "html",
        }
    }

    /// Pandoc `--to` value
    pub fn pandoc_target(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Pdf => "pdf",
            Self::Html => "html5",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "epub" => Ok(Self::Epub),
            "pdf" => Ok(Self::Pdf),
            "html" | "html5" => Ok(Self::Html),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}
