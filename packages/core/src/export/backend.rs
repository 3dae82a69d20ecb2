//! Document converter backends
//!
//! The chapter HTML files are handed to an external converter together
//! with book metadata. [`PandocBackend`] shells out to `pandoc`; tests
//! substitute their own [`ConversionBackend`].

use crate::export::{ExportError, ExportFormat};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;

/// Input files plus options for one conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// Input files, in reading order
    pub files: Vec<PathBuf>,
    pub format: ExportFormat,
    /// Destination file
    pub output: PathBuf,
    pub title: String,
    pub author: Option<String>,
    /// Generate a table of contents
    pub toc: bool,
}

/// External document converter
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Convert `request.files` into `request.output`; returns the output path
    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ExportError>;
}

/// Runs the `pandoc` executable
#[derive(Debug, Clone)]
pub struct PandocBackend {
    program: String,
    pdf_engine: Option<String>,
}

impl Default for PandocBackend {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

impl PandocBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            pdf_engine: None,
        }
    }

    /// Use a specific `--pdf-engine` for PDF output
    pub fn with_pdf_engine(mut self, engine: impl Into<String>) -> Self {
        self.pdf_engine = Some(engine.into());
        self
    }

    /// Command-line arguments for `request`
    pub fn build_args(&self, request: &ConversionRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = request
            .files
            .iter()
            .map(|f| f.as_os_str().to_owned())
            .collect();

        args.push(OsString::from("-o"));
        args.push(request.output.as_os_str().to_owned());

        args.push(OsString::from("--from"));
        args.push(OsString::from("html"));
        args.push(OsString::from("--to"));
        args.push(OsString::from(request.format.pandoc_target()));

        if request.format == ExportFormat::Html {
            args.push(OsString::from("--standalone"));
        }

        if request.format == ExportFormat::Pdf {
            if let Some(engine) = &self.pdf_engine {
                args.push(OsString::from("--pdf-engine"));
                args.push(OsString::from(engine));
            }
        }

        if request.toc {
            args.push(OsString::from("--toc"));
        }

        args.push(OsString::from("--metadata"));
        args.push(OsString::from(format!("title={}", request.title)));

        if let Some(author) = &request.author {
            args.push(OsString::from("--metadata"));
            args.push(OsString::from(format!("author={}", author)));
        }

        args
    }
}

#[async_trait]
impl ConversionBackend for PandocBackend {
    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ExportError> {
        tracing::info!(
            "Converting {} file(s) to {} via {} -> {}",
            request.files.len(),
            request.format,
            self.program,
            request.output.display()
        );

        if let Some(parent) = request.output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ExportError::io(parent, e))?;
            }
        }

        let output = tokio::process::Command::new(&self.program)
            .args(self.build_args(request))
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExportError::ConverterNotFound {
                        program: self.program.clone(),
                    }
                } else {
                    ExportError::io(&self.program, e)
                }
            })?;

        if !output.status.success() {
            return Err(ExportError::conversion_failed(
                request.format.to_string(),
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr),
            ));
        }

        Ok(request.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(format: ExportFormat) -> ConversionRequest {
        ConversionRequest {
            files: vec![PathBuf::from("01-a.html"), PathBuf::from("02-b.html")],
            format,
            output: PathBuf::from("out/book.epub"),
            title: "My Book".to_string(),
            author: Some("Ann".to_string()),
            toc: true,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_build_args_keeps_file_order_and_metadata() {
        let args = strings(PandocBackend::default().build_args(&request(ExportFormat::Epub)));

        assert_eq!(&args[..2], ["01-a.html", "02-b.html"]);
        assert!(args.windows(2).any(|w| w == ["--to", "epub"]));
        assert!(args.windows(2).any(|w| w == ["--metadata", "title=My Book"]));
        assert!(args.windows(2).any(|w| w == ["--metadata", "author=Ann"]));
        assert!(args.contains(&"--toc".to_string()));
        assert!(!args.contains(&"--standalone".to_string()));
    }

    #[test]
    fn test_pdf_engine_only_for_pdf() {
        let backend = PandocBackend::default().with_pdf_engine("weasyprint");

        let pdf = strings(backend.build_args(&request(ExportFormat::Pdf)));
        assert!(pdf.windows(2).any(|w| w == ["--pdf-engine", "weasyprint"]));

        let epub = strings(backend.build_args(&request(ExportFormat::Epub)));
        assert!(!epub.contains(&"--pdf-engine".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut req = request(ExportFormat::Html);
        req.output = dir.path().join("book.html");

        let backend = PandocBackend::new("folio-no-such-converter");
        let err = backend.convert(&req).await.unwrap_err();
        assert!(matches!(err, ExportError::ConverterNotFound { .. }));
    }
}
