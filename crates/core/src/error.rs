//! Error types for KPI extraction and report generation.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a report deck into KPI summaries.
///
/// Field cast failures are deliberately absent: a value that does not parse
/// becomes a placeholder instead of an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open or read the input file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file format is not supported or could not be detected.
    #[error("Unsupported or unrecognized file format: {0}")]
    UnsupportedFormat(String),

    /// Failed to parse the PPTX file structure.
    #[error("PPTX parsing error: {0}")]
    PptxParseError(String),

    /// ZIP archive error (for PPTX).
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing error (for PPTX).
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// No usable KPI structure could be recovered from a provider response.
    #[error("KPI extraction error: {0}")]
    ExtractionError(String),

    /// The KPI provider failed on every attempt.
    #[error("KPI provider failed after {attempts} attempt(s): {message}")]
    ProviderError { attempts: u32, message: String },

    /// A KPI mapping that is not a JSON object.
    #[error("Invalid KPI record: {0}")]
    InvalidRecord(String),
}
