//! PPTX (Office Open XML) backend for report decks.
//!
//! Reads the ZIP/XML package and produces one block of raw text per slide,
//! in presentation order.

pub mod parser;

pub use parser::PptxParser;

use kpi_core::{Deck, DeckFormat, Error, Result};
use std::io::Cursor;
use std::path::Path;

/// Detect the container format from magic bytes, then the file extension.
pub fn detect_format(path: &Path, header: &[u8]) -> Option<DeckFormat> {
    DeckFormat::from_magic(header).or_else(|| {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(DeckFormat::from_extension)
    })
}

/// Read and parse a deck file.
///
/// Legacy binary `.ppt` files are recognised and rejected.
pub fn open_deck(path: &Path) -> Result<Deck> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    match detect_format(path, &bytes) {
        Some(DeckFormat::Pptx) => {
            log::debug!("Parsing {} as PPTX", filename);
            PptxParser::new().parse(Cursor::new(bytes), filename)
        }
        Some(DeckFormat::LegacyPpt) => Err(Error::UnsupportedFormat(format!(
            "{} is a legacy .ppt file; save it as .pptx first",
            filename
        ))),
        None => Err(Error::UnsupportedFormat(format!(
            "{} is not a PowerPoint deck",
            filename
        ))),
    }
}
