//! Domain types for representing the raw text of a report deck.

use serde::{Deserialize, Serialize};

/// A report deck with the raw text of every slide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    /// Original filename (without path).
    pub filename: String,

    /// Slides in presentation order.
    pub slides: Vec<DeckSlide>,
}

impl Deck {
    /// Create an empty deck with the given filename.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            slides: Vec::new(),
        }
    }

    /// Build a deck from `(slide-index, raw-slide-text)` pairs.
    pub fn from_texts<I, S>(filename: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        let mut deck = Self::new(filename);
        for (number, text) in texts {
            let mut slide = DeckSlide::new(number);
            slide.add_line(text);
            deck.add_slide(slide);
        }
        deck
    }

    /// Add a slide to the deck.
    pub fn add_slide(&mut self, slide: DeckSlide) {
        self.slides.push(slide);
    }
}

/// The detected container format of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeckFormat {
    /// Modern PPTX (Office Open XML).
    Pptx,
    /// Legacy PPT (OLE/CFB binary). Detected so it can be rejected clearly.
    LegacyPpt,
}

impl DeckFormat {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pptx" => Some(Self::Pptx),
            "ppt" => Some(Self::LegacyPpt),
            _ => None,
        }
    }

    /// Detect format from file magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }

        // PPTX is a ZIP file (PK\x03\x04)
        if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
            return Some(Self::Pptx);
        }

        // PPT is an OLE/CFB file (D0 CF 11 E0 A1 B1 1A E1)
        if bytes.len() >= 8
            && bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])
        {
            return Some(Self::LegacyPpt);
        }

        None
    }
}

/// A single slide of a deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSlide {
    /// 1-based slide number.
    pub number: usize,

    /// Text blocks extracted from this slide, in reading order.
    pub lines: Vec<SlideText>,
}

impl DeckSlide {
    /// Create a new slide with the given number.
    pub fn new(number: usize) -> Self {
        Self {
            number,
            lines: Vec::new(),
        }
    }

    /// Add a text block to this slide.
    pub fn add_line(&mut self, text: impl Into<String>) {
        self.lines.push(SlideText::new(text));
    }

    /// Add a text block with position information.
    pub fn add_line_with_position(&mut self, text: impl Into<String>, y: f64, x: f64) {
        self.lines.push(SlideText::with_position(text, y, x));
    }

    /// Sort text blocks by position (top-to-bottom, then left-to-right).
    pub fn sort_by_position(&mut self) {
        self.lines.sort_by(|a, b| {
            let y_cmp = a
                .y_position
                .partial_cmp(&b.y_position)
                .unwrap_or(std::cmp::Ordering::Equal);
            if y_cmp == std::cmp::Ordering::Equal {
                a.x_position
                    .partial_cmp(&b.x_position)
                    .unwrap_or(std::cmp::Ordering::Equal)
            } else {
                y_cmp
            }
        });
    }

    /// The slide's raw text: every non-empty block, newline-joined.
    pub fn raw_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text content from a shape, table, or text frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideText {
    /// The actual text content.
    pub text: String,

    /// Y position for ordering (top-to-bottom). None if unknown.
    pub y_position: Option<f64>,

    /// X position for ordering (left-to-right). None if unknown.
    pub x_position: Option<f64>,
}

impl SlideText {
    /// Create new slide text without position info.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            y_position: None,
            x_position: None,
        }
    }

    /// Create new slide text with position info.
    pub fn with_position(text: impl Into<String>, y: f64, x: f64) -> Self {
        Self {
            text: text.into(),
            y_position: Some(y),
            x_position: Some(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_magic() {
        assert_eq!(
            DeckFormat::from_magic(&[0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0]),
            Some(DeckFormat::Pptx)
        );
        assert_eq!(
            DeckFormat::from_magic(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
            Some(DeckFormat::LegacyPpt)
        );
        assert_eq!(DeckFormat::from_magic(b"%PDF-1.7"), None);
        assert_eq!(DeckFormat::from_magic(b"PK"), None);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DeckFormat::from_extension("PPTX"), Some(DeckFormat::Pptx));
        assert_eq!(DeckFormat::from_extension("ppt"), Some(DeckFormat::LegacyPpt));
        assert_eq!(DeckFormat::from_extension("key"), None);
    }

    #[test]
    fn test_raw_text_skips_blank_blocks() {
        let mut slide = DeckSlide::new(1);
        slide.add_line("  PerformanceMax  ");
        slide.add_line("   ");
        slide.add_line("Impressions: 1,234");
        assert_eq!(slide.raw_text(), "PerformanceMax\nImpressions: 1,234");
    }

    #[test]
    fn test_sort_by_position() {
        let mut slide = DeckSlide::new(1);
        slide.add_line_with_position("bottom", 500.0, 0.0);
        slide.add_line_with_position("top right", 10.0, 300.0);
        slide.add_line_with_position("top left", 10.0, 5.0);
        slide.sort_by_position();
        assert_eq!(slide.raw_text(), "top left\ntop right\nbottom");
    }

    #[test]
    fn test_deck_from_texts() {
        let deck = Deck::from_texts("report.pptx", vec![(1, "Intro"), (2, "Social Ads")]);
        assert_eq!(deck.slides.len(), 2);
        assert_eq!(deck.slides[1].number, 2);
        assert_eq!(deck.slides[1].raw_text(), "Social Ads");
    }
}
