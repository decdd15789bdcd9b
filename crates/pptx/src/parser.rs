//! PPTX slide walker.

use kpi_core::{Deck, DeckSlide, Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

const PRESENTATION_PATH: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PATH: &str = "ppt/_rels/presentation.xml.rels";

/// Separator between the cells of a table row.
const CELL_SEPARATOR: &str = " | ";

/// Parser for PPTX (Office Open XML) decks.
pub struct PptxParser;

impl PptxParser {
    /// Create a new PPTX parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a PPTX deck from a reader.
    pub fn parse<R: Read + Seek>(&self, reader: R, filename: &str) -> Result<Deck> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let mut deck = Deck::new(filename);
        let slide_order = self.get_slide_order(&mut archive)?;
        if slide_order.is_empty() {
            return Err(Error::PptxParseError(format!("No slides found in {}", filename)));
        }

        for (idx, slide_path) in slide_order.iter().enumerate() {
            let slide = self.parse_slide(&mut archive, slide_path, idx + 1)?;
            log::debug!("{}: slide {} has {} text blocks", slide_path, slide.number, slide.lines.len());
            deck.add_slide(slide);
        }

        Ok(deck)
    }

    /// Ordered slide part paths.
    ///
    /// The slide id list in `presentation.xml` is authoritative. When it is
    /// missing or unreadable, slides are ordered by the number in their part
    /// name.
    fn get_slide_order<R: Read + Seek>(&self, archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
        let rels_content = self.read_file_from_archive(archive, PRESENTATION_RELS_PATH)?;
        let slide_rels: HashMap<String, String> = parse_relationships(&rels_content)?
            .into_iter()
            .filter(|rel| rel.rel_type.ends_with("/slide"))
            .map(|rel| (rel.id, resolve_target(&rel.target)))
            .collect();

        if let Ok(presentation) = self.read_file_from_archive(archive, PRESENTATION_PATH) {
            match parse_slide_id_list(&presentation) {
                Ok(ids) => {
                    let ordered: Vec<String> = ids
                        .iter()
                        .filter_map(|id| slide_rels.get(id).cloned())
                        .collect();
                    if !ordered.is_empty() {
                        return Ok(ordered);
                    }
                }
                Err(e) => log::warn!("Ignoring unreadable slide list: {}", e),
            }
        }

        let mut slides: Vec<(String, Option<usize>)> = slide_rels
            .into_values()
            .map(|path| {
                let number = path.rsplit('/').next().and_then(extract_slide_number);
                (path, number)
            })
            .collect();

        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });

        Ok(slides.into_iter().map(|(path, _)| path).collect())
    }

    /// Parse a single slide from the archive.
    fn parse_slide<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        slide_path: &str,
        slide_number: usize,
    ) -> Result<DeckSlide> {
        let content = self.read_file_from_archive(archive, slide_path)?;
        let mut slide = DeckSlide::new(slide_number);

        for shape in extract_shapes_from_xml(&content) {
            slide.add_line_with_position(shape.text, shape.y, shape.x);
        }

        // Top-to-bottom, left-to-right
        slide.sort_by_position();

        Ok(slide)
    }

    /// Read a file from the ZIP archive.
    fn read_file_from_archive<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        path: &str,
    ) -> Result<String> {
        let mut file = archive
            .by_name(path)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(content)
    }
}

impl Default for PptxParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

fn attr_string(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut rels = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                rels.push(Relationship {
                    id: attr_string(e, b"Id").unwrap_or_default(),
                    rel_type: attr_string(e, b"Type").unwrap_or_default(),
                    target: attr_string(e, b"Target").unwrap_or_default(),
                });
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing relationships: {}", e)));
            }
            _ => {}
        }
    }

    Ok(rels)
}

/// Relationship ids of `p:sldId` entries, in presentation order.
fn parse_slide_id_list(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"sldId" =>
            {
                // The plain `id` attribute is the numeric slide id; we want `r:id`.
                let rel_id = e.attributes().flatten().find(|attr| {
                    let key = attr.key.as_ref();
                    key != b"id" && local_name(key) == b"id"
                });
                if let Some(attr) = rel_id {
                    ids.push(String::from_utf8_lossy(&attr.value).to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!("Error parsing presentation: {}", e)));
            }
            _ => {}
        }
    }

    Ok(ids)
}

/// Archive path for a relationship target relative to `ppt/`.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

/// A text-bearing shape with its offset on the slide.
#[derive(Debug, Default)]
struct ShapeInfo {
    text: String,
    x: f64,
    y: f64,
}

/// Table being collected inside a graphic frame.
#[derive(Debug, Default)]
struct TableState {
    rows: Vec<String>,
    cells: Vec<String>,
    cell: String,
    in_cell: bool,
}

impl TableState {
    fn finish_cell(&mut self) {
        self.cells.push(self.cell.trim().to_string());
        self.cell.clear();
        self.in_cell = false;
    }

    fn finish_row(&mut self) {
        if self.cells.iter().any(|c| !c.is_empty()) {
            self.rows.push(self.cells.join(CELL_SEPARATOR));
        }
        self.cells.clear();
    }
}

fn is_shape(name: &[u8]) -> bool {
    matches!(name, b"sp" | b"pic" | b"graphicFrame" | b"cxnSp")
}

fn apply_offset(shape: &mut ShapeInfo, e: &BytesStart<'_>) {
    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value);
        match attr.key.as_ref() {
            b"x" => {
                if let Ok(x) = value.parse::<f64>() {
                    shape.x = x;
                }
            }
            b"y" => {
                if let Ok(y) = value.parse::<f64>() {
                    shape.y = y;
                }
            }
            _ => {}
        }
    }
}

/// Collect the text of every shape on a slide.
///
/// Text boxes keep one line per paragraph. Tables become one line per row
/// with cells joined by `" | "`. Shapes inside groups are collected on their
/// own. Malformed XML ends the walk with whatever was read so far.
fn extract_shapes_from_xml(xml_content: &str) -> Vec<ShapeInfo> {
    let mut shapes = Vec::new();
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(false);

    let mut current_shape: Option<ShapeInfo> = None;
    let mut position_set = false;
    let mut table: Option<TableState> = None;
    let mut in_run_text = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    n if is_shape(n) => {
                        current_shape = Some(ShapeInfo::default());
                        position_set = false;
                        current_text.clear();
                    }
                    b"tbl" => table = Some(TableState::default()),
                    b"tc" => {
                        if let Some(t) = table.as_mut() {
                            t.cell.clear();
                            t.in_cell = true;
                        }
                    }
                    b"p" => match table.as_mut() {
                        Some(t) if t.in_cell => {
                            if !t.cell.is_empty() {
                                t.cell.push(' ');
                            }
                        }
                        _ => {
                            if !current_text.is_empty() {
                                current_text.push('\n');
                            }
                        }
                    },
                    b"t" => in_run_text = true,
                    b"off" => {
                        if let (Some(shape), false) = (current_shape.as_mut(), position_set) {
                            apply_offset(shape, e);
                            position_set = true;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"off" => {
                        if let (Some(shape), false) = (current_shape.as_mut(), position_set) {
                            apply_offset(shape, e);
                            position_set = true;
                        }
                    }
                    b"br" => match table.as_mut() {
                        Some(t) if t.in_cell => t.cell.push(' '),
                        _ => current_text.push('\n'),
                    },
                    b"tc" => {
                        if let Some(t) = table.as_mut() {
                            t.cells.push(String::new());
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_run_text && current_shape.is_some() {
                    let text = e.unescape().unwrap_or_default();
                    match table.as_mut() {
                        Some(t) if t.in_cell => t.cell.push_str(&text),
                        _ => current_text.push_str(&text),
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"t" => in_run_text = false,
                    b"tc" => {
                        if let Some(t) = table.as_mut() {
                            t.finish_cell();
                        }
                    }
                    b"tr" => {
                        if let Some(t) = table.as_mut() {
                            t.finish_row();
                        }
                    }
                    b"tbl" => {
                        if let Some(t) = table.take() {
                            if !t.rows.is_empty() {
                                if !current_text.is_empty() {
                                    current_text.push('\n');
                                }
                                current_text.push_str(&t.rows.join("\n"));
                            }
                        }
                    }
                    n if is_shape(n) => {
                        if let Some(mut shape) = current_shape.take() {
                            shape.text = current_text.trim().to_string();
                            if !shape.text.is_empty() {
                                shapes.push(shape);
                            }
                        }
                        current_text.clear();
                        in_run_text = false;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!(
                    "XML parsing error at position {}: {}; keeping {} shape(s)",
                    reader.buffer_position(),
                    e,
                    shapes.len()
                );
                break;
            }
            _ => {}
        }
    }

    shapes
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}
