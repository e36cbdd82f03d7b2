//! Text-extraction strategy: a PDF is decoded into positioned text
//! fragments per page, each page is rendered into lines, and the pages are
//! joined into one plain-text document.

use async_trait::async_trait;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use thiserror::Error;

/// Extracted text beyond this many characters is dropped before prompting.
pub const MAX_TEXT_CHARS: usize = 30_000;

/// Separator between rendered pages.
const PAGE_SEPARATOR: &str = "\n\n";

/// `TJ` adjustments more negative than this (thousandths of an em) are
/// rendered as a word gap.
const TJ_SPACE_THRESHOLD: f64 = -100.0;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to parse PDF document: {0}")]
    Parse(String),

    #[error("PDF contains no extractable text")]
    Empty,

    #[error("Text extraction task failed: {0}")]
    Task(String),
}

impl ExtractError {
    /// Message that is safe to return to the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            ExtractError::Parse(_) | ExtractError::Task(_) => "Failed to parse PDF document",
            ExtractError::Empty => "PDF contains no extractable text",
        }
    }
}

impl From<lopdf::Error> for ExtractError {
    fn from(err: lopdf::Error) -> Self {
        ExtractError::Parse(err.to_string())
    }
}

/// A run of text and the vertical position it was drawn at.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub y: f64,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, y: f64) -> Self {
        Self {
            text: text.into(),
            y,
        }
    }
}

/// Renders one page: fragments drawn at the same height share a line, and
/// a change of height starts a new one.
pub fn render_page(fragments: &[TextFragment]) -> String {
    let mut page = String::new();
    let mut last_y: Option<f64> = None;

    for fragment in fragments {
        if let Some(y) = last_y {
            if y != fragment.y {
                page.push('\n');
            }
        }
        page.push_str(&fragment.text);
        last_y = Some(fragment.y);
    }

    page
}

/// Joins rendered pages in page order.
pub fn join_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    pages
        .into_iter()
        .map(|page| page.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

/// Keeps the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Turns PDF bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, pdf: Vec<u8>) -> Result<String, ExtractError>;
}

/// Runs the extractor and prepares its output for the prompt: surrounding
/// whitespace is trimmed, blank text is an error and the rest is capped at
/// [`MAX_TEXT_CHARS`].
pub async fn document_text(
    extractor: &dyn TextExtractor,
    pdf: Vec<u8>,
) -> Result<String, ExtractError> {
    let raw = extractor.extract(pdf).await?;
    let text = raw.trim();
    if text.is_empty() {
        return Err(ExtractError::Empty);
    }

    let total_chars = text.chars().count();
    let truncated = truncate_chars(text, MAX_TEXT_CHARS);
    if total_chars > MAX_TEXT_CHARS {
        tracing::info!(
            total_chars,
            kept_chars = MAX_TEXT_CHARS,
            "Extracted text truncated"
        );
    }

    Ok(truncated.to_string())
}

/// Extractor backed by `lopdf`. Decoding is CPU-bound and runs on the
/// blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for LopdfExtractor {
    async fn extract(&self, pdf: Vec<u8>) -> Result<String, ExtractError> {
        tokio::task::spawn_blocking(move || extract_text(&pdf))
            .await
            .map_err(|e| ExtractError::Task(e.to_string()))?
    }
}

/// Decodes every page of `pdf` and joins the rendered pages.
pub fn extract_text(pdf: &[u8]) -> Result<String, ExtractError> {
    let document = Document::load_mem(pdf)?;

    let mut pages = Vec::new();
    for (page_number, page_id) in document.get_pages() {
        let fragments = page_fragments(&document, page_id)?;
        tracing::debug!(page_number, fragments = fragments.len(), "Page decoded");
        pages.push(render_page(&fragments));
    }

    Ok(join_pages(pages))
}

fn page_fragments(
    document: &Document,
    page_id: ObjectId,
) -> Result<Vec<TextFragment>, ExtractError> {
    let fonts = document.get_page_fonts(page_id);
    let content = Content::decode(&document.get_page_content(page_id)?)?;

    let mut walker = ContentWalker::new(&fonts);
    for operation in &content.operations {
        walker.apply(&operation.operator, &operation.operands);
    }

    Ok(walker.fragments)
}

/// Affine matrix `[a b c d e f]` as used by PDF content streams.
type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `m * n`
fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f64; N]> {
    let mut values = [0.0; N];
    if operands.len() < N {
        return None;
    }
    for (value, operand) in values.iter_mut().zip(operands) {
        *value = number(operand)?;
    }
    Some(values)
}

/// Tracks text and graphics state across one page's content stream and
/// collects the text it draws.
struct ContentWalker<'a> {
    fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>,
    encoding: Option<&'a str>,
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    leading: f64,
    fragments: Vec<TextFragment>,
}

impl<'a> ContentWalker<'a> {
    fn new(fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>) -> Self {
        Self {
            fonts,
            encoding: None,
            ctm: IDENTITY,
            saved: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            leading: 0.0,
            fragments: Vec::new(),
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.ctm = multiply(&m, &self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                let fonts = self.fonts;
                self.encoding = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .and_then(|name| fonts.get(name))
                    .map(|font| font.get_font_encoding());
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    self.leading = leading;
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(text) = operands.first().and_then(|s| self.decode(s)) {
                    self.emit(text);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let text = self.decode_array(items);
                    self.emit(text);
                }
            }
            "'" => {
                self.next_line();
                if let Some(text) = operands.first().and_then(|s| self.decode(s)) {
                    self.emit(text);
                }
            }
            "\"" => {
                self.next_line();
                if let Some(text) = operands.get(2).and_then(|s| self.decode(s)) {
                    self.emit(text);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn decode(&self, object: &Object) -> Option<String> {
        match object {
            Object::String(bytes, _) => Some(Document::decode_text(self.encoding, bytes)),
            _ => None,
        }
    }

    fn decode_array(&self, items: &[Object]) -> String {
        let mut text = String::new();
        for item in items {
            match item {
                Object::String(..) => {
                    if let Some(decoded) = self.decode(item) {
                        text.push_str(&decoded);
                    }
                }
                other => {
                    if number(other).is_some_and(|adjust| adjust < TJ_SPACE_THRESHOLD) {
                        text.push(' ');
                    }
                }
            }
        }
        text
    }

    fn emit(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        let y = multiply(&self.text_matrix, &self.ctm)[5];
        self.fragments.push(TextFragment { text, y });
    }
}
