pub mod pdf_text;
pub mod prompt;

pub use pdf_text::{
    document_text, render_page, truncate_chars, ExtractError, LopdfExtractor, TextExtractor,
    TextFragment, MAX_TEXT_CHARS,
};
pub use prompt::summary_prompt;
