pub mod caption;

pub use caption::{caption_upload_policy, generate_caption, CAPTION_PROMPT};
