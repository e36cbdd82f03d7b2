pub mod summary;

pub use summary::{generate_summary, summary_upload_policy};
