pub mod encoder;

pub use encoder::{encode_inline, InlinePayload};
