//! Interaction primitives: resolve a target through its fallback chain, then
//! act on it.

pub mod base;
pub mod primitives;

pub use base::StepResult;
pub use primitives::{chunk, click, fill_and_press, fill_text, press_key, type_chunked, upload_file};
