pub mod census;
pub mod matcher;

pub use census::{target_reports, PageCensus, TargetReport};
pub use matcher::StaticDocument;
