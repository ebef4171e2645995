pub mod chrome;
pub mod navigation;
pub mod page_events;

pub use chrome::ChromeBrowser;
pub use navigation::{evaluate_json, NavigationManager, NavigationResult};
pub use page_events::{PageEventLog, PageMessage};
