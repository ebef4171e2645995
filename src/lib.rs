pub mod actions;
pub mod article;
pub mod browser;
pub mod capture;
pub mod core;
pub mod diagnostics;
pub mod dom;
pub mod errors;
pub mod flow;
pub mod locator;
pub mod session;
pub mod testing;
pub mod types;
pub mod utils;

pub use article::{ArticleDraft, Visibility};
pub use browser::ChromeBrowser;
pub use errors::{PublishError, Result};
pub use flow::{PublishFlow, PublishOutcome, SiteSelectors};
pub use session::{AuthenticationBundle, SessionStore};
pub use types::*;
