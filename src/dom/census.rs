use crate::dom::matcher::{is_hidden, rendered_text, StaticDocument};
use crate::locator::LocatorSpec;
use crate::types::PageSnapshot;
use serde::{Deserialize, Serialize};

const BODY_EXCERPT_CHARS: usize = 500;
const HTML_EXCERPT_CHARS: usize = 1000;
const BUTTON_SAMPLE: usize = 10;

/// Element counts that tell a maintainer what the page looked like when a
/// step failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageCensus {
    pub url: String,
    pub title: String,
    pub frame_urls: Vec<String>,
    pub dialogs: usize,
    pub buttons: usize,
    pub textareas: usize,
    pub text_inputs: usize,
    pub editables: usize,
    pub file_inputs: usize,
    pub button_samples: Vec<ButtonSample>,
    pub body_excerpt: String,
    pub html_excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonSample {
    pub text: String,
    pub visible: bool,
}

/// How many elements each strategy of a target matches in the captured HTML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub strategies: Vec<StrategyMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyMatch {
    pub strategy: String,
    pub matches: usize,
}

fn excerpt(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

impl PageCensus {
    pub fn from_snapshot(snapshot: &PageSnapshot) -> Self {
        let doc = StaticDocument::parse(&snapshot.html);
        let buttons = doc.select("button");

        Self {
            url: snapshot.url.clone(),
            title: snapshot.title.clone(),
            frame_urls: snapshot.frame_urls.clone(),
            dialogs: doc.select(r#"[role="dialog"], .modal, [class*="modal"]"#).len(),
            buttons: buttons.len(),
            textareas: doc.select("textarea").len(),
            text_inputs: doc.select(r#"input[type="text"]"#).len(),
            editables: doc.select(r#"[contenteditable="true"]"#).len(),
            file_inputs: doc.select(r#"input[type="file"]"#).len(),
            button_samples: buttons
                .iter()
                .take(BUTTON_SAMPLE)
                .map(|b| ButtonSample {
                    text: rendered_text(b),
                    visible: !is_hidden(b),
                })
                .collect(),
            body_excerpt: excerpt(&snapshot.body_text, BODY_EXCERPT_CHARS),
            html_excerpt: excerpt(&snapshot.html, HTML_EXCERPT_CHARS),
        }
    }
}

pub fn target_reports(html: &str, specs: &[&LocatorSpec]) -> Vec<TargetReport> {
    let doc = StaticDocument::parse(html);
    specs
        .iter()
        .map(|spec| TargetReport {
            target: spec.target.clone(),
            strategies: spec
                .candidates
                .iter()
                .map(|c| StrategyMatch {
                    strategy: c.strategy.to_string(),
                    matches: doc.count(&c.strategy),
                })
                .collect(),
        })
        .collect()
}
