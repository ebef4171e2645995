use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an element lives: the top document or a same-origin frame, indexed
/// in document order of `iframe`/`frame` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Document,
    Frame(usize),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Document => write!(f, "document"),
            Scope::Frame(index) => write!(f, "frame[{}]", index),
        }
    }
}

/// An element tagged by a successful probe. The token is only meaningful to
/// the browser that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub scope: Scope,
    pub token: String,
}

impl ElementHandle {
    pub fn new(scope: Scope, token: impl Into<String>) -> Self {
        Self {
            scope,
            token: token.into(),
        }
    }
}

/// One probe of one strategy against the live page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHit {
    pub handle: ElementHandle,
    pub visible: bool,
    pub enabled: bool,
    /// Accessible name of the element, or its text when it has none.
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickMode {
    #[default]
    Normal,
    /// Skip visibility and occlusion checks, for controls that are rendered
    /// but covered by something else.
    Force,
}

/// How settled a navigation must be before it counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    NetworkIdle,
}

/// Raw page state as handed back by a browser; diagnostics turn it into files.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub html: String,
    pub body_text: String,
    pub frame_urls: Vec<String>,
    pub screenshot_png: Option<Vec<u8>>,
}
