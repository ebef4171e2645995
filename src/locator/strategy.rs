use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Text matching used for accessible names, placeholders and rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPattern {
    Contains(String),
    Exact(String),
    AnyOf(Vec<TextPattern>),
}

impl TextPattern {
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Contains(needle) => text.contains(needle.as_str()),
            Self::Exact(expected) => text == expected,
            Self::AnyOf(patterns) => patterns.iter().any(|p| p.matches(text)),
        }
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(needle) => write!(f, "*{}*", needle),
            Self::Exact(expected) => write!(f, "={}", expected),
            Self::AnyOf(patterns) => {
                let parts: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
        }
    }
}

/// One way of finding a semantic target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Strategy {
    /// Explicit or implicit ARIA role, optionally filtered by accessible name.
    Role {
        role: String,
        #[serde(default)]
        name: Option<TextPattern>,
    },
    Placeholder { text: TextPattern },
    /// All matches of a CSS selector; the first visible one wins.
    Css { selector: String },
    /// Only the first match of a CSS selector, visible or not.
    FirstOf { selector: String },
    /// Scan matches of `selector` in document order and take the first whose
    /// rendered text matches.
    RenderedText { selector: String, text: TextPattern },
}

impl Strategy {
    pub fn role(role: impl Into<String>, name: TextPattern) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name),
        }
    }

    pub fn placeholder(text: TextPattern) -> Self {
        Self::Placeholder { text }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    pub fn first_of(selector: impl Into<String>) -> Self {
        Self::FirstOf {
            selector: selector.into(),
        }
    }

    pub fn rendered_text(selector: impl Into<String>, text: TextPattern) -> Self {
        Self::RenderedText {
            selector: selector.into(),
            text,
        }
    }

    /// The pattern this strategy matches names or rendered text against.
    pub fn label_pattern(&self) -> Option<&TextPattern> {
        match self {
            Self::Role { name, .. } => name.as_ref(),
            Self::RenderedText { text, .. } => Some(text),
            Self::Placeholder { .. } | Self::Css { .. } | Self::FirstOf { .. } => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role, name: Some(name) } => write!(f, "role={} name={}", role, name),
            Self::Role { role, name: None } => write!(f, "role={}", role),
            Self::Placeholder { text } => write!(f, "placeholder={}", text),
            Self::Css { selector } => write!(f, "css={}", selector),
            Self::FirstOf { selector } => write!(f, "first-of={}", selector),
            Self::RenderedText { selector, text } => write!(f, "text({})={}", selector, text),
        }
    }
}

/// What a probe hit must satisfy before it counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Attached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub strategy: Strategy,
    #[serde(default, rename = "timeout_ms", with = "opt_millis")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub state: WaitState,
}

impl Candidate {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            timeout: None,
            state: WaitState::Visible,
        }
    }

    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

/// Ordered fallback list for one semantic target. Earlier candidates are
/// preferred; resolution stops at the first success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSpec {
    pub target: String,
    pub candidates: Vec<Candidate>,
}

impl LocatorSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            candidates: Vec::new(),
        }
    }

    pub fn then(mut self, strategy: Strategy) -> Self {
        self.candidates.push(Candidate::new(strategy));
        self
    }

    pub fn then_within(mut self, strategy: Strategy, timeout: Duration) -> Self {
        let mut candidate = Candidate::new(strategy);
        candidate.timeout = Some(timeout);
        self.candidates.push(candidate);
        self
    }

    /// Accept matches that are attached but not rendered.
    pub fn attached(mut self) -> Self {
        for candidate in &mut self.candidates {
            candidate.state = WaitState::Attached;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Whether any candidate would pick an element labelled `label`.
    pub fn matches_label(&self, label: &str) -> bool {
        self.candidates
            .iter()
            .filter_map(|c| c.strategy.label_pattern())
            .any(|pattern| pattern.matches(label))
    }

    /// Upper bound of a full resolution.
    pub fn total_budget(&self, default: Duration) -> Duration {
        self.candidates.iter().map(|c| c.timeout(default)).sum()
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
