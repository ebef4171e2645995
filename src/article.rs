//! Markdown article input: a YAML front-matter block followed by the body.

use crate::errors::{PublishError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

pub const UNTITLED: &str = "（無題）";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Draft,
    Public,
}

impl Visibility {
    /// `status: public` in the front matter means public; anything else is a
    /// draft. An explicit flag wins over the front matter.
    pub fn resolve(status: Option<&str>, flag: Option<bool>) -> Self {
        let public = match flag {
            Some(flag) => flag,
            None => status
                .map(|s| s.trim().eq_ignore_ascii_case("public"))
                .unwrap_or(false),
        };
        if public {
            Visibility::Public
        } else {
            Visibility::Draft
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: String,
    /// Always starts with a heading line.
    pub body_markdown: String,
    /// Submitted in this order.
    pub tags: Vec<String>,
    pub cover_image: Option<PathBuf>,
    pub visibility: Visibility,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Split `source` into its front matter (if any) and the remaining body.
fn split_front_matter(source: &str) -> Result<(Option<&str>, &str)> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let Some(rest) = source
        .strip_prefix("---\n")
        .or_else(|| source.strip_prefix("---\r\n"))
    else {
        return Ok((None, source));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Ok((Some(&rest[..offset]), &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(PublishError::InvalidArticle(
        "front matter is not terminated".to_string(),
    ))
}

static LEADING_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s+").expect("heading pattern is a valid regex"));

/// Prefix `# {title}` unless the body already opens with a heading.
pub fn ensure_heading(title: &str, body: &str) -> String {
    if LEADING_HEADING.is_match(body.trim()) {
        body.to_string()
    } else {
        format!("# {}\n\n{}", title, body)
    }
}

impl ArticleDraft {
    pub fn load(path: &Path, public_flag: Option<bool>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&source, base_dir, public_flag)
    }

    /// Parse a Markdown document. A relative `cover_image` is resolved
    /// against `base_dir`.
    pub fn parse(source: &str, base_dir: &Path, public_flag: Option<bool>) -> Result<Self> {
        let (front, body) = split_front_matter(source)?;

        let meta = match front {
            Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str::<Value>(yaml)?,
            _ => Value::Null,
        };
        if !matches!(meta, Value::Mapping(_) | Value::Null) {
            return Err(PublishError::InvalidArticle(
                "front matter must be a mapping".to_string(),
            ));
        }

        let title = meta
            .get("title")
            .and_then(scalar_to_string)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let tags = match meta.get("tags") {
            Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
            _ => Vec::new(),
        };

        let cover_image = meta
            .get("cover_image")
            .and_then(scalar_to_string)
            .filter(|c| !c.trim().is_empty())
            .map(|c| base_dir.join(c.trim()));

        let status = meta.get("status").and_then(scalar_to_string);
        let visibility = Visibility::resolve(status.as_deref(), public_flag);

        debug!(
            "Parsed article {:?}: {} tags, cover {:?}, {:?}",
            title,
            tags.len(),
            cover_image,
            visibility
        );

        Ok(Self {
            body_markdown: ensure_heading(&title, body),
            title,
            tags,
            cover_image,
            visibility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "---\ntitle: Example\ntags: [rust, note, 2024]\ncover_image: img/cover.png\nstatus: public\n---\nFirst paragraph.\n";

    #[test]
    fn headless_body_gets_title_heading() {
        let draft = ArticleDraft::parse(ARTICLE, Path::new("/posts"), None).unwrap();
        assert!(draft.body_markdown.starts_with("# Example\n\n"));
        assert!(draft.body_markdown.ends_with("First paragraph.\n"));
    }

    #[test]
    fn existing_heading_is_kept() {
        let source = "---\ntitle: Example\n---\n\n# Already here\n\ntext";
        let draft = ArticleDraft::parse(source, Path::new("."), None).unwrap();
        assert_eq!(draft.body_markdown, "\n# Already here\n\ntext");
    }

    #[test]
    fn hashtag_without_space_is_not_a_heading() {
        assert_eq!(ensure_heading("T", "#tag line"), "# T\n\n#tag line");
    }

    #[test]
    fn heading_after_blank_lines_is_kept_on_every_call() {
        for _ in 0..3 {
            assert_eq!(ensure_heading("T", "\n\n#\tIntro\nbody"), "\n\n#\tIntro\nbody");
        }
    }

    #[test]
    fn reads_metadata() {
        let draft = ArticleDraft::parse(ARTICLE, Path::new("/posts"), None).unwrap();
        assert_eq!(draft.title, "Example");
        assert_eq!(draft.tags, vec!["rust", "note", "2024"]);
        assert_eq!(draft.cover_image, Some(PathBuf::from("/posts/img/cover.png")));
        assert_eq!(draft.visibility, Visibility::Public);
    }

    #[test]
    fn missing_title_uses_placeholder() {
        let draft = ArticleDraft::parse("---\ntitle: \"  \"\n---\nbody", Path::new("."), None).unwrap();
        assert_eq!(draft.title, UNTITLED);
        assert!(draft.body_markdown.starts_with("# （無題）"));

        let bare = ArticleDraft::parse("just text", Path::new("."), None).unwrap();
        assert_eq!(bare.title, UNTITLED);
        assert!(bare.tags.is_empty());
        assert_eq!(bare.visibility, Visibility::Draft);
    }

    #[test]
    fn flag_overrides_status() {
        let draft = ArticleDraft::parse(ARTICLE, Path::new("."), Some(false)).unwrap();
        assert_eq!(draft.visibility, Visibility::Draft);
        assert_eq!(Visibility::resolve(Some("draft"), Some(true)), Visibility::Public);
        assert_eq!(Visibility::resolve(Some("PUBLIC"), None), Visibility::Public);
    }

    #[test]
    fn unterminated_front_matter_is_rejected() {
        let err = ArticleDraft::parse("---\ntitle: x\nbody", Path::new("."), None).unwrap_err();
        assert!(matches!(err, PublishError::InvalidArticle(_)));
    }

    #[test]
    fn load_resolves_cover_beside_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.md");
        std::fs::write(&path, ARTICLE).unwrap();
        let draft = ArticleDraft::load(&path, None).unwrap();
        assert_eq!(draft.cover_image, Some(dir.path().join("img/cover.png")));
    }
}
