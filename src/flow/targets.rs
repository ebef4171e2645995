use crate::errors::{PublishError, Result};
use crate::locator::{LocatorSpec, Strategy, TextPattern};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Every UI target the composer workflow touches, as fallback chains. The
/// defaults describe note.com's editor; a JSON file can replace any of them
/// when the markup changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    pub new_post_button: LocatorSpec,
    pub text_menu_item: LocatorSpec,
    /// Polled together with `composer_body` once the composer URL is loaded
    /// directly.
    pub composer_title: LocatorSpec,
    pub composer_body: LocatorSpec,
    pub title_field: LocatorSpec,
    pub body_editor: LocatorSpec,
    pub cover_input: LocatorSpec,
    pub publish_settings: LocatorSpec,
    pub tag_input: LocatorSpec,
    pub publish_button: LocatorSpec,
    pub draft_button: LocatorSpec,
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

impl Default for SiteSelectors {
    fn default() -> Self {
        let title = TextPattern::contains("タイトル");

        Self {
            new_post_button: LocatorSpec::new("new post button")
                .then_within(Strategy::role("button", TextPattern::contains("投稿")), secs(15)),
            text_menu_item: LocatorSpec::new("text post menu item")
                .then_within(Strategy::role("menuitem", TextPattern::contains("テキスト")), secs(15)),
            composer_title: LocatorSpec::new("composer title").then(Strategy::first_of("textarea")),
            composer_body: LocatorSpec::new("composer body")
                .then(Strategy::first_of(r#"[contenteditable="true"]"#)),
            title_field: LocatorSpec::new("title field")
                .then_within(Strategy::css(r#"textarea[placeholder="記事タイトル"]"#), secs(10))
                .then_within(Strategy::first_of("textarea"), secs(10))
                .then_within(Strategy::placeholder(TextPattern::contains("記事タイトル")), secs(10))
                .then_within(Strategy::placeholder(title), secs(10))
                .then_within(Strategy::css(r#"input[placeholder*="タイトル"]"#), secs(10))
                .then_within(Strategy::css(r#"textarea[placeholder*="タイトル"]"#), secs(10)),
            body_editor: LocatorSpec::new("body editor")
                .then_within(Strategy::css(r#".ProseMirror[contenteditable="true"]"#), secs(10))
                .then_within(Strategy::css(r#"[role="textbox"][contenteditable="true"]"#), secs(10))
                .then_within(Strategy::first_of(r#"[contenteditable="true"]"#), secs(10)),
            cover_input: LocatorSpec::new("cover image input")
                .then_within(Strategy::first_of(r#"input[type="file"]"#), secs(10))
                .attached(),
            publish_settings: LocatorSpec::new("publish settings")
                .then_within(Strategy::role("button", TextPattern::contains("公開設定")), secs(5))
                .then_within(Strategy::role("button", TextPattern::contains("公開")), secs(5))
                .then_within(Strategy::role("button", TextPattern::contains("設定")), secs(5)),
            tag_input: LocatorSpec::new("tag input").then_within(
                Strategy::placeholder(TextPattern::AnyOf(vec![
                    TextPattern::contains("タグを追加"),
                    TextPattern::contains("タグ"),
                ])),
                secs(8),
            ),
            publish_button: LocatorSpec::new("publish button")
                .then_within(
                    Strategy::rendered_text(
                        "button",
                        TextPattern::AnyOf(vec![
                            TextPattern::contains("公開に進む"),
                            TextPattern::contains("公開する"),
                            TextPattern::exact("公開"),
                        ]),
                    ),
                    secs(1),
                )
                .attached(),
            draft_button: LocatorSpec::new("draft save button")
                .then_within(
                    Strategy::rendered_text(
                        "button",
                        TextPattern::AnyOf(vec![
                            TextPattern::contains("下書き保存"),
                            TextPattern::contains("下書き"),
                            TextPattern::exact("保存"),
                        ]),
                    ),
                    secs(1),
                )
                .attached(),
        }
    }
}

impl SiteSelectors {
    /// Load overrides from JSON. Targets missing from the file keep their
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PublishError::ConfigurationError(format!("{}: {}", path.display(), e))
        })?;
        let selectors: Self = serde_json::from_str(&raw)?;
        if let Some(empty) = selectors.all().into_iter().find(|s| s.is_empty()) {
            return Err(PublishError::ConfigurationError(format!(
                "{} has no candidates",
                empty.target
            )));
        }
        Ok(selectors)
    }

    /// Every target, for diagnostics reports.
    pub fn all(&self) -> Vec<&LocatorSpec> {
        vec![
            &self.new_post_button,
            &self.text_menu_item,
            &self.composer_title,
            &self.composer_body,
            &self.title_field,
            &self.body_editor,
            &self.cover_input,
            &self.publish_settings,
            &self.tag_input,
            &self.publish_button,
            &self.draft_button,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::StaticDocument;
    use crate::locator::WaitState;

    #[test]
    fn defaults_carry_editor_timeouts() {
        let selectors = SiteSelectors::default();
        let default = Duration::from_secs(10);
        assert_eq!(selectors.title_field.len(), 6);
        assert_eq!(selectors.title_field.total_budget(default), secs(60));
        assert_eq!(selectors.body_editor.total_budget(default), secs(30));
        assert_eq!(selectors.publish_settings.total_budget(default), secs(15));
        assert_eq!(selectors.cover_input.candidates[0].state, WaitState::Attached);
    }

    #[test]
    fn save_scan_distinguishes_intents() {
        let selectors = SiteSelectors::default();
        let page = StaticDocument::parse(
            r#"<button>公開設定</button><button>下書き保存</button><button>公開に進む</button>"#,
        );
        let publish = page.candidates(&selectors.publish_button.candidates[0].strategy);
        let draft = page.candidates(&selectors.draft_button.candidates[0].strategy);
        assert_eq!(publish.len(), 1);
        assert_eq!(draft.len(), 1);
        assert_ne!(publish, draft);
    }

    #[test]
    fn partial_override_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectors.json");
        std::fs::write(
            &path,
            r#"{"tag_input": {"target": "tag input", "candidates": [{"by": "css", "selector": "input.tags"}]}}"#,
        )
        .unwrap();

        let selectors = SiteSelectors::load(&path).unwrap();
        assert_eq!(selectors.tag_input.candidates[0].strategy, Strategy::css("input.tags"));
        assert_eq!(selectors.title_field.len(), 6);
    }

    #[test]
    fn empty_chain_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectors.json");
        std::fs::write(&path, r#"{"body_editor": {"target": "body editor", "candidates": []}}"#).unwrap();
        assert!(matches!(
            SiteSelectors::load(&path),
            Err(PublishError::ConfigurationError(_))
        ));
    }
}
