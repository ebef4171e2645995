//! The publish workflow: a state machine over the composer's steps, driven by
//! the selectors in `targets`.

pub mod publisher;
pub mod state;
pub mod targets;

pub use publisher::{PublishFlow, PublishOutcome};
pub use state::FlowState;
pub use targets::SiteSelectors;

use crate::article::ArticleDraft;
use crate::core::{BrowserTrait, Config, PageContext};
use crate::diagnostics::DiagnosticsCapture;
use crate::errors::Result;
use crate::session::AuthenticationBundle;
use tracing::warn;

/// Launch a browser, restore the session and run the workflow. The browser is
/// closed whatever the outcome.
pub async fn publish<B: BrowserTrait>(
    browser: &mut B,
    config: &Config,
    selectors: &SiteSelectors,
    bundle: &AuthenticationBundle,
    draft: &ArticleDraft,
) -> Result<PublishOutcome> {
    browser.launch(config).await?;
    let result = run_session(&*browser, config, selectors, bundle, draft).await;
    if let Err(e) = browser.close().await {
        warn!("Closing the browser failed: {}", e);
    }
    result
}

async fn run_session<B: BrowserTrait>(
    browser: &B,
    config: &Config,
    selectors: &SiteSelectors,
    bundle: &AuthenticationBundle,
    draft: &ArticleDraft,
) -> Result<PublishOutcome> {
    if bundle.is_empty() {
        warn!("The saved session has no cookies or storage; the editor will likely ask to sign in");
    }
    let tab = browser.new_tab().await?;
    browser.restore_auth(&tab, bundle).await?;

    let ctx = PageContext::new(browser, &tab, &config.timing);
    let diagnostics = DiagnosticsCapture::new(config.diagnostics.clone());
    PublishFlow::new(ctx, config, selectors, &diagnostics)
        .run(draft)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PublishError;
    use crate::session::CookieRecord;
    use crate::testing::{FakeBrowser, FakeEvent, FakePage};
    use crate::types::ClickMode;
    use std::path::Path;

    const HOME: &str = "https://note.test/";
    const COMPOSE: &str = "https://note.test/notes/new";

    fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.site.base_url = "https://note.test".to_string();
        config.diagnostics.output_dir = dir.to_path_buf();
        config
    }

    fn home_with_menu() -> FakePage {
        FakePage::at(
            HOME,
            format!(
                r#"<header><button data-testid="new-post" data-reveals="menu">投稿</button></header>
                   <ul data-group="menu">
                     <li><a role="menuitem" data-testid="text-item" data-navigate="{}">テキスト</a></li>
                   </ul>"#,
                COMPOSE
            ),
        )
    }

    fn composer(save_controls: &str) -> FakePage {
        FakePage::at(
            COMPOSE,
            format!(
                r#"<html><head><title>記事を書く</title></head><body>
                   <textarea data-testid="title" placeholder="記事タイトル"></textarea>
                   <div class="ProseMirror" data-testid="body" contenteditable="true"></div>
                   {}
                   </body></html>"#,
                save_controls
            ),
        )
    }

    fn draft(front_matter: &str) -> ArticleDraft {
        let source = format!("---\n{}\n---\nHello from the body.\n", front_matter);
        ArticleDraft::parse(&source, Path::new("/nonexistent"), None).unwrap()
    }

    fn bundle() -> AuthenticationBundle {
        AuthenticationBundle {
            cookies: vec![CookieRecord {
                name: "_note_session_v5".into(),
                value: "secret".into(),
                domain: ".note.test".into(),
                path: "/".into(),
                expires: -1.0,
                http_only: true,
                secure: true,
                same_site: None,
            }],
            origins: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn draft_without_save_button_relies_on_autosave() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut browser = FakeBrowser::with_routes([home_with_menu(), composer("")]);

        let outcome = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_state, FlowState::Saved);
        assert!(outcome.assumed_autosave);
        assert_eq!(browser.journal()[0], FakeEvent::AuthRestored { cookies: 1 });
        assert_eq!(browser.visited(), vec![HOME, COMPOSE]);
        assert_eq!(browser.filled("title"), vec!["Example"]);
        assert!(browser.typed_text().starts_with("# Example\n\n"));
        assert!(!browser.is_running());
        assert!(dir.path().join("debug-after-navigation.json").exists());
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn public_run_without_publish_button_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut browser = FakeBrowser::with_routes([
            home_with_menu(),
            composer(r#"<button data-testid="draft">下書き保存</button>"#),
        ]);

        let err = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example\nstatus: public"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PublishError::SaveOrPublishFailed(_)));
        assert!(!browser.clicked().contains(&"draft".to_string()));
        assert!(dir.path().join("debug-error.png").exists());
        assert!(dir.path().join("debug-error.json").exists());
        assert!(!browser.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_cover_and_file_input_still_publishes_with_tags() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut browser = FakeBrowser::with_routes([
            home_with_menu(),
            composer(
                r#"<button data-testid="settings" data-reveals="settings">公開設定</button>
                   <section data-group="settings">
                     <input data-testid="tags" placeholder="タグを追加">
                     <button data-testid="publish">公開に進む</button>
                   </section>"#,
            ),
        ]);

        let outcome = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example\ntags: [rust, note]\ncover_image: missing.png\nstatus: public"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_state, FlowState::Published);
        assert!(!outcome.assumed_autosave);
        assert_eq!(browser.filled("tags"), vec!["rust", "note"]);

        let journal = browser.journal();
        let enters = journal
            .iter()
            .filter(|e| matches!(e, FakeEvent::KeyPressed { target, key } if target == "tags" && key == "Enter"))
            .count();
        assert_eq!(enters, 2);
        assert!(journal.contains(&FakeEvent::Clicked {
            target: "publish".into(),
            mode: ClickMode::Force,
        }));
        assert!(!journal.iter().any(|e| matches!(e, FakeEvent::FilesSet { .. })));

        let cover = outcome
            .steps
            .iter()
            .find(|s| s.target == "cover image input")
            .unwrap();
        assert!(!cover.succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn draft_run_never_clicks_a_publish_control() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut browser = FakeBrowser::with_routes([
            home_with_menu(),
            composer(r#"<button data-testid="publish-now">公開する</button>"#),
        ]);

        let outcome = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example\ntags: [rust]"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_state, FlowState::Saved);
        assert!(outcome.assumed_autosave);
        assert!(!browser.clicked().contains(&"publish-now".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tags_do_not_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut browser = FakeBrowser::with_routes([
            home_with_menu(),
            composer(r#"<button data-testid="draft">下書き保存</button>"#),
        ]);

        let outcome = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example\ntags: [rust, note]"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_state, FlowState::Saved);
        assert!(!outcome.assumed_autosave);
        let failed_tags: Vec<_> = outcome
            .steps
            .iter()
            .filter(|s| s.target == "tag input")
            .collect();
        assert_eq!(failed_tags.len(), 2);
        assert!(failed_tags.iter().all(|s| !s.succeeded));
        assert!(browser.clicked().contains(&"draft".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn settings_reopen_when_a_tag_closes_them() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut browser = FakeBrowser::with_routes([
            home_with_menu(),
            composer(
                r#"<button data-testid="settings" data-reveals="settings">公開設定</button>
                   <section data-group="settings">
                     <input data-testid="tags" placeholder="タグを追加" data-collapses="settings">
                   </section>
                   <button data-testid="draft">下書き保存</button>"#,
            ),
        ]);

        let outcome = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example\ntags: [rust, note]"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_state, FlowState::Saved);
        assert_eq!(browser.filled("tags"), vec!["rust", "note"]);
        let settings_clicks = browser
            .clicked()
            .iter()
            .filter(|target| target.as_str() == "settings")
            .count();
        assert_eq!(settings_clicks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_composer_url_without_menu() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let late_composer = FakePage::at(
            COMPOSE,
            r#"<textarea data-testid="title" placeholder="記事タイトル" data-appear-after-ms="2000"></textarea>
               <div class="ProseMirror" data-testid="body" contenteditable="true" data-appear-after-ms="2500"></div>
               <button data-testid="draft">下書き保存</button>"#,
        );
        let mut browser = FakeBrowser::with_routes([FakePage::at(HOME, "<p>welcome</p>"), late_composer]);

        let outcome = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example"),
        )
        .await
        .unwrap();

        assert_eq!(browser.visited(), vec![HOME, COMPOSE]);
        let composer = outcome.steps.iter().find(|s| s.target == "composer").unwrap();
        assert!(composer.succeeded);
        assert_eq!(outcome.final_state, FlowState::Saved);
        assert!(!outcome.assumed_autosave);
        assert!(browser.clicked().contains(&"draft".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_body_editor_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut browser = FakeBrowser::with_routes([
            home_with_menu(),
            FakePage::at(COMPOSE, r#"<textarea placeholder="記事タイトル"></textarea>"#),
        ]);

        let err = publish(
            &mut browser,
            &config,
            &SiteSelectors::default(),
            &bundle(),
            &draft("title: Example"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PublishError::ElementNotFound { ref target, tried: 3 } if target == "body editor"));
        assert!(dir.path().join("debug-error.html").exists());
    }
}
