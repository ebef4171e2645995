use crate::actions::{self, StepResult};
use crate::article::{ArticleDraft, Visibility};
use crate::core::{BrowserTrait, Config, PageContext};
use crate::diagnostics::{DiagnosticReport, DiagnosticsCapture};
use crate::errors::{PublishError, Result};
use crate::flow::{FlowState, SiteSelectors};
use crate::locator::LocatorResolver;
use crate::types::{ClickMode, WaitUntil};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What a finished run did.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// `Saved` or `Published`.
    pub final_state: FlowState,
    pub steps: Vec<StepResult>,
    /// The draft was not saved explicitly; the editor's auto-save is trusted
    /// to have persisted it.
    pub assumed_autosave: bool,
    pub diagnostics: Vec<DiagnosticReport>,
}

/// Drives the composer from the home page to a saved draft or a published
/// article.
pub struct PublishFlow<'a, B: BrowserTrait> {
    ctx: PageContext<'a, B>,
    config: &'a Config,
    selectors: &'a SiteSelectors,
    diagnostics: &'a DiagnosticsCapture,
    state: FlowState,
    steps: Vec<StepResult>,
    reports: Vec<DiagnosticReport>,
    outcome: Option<FlowState>,
    assumed_autosave: bool,
}

impl<'a, B: BrowserTrait> PublishFlow<'a, B> {
    pub fn new(
        ctx: PageContext<'a, B>,
        config: &'a Config,
        selectors: &'a SiteSelectors,
        diagnostics: &'a DiagnosticsCapture,
    ) -> Self {
        Self {
            ctx,
            config,
            selectors,
            diagnostics,
            state: FlowState::Start,
            steps: Vec::new(),
            reports: Vec::new(),
            outcome: None,
            assumed_autosave: false,
        }
    }

    /// Run every step. On a fatal error the page is dumped as `error`
    /// diagnostics before the error is returned.
    pub async fn run(mut self, draft: &ArticleDraft) -> Result<PublishOutcome> {
        info!("Publishing {:?} as {:?}", draft.title, draft.visibility);

        while !self.state.is_terminal() {
            let from = self.state;
            match self.advance(draft).await {
                Ok(to) => {
                    debug!("{} -> {}", from, to);
                    if matches!(to, FlowState::Saved | FlowState::Published) {
                        self.outcome = Some(to);
                    }
                    self.state = to;
                }
                Err(e) => {
                    error!("Step from {} failed: {}", from, e);
                    self.state = FlowState::Failed;
                    self.diagnostics
                        .capture(&self.ctx, "error", &self.selectors.all())
                        .await;
                    return Err(e);
                }
            }
        }

        Ok(PublishOutcome {
            final_state: self.outcome.unwrap_or(FlowState::Done),
            steps: self.steps,
            assumed_autosave: self.assumed_autosave,
            diagnostics: self.reports,
        })
    }

    /// Perform the current state's step and return the state it leads to.
    async fn advance(&mut self, draft: &ArticleDraft) -> Result<FlowState> {
        match self.state {
            FlowState::Start => self.go_home().await?,
            FlowState::Home => {
                self.open_composer().await?;
                if let Some(report) = self
                    .diagnostics
                    .checkpoint(&self.ctx, "after-navigation", &self.selectors.all())
                    .await
                {
                    self.reports.push(report);
                }
            }
            FlowState::ComposerOpen => self.set_title(&draft.title).await,
            FlowState::TitleSet => {
                let step = actions::type_chunked(
                    &self.ctx,
                    &self.selectors.body_editor,
                    &draft.body_markdown,
                    self.config.timing.chunk_size,
                    Duration::from_millis(self.config.timing.inter_chunk_delay_ms),
                )
                .await?;
                self.steps.push(step);
            }
            FlowState::BodySet => {
                let step = match &draft.cover_image {
                    Some(cover) => actions::upload_file(&self.ctx, &self.selectors.cover_input, cover).await,
                    None => StepResult::skipped(&self.selectors.cover_input.target),
                };
                self.steps.push(step);
            }
            FlowState::CoverAttempted => self.add_tags(&draft.tags, draft.visibility).await,
            FlowState::TagsAttempted => return self.save_or_publish(draft.visibility).await,
            FlowState::Saved | FlowState::Published => {}
            FlowState::Done | FlowState::Failed => return Ok(self.state),
        }
        Ok(self.state.next().unwrap_or(self.state))
    }

    async fn go_home(&mut self) -> Result<()> {
        let home = self.config.base_url()?;
        info!("Navigating to {}", home);
        self.ctx
            .browser
            .navigate(
                self.ctx.tab,
                home.as_str(),
                WaitUntil::DomContentLoaded,
                Duration::from_millis(self.config.timing.navigation_timeout_ms),
            )
            .await?;
        debug!("Current URL: {}", self.ctx.browser.current_url(self.ctx.tab).await?);
        Ok(())
    }

    /// Click through the new-post menu, or load the composer URL directly when
    /// the menu is not there.
    async fn open_composer(&mut self) -> Result<()> {
        let menu_error = match self.click_new_post_menu().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!("New post menu unavailable ({}), opening the composer URL", menu_error);

        let started = Instant::now();
        let compose = self.config.compose_url()?;
        if let Err(e) = self
            .ctx
            .browser
            .navigate(
                self.ctx.tab,
                compose.as_str(),
                WaitUntil::NetworkIdle,
                Duration::from_millis(self.config.timing.navigation_timeout_ms),
            )
            .await
        {
            warn!("Loading {} failed: {}", compose, e);
            return Err(menu_error);
        }
        info!("Loaded {}", compose);

        let specs = [&self.selectors.composer_title, &self.selectors.composer_body];
        let wait = Duration::from_millis(self.config.timing.composer_wait_ms);
        let step = match LocatorResolver::race(&self.ctx, &specs, wait).await {
            Ok((winner, resolved)) => {
                info!("Editor ready ({} visible)", specs[winner].target);
                StepResult::success("composer", resolved.strategy_index, started.elapsed())
            }
            Err(e) => {
                warn!("Editor did not become ready: {}; continuing", e);
                let report = self
                    .diagnostics
                    .inspect(&self.ctx, "composer-wait", &self.selectors.all())
                    .await;
                if let Some(report) = &report {
                    let census = &report.census;
                    info!(
                        "Page {:?}: {} frames, {} dialogs, {} buttons, {} textareas, {} text inputs, {} editables",
                        census.title,
                        census.frame_urls.len(),
                        census.dialogs,
                        census.buttons,
                        census.textareas,
                        census.text_inputs,
                        census.editables
                    );
                    debug!("Body text: {}", census.body_excerpt);
                }
                StepResult::failure("composer", started.elapsed()).with_diagnostic(report)
            }
        };
        self.steps.push(step);
        Ok(())
    }

    async fn click_new_post_menu(&mut self) -> Result<()> {
        let button = actions::click(&self.ctx, &self.selectors.new_post_button, ClickMode::Normal).await?;
        let item = actions::click(&self.ctx, &self.selectors.text_menu_item, ClickMode::Normal).await?;
        info!("Opened the composer from the new post menu");
        self.steps.push(button);
        self.steps.push(item);
        Ok(())
    }

    async fn set_title(&mut self, title: &str) {
        let started = Instant::now();
        let step = match actions::fill_text(&self.ctx, &self.selectors.title_field, title).await {
            Ok(step) => step,
            Err(e) => {
                warn!("Could not set the title: {}", e);
                let report = self
                    .diagnostics
                    .inspect(&self.ctx, "title", &[&self.selectors.title_field])
                    .await;
                StepResult::failure(&self.selectors.title_field.target, started.elapsed())
                    .with_diagnostic(report)
            }
        };
        self.steps.push(step);
    }

    /// Try each settings button in turn; none being clickable is fine. Draft
    /// runs skip any control that the publish button chain would also pick.
    async fn open_publish_settings(&self, visibility: Visibility) -> bool {
        let spec = &self.selectors.publish_settings;
        for (index, candidate) in spec.candidates.iter().enumerate() {
            let Some(hit) = LocatorResolver::await_hit(&self.ctx, &spec.target, index, candidate).await else {
                continue;
            };
            if visibility == Visibility::Draft && self.selectors.publish_button.matches_label(&hit.label) {
                debug!("Not clicking {:?} for {} in a draft run", hit.label, spec.target);
                continue;
            }
            match self.ctx.browser.click(self.ctx.tab, &hit.handle, ClickMode::Normal).await {
                Ok(()) => {
                    debug!("Opened {} via strategy #{}", spec.target, index);
                    self.ctx.settle(self.config.timing.panel_settle_ms).await;
                    return true;
                }
                Err(e) => debug!("{} #{} not clickable: {}", spec.target, index, e),
            }
        }
        debug!("No {} control found", spec.target);
        false
    }

    /// Whether the tag input is on screen right now, without waiting.
    async fn tag_input_visible(&self) -> bool {
        for candidate in &self.selectors.tag_input.candidates {
            if let Ok(Some(hit)) = self.ctx.browser.probe(self.ctx.tab, &candidate.strategy).await {
                if hit.visible && hit.enabled {
                    return true;
                }
            }
        }
        false
    }

    /// Enter each tag, reopening publish settings whenever the tag input has
    /// gone away. A failed tag is logged and the next one is tried.
    async fn add_tags(&mut self, tags: &[String], visibility: Visibility) {
        for tag in tags {
            if !self.tag_input_visible().await {
                self.open_publish_settings(visibility).await;
            }

            let started = Instant::now();
            match actions::fill_and_press(&self.ctx, &self.selectors.tag_input, tag, "Enter").await {
                Ok(step) => {
                    info!("Added tag {:?}", tag);
                    self.steps.push(step);
                }
                Err(e) => {
                    warn!("Could not add tag {:?}: {}", tag, e);
                    self.steps
                        .push(StepResult::failure(&self.selectors.tag_input.target, started.elapsed()));
                }
            }
            self.ctx.settle(self.config.timing.tag_settle_ms).await;
        }
    }

    async fn save_or_publish(&mut self, visibility: Visibility) -> Result<FlowState> {
        self.ctx.settle(self.config.timing.autosave_wait_ms).await;
        self.open_publish_settings(visibility).await;

        let (spec, reached) = match visibility {
            Visibility::Public => (&self.selectors.publish_button, FlowState::Published),
            Visibility::Draft => (&self.selectors.draft_button, FlowState::Saved),
        };

        match actions::click(&self.ctx, spec, ClickMode::Force).await {
            Ok(step) => {
                self.steps.push(step);
                self.ctx.settle(self.config.timing.after_submit_settle_ms).await;
                info!("{}: clicked {}", reached, spec.target);
                Ok(reached)
            }
            Err(e) if e.is_lookup_failure() => match visibility {
                Visibility::Draft => {
                    warn!(
                        "No draft save button found; assuming the editor auto-saved the draft. This is not verified."
                    );
                    self.assumed_autosave = true;
                    self.steps.push(StepResult::failure(&spec.target, Duration::ZERO));
                    Ok(FlowState::Saved)
                }
                Visibility::Public => Err(PublishError::SaveOrPublishFailed(format!(
                    "no {} found; the editor markup may have changed",
                    spec.target
                ))),
            },
            Err(e) => Err(e),
        }
    }
}
