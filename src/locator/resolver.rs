//! Fallback chain orchestration over `LocatorSpec`s.

use crate::core::{BrowserTrait, PageContext};
use crate::errors::{PublishError, Result};
use crate::locator::{Candidate, LocatorSpec, WaitState};
use crate::types::{ElementHandle, ProbeHit};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub handle: ElementHandle,
    pub strategy_index: usize,
    pub elapsed: Duration,
}

pub struct LocatorResolver;

fn accepts(state: WaitState, hit: &ProbeHit) -> bool {
    match state {
        WaitState::Visible => hit.visible && hit.enabled,
        WaitState::Attached => true,
    }
}

impl LocatorResolver {
    /// Try every candidate in order, each with its own bounded wait. Fails with
    /// `ElementNotFound` only once all of them have timed out.
    pub async fn resolve<B: BrowserTrait>(
        ctx: &PageContext<'_, B>,
        spec: &LocatorSpec,
    ) -> Result<Resolved> {
        let started = Instant::now();
        debug!("Resolving {} ({} candidates)", spec.target, spec.len());

        for (index, candidate) in spec.candidates.iter().enumerate() {
            if let Some(handle) = Self::await_candidate(ctx, &spec.target, index, candidate).await {
                let elapsed = started.elapsed();
                info!(
                    "Resolved {} with strategy #{} ({}) in {}ms",
                    spec.target,
                    index,
                    candidate.strategy,
                    elapsed.as_millis()
                );
                return Ok(Resolved {
                    handle,
                    strategy_index: index,
                    elapsed,
                });
            }
        }

        Err(PublishError::ElementNotFound {
            target: spec.target.clone(),
            tried: spec.len(),
        })
    }

    /// Poll one candidate until it yields an acceptable element or its timeout
    /// elapses. Probe errors count as misses.
    pub async fn await_candidate<B: BrowserTrait>(
        ctx: &PageContext<'_, B>,
        target: &str,
        index: usize,
        candidate: &Candidate,
    ) -> Option<ElementHandle> {
        Self::await_hit(ctx, target, index, candidate)
            .await
            .map(|hit| hit.handle)
    }

    /// Like `await_candidate`, but keeps the whole probe hit.
    pub async fn await_hit<B: BrowserTrait>(
        ctx: &PageContext<'_, B>,
        target: &str,
        index: usize,
        candidate: &Candidate,
    ) -> Option<ProbeHit> {
        let timeout = candidate.timeout(ctx.default_wait());
        let deadline = Instant::now() + timeout;

        loop {
            match ctx.browser.probe(ctx.tab, &candidate.strategy).await {
                Ok(Some(hit)) if accepts(candidate.state, &hit) => {
                    if hit.handle.scope != crate::types::Scope::Document {
                        debug!("{} found inside {}", target, hit.handle.scope);
                    }
                    return Some(hit);
                }
                Ok(_) => {}
                Err(e) => debug!("Probe for {} #{} failed: {}", target, index, e),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(ctx.poll_interval().min(deadline - now)).await;
        }

        debug!(
            "Strategy #{} for {} ({}) timed out after {}ms",
            index,
            target,
            candidate.strategy,
            timeout.as_millis()
        );
        None
    }

    /// Poll several specs in one loop and return whichever appears first, as
    /// `(spec index, resolution)`. Per-candidate timeouts are ignored; only
    /// `timeout` bounds the wait.
    pub async fn race<B: BrowserTrait>(
        ctx: &PageContext<'_, B>,
        specs: &[&LocatorSpec],
        timeout: Duration,
    ) -> Result<(usize, Resolved)> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            for (spec_index, spec) in specs.iter().enumerate() {
                for (index, candidate) in spec.candidates.iter().enumerate() {
                    match ctx.browser.probe(ctx.tab, &candidate.strategy).await {
                        Ok(Some(hit)) if accepts(candidate.state, &hit) => {
                            info!("{} appeared first", spec.target);
                            return Ok((
                                spec_index,
                                Resolved {
                                    handle: hit.handle,
                                    strategy_index: index,
                                    elapsed: started.elapsed(),
                                },
                            ));
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Probe for {} #{} failed: {}", spec.target, index, e),
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(ctx.poll_interval().min(deadline - now)).await;
        }

        let targets: Vec<&str> = specs.iter().map(|s| s.target.as_str()).collect();
        Err(PublishError::ElementNotFound {
            target: targets.join(" or "),
            tried: specs.iter().map(|s| s.len()).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimingConfig;
    use crate::locator::{Strategy, TextPattern};
    use crate::testing::{FakeBrowser, FakePage};
    use crate::types::Scope;

    fn timing() -> TimingConfig {
        TimingConfig {
            default_wait_ms: 1000,
            poll_interval_ms: 100,
            ..TimingConfig::default()
        }
    }

    fn spec() -> LocatorSpec {
        LocatorSpec::new("title field")
            .then(Strategy::css(r#"textarea[placeholder="記事タイトル"]"#))
            .then(Strategy::first_of("textarea"))
            .then(Strategy::placeholder(TextPattern::contains("タイトル")))
    }

    #[tokio::test(start_paused = true)]
    async fn reports_first_available_strategy_index() {
        let browser = FakeBrowser::with_page(FakePage::new(
            r#"<textarea placeholder="本文"></textarea><input placeholder="タイトル">"#,
        ));
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);

        let resolved = LocatorResolver::resolve(&ctx, &spec()).await.unwrap();
        // The css candidate misses; first textarea is the body one but visible.
        assert_eq!(resolved.strategy_index, 1);
        assert_eq!(resolved.elapsed, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn primary_strategy_wins_without_waiting() {
        let browser = FakeBrowser::with_page(FakePage::new(
            r#"<textarea placeholder="記事タイトル"></textarea>"#,
        ));
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);

        let resolved = LocatorResolver::resolve(&ctx, &spec()).await.unwrap();
        assert_eq!(resolved.strategy_index, 0);
        assert_eq!(resolved.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_every_timeout_before_failing() {
        let browser = FakeBrowser::with_page(FakePage::new("<p>loading…</p>"));
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);
        let spec = spec().then_within(Strategy::css("input.title"), Duration::from_millis(2500));

        let started = Instant::now();
        let err = LocatorResolver::resolve(&ctx, &spec).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, PublishError::ElementNotFound { tried: 4, .. }));
        assert_eq!(spec.total_budget(ctx.default_wait()), Duration::from_millis(5500));
        assert!(elapsed >= Duration::from_millis(5500));
        assert!(elapsed < Duration::from_millis(5500 + 4 * 100));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_late_elements_within_budget() {
        let browser = FakeBrowser::with_page(FakePage::new(
            r#"<textarea placeholder="記事タイトル" data-appear-after-ms="600"></textarea>"#,
        ));
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);

        let resolved = LocatorResolver::resolve(&ctx, &spec()).await.unwrap();
        assert_eq!(resolved.strategy_index, 0);
        assert_eq!(resolved.elapsed, Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_matches_are_skipped_unless_attached_is_enough() {
        let browser = FakeBrowser::with_page(FakePage::new(
            r#"<button style="display: none">下書き保存</button>"#,
        ));
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);
        let visible = LocatorSpec::new("save")
            .then(Strategy::rendered_text("button", TextPattern::contains("下書き")));

        assert!(LocatorResolver::resolve(&ctx, &visible).await.is_err());
        let resolved = LocatorResolver::resolve(&ctx, &visible.attached()).await.unwrap();
        assert_eq!(resolved.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_frames_when_document_lacks_target() {
        let browser = FakeBrowser::with_page(
            FakePage::new(r#"<iframe src="/editor"></iframe>"#)
                .with_frame(r#"<div class="ProseMirror" contenteditable="true"></div>"#),
        );
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);
        let spec = LocatorSpec::new("body editor").then(Strategy::first_of(r#"[contenteditable="true"]"#));

        let resolved = LocatorResolver::resolve(&ctx, &spec).await.unwrap();
        assert_eq!(resolved.handle.scope, Scope::Frame(0));
    }

    #[tokio::test(start_paused = true)]
    async fn race_returns_whichever_spec_appears_first() {
        let browser = FakeBrowser::with_page(FakePage::new(
            r#"<textarea data-appear-after-ms="900"></textarea>
               <div contenteditable="true" data-appear-after-ms="300"></div>"#,
        ));
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);
        let title = LocatorSpec::new("title").then(Strategy::first_of("textarea"));
        let body = LocatorSpec::new("body").then(Strategy::first_of(r#"[contenteditable="true"]"#));

        let (winner, resolved) = LocatorResolver::race(&ctx, &[&title, &body], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(winner, 1);
        assert_eq!(resolved.elapsed, Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn race_times_out_as_element_not_found() {
        let browser = FakeBrowser::with_page(FakePage::new("<div class=\"spinner\"></div>"));
        let timing = timing();
        let ctx = PageContext::new(&browser, &(), &timing);
        let title = LocatorSpec::new("title").then(Strategy::first_of("textarea"));

        let started = Instant::now();
        let err = LocatorResolver::race(&ctx, &[&title], Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ElementNotFound { .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
