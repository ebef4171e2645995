//! A simulated browser for exercising the engine without Chrome.
//!
//! Pages are static HTML parsed with `scraper`. A handful of `data-*`
//! attributes stand in for the dynamic behaviour of a real composer:
//!
//! - `data-appear-after-ms="N"`: invisible until N ms after the page loaded
//! - `data-group="G"`: invisible until an element with `data-reveals="G"` is clicked
//! - `data-navigate="URL"`: clicking loads the route registered for URL
//! - `data-collapses="G"`: pressing Enter here hides group G again
//! - `data-occluded`: a normal click fails, a forced one succeeds
//! - `data-reject-fill`: `fill` fails on this element
//! - `data-testid="ID"`: the name used for the element in the journal

use crate::core::{BrowserTrait, Config};
use crate::dom::matcher::{accessible_name, is_content_editable, is_disabled, is_hidden, rendered_text, StaticDocument};
use crate::errors::{PublishError, Result};
use crate::locator::Strategy;
use crate::session::AuthenticationBundle;
use crate::types::{ClickMode, ElementHandle, PageSnapshot, ProbeHit, Scope, WaitUntil};
use async_trait::async_trait;
use scraper::ElementRef;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in PNG bytes: the signature is enough for anything that sniffs it.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Debug, Clone)]
pub struct FakePage {
    pub url: String,
    pub html: String,
    pub frames: Vec<String>,
}

impl FakePage {
    pub fn new(html: impl Into<String>) -> Self {
        Self::at("about:blank", html)
    }

    pub fn at(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            frames: Vec::new(),
        }
    }

    /// Content of the next same-origin frame, in `iframe` order.
    pub fn with_frame(mut self, html: impl Into<String>) -> Self {
        self.frames.push(html.into());
        self
    }

    fn document(&self, scope: Scope) -> Option<&str> {
        match scope {
            Scope::Document => Some(&self.html),
            Scope::Frame(index) => self.frames.get(index).map(String::as_str),
        }
    }

    fn scopes(&self) -> impl Iterator<Item = Scope> {
        std::iter::once(Scope::Document).chain((0..self.frames.len()).map(Scope::Frame))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FakeEvent {
    Navigated(String),
    AuthRestored { cookies: usize },
    Filled { target: String, value: String },
    Typed { target: String, text: String },
    Clicked { target: String, mode: ClickMode },
    KeyPressed { target: String, key: String },
    FilesSet { target: String, files: Vec<PathBuf> },
}

struct FakeState {
    routes: HashMap<String, FakePage>,
    current: FakePage,
    loaded_at: Instant,
    revealed: HashSet<String>,
    journal: Vec<FakeEvent>,
    auth: AuthenticationBundle,
    running: bool,
}

pub struct FakeBrowser {
    state: Mutex<FakeState>,
}

impl FakeBrowser {
    pub fn with_page(page: FakePage) -> Self {
        Self {
            state: Mutex::new(FakeState {
                routes: HashMap::new(),
                current: page,
                loaded_at: Instant::now(),
                revealed: HashSet::new(),
                journal: Vec::new(),
                auth: AuthenticationBundle::default(),
                running: true,
            }),
        }
    }

    /// A browser on `about:blank` that serves the given routes.
    pub fn with_routes(pages: impl IntoIterator<Item = FakePage>) -> Self {
        let browser = Self::with_page(FakePage::new("<html><body></body></html>"));
        {
            let mut state = browser.state();
            for page in pages {
                state.routes.insert(page.url.clone(), page);
            }
        }
        browser
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn journal(&self) -> Vec<FakeEvent> {
        self.state().journal.clone()
    }

    /// Everything typed through `insert_text`, in order.
    pub fn typed_text(&self) -> String {
        self.state()
            .journal
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Typed { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn typed_chunks(&self) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Typed { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn filled(&self, target: &str) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Filled { target: t, value } if t == target => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Clicked { target, .. } => Some(target.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn visited(&self) -> Vec<String> {
        self.state()
            .journal
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Navigated(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }
}

fn describe(el: &ElementRef<'_>) -> String {
    el.value()
        .attr("data-testid")
        .map(str::to_string)
        .unwrap_or_else(|| el.value().name().to_string())
}

fn parse_token(handle: &ElementHandle) -> Result<usize> {
    handle
        .token
        .parse()
        .map_err(|_| PublishError::DriverFailed(format!("foreign handle {}", handle.token)))
}

impl FakeState {
    fn is_visible(&self, el: &ElementRef<'_>) -> bool {
        if is_hidden(el) {
            return false;
        }
        let elapsed = self.loaded_at.elapsed();
        let appeared = el
            .value()
            .attr("data-appear-after-ms")
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(|ms| elapsed >= Duration::from_millis(ms))
            .unwrap_or(true);
        let grouped_ok = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .chain(std::iter::once(*el))
            .filter_map(|e| e.value().attr("data-group"))
            .all(|group| self.revealed.contains(group));
        appeared && grouped_ok
    }

    fn load(&mut self, url: &str) -> Result<()> {
        let page = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| PublishError::NavigationTimeout(url.to_string()))?;
        self.current = page;
        self.loaded_at = Instant::now();
        self.revealed.clear();
        self.journal.push(FakeEvent::Navigated(url.to_string()));
        Ok(())
    }

    /// Run `f` against the handle's element. The parsed document never
    /// outlives this call.
    fn with_element<T>(
        &self,
        handle: &ElementHandle,
        f: impl FnOnce(&Self, &ElementRef<'_>) -> Result<T>,
    ) -> Result<T> {
        let index = parse_token(handle)?;
        let html = self
            .current
            .document(handle.scope)
            .ok_or_else(|| PublishError::DriverFailed(format!("no {}", handle.scope)))?;
        let doc = StaticDocument::parse(html);
        let el = doc
            .element(index)
            .ok_or_else(|| PublishError::DriverFailed("element detached".to_string()))?;
        f(self, &el)
    }
}

#[async_trait]
impl BrowserTrait for FakeBrowser {
    type TabHandle = ();

    async fn launch(&mut self, _config: &Config) -> Result<()> {
        self.state().running = true;
        Ok(())
    }

    async fn new_tab(&self) -> Result<Self::TabHandle> {
        if self.state().running {
            Ok(())
        } else {
            Err(PublishError::BrowserNotLaunched)
        }
    }

    async fn restore_auth(&self, _tab: &(), bundle: &AuthenticationBundle) -> Result<()> {
        let mut state = self.state();
        state.auth = bundle.clone();
        state.journal.push(FakeEvent::AuthRestored {
            cookies: bundle.cookies.len(),
        });
        Ok(())
    }

    async fn capture_auth(&self, _tab: &()) -> Result<AuthenticationBundle> {
        Ok(self.state().auth.clone())
    }

    async fn navigate(&self, _tab: &(), url: &str, _wait_until: WaitUntil, _timeout: Duration) -> Result<()> {
        self.state().load(url)
    }

    async fn probe(&self, _tab: &(), strategy: &Strategy) -> Result<Option<ProbeHit>> {
        let state = self.state();
        let mut fallback: Option<ProbeHit> = None;

        for scope in state.current.scopes() {
            let Some(html) = state.current.document(scope) else {
                continue;
            };
            let doc = StaticDocument::parse(html);
            for index in doc.candidates(strategy) {
                let Some(el) = doc.element(index) else {
                    continue;
                };
                let hit = ProbeHit {
                    handle: ElementHandle::new(scope, index.to_string()),
                    visible: state.is_visible(&el),
                    enabled: !is_disabled(&el),
                    label: accessible_name(&el),
                };
                if hit.visible {
                    return Ok(Some(hit));
                }
                if fallback.is_none() {
                    fallback = Some(hit);
                }
            }
        }
        Ok(fallback)
    }

    async fn fill(&self, _tab: &(), element: &ElementHandle, value: &str) -> Result<()> {
        let mut state = self.state();
        let target = state.with_element(element, |_, el| {
            let tag = el.value().name();
            let input_type = el.value().attr("type").unwrap_or("text");
            let fillable = tag == "textarea"
                || (tag == "input" && !matches!(input_type, "file" | "button" | "submit" | "checkbox" | "radio"))
                || is_content_editable(el);
            if !fillable || is_disabled(el) || el.value().attr("data-reject-fill").is_some() {
                return Err(PublishError::DriverFailed(format!("{} is not fillable", describe(el))));
            }
            Ok(describe(el))
        })?;
        state.journal.push(FakeEvent::Filled {
            target,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn click(&self, _tab: &(), element: &ElementHandle, mode: ClickMode) -> Result<()> {
        let mut state = self.state();
        let (target, reveals, navigates) = state.with_element(element, |state, el| {
            if mode == ClickMode::Normal {
                if !state.is_visible(el) {
                    return Err(PublishError::DriverFailed(format!("{} not visible", describe(el))));
                }
                if is_disabled(el) {
                    return Err(PublishError::DriverFailed(format!("{} disabled", describe(el))));
                }
                if el.value().attr("data-occluded").is_some() {
                    return Err(PublishError::DriverFailed(format!("{} occluded", describe(el))));
                }
            }
            Ok((
                describe(el),
                el.value().attr("data-reveals").map(str::to_string),
                el.value().attr("data-navigate").map(str::to_string),
            ))
        })?;

        state.journal.push(FakeEvent::Clicked { target, mode });
        if let Some(group) = reveals {
            state.revealed.insert(group);
        }
        if let Some(url) = navigates {
            state.load(&url)?;
        }
        Ok(())
    }

    async fn insert_text(&self, _tab: &(), element: &ElementHandle, text: &str, key_delay: Duration) -> Result<()> {
        {
            let mut state = self.state();
            let target = state.with_element(element, |_, el| Ok(describe(el)))?;
            state.journal.push(FakeEvent::Typed {
                target,
                text: text.to_string(),
            });
        }
        if !key_delay.is_zero() {
            tokio::time::sleep(key_delay * text.chars().count() as u32).await;
        }
        Ok(())
    }

    async fn press_key(&self, _tab: &(), element: &ElementHandle, key: &str) -> Result<()> {
        let mut state = self.state();
        let (target, collapses) = state.with_element(element, |_, el| {
            Ok((describe(el), el.value().attr("data-collapses").map(str::to_string)))
        })?;
        state.journal.push(FakeEvent::KeyPressed {
            target,
            key: key.to_string(),
        });
        if let Some(group) = collapses.filter(|_| key == "Enter") {
            state.revealed.remove(&group);
        }
        Ok(())
    }

    async fn set_input_files(&self, _tab: &(), element: &ElementHandle, files: &[PathBuf]) -> Result<()> {
        let mut state = self.state();
        let target = state.with_element(element, |_, el| {
            if el.value().name() != "input" || el.value().attr("type") != Some("file") {
                return Err(PublishError::DriverFailed(format!("{} is not a file input", describe(el))));
            }
            Ok(describe(el))
        })?;
        if let Some(missing) = files.iter().find(|f| !f.exists()) {
            return Err(PublishError::DriverFailed(format!("{} does not exist", missing.display())));
        }
        state.journal.push(FakeEvent::FilesSet {
            target,
            files: files.to_vec(),
        });
        Ok(())
    }

    async fn snapshot(&self, _tab: &()) -> Result<PageSnapshot> {
        let state = self.state();
        let doc = StaticDocument::parse(&state.current.html);
        let title = doc.select("title").first().map(rendered_text).unwrap_or_default();
        let body_text = doc.select("body").first().map(rendered_text).unwrap_or_default();
        let frame_urls = doc
            .select("iframe, frame")
            .iter()
            .map(|f| f.value().attr("src").unwrap_or("about:blank").to_string())
            .collect();

        Ok(PageSnapshot {
            url: state.current.url.clone(),
            title,
            html: state.current.html.clone(),
            body_text,
            frame_urls,
            screenshot_png: Some(FAKE_PNG.to_vec()),
        })
    }

    async fn current_url(&self, _tab: &()) -> Result<String> {
        Ok(self.state().current.url.clone())
    }

    fn is_running(&self) -> bool {
        self.state().running
    }

    async fn close(&mut self) -> Result<()> {
        self.state().running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::TextPattern;

    #[tokio::test]
    async fn clicking_navigates_and_reveals() {
        let browser = FakeBrowser::with_routes([
            FakePage::at(
                "https://note.test/",
                r##"<button data-testid="open" data-reveals="menu">投稿</button>
                   <div data-group="menu"><a role="menuitem" href="#" data-navigate="https://note.test/new">テキスト</a></div>"##,
            ),
            FakePage::at("https://note.test/new", "<textarea></textarea>"),
        ]);
        browser
            .navigate(&(), "https://note.test/", WaitUntil::DomContentLoaded, Duration::from_secs(1))
            .await
            .unwrap();

        let menu = Strategy::role("menuitem", TextPattern::contains("テキスト"));
        let hidden = browser.probe(&(), &menu).await.unwrap().unwrap();
        assert!(!hidden.visible);

        let open = browser
            .probe(&(), &Strategy::role("button", TextPattern::contains("投稿")))
            .await
            .unwrap()
            .unwrap();
        browser.click(&(), &open.handle, ClickMode::Normal).await.unwrap();

        let shown = browser.probe(&(), &menu).await.unwrap().unwrap();
        assert!(shown.visible);
        browser.click(&(), &shown.handle, ClickMode::Normal).await.unwrap();
        assert_eq!(browser.current_url(&()).await.unwrap(), "https://note.test/new");
        assert_eq!(browser.visited(), vec!["https://note.test/", "https://note.test/new"]);
    }

    #[tokio::test]
    async fn occluded_elements_need_force() {
        let browser = FakeBrowser::with_page(FakePage::new(r#"<button data-occluded>公開</button>"#));
        let hit = browser
            .probe(&(), &Strategy::rendered_text("button", TextPattern::exact("公開")))
            .await
            .unwrap()
            .unwrap();
        assert!(browser.click(&(), &hit.handle, ClickMode::Normal).await.is_err());
        browser.click(&(), &hit.handle, ClickMode::Force).await.unwrap();
        assert_eq!(browser.clicked(), vec!["button"]);
    }

    #[tokio::test]
    async fn unknown_route_times_out() {
        let browser = FakeBrowser::with_routes([]);
        let err = browser
            .navigate(&(), "https://nowhere.test/", WaitUntil::NetworkIdle, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::NavigationTimeout(_)));
    }
}
