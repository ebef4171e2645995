//! Strategy evaluation against static HTML.
//!
//! The rules follow the in-page probe script (`utils::javascript`) as closely
//! as static markup allows: visibility comes from `hidden`, inline styles and
//! hidden classes instead of layout.

use crate::locator::{Strategy, TextPattern};
use scraper::{ElementRef, Html, Selector};

pub struct StaticDocument {
    html: Html,
}

impl StaticDocument {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// All elements in document order. Indices into this list are stable for
    /// a given input.
    pub fn elements(&self) -> Vec<ElementRef<'_>> {
        match Selector::parse("*") {
            Ok(all) => self.html.select(&all).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn element(&self, index: usize) -> Option<ElementRef<'_>> {
        self.elements().into_iter().nth(index)
    }

    pub fn select(&self, css: &str) -> Vec<ElementRef<'_>> {
        match Selector::parse(css) {
            Ok(selector) => self.html.select(&selector).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Indices of the elements `strategy` would consider, in the order the
    /// probe would consider them.
    pub fn candidates(&self, strategy: &Strategy) -> Vec<usize> {
        let all = self.elements();
        let index_of = |el: &ElementRef<'_>| all.iter().position(|e| e.id() == el.id());

        match strategy {
            Strategy::Role { role, name } => all
                .iter()
                .enumerate()
                .filter(|(_, el)| implicit_role(el).as_deref() == Some(role.as_str()))
                .filter(|(_, el)| matches_opt(name.as_ref(), &accessible_name(el)))
                .map(|(i, _)| i)
                .collect(),
            Strategy::Placeholder { text } => all
                .iter()
                .enumerate()
                .filter(|(_, el)| {
                    el.value()
                        .attr("placeholder")
                        .map(|p| text.matches(p))
                        .unwrap_or(false)
                })
                .map(|(i, _)| i)
                .collect(),
            Strategy::Css { selector } => self
                .select(selector)
                .iter()
                .filter_map(|el| index_of(el))
                .collect(),
            Strategy::FirstOf { selector } => self
                .select(selector)
                .first()
                .and_then(|el| index_of(el))
                .into_iter()
                .collect(),
            Strategy::RenderedText { selector, text } => self
                .select(selector)
                .iter()
                .find(|el| text.matches(&rendered_text(el)))
                .and_then(|el| index_of(el))
                .into_iter()
                .collect(),
        }
    }

    pub fn count(&self, strategy: &Strategy) -> usize {
        self.candidates(strategy).len()
    }
}

fn matches_opt(pattern: Option<&TextPattern>, text: &str) -> bool {
    pattern.map(|p| p.matches(text)).unwrap_or(true)
}

pub fn implicit_role(el: &ElementRef<'_>) -> Option<String> {
    let element = el.value();
    if let Some(explicit) = element.attr("role") {
        return explicit.split_whitespace().next().map(str::to_string);
    }

    let input_type = element
        .attr("type")
        .unwrap_or("text")
        .to_ascii_lowercase();

    let role = match element.name() {
        "button" => "button",
        "input" if matches!(input_type.as_str(), "button" | "submit" | "reset" | "image") => "button",
        "input" if matches!(input_type.as_str(), "text" | "search" | "email" | "url" | "tel") => {
            "textbox"
        }
        "textarea" => "textbox",
        "a" if element.attr("href").is_some() => "link",
        _ => return None,
    };
    Some(role.to_string())
}

pub fn rendered_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join("").trim().to_string()
}

pub fn accessible_name(el: &ElementRef<'_>) -> String {
    let element = el.value();
    if let Some(label) = element.attr("aria-label").map(str::trim).filter(|l| !l.is_empty()) {
        return label.to_string();
    }
    let text = rendered_text(el);
    if !text.is_empty() {
        return text;
    }
    element
        .attr("title")
        .or_else(|| element.attr("value"))
        .unwrap_or("")
        .trim()
        .to_string()
}

fn hides_itself(el: &ElementRef<'_>) -> bool {
    let element = el.value();
    if element.attr("hidden").is_some() {
        return true;
    }
    if element.name() == "input" && element.attr("type") == Some("hidden") {
        return true;
    }
    if let Some(style) = element.attr("style") {
        let style = style.to_lowercase().replace(' ', "");
        if style.contains("display:none") || style.contains("visibility:hidden") || style.contains("opacity:0;")
            || style.ends_with("opacity:0")
        {
            return true;
        }
    }
    element
        .attr("class")
        .map(|classes| classes.split_whitespace().any(|c| c == "hidden" || c == "d-none"))
        .unwrap_or(false)
}

/// Static visibility: the element and none of its ancestors hide themselves.
pub fn is_hidden(el: &ElementRef<'_>) -> bool {
    if hides_itself(el) {
        return true;
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| hides_itself(&ancestor))
}

pub fn is_disabled(el: &ElementRef<'_>) -> bool {
    let element = el.value();
    element.attr("disabled").is_some() || element.attr("aria-disabled") == Some("true")
}

pub fn is_content_editable(el: &ElementRef<'_>) -> bool {
    matches!(el.value().attr("contenteditable"), Some("true") | Some(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSER: &str = r#"
        <header>
            <button aria-label="投稿する">+</button>
            <a href="/notes">記事</a>
        </header>
        <main>
            <textarea placeholder="記事タイトル"></textarea>
            <div class="ProseMirror" role="textbox" contenteditable="true"></div>
            <div style="display: none"><button>公開に進む</button></div>
            <button disabled>下書き保存</button>
        </main>
    "#;

    #[test]
    fn roles_cover_implicit_and_explicit() {
        let doc = StaticDocument::parse(COMPOSER);
        assert_eq!(doc.count(&Strategy::role("button", TextPattern::contains("投稿"))), 1);
        assert_eq!(
            doc.count(&Strategy::Role {
                role: "textbox".into(),
                name: None
            }),
            2
        );
        assert_eq!(doc.count(&Strategy::role("link", TextPattern::exact("記事"))), 1);
    }

    #[test]
    fn rendered_text_takes_first_match_in_order() {
        let doc = StaticDocument::parse(COMPOSER);
        let strategy = Strategy::rendered_text(
            "button",
            TextPattern::AnyOf(vec![TextPattern::contains("下書き"), TextPattern::contains("公開")]),
        );
        let found = doc.candidates(&strategy);
        assert_eq!(found.len(), 1);
        let el = doc.element(found[0]).unwrap();
        assert_eq!(rendered_text(&el), "公開に進む");
        assert!(is_hidden(&el));
    }

    #[test]
    fn placeholder_and_css_find_title() {
        let doc = StaticDocument::parse(COMPOSER);
        let by_placeholder = doc.candidates(&Strategy::placeholder(TextPattern::contains("タイトル")));
        let by_css = doc.candidates(&Strategy::css(r#"textarea[placeholder="記事タイトル"]"#));
        assert_eq!(by_placeholder, by_css);
        assert_eq!(by_css.len(), 1);
    }

    #[test]
    fn disabled_and_editable_flags() {
        let doc = StaticDocument::parse(COMPOSER);
        let save = doc.select("button[disabled]");
        assert!(is_disabled(&save[0]));
        let editor = doc.select(".ProseMirror");
        assert!(is_content_editable(&editor[0]));
        assert!(!is_hidden(&editor[0]));
    }

    #[test]
    fn invalid_css_matches_nothing() {
        let doc = StaticDocument::parse(COMPOSER);
        assert_eq!(doc.count(&Strategy::css("textarea[")), 0);
    }
}
