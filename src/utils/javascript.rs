//! Script builders for the Chrome driver. Every script is a self-invoking
//! function that returns plain JSON so `Runtime.evaluate` can hand it back by
//! value.

use crate::locator::Strategy;
use crate::types::{ClickMode, ElementHandle, Scope};

pub const HANDLE_ATTRIBUTE: &str = "data-np-handle";

/// Shared helpers: frame enumeration, visibility, implicit roles, accessible
/// names and text matching. Mirrors `dom::matcher` for static HTML.
const PRELUDE: &str = r#"
    const np = {
        roots() {
            const out = [{ scope: null, doc: document }];
            document.querySelectorAll('iframe, frame').forEach((frame, index) => {
                try {
                    if (frame.contentDocument) out.push({ scope: index, doc: frame.contentDocument });
                } catch (e) {}
            });
            return out;
        },
        root(scope) {
            if (scope === null) return document;
            const frame = document.querySelectorAll('iframe, frame')[scope];
            try { return frame ? frame.contentDocument : null; } catch (e) { return null; }
        },
        locate(scope, token) {
            const doc = np.root(scope);
            return doc ? doc.querySelector('[HANDLE_ATTRIBUTE="' + token + '"]') : null;
        },
        visible(el) {
            const rect = el.getBoundingClientRect();
            const style = el.ownerDocument.defaultView.getComputedStyle(el);
            return rect.width > 0 && rect.height > 0 &&
                style.visibility !== 'hidden' &&
                style.display !== 'none' &&
                parseFloat(style.opacity) > 0;
        },
        enabled(el) {
            return !el.disabled && el.getAttribute('aria-disabled') !== 'true';
        },
        role(el) {
            const explicit = el.getAttribute('role');
            if (explicit) return explicit.trim().split(/\s+/)[0];
            const tag = el.tagName.toLowerCase();
            const type = (el.getAttribute('type') || 'text').toLowerCase();
            if (tag === 'button') return 'button';
            if (tag === 'input' && ['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
            if (tag === 'input' && ['text', 'search', 'email', 'url', 'tel'].includes(type)) return 'textbox';
            if (tag === 'textarea') return 'textbox';
            if (tag === 'a' && el.hasAttribute('href')) return 'link';
            return null;
        },
        name(el) {
            const label = el.getAttribute('aria-label');
            if (label && label.trim()) return label.trim();
            const text = (el.innerText || el.textContent || '').trim();
            if (text) return text;
            return (el.getAttribute('title') || el.getAttribute('value') || '').trim();
        },
        text(el) {
            return (el.innerText || el.textContent || '').trim();
        },
        matches(text, pattern) {
            if (pattern === null || pattern === undefined) return true;
            if ('contains' in pattern) return text.includes(pattern.contains);
            if ('exact' in pattern) return text === pattern.exact;
            if ('any_of' in pattern) return pattern.any_of.some(p => np.matches(text, p));
            return false;
        },
        candidates(doc, strategy) {
            switch (strategy.by) {
                case 'role':
                    return Array.from(doc.querySelectorAll('*'))
                        .filter(el => np.role(el) === strategy.role && np.matches(np.name(el), strategy.name));
                case 'placeholder':
                    return Array.from(doc.querySelectorAll('[placeholder]'))
                        .filter(el => np.matches(el.getAttribute('placeholder'), strategy.text));
                case 'css':
                    return Array.from(doc.querySelectorAll(strategy.selector));
                case 'first_of': {
                    const first = doc.querySelector(strategy.selector);
                    return first ? [first] : [];
                }
                case 'rendered_text': {
                    const first = Array.from(doc.querySelectorAll(strategy.selector))
                        .find(el => np.matches(np.text(el), strategy.text));
                    return first ? [first] : [];
                }
                default:
                    return [];
            }
        },
    };
"#;

fn prelude() -> String {
    PRELUDE.replace("HANDLE_ATTRIBUTE", HANDLE_ATTRIBUTE)
}

/// JSON literal for embedding a Rust string into a script.
pub fn literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn scope_literal(scope: Scope) -> String {
    match scope {
        Scope::Document => "null".to_string(),
        Scope::Frame(index) => index.to_string(),
    }
}

fn locate_expr(handle: &ElementHandle) -> String {
    format!(
        "np.locate({}, {})",
        scope_literal(handle.scope),
        literal(&handle.token)
    )
}

/// Finds the strategy's element across the document and its frames, tags it
/// with `token` and reports `{found, scope, visible, enabled, label}`. A
/// visible match anywhere wins over a hidden one.
pub fn probe_script(strategy: &Strategy, token: &str) -> serde_json::Result<String> {
    let strategy_json = serde_json::to_string(strategy)?;
    Ok(format!(
        r#"
        (function() {{
            {prelude}
            const strategy = {strategy};
            let fallback = null;
            for (const root of np.roots()) {{
                let found;
                try {{
                    found = np.candidates(root.doc, strategy);
                }} catch (e) {{
                    return {{ found: false, error: e.message }};
                }}
                for (const el of found) {{
                    const hit = {{ el: el, scope: root.scope, visible: np.visible(el), enabled: np.enabled(el) }};
                    if (hit.visible) {{
                        fallback = hit;
                        break;
                    }}
                    if (fallback === null) fallback = hit;
                }}
                if (fallback !== null && fallback.visible) break;
            }}
            if (fallback === null) return {{ found: false }};
            fallback.el.setAttribute('{attr}', {token});
            return {{ found: true, scope: fallback.scope, visible: fallback.visible, enabled: fallback.enabled, label: np.name(fallback.el).slice(0, 200) }};
        }})()
        "#,
        prelude = prelude(),
        strategy = strategy_json,
        attr = HANDLE_ATTRIBUTE,
        token = literal(token),
    ))
}

pub fn fill_script(handle: &ElementHandle, value: &str) -> String {
    format!(
        r#"
        (function() {{
            {prelude}
            const el = {locate};
            if (!el) return {{ ok: false, error: 'element detached' }};
            const value = {value};
            el.focus();
            if (el.isContentEditable) {{
                el.textContent = value;
                el.dispatchEvent(new InputEvent('input', {{ bubbles: true, inputType: 'insertText', data: value }}));
                return {{ ok: true }};
            }}
            const view = el.ownerDocument.defaultView;
            const proto = el.tagName === 'TEXTAREA' ? view.HTMLTextAreaElement.prototype
                : el.tagName === 'INPUT' ? view.HTMLInputElement.prototype : null;
            if (!proto || el.readOnly || el.disabled) return {{ ok: false, error: 'element is not fillable' }};
            Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: el.value === value }};
        }})()
        "#,
        prelude = prelude(),
        locate = locate_expr(handle),
        value = literal(value),
    )
}

pub fn click_script(handle: &ElementHandle, mode: ClickMode) -> String {
    format!(
        r#"
        (function() {{
            {prelude}
            const el = {locate};
            if (!el) return {{ ok: false, error: 'element detached' }};
            el.scrollIntoView({{ block: 'center', inline: 'center' }});
            if ({checked}) {{
                if (!np.visible(el)) return {{ ok: false, error: 'element not visible' }};
                if (!np.enabled(el)) return {{ ok: false, error: 'element disabled' }};
                const rect = el.getBoundingClientRect();
                const top = el.ownerDocument.elementFromPoint(rect.left + rect.width / 2, rect.top + rect.height / 2);
                if (top && top !== el && !el.contains(top)) return {{ ok: false, error: 'element occluded' }};
            }}
            const view = el.ownerDocument.defaultView;
            ['mousedown', 'mouseup'].forEach(type => {{
                el.dispatchEvent(new view.MouseEvent(type, {{ bubbles: true, cancelable: true }}));
            }});
            el.click();
            return {{ ok: true }};
        }})()
        "#,
        prelude = prelude(),
        locate = locate_expr(handle),
        checked = mode == ClickMode::Normal,
    )
}

/// Focuses the element and, for rich-text hosts, moves the caret to the end.
pub fn focus_script(handle: &ElementHandle) -> String {
    format!(
        r#"
        (function() {{
            {prelude}
            const el = {locate};
            if (!el) return {{ ok: false, error: 'element detached' }};
            el.focus();
            if (el.isContentEditable) {{
                const view = el.ownerDocument.defaultView;
                const range = el.ownerDocument.createRange();
                range.selectNodeContents(el);
                range.collapse(false);
                const selection = view.getSelection();
                selection.removeAllRanges();
                selection.addRange(range);
            }}
            return {{ ok: true }};
        }})()
        "#,
        prelude = prelude(),
        locate = locate_expr(handle),
    )
}

/// Expression evaluating to the element itself, for CDP calls that need an
/// object id rather than a value.
pub fn element_expression(handle: &ElementHandle) -> String {
    format!(
        "(function() {{ {prelude} return {locate}; }})()",
        prelude = prelude(),
        locate = locate_expr(handle),
    )
}

pub fn ready_state_script() -> &'static str {
    r#"
    (function() {
        return {
            readyState: document.readyState,
            resources: performance.getEntriesByType('resource').length,
            url: window.location.href
        };
    })()
    "#
}

pub fn snapshot_script() -> &'static str {
    r#"
    (function() {
        const frames = Array.from(document.querySelectorAll('iframe, frame')).map(f => f.src || 'about:blank');
        return {
            url: window.location.href,
            title: document.title,
            html: document.documentElement ? document.documentElement.outerHTML : '',
            bodyText: document.body ? document.body.innerText : '',
            frames: frames
        };
    })()
    "#
}

pub fn local_storage_dump_script() -> &'static str {
    r#"
    (function() {
        const out = [];
        for (let i = 0; i < localStorage.length; i++) {
            const name = localStorage.key(i);
            out.push({ name: name, value: localStorage.getItem(name) });
        }
        return { origin: window.location.origin, localStorage: out };
    })()
    "#
}

pub fn local_storage_restore_script(entries: &serde_json::Value) -> String {
    format!(
        r#"
        (function() {{
            const entries = {};
            let count = 0;
            try {{
                for (const entry of entries) {{
                    localStorage.setItem(entry.name, entry.value);
                    count++;
                }}
                return {{ ok: true, count: count }};
            }} catch (error) {{
                return {{ ok: false, error: error.message, count: count }};
            }}
        }})()
        "#,
        entries
    )
}

pub const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";
