//! Main-content detection.
//!
//! Paragraph-like elements vote for their parent (full score) and
//! grandparent (half score); the candidate with the best score after a link
//! density penalty is taken as the article body. Navigation, ads and other
//! boilerplate are skipped both while scoring and while rendering text.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

const MIN_PARAGRAPH_CHARS: usize = 25;

const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside",
    "form", "iframe", "button",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul",
    "ol", "pre", "blockquote", "br", "tr", "table", "figure", "figcaption", "dd", "dt", "hr",
];

// Containers never treated as boilerplate, whatever their class says
const STRUCTURAL_TAGS: &[&str] = &["html", "body", "main", "article"];

static NOISE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^|[-_\s])(ads?|advert\w*|banner|popup|promo\w*|sponsor\w*|share|social|comments?|related|sidebar|menu|navbar|breadcrumbs?|cookie\w*|newsletter)($|[-_\s])",
    )
    .expect("noise pattern is valid")
});

static INLINE_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("whitespace pattern is valid"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));

/// Best-effort readable text of a page: density heuristic first, then the
/// `readability` crate, then all non-boilerplate body text.
pub fn main_content(html: &str, document: &Html, base_url: &Url) -> Option<String> {
    if let Some(text) = densest_block(document) {
        return Some(text);
    }
    debug!("No dense text block in {}, trying readability", base_url);

    match ::readability::extractor::extract(&mut html.as_bytes(), base_url) {
        Ok(product) => {
            let text = clean_text(&html2text::from_read(product.content.as_bytes(), 80));
            if !text.is_empty() {
                return Some(text);
            }
        }
        Err(e) => warn!("Readability extraction failed for {}: {}", base_url, e),
    }

    let body = Selector::parse("body").ok()?;
    let text = document
        .select(&body)
        .next()
        .map(render_text)
        .unwrap_or_default();
    (!text.is_empty()).then_some(text)
}

/// Text of the highest scoring content block, if any paragraph qualified
pub fn densest_block(document: &Html) -> Option<String> {
    let paragraphs = Selector::parse("p, pre, blockquote").ok()?;

    let mut scores: HashMap<_, f64> = HashMap::new();
    let mut order = Vec::new();
    let mut vote = |element: ElementRef<'_>, score: f64| {
        let id = element.id();
        if !scores.contains_key(&id) {
            order.push(id);
        }
        *scores.entry(id).or_insert(0.0) += score;
    };

    for paragraph in document.select(&paragraphs) {
        if paragraph
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(is_noise)
        {
            continue;
        }
        let text = collapsed_text(paragraph);
        let chars = text.chars().count();
        if chars < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let score = 1.0 + text.matches(',').count() as f64 + (chars as f64 / 100.0).min(3.0);

        let Some(parent) = paragraph.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        vote(parent, score);
        if let Some(grandparent) = parent.parent().and_then(ElementRef::wrap) {
            vote(grandparent, score / 2.0);
        }
    }

    let mut best: Option<(ElementRef<'_>, f64)> = None;
    for id in order {
        let Some(candidate) = document.tree.get(id).and_then(ElementRef::wrap) else {
            continue;
        };
        let score = scores.get(&id).copied().unwrap_or_default() * (1.0 - link_density(candidate));
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    let (element, score) = best?;
    if score <= 0.0 {
        return None;
    }
    debug!("Selected <{}> block with score {:.2}", element.value().name(), score);
    let text = render_text(element);
    (!text.is_empty()).then_some(text)
}

/// Share of the element's text, by characters, that sits inside links
pub fn link_density(element: ElementRef<'_>) -> f64 {
    let total = collapsed_text(element).chars().count();
    if total == 0 {
        return 0.0;
    }
    let Ok(anchors) = Selector::parse("a") else {
        return 0.0;
    };
    let linked: usize = element
        .select(&anchors)
        .map(|a| collapsed_text(a).chars().count())
        .sum();
    (linked as f64 / total as f64).min(1.0)
}

/// Boilerplate element: noise tag, or class/id naming a non-content region
pub fn is_noise(element: ElementRef<'_>) -> bool {
    let name = element.value().name();
    if STRUCTURAL_TAGS.contains(&name) {
        return false;
    }
    if NOISE_TAGS.contains(&name) {
        return true;
    }
    let class = element.value().attr("class").unwrap_or_default();
    let id = element.value().id().unwrap_or_default();
    NOISE_ATTR.is_match(class) || NOISE_ATTR.is_match(id)
}

/// Render an element's text with block elements on their own lines,
/// skipping boilerplate
pub fn render_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    render_into(element, &mut out);
    clean_text(&out)
}

fn render_into(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if is_noise(child_element) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&child_element.value().name());
            if block {
                out.push('\n');
            }
            render_into(child_element, out);
            if block {
                out.push('\n');
            }
        } else if let Some(text) = child.value().as_text() {
            out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
        }
    }
}

/// Collapse runs of spaces, trim each line, keep at most one blank line
pub fn clean_text(text: &str) -> String {
    let collapsed = INLINE_WS.replace_all(text, " ");
    let lines = collapsed.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    BLANK_LINES.replace_all(&lines, "\n\n").trim().to_string()
}

fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
