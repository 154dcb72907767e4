//! HTML → title, visible text and metadata.
//!
//! Pure functions over a parsed document; no I/O.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use searchlight_shared::PageMetadata;

/// Title used when a page has neither `<title>` nor `<h1>`.
pub const UNTITLED: &str = "No Title Found";

/// Elements whose text never counts as page content.
const CHROME_TAGS: [&str; 7] = ["script", "style", "nav", "footer", "aside", "header", "noscript"];

/// Main-content candidates, most specific first.
const CONTENT_SELECTORS: [&str; 9] = [
    "article",
    r#"[role="main"]"#,
    "main",
    ".content",
    ".main-content",
    ".article-content",
    ".post-content",
    "#content",
    "#main",
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| selector("body"));
static CONTENT_SELS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| CONTENT_SELECTORS.iter().map(|css| selector(css)).collect());

/// Page fields extracted from one HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub content: String,
    pub metadata: PageMetadata,
}

/// Parse `html` and extract everything a [`searchlight_shared::ScrapeResult`] needs.
pub fn extract_page(html: &str, url: &Url, max_content_length: usize) -> ExtractedPage {
    let doc = Html::parse_document(html);
    ExtractedPage {
        title: extract_title(&doc),
        content: clean_content(&extract_content(&doc), max_content_length),
        metadata: extract_metadata(&doc, url),
    }
}

/// `<title>`, else the first `<h1>`, else [`UNTITLED`].
pub fn extract_title(doc: &Html) -> String {
    [&*TITLE_SEL, &*H1_SEL]
        .into_iter()
        .filter_map(|sel| doc.select(sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

/// Raw visible text of the main content area.
///
/// Uses the first content candidate outside page chrome; falls back to
/// `<body>`, then to the whole document.
pub fn extract_content(doc: &Html) -> String {
    let main = CONTENT_SELS
        .iter()
        .find_map(|sel| doc.select(sel).find(|el| !inside_chrome(el)));

    if let Some(el) = main {
        let text = visible_text(el);
        if !text.trim().is_empty() {
            return text;
        }
    }

    match doc.select(&BODY_SEL).next() {
        Some(body) => visible_text(body),
        None => visible_text(doc.root_element()),
    }
}

/// Collapse whitespace, trim, and cut to `max` characters (with a trailing "...").
pub fn clean_content(text: &str, max: usize) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let collapsed = WS_RE.replace_all(text, " ");
    let trimmed = collapsed.trim();

    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let kept: String = trimmed.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Description, author, publication date and site name from `<meta>` tags.
pub fn extract_metadata(doc: &Html, url: &Url) -> PageMetadata {
    PageMetadata {
        description: meta_content(doc, &[r#"meta[name="description"]"#, r#"meta[property="og:description"]"#]),
        author: meta_content(doc, &[r#"meta[name="author"]"#, r#"meta[property="article:author"]"#]),
        published_date: meta_content(
            doc,
            &[r#"meta[property="article:published_time"]"#, r#"meta[name="date"]"#],
        ),
        site_name: meta_content(doc, &[r#"meta[property="og:site_name"]"#])
            .or_else(|| url.host_str().map(|h| match url.port() {
                Some(port) => format!("{h}:{port}"),
                None => h.to_string(),
            })),
    }
}

/// `content` of the first present tag, trying `selectors` in order.
fn meta_content(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let sel = Selector::parse(css).ok()?;
        let el = doc.select(&sel).next()?;
        el.value()
            .attr("content")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    })
}

fn is_chrome(name: &str) -> bool {
    CHROME_TAGS.contains(&name)
}

fn inside_chrome(el: &ElementRef) -> bool {
    is_chrome(el.value().name())
        || el
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| is_chrome(e.name())))
}

/// Concatenated text nodes under `root`, skipping anything inside chrome tags.
fn visible_text(root: ElementRef) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .any(|a| a.value().as_element().is_some_and(|e| is_chrome(e.name())));
        if !hidden {
            out.push_str(text);
        }
    }
    out
}
