//! Inline citation markers and the trailing sources list.
//!
//! Numbering is 1-based and follows the order of the `sources` slice, so a
//! source's number is its position in the list.

use std::sync::LazyLock;

use regex::Regex;

use searchlight_shared::{Result, Source};

/// Returned by [`format_sources_list`] for an empty list.
pub const NO_SOURCES: &str = "No sources available.";

/// Longest snippet shown in the sources list.
const LIST_SNIPPET_MAX: usize = 150;

/// Default bound for [`clean_snippet`].
pub const SNIPPET_MAX: usize = 200;

/// Turns a generated response plus its sources into display text.
pub trait ResponseFormatter: Send + Sync {
    fn format(&self, response: &str, sources: &[Source]) -> Result<String>;
}

/// Default formatter: inline markers plus a sources section.
#[derive(Debug, Clone, Copy, Default)]
pub struct CitationFormatter;

impl ResponseFormatter for CitationFormatter {
    fn format(&self, response: &str, sources: &[Source]) -> Result<String> {
        Ok(format_response_with_sources(response, sources))
    }
}

/// Numbered markdown list: `**n. [title](url)**` with an indented snippet line.
pub fn format_sources_list(sources: &[Source]) -> String {
    if sources.is_empty() {
        return NO_SOURCES.to_string();
    }

    sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut entry = format!("**{}. [{}]({})**", i + 1, s.title, s.url);
            if !s.snippet.is_empty() {
                entry.push_str("\n   ");
                entry.push_str(&truncate_chars(&s.snippet, LIST_SNIPPET_MAX));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Append `[n]` after every second sentence except the last.
///
/// Sentences are split on `". "`. The sentence at 0-based position `i` gets a
/// marker when `(i + 1)` is even and it is not the final sentence; markers
/// cycle through the sources as `(i / 2) % len + 1`. Placement is positional,
/// not semantic.
pub fn insert_inline_citations(text: &str, sources: &[Source]) -> String {
    if sources.is_empty() {
        return text.to_string();
    }

    let sentences: Vec<&str> = text.split(". ").collect();
    let last = sentences.len() - 1;

    sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| {
            if i > 0 && (i + 1) % 2 == 0 && i < last {
                format!("{sentence} [{}]", (i / 2) % sources.len() + 1)
            } else {
                (*sentence).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(". ")
}

/// Cited response, a horizontal rule, then the sources list.
///
/// Returns `response` unchanged when there are no sources.
pub fn format_response_with_sources(response: &str, sources: &[Source]) -> String {
    if sources.is_empty() {
        return response.to_string();
    }

    format!(
        "{}\n\n---\n\n**Sources:**\n\n{}",
        insert_inline_citations(response, sources),
        format_sources_list(sources)
    )
}

/// A source with surrounding whitespace trimmed from every field.
pub fn create_source(title: &str, url: &str, snippet: &str) -> Source {
    Source {
        title: title.trim().to_string(),
        url: url.trim().to_string(),
        snippet: snippet.trim().to_string(),
    }
}

/// Collapse whitespace runs and cut to `max` characters (with "...").
pub fn clean_snippet(text: &str, max: usize) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let collapsed = WS_RE.replace_all(text.trim(), " ");
    truncate_chars(&collapsed, max)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(title: &str, url: &str) -> Source {
        create_source(title, url, "")
    }

    #[test]
    fn sources_list_numbers_in_order() {
        let list = format_sources_list(&[src("A", "u1"), src("B", "u2")]);
        assert_eq!(list, "**1. [A](u1)**\n\n**2. [B](u2)**");
    }

    #[test]
    fn sources_list_empty() {
        assert_eq!(format_sources_list(&[]), "No sources available.");
    }

    #[test]
    fn sources_list_truncates_snippet() {
        let long = "s".repeat(151);
        let list = format_sources_list(&[create_source("A", "u1", &long)]);
        assert_eq!(list, format!("**1. [A](u1)**\n   {}...", "s".repeat(147)));

        let exact = "s".repeat(150);
        let list = format_sources_list(&[create_source("A", "u1", &exact)]);
        assert!(list.ends_with(&exact));
    }

    #[test]
    fn inline_citations_every_second_sentence() {
        let sources = [src("A", "u1"), src("B", "u2")];
        let cited = insert_inline_citations("S1. S2. S3. S4. S5", &sources);
        assert_eq!(cited, "S1. S2 [1]. S3. S4 [2]. S5");
    }

    #[test]
    fn inline_citations_cycle_sources() {
        let sources = [src("A", "u1")];
        let cited = insert_inline_citations("a. b. c. d. e. f. g", &sources);
        assert_eq!(cited, "a. b [1]. c. d [1]. e. f [1]. g");
    }

    #[test]
    fn final_sentence_never_cited() {
        let sources = [src("A", "u1")];
        assert_eq!(insert_inline_citations("One. Two", &sources), "One. Two");
        assert_eq!(insert_inline_citations("Single sentence.", &sources), "Single sentence.");
    }

    #[test]
    fn no_sources_leaves_text_alone() {
        assert_eq!(insert_inline_citations("A. B. C", &[]), "A. B. C");
        assert_eq!(format_response_with_sources("A. B. C", &[]), "A. B. C");
    }

    #[test]
    fn full_response_layout() {
        let formatted = format_response_with_sources("A. B. C", &[src("T", "https://t.example")]);
        assert_eq!(
            formatted,
            "A. B [1]. C\n\n---\n\n**Sources:**\n\n**1. [T](https://t.example)**"
        );
    }

    #[test]
    fn create_source_trims() {
        let s = create_source("  Title ", "\thttps://x.example\n", " snip ");
        assert_eq!(s, Source {
            title: "Title".into(),
            url: "https://x.example".into(),
            snippet: "snip".into(),
        });
    }

    #[test]
    fn clean_snippet_collapses_and_truncates() {
        assert_eq!(clean_snippet("  a\n\n b  ", 200), "a b");
        assert_eq!(clean_snippet("abcdefghij", 6), "abc...");
        assert_eq!(clean_snippet("", 10), "");
    }

    #[test]
    fn citation_formatter_matches_free_function() {
        let sources = [src("A", "u1")];
        let via_trait = CitationFormatter.format("X. Y. Z", &sources).unwrap();
        assert_eq!(via_trait, format_response_with_sources("X. Y. Z", &sources));
    }
}
