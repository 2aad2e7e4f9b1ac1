//! Organization name and description from a fetched page.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use thiserror::Error;

/// Descriptions longer than this are shortened.
pub const DESCRIPTION_MAX_CHARS: usize = 200;

/// A sentence boundary before this position is too early to cut at.
const SENTENCE_SEARCH_START: usize = 80;

/// Title segments with more words than this read like taglines.
const MAX_BRAND_WORDS: usize = 4;

lazy_static! {
    static ref TITLE_SEPARATOR: Regex = Regex::new(r"\s*[|–—]\s*|\s+-\s+").unwrap();
    static ref TITLE_BOILERPLATE: Regex =
        Regex::new(r"(?i)(?:^|[\s:|,\-]+)(?:official site|homepage|home|welcome|api)\s*$").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref ANCHORS: Selector = Selector::parse("a[href]").unwrap();
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref JSON_LD: Selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected an HTML page, got {0}")]
    NotHtml(String),
    #[error("the page body is binary")]
    Binary,
}

/// Everything the pipeline needs from a page. Owned, so the parsed document
/// never has to outlive the call that built it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Visible text with whitespace collapsed; script and style contents are
    /// left out.
    pub text: String,
    /// Raw `href` values of the page's anchors, in document order.
    pub links: Vec<String>,
}

/// Parses a response body. Bodies declared as something other than HTML, or
/// containing NUL bytes, are refused.
pub fn parse_page(body: &[u8], content_type: Option<&str>) -> Result<Page, ParseError> {
    if body.contains(&0) {
        return Err(ParseError::Binary);
    }

    if let Some(content_type) = content_type {
        let mime = content_type.to_ascii_lowercase();

        if !mime.contains("html") {
            return Err(ParseError::NotHtml(content_type.to_string()));
        }
    }

    let source = String::from_utf8_lossy(body);
    let document = Html::parse_document(&source);

    Ok(Page {
        name: extract_name(&document),
        description: extract_description(&document),
        text: visible_text(&document),
        links: document
            .select(&ANCHORS)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .collect(),
    })
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn meta_content(document: &Html, attr: &str, key: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[{}="{}"]"#, attr, key)).ok()?;

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty())
}

/// `og:site_name`, then a JSON-LD organization, then the cleaned title.
pub fn extract_name(document: &Html) -> Option<String> {
    meta_content(document, "property", "og:site_name")
        .or_else(|| json_ld_organization(document))
        .or_else(|| {
            let title = document.select(&TITLE).next()?.text().collect::<String>();

            clean_title(&title)
        })
}

pub fn extract_description(document: &Html) -> Option<String> {
    meta_content(document, "name", "description")
        .or_else(|| meta_content(document, "property", "og:description"))
        .map(|d| truncate_description(&d))
}

fn json_ld_organization(document: &Html) -> Option<String> {
    document
        .select(&JSON_LD)
        .filter_map(|script| serde_json::from_str::<Value>(&script.text().collect::<String>()).ok())
        .find_map(|data| organization_name(&data))
}

fn is_organization(node: &serde_json::Map<String, Value>) -> bool {
    let is_org = |t: &Value| t.as_str().is_some_and(|t| t.ends_with("Organization"));

    match node.get("@type") {
        Some(Value::Array(types)) => types.iter().any(is_org),
        Some(t) => is_org(t),
        None => false,
    }
}

fn organization_name(data: &Value) -> Option<String> {
    match data {
        Value::Array(items) => items.iter().find_map(organization_name),
        Value::Object(node) => {
            if is_organization(node) {
                let name = node
                    .get("name")
                    .and_then(Value::as_str)
                    .map(collapse_whitespace)
                    .filter(|n| !n.is_empty());

                if name.is_some() {
                    return name;
                }
            }

            node.get("@graph").and_then(organization_name)
        }
        _ => None,
    }
}

/// Reduces a page title to something that reads like a brand name.
///
/// Titles made of several segments (`Acme API | Developer Portal`) resolve to
/// the shortest segment of at most four words; otherwise trailing boilerplate
/// like `Home` or `Official Site` is removed.
pub fn clean_title(title: &str) -> Option<String> {
    let title = collapse_whitespace(title);

    let segments: Vec<&str> = TITLE_SEPARATOR
        .split(&title)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.len() > 1 {
        let mut best: Option<&str> = None;

        for &segment in &segments {
            if segment.split_whitespace().count() > MAX_BRAND_WORDS {
                continue;
            }

            // strictly shorter, so the earliest segment wins ties
            if best.map_or(true, |b| segment.chars().count() < b.chars().count()) {
                best = Some(segment);
            }
        }

        if let Some(best) = best {
            return Some(best.to_string());
        }
    }

    let trailing = |c: char| c.is_whitespace() || c.is_ascii_punctuation();
    let mut stripped = title.trim_end_matches(trailing);

    while let Some(m) = TITLE_BOILERPLATE.find(stripped) {
        stripped = stripped[..m.start()].trim_end_matches(trailing);
    }

    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Shortens a description to at most [`DESCRIPTION_MAX_CHARS`] characters,
/// cutting at the last sentence end past the first 80 characters when there
/// is one (punctuation followed by whitespace, so `v1.5` or `acme.ai` do not
/// count), or hard cutting and adding an ellipsis otherwise.
pub fn truncate_description(description: &str) -> String {
    let chars: Vec<char> = description.chars().collect();

    if chars.len() <= DESCRIPTION_MAX_CHARS {
        return description.to_string();
    }

    let head = &chars[..DESCRIPTION_MAX_CHARS];

    let boundary = (SENTENCE_SEARCH_START..head.len())
        .rev()
        .find(|&i| {
            matches!(head[i], '.' | '!' | '?')
                && chars.get(i + 1).map_or(true, |c| c.is_whitespace())
        });

    match boundary {
        Some(end) => head[..=end].iter().collect(),
        None => {
            let mut cut: String = head[..DESCRIPTION_MAX_CHARS - 1].iter().collect();
            cut.truncate(cut.trim_end().len());
            cut.push('\u{2026}');
            cut
        }
    }
}

fn visible_text(document: &Html) -> String {
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript" | "template"));

        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }

    collapse_whitespace(&text)
}
