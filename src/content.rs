use crate::config::{CATEGORY_PREFIX, INFOBOX_PREFIX, MAX_TAG_CHARS};
use crate::error::RecordError;
use crate::wikitext;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

/// `<head> (in|of|by) <tail>`, non-greedy on the head.
static GENERAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s(in|of|by)\s(.+)$").unwrap());

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_]+").unwrap());

static TEMPLATE_NAMESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*template\s*:").unwrap());

/// Tags derived from one page's wikitext.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageFacts {
    pub templates: Vec<String>,
    pub infobox: Option<String>,
    pub categories: Vec<String>,
    pub general: Vec<String>,
}

pub fn analyze(text: &str) -> Result<PageFacts, RecordError> {
    let code = wikitext::parse(text)?;

    let templates = make_tags(
        code.templates
            .iter()
            .map(|name| TEMPLATE_NAMESPACE_REGEX.replace(name, "")),
    );

    let infobox = templates
        .iter()
        .find_map(|t| t.strip_prefix(INFOBOX_PREFIX))
        .map(str::to_string);

    let categories = make_tags(
        code.links
            .iter()
            .filter_map(|target| target.strip_prefix(CATEGORY_PREFIX)),
    );

    let general = make_tags(categories.iter().filter_map(|c| general_head(c)));

    Ok(PageFacts {
        templates,
        infobox,
        categories,
        general,
    })
}

/// Trims, lowercases and collapses whitespace/underscores.
/// Returns `None` for empty tags and tags of [`MAX_TAG_CHARS`] or more.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE_REGEX.replace_all(raw.trim(), " ");
    let tag = collapsed.trim().to_lowercase();
    if tag.is_empty() || tag.chars().count() >= MAX_TAG_CHARS {
        return None;
    }
    Some(tag)
}

/// Normalizes and deduplicates, keeping first-seen order.
pub fn make_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = FxHashSet::default();
    let mut tags = Vec::new();
    for item in raw {
        if let Some(tag) = normalize_tag(item.as_ref()) {
            if seen.insert(tag.clone()) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Head of a `<head> in|of|by <tail>` category, e.g. "Cities" for "Cities in France".
pub fn general_head(category: &str) -> Option<&str> {
    GENERAL_REGEX
        .captures(category)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
