//! Minimal wikitext scanner.
//!
//! Finds every template invocation (`{{name|...}}`, nested ones included) and
//! every wikilink (`[[target|label]]`) in a page. It works on raw bytes and
//! only splits at ASCII delimiters, so all slices stay on UTF-8 boundaries.
//! HTML comments and the bodies of verbatim tags (`<nowiki>`, `<math>`,
//! `<pre>` and friends) are skipped. `{{{arguments}}}` are not templates, and
//! unclosed constructs are ignored.

use crate::config::MAX_NESTING_DEPTH;
use crate::error::RecordError;
use memchr::memmem;

/// Tags whose content is never scanned for markup.
const VERBATIM_TAGS: [&[u8]; 5] = [b"nowiki", b"math", b"pre", b"syntaxhighlight", b"source"];

/// Templates and links found in one page, in document order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Wikicode<'a> {
    /// Template names with comments and nested markup removed, not yet normalized
    pub templates: Vec<String>,
    /// Link targets (text before the first `|`), leading whitespace trimmed
    pub links: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy)]
enum Open {
    Template(usize),
    Argument,
    Link(usize),
}

pub fn parse(text: &str) -> Result<Wikicode<'_>, RecordError> {
    let bytes = text.as_bytes();
    let mut stack: Vec<Open> = Vec::new();
    // (start offset, name) so nested templates can be put back in document order
    let mut templates: Vec<(usize, String)> = Vec::new();
    let mut links: Vec<(usize, &str)> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        match bytes[i] {
            b'<' if rest.starts_with(b"<!--") => {
                i = skip_comment(bytes, i);
            }
            b'<' => {
                i = match verbatim_tag(rest) {
                    Some(tag) => skip_verbatim(bytes, i, tag),
                    None => i + 1,
                };
            }
            b'{' if rest.starts_with(b"{{{") => {
                stack.push(Open::Argument);
                i += 3;
            }
            b'{' if rest.starts_with(b"{{") => {
                stack.push(Open::Template(i + 2));
                i += 2;
            }
            b'}' if rest.starts_with(b"}}") => {
                match stack.last() {
                    Some(Open::Argument) if rest.starts_with(b"}}}") => {
                        stack.pop();
                        i += 3;
                        continue;
                    }
                    _ => {}
                }
                if let Some(pos) = innermost(&stack, |o| matches!(o, Open::Template(_))) {
                    if let Open::Template(start) = stack[pos] {
                        templates.push((start, template_name(&text[start..i])));
                    }
                    stack.truncate(pos);
                }
                i += 2;
            }
            b'[' if rest.starts_with(b"[[") => {
                // a link target cannot hold `[[`, so an open link still in its target is stray
                if let Some(&Open::Link(start)) = stack.last() {
                    if memchr::memchr(b'|', &bytes[start..i]).is_none() {
                        stack.pop();
                    }
                }
                stack.push(Open::Link(i + 2));
                i += 2;
            }
            b']' if rest.starts_with(b"]]") => {
                if let Some(pos) = innermost(&stack, |o| matches!(o, Open::Link(_))) {
                    if let Open::Link(start) = stack[pos] {
                        links.push((start, link_target(&text[start..i])));
                    }
                    stack.truncate(pos);
                }
                i += 2;
            }
            _ => i += 1,
        }

        if stack.len() > MAX_NESTING_DEPTH {
            return Err(RecordError::Wikitext(format!(
                "markup nested deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
    }

    templates.sort_by_key(|(start, _)| *start);
    links.sort_by_key(|(start, _)| *start);

    Ok(Wikicode {
        templates: templates.into_iter().map(|(_, name)| name).collect(),
        links: links.into_iter().map(|(_, target)| target).collect(),
    })
}

fn innermost(stack: &[Open], pred: impl Fn(&Open) -> bool) -> Option<usize> {
    stack.iter().rposition(pred)
}

/// True when `rest` begins with `name` (any case) followed by the end of a tag name.
fn tag_name_at(rest: &[u8], name: &[u8]) -> bool {
    rest.len() > name.len()
        && rest[..name.len()].eq_ignore_ascii_case(name)
        && matches!(rest[name.len()], b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')
}

fn verbatim_tag(rest: &[u8]) -> Option<&'static [u8]> {
    VERBATIM_TAGS
        .iter()
        .copied()
        .find(|tag| tag_name_at(&rest[1..], tag))
}

/// Returns the offset just past `-->`, or the end of input if unterminated.
fn skip_comment(bytes: &[u8], start: usize) -> usize {
    match memmem::find(&bytes[start + 4..], b"-->") {
        Some(pos) => start + 4 + pos + 3,
        None => bytes.len(),
    }
}

/// Skips a self-closing `<tag/>` or a whole `<tag ...>...</tag>` span. The
/// closing tag matches in any case; without one the rest of the page is skipped.
fn skip_verbatim(bytes: &[u8], start: usize, tag: &[u8]) -> usize {
    let tag_end = match memchr::memchr(b'>', &bytes[start..]) {
        Some(pos) => start + pos,
        None => return bytes.len(),
    };
    if bytes[tag_end - 1] == b'/' {
        return tag_end + 1;
    }

    let mut from = tag_end + 1;
    while let Some(pos) = memchr::memchr(b'<', &bytes[from..]) {
        let at = from + pos;
        let rest = &bytes[at + 1..];
        if rest.first() == Some(&b'/') && tag_name_at(&rest[1..], tag) {
            return match memchr::memchr(b'>', rest) {
                Some(gt) => at + 1 + gt + 1,
                None => bytes.len(),
            };
        }
        from = at + 1;
    }
    bytes.len()
}

/// Name segment of a template body: everything before the first top-level `|`,
/// with comments and nested templates/links dropped.
fn template_name(inner: &str) -> String {
    let bytes = inner.as_bytes();
    let mut name = String::new();
    let mut depth: usize = 0;
    let mut run_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(b"<!--") {
            if depth == 0 {
                name.push_str(&inner[run_start..i]);
            }
            i = skip_comment(bytes, i);
            run_start = i;
        } else if rest.starts_with(b"{{") || rest.starts_with(b"[[") {
            if depth == 0 {
                name.push_str(&inner[run_start..i]);
            }
            depth += 1;
            i += 2;
            run_start = i;
        } else if (rest.starts_with(b"}}") || rest.starts_with(b"]]")) && depth > 0 {
            depth -= 1;
            i += 2;
            run_start = i;
        } else if bytes[i] == b'|' && depth == 0 {
            name.push_str(&inner[run_start..i]);
            return name;
        } else {
            i += 1;
        }
    }

    if depth == 0 && run_start < bytes.len() {
        name.push_str(&inner[run_start..]);
    }
    name
}

fn link_target(inner: &str) -> &str {
    inner.split('|').next().unwrap_or("").trim_start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_templates_in_document_order() {
        let code = parse("{{Infobox person|name={{birth date|1990}}}} text {{Cite web|url=x}}").unwrap();
        assert_eq!(code.templates, vec!["Infobox person", "birth date", "Cite web"]);
    }

    #[test]
    fn finds_links_and_targets() {
        let code = parse("See [[Paris|the city]] and [[Category:Capitals in Europe]].").unwrap();
        assert_eq!(code.links, vec!["Paris", "Category:Capitals in Europe"]);
    }

    #[test]
    fn links_nested_in_file_captions() {
        let code = parse("[[File:Map.png|thumb|Near [[Lyon]]]]").unwrap();
        assert_eq!(code.links, vec!["File:Map.png", "Lyon"]);
    }

    #[test]
    fn links_inside_templates_are_found() {
        let code = parse("{{Main|[[Category:Rivers of France]]}}").unwrap();
        assert_eq!(code.templates, vec!["Main"]);
        assert_eq!(code.links, vec!["Category:Rivers of France"]);
    }

    #[test]
    fn arguments_are_not_templates() {
        let code = parse("{{Navbox|title={{{title|}}}}}").unwrap();
        assert_eq!(code.templates, vec!["Navbox"]);
    }

    #[test]
    fn comments_and_nowiki_are_skipped() {
        let code = parse("<!-- {{Hidden}} --> <nowiki>{{Literal}}</nowiki> {{Shown}} <nowiki/>").unwrap();
        assert_eq!(code.templates, vec!["Shown"]);
    }

    #[test]
    fn verbatim_tag_bodies_are_skipped() {
        let code = parse("<math>\\frac{{n}}{k}</math> <PRE>{{Code}}</pre> <source lang=\"c\">{{1,2}}</SOURCE> {{Shown}}").unwrap();
        assert_eq!(code.templates, vec!["Shown"]);
    }

    #[test]
    fn closing_verbatim_tag_matches_any_case() {
        let code = parse("<nowiki>{{Literal}}</Nowiki> {{After}} [[Category:Kept]]").unwrap();
        assert_eq!(code.templates, vec!["After"]);
        assert_eq!(code.links, vec!["Category:Kept"]);
    }

    #[test]
    fn tags_sharing_a_prefix_are_scanned() {
        let code = parse("<preview>{{Shown}}</preview> <mathx>{{Also}}</mathx>").unwrap();
        assert_eq!(code.templates, vec!["Shown", "Also"]);
    }

    #[test]
    fn sequential_stray_link_openers_are_not_nesting() {
        let text = "x [[ y ".repeat(MAX_NESTING_DEPTH + 1) + "{{Infobox settlement}} [[Category:Cities in France]]";
        let code = parse(&text).unwrap();
        assert_eq!(code.templates, vec!["Infobox settlement"]);
        assert_eq!(code.links, vec!["Category:Cities in France"]);
    }

    #[test]
    fn comment_in_template_name_is_removed() {
        let code = parse("{{Infobox settlement <!-- see docs -->\n| name = Paris}}").unwrap();
        assert_eq!(code.templates, vec!["Infobox settlement \n"]);
    }

    #[test]
    fn unclosed_template_is_ignored() {
        let code = parse("{{Infobox person\n| name = broken").unwrap();
        assert!(code.templates.is_empty());
    }

    #[test]
    fn unclosed_link_inside_template_does_not_swallow_it() {
        let code = parse("{{Quote|text [[broken}} after").unwrap();
        assert_eq!(code.templates, vec!["Quote"]);
        assert!(code.links.is_empty());
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let text = "{{a|".repeat(MAX_NESTING_DEPTH + 1);
        assert!(matches!(parse(&text), Err(RecordError::Wikitext(_))));
    }

    #[test]
    fn non_ascii_text_keeps_boundaries() {
        let code = parse("Ünîcödé {{Infobox Stadt|Name=Köln}} [[Kategorie:Städte]]").unwrap();
        assert_eq!(code.templates, vec!["Infobox Stadt"]);
        assert_eq!(code.links, vec!["Kategorie:Städte"]);
    }

    #[test]
    fn template_name_strips_nested_markup() {
        assert_eq!(template_name("{{PAGENAME}} list|x"), " list");
        assert_eq!(template_name("plain"), "plain");
    }
}
