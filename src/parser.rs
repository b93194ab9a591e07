//! Tag parser: extracts `/thought[...]` and `<thought ...>...</thought>`
//! fragments from raw model output, and produces cleaned text with the
//! fragments removed.
//!
//! Two grammars for the bracket form (regex-style and linear/bracket-balanced)
//! are both pure functions over a string with a configurable `tag_name`.
//! Neither grammar ever raises on malformed input — unclosed tags are
//! skipped (§7, Parser tolerance).

use std::collections::BTreeMap;

use uuid::Uuid;

/// Ordered extraction result: `"<tag>_i" -> trimmed content`, insertion order preserved.
pub type TagMap = Vec<(String, String)>;

fn tag_key(tag_name: &str, index: usize) -> String {
    format!("{tag_name}_{index}")
}

/// Regex-style (baseline) extraction: non-greedy `/<tag_name>[CONTENT]` where
/// `CONTENT` excludes `]`. This is a direct character scan rather than a
/// `regex` crate match (this corpus's dependency set carries no `regex`
/// dependency; see DESIGN.md), but yields exactly the same matches as
/// `r"/tag_name\[(.*?)\]"` over a single line of text: the first `]`
/// after the opening `[` terminates the match.
pub fn parse_thought_tags(text: &str, tag_name: &str) -> TagMap {
    let needle = format!("/{tag_name}[");
    let mut out = Vec::new();
    let mut index = 0usize;
    let mut search_start = 0usize;

    while let Some(rel_start) = text[search_start..].find(&needle) {
        let match_start = search_start + rel_start;
        let content_start = match_start + needle.len();
        if let Some(rel_end) = text[content_start..].find(']') {
            let content_end = content_start + rel_end;
            let content = text[content_start..content_end].trim().to_string();
            out.push((tag_key(tag_name, index), content));
            index += 1;
            search_start = content_end + 1;
        } else {
            // No closing bracket at all for the remainder of the text.
            search_start = content_start;
        }
    }
    out
}

/// Clean text parsed by the regex-style grammar: replace each match plus
/// adjacent horizontal whitespace with a single newline, then collapse.
pub fn clean_thought_tags(text: &str, tag_name: &str) -> String {
    let needle = format!("/{tag_name}[");
    let mut result = String::new();
    let mut search_start = 0usize;
    let mut last_copied = 0usize;

    while let Some(rel_start) = text[search_start..].find(&needle) {
        let match_start = search_start + rel_start;
        let content_start = match_start + needle.len();
        let Some(rel_end) = text[content_start..].find(']') else {
            search_start = content_start;
            continue;
        };
        let content_end = content_start + rel_end + 1; // include the ']'

        // Extend the removed span to swallow adjacent horizontal whitespace.
        let mut span_start = match_start;
        while span_start > last_copied
            && text[..span_start].ends_with(|c: char| c == ' ' || c == '\t')
        {
            span_start -= 1;
        }
        let mut span_end = content_end;
        while span_end < text.len() && text[span_end..].starts_with(|c: char| c == ' ' || c == '\t')
        {
            span_end += 1;
        }

        result.push_str(&text[last_copied..span_start]);
        result.push('\n');
        last_copied = span_end;
        search_start = content_end;
    }
    result.push_str(&text[last_copied..]);
    collapse_whitespace(&result)
}

fn collapse_whitespace(s: &str) -> String {
    // `[ \t]+\n` -> `\n`
    let mut step1 = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending_hspace: Vec<char> = Vec::new();
    while let Some(c) = chars.next() {
        if c == ' ' || c == '\t' {
            pending_hspace.push(c);
        } else if c == '\n' {
            pending_hspace.clear();
            step1.push('\n');
        } else {
            step1.extend(pending_hspace.drain(..));
            step1.push(c);
        }
    }
    step1.extend(pending_hspace);

    // `\n[ \t]+` -> `\n`
    let mut step2 = String::with_capacity(step1.len());
    let mut chars = step1.chars().peekable();
    while let Some(c) = chars.next() {
        step2.push(c);
        if c == '\n' {
            while matches!(chars.peek(), Some(' ') | Some('\t')) {
                chars.next();
            }
        }
    }

    // `\n{3,}` -> `\n\n`
    let mut step3 = String::with_capacity(step2.len());
    let mut newline_run = 0usize;
    for c in step2.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                step3.push('\n');
            }
        } else {
            newline_run = 0;
            step3.push(c);
        }
    }

    step3.trim().to_string()
}

/// Linear (bracket-balanced) extraction: tracks `[`/`]` depth so nested
/// brackets inside content survive. Unclosed tags are skipped.
pub fn parse_thought_tags_linear(text: &str, tag_name: &str) -> TagMap {
    linear_matches(text, tag_name)
        .into_iter()
        .enumerate()
        .map(|(i, m)| (tag_key(tag_name, i), m.content))
        .collect()
}

struct LinearMatch {
    start: usize,
    end: usize,
    content: String,
}

fn linear_matches(text: &str, tag_name: &str) -> Vec<LinearMatch> {
    let needle = format!("/{tag_name}[");
    let bytes: Vec<char> = text.chars().collect();
    let needle_chars: Vec<char> = needle.chars().collect();
    let mut out = Vec::new();
    let mut i = 0usize;

    while i + needle_chars.len() <= bytes.len() {
        if bytes[i..i + needle_chars.len()] == needle_chars[..] {
            let open_bracket = i + needle_chars.len() - 1; // index of '['
            let mut depth = 0i32;
            let mut j = open_bracket;
            let mut closed_at = None;
            while j < bytes.len() {
                match bytes[j] {
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            closed_at = Some(j);
                            break;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            if let Some(close) = closed_at {
                let content: String = bytes[open_bracket + 1..close].iter().collect();
                out.push(LinearMatch {
                    start: i,
                    end: close + 1,
                    content,
                });
                i = close + 1;
            } else {
                // Unclosed: advance past the initial '/' only, per §4.1.
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    out
}

/// Clean text parsed by the linear grammar: span-based reconstruction.
pub fn clean_thought_tags_linear(text: &str, tag_name: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let matches = linear_matches(text, tag_name);
    let mut result = String::new();
    let mut last = 0usize;
    for m in &matches {
        result.push_str(&chars[last..m.start].iter().collect::<String>());
        result.push('\n');
        last = m.end;
    }
    result.push_str(&chars[last..].iter().collect::<String>());
    collapse_whitespace(&result)
}

/// Parse and clean in one call, using the regex-style grammar.
pub fn parse_and_clean(text: &str, tag_name: &str) -> (String, TagMap) {
    (
        clean_thought_tags(text, tag_name),
        parse_thought_tags(text, tag_name),
    )
}

/// A single structured thought parsed from XML-style `<thought ...>` tags.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStructuredThought {
    pub thought_id: String,
    pub category: String,
    pub confidence: f64,
    pub content: String,
}

/// Parse `<thought id="" category="" confidence="">content</thought>` tags,
/// case-insensitive, content spanning newlines. Empty-content tags are skipped.
pub fn parse_structured_thoughts(
    text: &str,
    default_category: &str,
    default_confidence: f64,
) -> Vec<ParsedStructuredThought> {
    let lower = text.to_lowercase();
    let mut out = Vec::new();
    let mut search_start = 0usize;

    while let Some(open_rel) = lower[search_start..].find("<thought") {
        let open_start = search_start + open_rel;
        let Some(tag_close_rel) = lower[open_start..].find('>') else {
            break;
        };
        let tag_close = open_start + tag_close_rel;
        let attrs_raw = &text[open_start + "<thought".len()..tag_close];

        let Some(close_tag_rel) = lower[tag_close + 1..].find("</thought>") else {
            break;
        };
        let content_start = tag_close + 1;
        let content_end = content_start + close_tag_rel;
        let close_tag_end = content_end + "</thought>".len();

        let content = text[content_start..content_end].trim().to_string();
        search_start = close_tag_end;
        if content.is_empty() {
            continue;
        }

        let attrs = parse_attrs(attrs_raw);
        let thought_id = attrs
            .get("id")
            .cloned()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let category = attrs
            .get("category")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_category.to_string());
        let confidence = attrs
            .get("confidence")
            .and_then(|s| s.parse::<f64>().ok())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(default_confidence);

        out.push(ParsedStructuredThought {
            thought_id,
            category,
            confidence,
            content,
        });
    }
    out
}

fn parse_attrs(raw: &str) -> BTreeMap<String, String> {
    // `name="value"` pairs, case-insensitive names.
    let mut out = BTreeMap::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let name_start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        if i == name_start {
            i += 1;
            continue;
        }
        let name: String = chars[name_start..i].iter().collect();
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() || chars[i] != '=' {
            continue;
        }
        i += 1;
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() || chars[i] != '"' {
            continue;
        }
        i += 1;
        let val_start = i;
        while i < chars.len() && chars[i] != '"' {
            i += 1;
        }
        let value: String = chars[val_start..i].iter().collect();
        if i < chars.len() {
            i += 1; // closing quote
        }
        out.insert(name.to_lowercase(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC_INPUT: &str = "Initial analysis of the problem.\n\n/thought[The user wants a recursive solution] /thought[Edge cases include empty input and single elements] Continuing the analysis.\n\n/thought[Time complexity should be O(n log n)] /thought[Space complexity is O(n) due to recursion] Final assessment follows.";

    #[test]
    fn spec_reproduction_four_fragments() {
        let map = parse_thought_tags(SPEC_INPUT, "thought");
        assert_eq!(map.len(), 4);
        assert_eq!(map[0].0, "thought_0");
        assert_eq!(map[0].1, "The user wants a recursive solution");
        assert_eq!(map[3].1, "Space complexity is O(n) due to recursion");
    }

    #[test]
    fn nested_brackets_regex_vs_linear() {
        let input = "X /thought[value [with nested] tokens] Y";
        let regex_map = parse_thought_tags(input, "thought");
        assert_eq!(regex_map[0].1, "value [with nested");

        let linear_map = parse_thought_tags_linear(input, "thought");
        assert_eq!(linear_map[0].1, "value [with nested] tokens");

        let cleaned = clean_thought_tags_linear(input, "thought");
        assert_eq!(cleaned, "X\nY");
    }

    #[test]
    fn unclosed_tag_is_skipped() {
        let input = "before /thought[unterminated content no close";
        assert!(parse_thought_tags(input, "thought").is_empty());
        assert!(parse_thought_tags_linear(input, "thought").is_empty());
    }

    #[test]
    fn clean_idempotent() {
        let once = clean_thought_tags(SPEC_INPUT, "thought");
        let twice = clean_thought_tags(&once, "thought");
        assert_eq!(once, twice);
        assert!(parse_thought_tags(&once, "thought").is_empty());
    }

    #[test]
    fn linear_is_superset_of_regex_keys() {
        let input = "/thought[a] middle /thought[b [nested] c]";
        let regex_keys: Vec<_> = parse_thought_tags(input, "thought")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let linear_keys: Vec<_> = parse_thought_tags_linear(input, "thought")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert!(regex_keys.iter().all(|k| linear_keys.contains(k)));
    }

    #[test]
    fn structured_thought_parsing_and_confidence_clamp() {
        let input = r#"<thought id="t1" category="plan" confidence="1.7">Do the thing</thought><thought>untagged</thought><thought category="x"></thought>"#;
        let parsed = parse_structured_thoughts(input, "reflection", 0.9);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].thought_id, "t1");
        assert_eq!(parsed[0].confidence, 1.0);
        assert_eq!(parsed[1].category, "reflection");
        assert_eq!(parsed[1].confidence, 0.9);
    }
}
