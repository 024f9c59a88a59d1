//! Metadata extraction from markdown notes.
//!
//! Pulls frontmatter tags, inline `#tag` occurrences, and outbound
//! `[[wiki-links]]` out of note content. Tag case is preserved and
//! duplicates are removed, keeping first-seen order.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Wiki-link pattern: `[[Title]]`, `[[Title|alias]]`, `[[Title#anchor]]`.
/// The captured group is the target note title.
fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]|#]+)(?:[|#][^\]]+)?\]\]").unwrap())
}

fn inline_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`]+`").unwrap())
}

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([A-Za-z0-9_-]+)").unwrap())
}

/// Strip a leading `---` fenced YAML frontmatter block.
///
/// A malformed block (no closing fence) is left in place.
pub fn remove_frontmatter(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---") else {
        return content;
    };
    // The opening fence must be its own line.
    if !rest.starts_with('\n') && !rest.starts_with("\r\n") {
        return content;
    }
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.trim_start_matches(['\r', '\n'])
        }
        None => content,
    }
}

/// The frontmatter body, if the content opens with a fenced block.
fn frontmatter_body(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    if !rest.starts_with('\n') && !rest.starts_with("\r\n") {
        return None;
    }
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

/// Tags from the frontmatter `tags:` field.
///
/// Accepts a YAML sequence (`tags: [a, b]` or block form) as well as a
/// plain string with comma or whitespace separation. A leading `#` on
/// a tag is dropped.
pub fn extract_frontmatter_tags(content: &str) -> Vec<String> {
    let Some(body) = frontmatter_body(content) else {
        return Vec::new();
    };

    let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(body) else {
        return Vec::new();
    };
    let Some(tags_field) = value.get("tags") else {
        return Vec::new();
    };

    let mut tags = Vec::new();
    match tags_field {
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                let raw = match item {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    _ => continue,
                };
                push_tag(&mut tags, &raw);
            }
        }
        serde_yaml::Value::String(s) => {
            for part in s.split([',', ' ', '\t']) {
                push_tag(&mut tags, part);
            }
        }
        _ => {}
    }

    tags
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    let tag = raw.trim().trim_start_matches('#');
    if !tag.is_empty() {
        tags.push(tag.to_string());
    }
}

/// Inline `#tag` occurrences, excluding code regions, headers, and URLs.
pub fn extract_inline_tags(content: &str) -> Vec<String> {
    let stripped = strip_code_and_headers(content);

    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for m in hashtag_re().find_iter(&stripped) {
        // Word boundary before the `#`: reject `word#tag`, `##header`,
        // and URL fragments (`https://x/#anchor` is stripped by the
        // preceding-char check on `/`).
        let before = stripped[..m.start()].chars().next_back();
        if before.is_some_and(|c| c.is_alphanumeric() || c == '#' || c == '/' || c == '_') {
            continue;
        }
        let tag = &m.as_str()[1..];
        if seen.insert(tag.to_string()) {
            tags.push(tag.to_string());
        }
    }

    tags
}

/// Remove fenced code blocks, inline code spans, and header lines so
/// hashtag matching cannot fire inside them.
fn strip_code_and_headers(content: &str) -> String {
    let mut kept = Vec::new();
    let mut fence: Option<usize> = None;

    for line in content.lines() {
        let trimmed = line.trim_start();
        let ticks = trimmed.chars().take_while(|&c| c == '`').count();

        if let Some(open) = fence {
            if ticks >= open {
                fence = None;
            }
            continue;
        }
        if ticks >= 3 {
            fence = Some(ticks);
            continue;
        }
        if trimmed.starts_with('#')
            && trimmed
                .trim_start_matches('#')
                .starts_with(char::is_whitespace)
        {
            continue;
        }
        kept.push(line);
    }

    inline_code_re().replace_all(&kept.join("\n"), " ").into_owned()
}

/// All tags: union of frontmatter and inline, first occurrence wins.
pub fn extract_all_tags(content: &str) -> Vec<String> {
    let mut tags = extract_frontmatter_tags(content);
    let mut seen: HashSet<String> = tags.iter().cloned().collect();
    for tag in extract_inline_tags(content) {
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}

/// Outbound wiki-link targets, deduplicated in order of appearance.
///
/// `[[Note]]`, `[[Note|Alias]]`, `[[Note#Header]]`, and
/// `[[Note#Header|Alias]]` all resolve to `Note`.
pub fn extract_wikilinks(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for caps in wikilink_re().captures_iter(content) {
        let target = caps[1].trim();
        if !target.is_empty() && seen.insert(target.to_string()) {
            links.push(target.to_string());
        }
    }

    links
}
