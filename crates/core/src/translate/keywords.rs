//! Keyword expansion and contraction.
//!
//! A keyword is `$Name$` in normal form and `$Name: value $` in working
//! form. Only names enabled by `svn:keywords` are touched; everything else
//! passes through byte-for-byte.

use std::collections::BTreeMap;

use crate::models::Entry;

/// Longest keyword body (between the two `$`) that is recognised.
const MAX_KEYWORD_LEN: usize = 255;

#[derive(Debug, Clone, Copy)]
enum KeywordValue {
    Revision,
    Date,
    Author,
    Url,
    Id,
}

/// Keyword groups; any alias in `svn:keywords` enables the whole group.
const KEYWORD_GROUPS: &[(&[&str], KeywordValue)] = &[
    (&["LastChangedRevision", "Rev", "Revision"], KeywordValue::Revision),
    (&["LastChangedDate", "Date"], KeywordValue::Date),
    (&["LastChangedBy", "Author"], KeywordValue::Author),
    (&["HeadURL", "URL"], KeywordValue::Url),
    (&["Id"], KeywordValue::Id),
];

/// Build the keyword map for `entry` from an `svn:keywords` value.
pub fn build_keywords(list: &str, entry: &Entry) -> BTreeMap<String, String> {
    let requested: Vec<&str> = list
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect();

    let mut map = BTreeMap::new();
    for (aliases, kind) in KEYWORD_GROUPS {
        if !aliases.iter().any(|alias| requested.contains(alias)) {
            continue;
        }
        let value = keyword_value(*kind, entry);
        for alias in *aliases {
            map.insert((*alias).to_string(), value.clone());
        }
    }
    map
}

fn keyword_value(kind: KeywordValue, entry: &Entry) -> String {
    let date = entry.changed_date.as_deref().unwrap_or("");
    let author = entry.last_author.as_deref().unwrap_or("");
    match kind {
        KeywordValue::Revision => entry.revision.to_string(),
        KeywordValue::Date => date.to_string(),
        KeywordValue::Author => author.to_string(),
        KeywordValue::Url => entry.url.clone().unwrap_or_default(),
        KeywordValue::Id => {
            let parts = [entry.name.clone(), entry.revision.to_string(), date.to_string(), author.to_string()];
            parts
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// Expand every enabled keyword to `$Name: value $`.
pub fn expand(input: &[u8], keywords: &BTreeMap<String, String>) -> Vec<u8> {
    translate(input, keywords, true)
}

/// Contract every enabled keyword to `$Name$`.
pub fn contract(input: &[u8], keywords: &BTreeMap<String, String>) -> Vec<u8> {
    translate(input, keywords, false)
}

fn translate(input: &[u8], keywords: &BTreeMap<String, String>, expand: bool) -> Vec<u8> {
    if keywords.is_empty() {
        return input.to_vec();
    }

    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'$' {
            if let Some((consumed, replacement)) = match_keyword(&input[i..], keywords, expand) {
                out.extend_from_slice(&replacement);
                i += consumed;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

/// Try to match a keyword at the start of `buf` (which begins with `$`).
///
/// Returns the number of bytes consumed and the replacement text.
fn match_keyword(
    buf: &[u8],
    keywords: &BTreeMap<String, String>,
    expand: bool,
) -> Option<(usize, Vec<u8>)> {
    let limit = buf.len().min(MAX_KEYWORD_LEN + 2);
    let close = 1 + buf
        .get(1..limit)?
        .iter()
        .position(|&b| matches!(b, b'$' | b'\n' | b'\r'))?;
    if buf[close] != b'$' {
        return None;
    }

    let body = &buf[1..close];
    let name = match body.iter().position(|&b| b == b':') {
        None => body,
        Some(colon) => {
            let value = &body[colon + 1..];
            // `$Name: value $` needs a space on both sides of the value.
            if value.first() != Some(&b' ') || value.last() != Some(&b' ') {
                return None;
            }
            &body[..colon]
        }
    };

    let name = std::str::from_utf8(name).ok()?;
    let value = keywords.get(name)?;
    let replacement = if expand && !value.is_empty() {
        format!("${name}: {value} $")
    } else {
        format!("${name}$")
    };
    Some((close + 1, replacement.into_bytes()))
}
