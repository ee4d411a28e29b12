//! Allow-list markup sanitization.
//!
//! Every string leaf of a decoded request is rewritten so that only allowed
//! tags survive, in canonical form and without attributes. `script`/`style`
//! elements lose their content too, and comments and declarations are
//! dropped. Markup left open at the end of the input is dropped together with
//! the rest of the input.
//!
//! Any `<` that does not begin a kept tag and could open markup (followed by a
//! letter, `/`, `!` or `?`) is escaped as `&lt;`, so fragments left around a
//! removed tag cannot re-form one (`<<b>img src=x>`). The scanner makes one
//! forward pass and never revisits input.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::config::SanitizerConfig;

/// Tags allowed by default.
pub const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "u", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li",
];

/// Elements whose content is dropped along with the tags.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Immutable allow-list policy.
#[derive(Debug, Clone)]
pub struct SanitizationPolicy {
    allowed: HashSet<String>,
}

/// What a `<` at a given offset turned out to start.
#[derive(Debug, PartialEq, Eq)]
enum Markup {
    /// Not markup; the `<` is ordinary text.
    Text,
    /// Markup to drop, ending before the given offset.
    Skip(usize),
    /// An allowed tag, emitted in canonical form.
    Keep { tag: String, end: usize },
    /// Markup that never closes; drop everything from here.
    Truncate,
}

impl Default for SanitizationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_TAGS.iter().copied())
    }
}

impl SanitizationPolicy {
    pub fn new<I, S>(allowed_tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed_tags
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &SanitizerConfig) -> Self {
        Self::new(&config.allowed_tags)
    }

    pub fn is_allowed(&self, tag: &str) -> bool {
        self.allowed.contains(&tag.to_ascii_lowercase())
    }

    /// Sanitize a single string.
    pub fn sanitize_str(&self, input: &str) -> String {
        if !input.contains('<') {
            return input.to_string();
        }

        let mut out = String::with_capacity(input.len());
        // Offsets in `out` where kept tags start.
        let mut kept = Vec::new();
        let mut text_start = 0;
        let mut pos = 0;

        while let Some(found) = input[pos..].find('<') {
            let lt = pos + found;
            match self.scan_markup(input, lt) {
                Markup::Text => {
                    pos = lt + 1;
                }
                Markup::Skip(end) => {
                    out.push_str(&input[text_start..lt]);
                    text_start = end;
                    pos = end;
                }
                Markup::Keep { tag, end } => {
                    out.push_str(&input[text_start..lt]);
                    kept.push(out.len());
                    out.push_str(&tag);
                    text_start = end;
                    pos = end;
                }
                Markup::Truncate => {
                    out.push_str(&input[text_start..lt]);
                    text_start = input.len();
                    break;
                }
            }
        }
        out.push_str(&input[text_start..]);

        escape_stray(out, &kept)
    }

    fn scan_markup(&self, input: &str, lt: usize) -> Markup {
        let bytes = input.as_bytes();
        match bytes.get(lt + 1) {
            Some(b'!') if bytes[lt..].starts_with(b"<!--") => {
                match input[lt + 4..].find("-->") {
                    Some(i) => Markup::Skip(lt + 4 + i + 3),
                    None => Markup::Truncate,
                }
            }
            Some(b'!' | b'?') => match input[lt + 2..].find('>') {
                Some(i) => Markup::Skip(lt + 2 + i + 1),
                None => Markup::Truncate,
            },
            Some(b'/') if bytes.get(lt + 2).is_some_and(u8::is_ascii_alphabetic) => {
                self.scan_tag(input, lt + 2, true)
            }
            Some(b) if b.is_ascii_alphabetic() => self.scan_tag(input, lt + 1, false),
            _ => Markup::Text,
        }
    }

    fn scan_tag(&self, input: &str, name_start: usize, closing: bool) -> Markup {
        let bytes = input.as_bytes();
        let name_end = bytes[name_start..]
            .iter()
            .position(|b| b.is_ascii_whitespace() || matches!(b, b'/' | b'>'))
            .map_or(bytes.len(), |p| name_start + p);
        let Some(end) = tag_end(bytes, name_end) else {
            return Markup::Truncate;
        };

        let name = input[name_start..name_end].to_ascii_lowercase();
        if !closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            return match raw_text_end(input, end, &name) {
                Some(end) => Markup::Skip(end),
                None => Markup::Truncate,
            };
        }
        if self.allowed.contains(&name) {
            let slash = if closing { "/" } else { "" };
            Markup::Keep {
                tag: format!("<{slash}{name}>"),
                end,
            }
        } else {
            Markup::Skip(end)
        }
    }

    /// Sanitize every string leaf and object key, keeping structure and key order.
    pub fn sanitize_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.sanitize_str(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.sanitize_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (self.sanitize_str(&k), self.sanitize_value(v)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other,
        }
    }
}

/// Offset just past the `>` closing a tag whose attributes start at `from`.
///
/// A `>` inside a quoted attribute value does not close the tag.
fn tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut after_eq = false;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'>' => return Some(i + 1),
            b'=' => {
                after_eq = true;
                continue;
            }
            b'"' | b'\'' if after_eq => quote = Some(b),
            b if b.is_ascii_whitespace() => continue,
            _ => {}
        }
        after_eq = false;
    }
    None
}

/// Offset just past the end tag closing a raw text element.
fn raw_text_end(input: &str, from: usize, name: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut pos = from;
    while let Some(found) = input[pos..].find("</") {
        let name_start = pos + found + 2;
        let name_end = name_start + name.len();
        let same_name = bytes
            .get(name_start..name_end)
            .is_some_and(|n| n.eq_ignore_ascii_case(name.as_bytes()));
        let boundary = bytes
            .get(name_end)
            .is_none_or(|b| b.is_ascii_whitespace() || matches!(b, b'/' | b'>'));
        if same_name && boundary {
            return tag_end(bytes, name_end);
        }
        pos = name_start;
    }
    None
}

fn opens_markup(next: Option<&u8>) -> bool {
    next.is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
}

/// Escape every `<` that could open markup, except the kept tags at `kept`.
fn escape_stray(out: String, kept: &[usize]) -> String {
    let bytes = out.as_bytes();
    let mut kept = kept.iter().copied().peekable();
    let mut escaped = String::new();
    let mut copied = 0;
    for (i, _) in out.match_indices('<') {
        if kept.peek() == Some(&i) {
            kept.next();
            continue;
        }
        if opens_markup(bytes.get(i + 1)) {
            escaped.push_str(&out[copied..i]);
            escaped.push_str("&lt;");
            copied = i + 1;
        }
    }
    if copied == 0 {
        return out;
    }
    escaped.push_str(&out[copied..]);
    escaped
}
