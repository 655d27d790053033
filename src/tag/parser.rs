//! Recursive scanner for the rule mini-language.
//!
//! The grammar, roughly:
//!
//! ```text
//! node    = rule | "[" [node] "]" [node | rule "," node]
//! rule    = identifier {":" ruleOpt} {"," rule}
//! ruleOpt = literal | "\"" quoted "\"" | "&" fieldKey | "@" contextId | "#" setKey
//! ```
//!
//! The parser is total: any input produces a tree (possibly empty). Malformed
//! rules surface later as analyzer diagnostics, never as parse failures.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tag::{ArgType, Rule, RuleArg, TagNode};

static RX_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(0|-?[1-9][0-9]*)$").unwrap());
static RX_FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?(0|[1-9][0-9]*)?\.[0-9]+$").unwrap());

/// Extracts the validator key's value from a full structured field tag and
/// parses it. A missing key, an empty value, or `"-"` yields an empty node.
pub fn parse_field_tag(tag: &str, key: &str) -> TagNode {
    match lookup_tag(tag, key) {
        Some(val) if !val.is_empty() && val != "-" => parse_rule_tag(&val),
        _ => TagNode::default(),
    }
}

/// Parses a raw rule-tag value into a [`TagNode`] tree.
pub fn parse_rule_tag(tag: &str) -> TagNode {
    let mut node = TagNode::default();
    let mut tag = tag;

    while !tag.is_empty() {
        tag = tag.trim_start_matches(' ');
        if tag.is_empty() {
            break;
        }
        let b = tag.as_bytes();

        // Bracketed form: split into key and elem trees and recurse. The
        // bracket content is opaque to quoting and tracks nesting depth.
        if b[0] == b'[' {
            let i = matching_bracket(b);
            let ktag = &tag[1..i.min(tag.len())];
            if !ktag.is_empty() {
                node.key = Some(Box::new(parse_rule_tag(ktag)));
            }
            let etag = &tag[i.min(tag.len())..];
            if etag.len() > 1 {
                node.elem = Some(Box::new(parse_rule_tag(&etag[1..])));
            }
            return node;
        }

        // Scan the rule name.
        let mut i = 0;
        while i < b.len() && b[i] != b',' && b[i] != b':' {
            i += 1;
        }
        if i == 0 {
            // Empty rule names between separators are skipped silently.
            tag = &tag[1..];
            continue;
        }
        let mut rule = Rule::new(&tag[..i]);
        tag = &tag[i..];

        if tag.is_empty() {
            node.rules.push(rule);
            break;
        }
        if tag.as_bytes()[0] == b',' {
            node.rules.push(rule);
            tag = &tag[1..];
            continue;
        }

        // Scan the rule's colon-separated options.
        while !tag.is_empty() {
            tag = &tag[1..]; // drop the leading ':'
            let b = tag.as_bytes();

            // Quoted option value: opaque up to the closing quote.
            if !b.is_empty() && b[0] == b'"' {
                let mut i = 1;
                while i < b.len() && b[i] != b'"' {
                    if b[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                let end = i.min(tag.len());
                rule.args
                    .push(RuleArg::new(ArgType::String, unescape(&tag[1..end])));
                tag = &tag[end..];
                if tag.starts_with('"') {
                    tag = &tag[1..];
                }
                if tag.starts_with(':') {
                    continue;
                }
                if tag.starts_with(',') {
                    tag = &tag[1..];
                }
                break;
            }

            let mut i = 0;
            while i < b.len() && b[i] != b':' && b[i] != b',' {
                i += 1;
            }
            let opt = &tag[..i];
            if let Some(ctx) = opt.strip_prefix('@') {
                rule.context = ctx.to_string();
            } else if let Some(sk) = opt.strip_prefix('#') {
                rule.set_key = sk.to_string();
            } else {
                rule.args.push(parse_arg(opt));
            }

            tag = &tag[i..];
            if tag.is_empty() {
                break;
            } else if tag.as_bytes()[0] == b',' {
                tag = &tag[1..];
                break;
            }
        }
        node.rules.push(rule);
    }
    node
}

// Index of the ']' matching the '[' at position 0, or the input length if
// unclosed. Quoted runs are skipped wholesale, including escaped quotes.
fn matching_bracket(b: &[u8]) -> usize {
    let mut i = 1;
    let mut depth = 0;
    while i < b.len() && (b[i] != b']' || depth > 0) {
        if b[i] == b'[' {
            depth += 1;
        } else if b[i] == b']' {
            depth -= 1;
        }
        i += 1;

        if b[i - 1] == b'"' {
            while i < b.len() && b[i] != b'"' {
                if b[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            if i < b.len() {
                i += 1;
            }
        }
    }
    i
}

fn parse_arg(val: &str) -> RuleArg {
    if let Some(key) = val.strip_prefix('&') {
        return RuleArg::new(ArgType::FieldRef, key);
    }
    RuleArg::new(classify_literal(val), val)
}

/// Classifies a bare (unquoted) literal value.
pub(crate) fn classify_literal(val: &str) -> ArgType {
    if val.is_empty() {
        return ArgType::Unknown;
    }
    if RX_INT.is_match(val) {
        return ArgType::Int;
    }
    if RX_FLOAT.is_match(val) {
        return ArgType::Float;
    }
    if val == "true" || val == "false" {
        return ArgType::Bool;
    }
    ArgType::String
}

/// Looks up a single key's value in a structured field tag, following the
/// host language's `key:"value"` convention: space-separated pairs with a
/// double-quoted, escapable value.
pub fn lookup_tag(tag: &str, key: &str) -> Option<String> {
    let mut tag = tag;
    loop {
        tag = tag.trim_start_matches(' ');
        if tag.is_empty() {
            return None;
        }
        let b = tag.as_bytes();

        let mut i = 0;
        while i < b.len() && b[i] > b' ' && b[i] != b':' && b[i] != b'"' {
            i += 1;
        }
        if i == 0 || i + 1 >= b.len() || b[i] != b':' || b[i + 1] != b'"' {
            return None;
        }
        let name = &tag[..i];
        tag = &tag[i + 1..];

        let b = tag.as_bytes();
        let mut i = 1;
        while i < b.len() && b[i] != b'"' {
            if b[i] == b'\\' {
                i += 1;
            }
            i += 1;
        }
        if i >= b.len() {
            return None;
        }
        let value = &tag[1..i];
        tag = &tag[i + 1..];

        if name == key {
            return Some(unescape(value));
        }
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}
