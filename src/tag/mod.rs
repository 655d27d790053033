//! The rule mini-language embedded in field tags.
//!
//! A parsed tag is a binary tree of [`TagNode`]s: the `key` and `elem`
//! children carry the rules that apply to the key and element of a map (or
//! the element of a slice/array), while `rules` carries the rules applied to
//! the value itself. Parsing never fails on input shape; type errors are
//! caught later by the analyzer.

pub mod parser;

use serde::{Deserialize, Serialize};

pub use parser::{lookup_tag, parse_field_tag, parse_rule_tag};

/// The inferred type of a rule argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ArgType {
    #[default]
    Unknown,
    Bool,
    Int,
    Float,
    String,
    /// A `&key` reference to a sibling field.
    FieldRef,
}

/// A single rule argument as parsed from a tag (`rule:arg`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuleArg {
    pub typ: ArgType,
    /// The raw value; may be empty.
    pub value: String,
}

impl RuleArg {
    pub fn new(typ: ArgType, value: impl Into<String>) -> Self {
        Self {
            typ,
            value: value.into(),
        }
    }

    /// A non-negative integer literal.
    pub fn is_uint(&self) -> bool {
        self.typ == ArgType::Int && !self.value.starts_with('-')
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// A named validation rule with its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Rule {
    pub name: String,
    pub args: Vec<RuleArg>,
    /// The `@context` under which the rule fires, empty for unconditional.
    pub context: String,
    /// The `#key` grouping tag, empty when absent.
    pub set_key: String,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Rule::default()
        }
    }

    fn to_tag_string(&self) -> String {
        let mut out = self.name.clone();
        for a in &self.args {
            out.push(':');
            out.push_str(&serialize_arg(a));
        }
        if !self.context.is_empty() {
            out.push_str(":@");
            out.push_str(&self.context);
        }
        if !self.set_key.is_empty() {
            out.push_str(":#");
            out.push_str(&self.set_key);
        }
        out
    }
}

/// Binary-tree representation of a parsed rule tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TagNode {
    pub rules: Vec<Rule>,
    pub key: Option<Box<TagNode>>,
    pub elem: Option<Box<TagNode>>,
}

impl TagNode {
    /// No rules at this level and no children.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.key.is_none() && self.elem.is_none()
    }

    /// Whether this node carries a rule with the given name.
    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.iter().any(|r| r.name == name)
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Whether this node or any node in its key/elem hierarchy carries rules.
    pub fn contains_rules(&self) -> bool {
        if !self.rules.is_empty() {
            return true;
        }
        if self.key.as_deref().is_some_and(TagNode::contains_rules) {
            return true;
        }
        self.elem.as_deref().is_some_and(TagNode::contains_rules)
    }

    /// Serializes back into tag syntax. Parsing the result yields a tree
    /// equal to `self`.
    pub fn to_tag_string(&self) -> String {
        let mut out = String::new();
        for (i, r) in self.rules.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&r.to_tag_string());
        }
        if self.key.is_some() || self.elem.is_some() {
            if !self.rules.is_empty() {
                out.push(',');
            }
            out.push('[');
            if let Some(k) = &self.key {
                out.push_str(&k.to_tag_string());
            }
            out.push(']');
            if let Some(e) = &self.elem {
                out.push_str(&e.to_tag_string());
            }
        }
        out
    }
}

fn serialize_arg(a: &RuleArg) -> String {
    match a.typ {
        ArgType::FieldRef => format!("&{}", a.value),
        ArgType::String => {
            if needs_quoting(&a.value) {
                let escaped = a.value.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            } else {
                a.value.clone()
            }
        }
        _ => a.value.clone(),
    }
}

// A bare string survives re-parsing only if it contains no structural
// characters and would not be re-classified as a different literal type.
fn needs_quoting(v: &str) -> bool {
    v.is_empty()
        || v.contains([':', ',', '[', ']', '"', '@', '#', '&', ' '])
        || parser::classify_literal(v) != ArgType::String
}
