//! Catalogue of known validation rules.
//!
//! Each rule name resolves to a [`RuleSpec`]: how the rule is type-checked
//! against its target field and how it is lowered by the synthesizer. The
//! registry is the single source of truth for rule resolution and must be
//! passed by reference to the analyzer; user-registered rules shadow the
//! defaults but may never replace the reserved names.

pub mod builtin;

use std::collections::HashMap;
use thiserror::Error;

use crate::diagnostics::ErrorKind;
use crate::tag::Rule;

/// Rule names that user registrations may not shadow.
pub const RESERVED_RULES: [&str; 4] = ["required", "notnil", "isvalid", "enum"];

/// Failure-condition comparison operator of a basic rule. The operator
/// expresses the check that *fails* the rule, e.g. `eq` fails on `!=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eql,
    Neq,
    Lss,
    Gtr,
    Leq,
    Geq,
}

/// Logical operator joining per-argument comparisons of a basic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOp {
    And,
    Or,
}

/// Boolean connective mode for chained function rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolConn {
    #[default]
    None,
    /// `p(v,a) || p(v,b) || …`
    Not,
    /// `!p(v,a) || !p(v,b) || …`
    And,
    /// `!p(v,a) && !p(v,b) && …`
    Or,
}

/// Language-neutral parameter kind of a predicate signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Int,
    Float,
    Bool,
    /// The empty interface; accepts anything.
    Any,
}

/// Qualified name of a predicate function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncIdent {
    pub pkg_path: String,
    pub name: String,
}

impl FuncIdent {
    pub fn new(pkg_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pkg_path: pkg_path.into(),
            name: name.into(),
        }
    }

    /// The short package name, derived from the last path segment.
    pub fn pkg_name(&self) -> &str {
        match self.pkg_path.rfind('/') {
            Some(i) => &self.pkg_path[i + 1..],
            None => &self.pkg_path,
        }
    }
}

/// How a basic rule constrains its target field and arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicCheck {
    /// `eq`/`ne`: one or more args against an equality-comparable field.
    Comparable,
    /// `gt`/`lt`/`gte`/`lte`/`min`/`max`: one numeric arg, numeric field.
    Ordered,
    /// `len`: one or two uint bounds, field type must have a length.
    Length,
    /// `rng`: exactly two numeric bounds, numeric field.
    Range,
}

/// A rule lowered to direct comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicRule {
    pub op: CompareOp,
    pub join: Option<JoinOp>,
    pub check: BasicCheck,
}

/// Rule-specific argument-value checker, applied after the generic
/// kind/arity checks pass.
pub type ArgCheck = fn(&Rule) -> Result<(), ErrorKind>;

/// A rule lowered to a named function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncRule {
    pub func: FuncIdent,
    /// Parameter kinds; index 0 is the field value. For variadic functions
    /// the last entry is the element kind of the variadic tail.
    pub params: Vec<ParamKind>,
    pub is_variadic: bool,
    pub conn: BoolConn,
    /// Emit raw string literals for string arguments.
    pub use_raw_string: bool,
    pub check: Option<ArgCheck>,
    pub is_custom: bool,
}

impl FuncRule {
    /// Parameter kinds aligned to an argument list of length `nargs`,
    /// repeating the tail kind as needed.
    pub fn params_for_args(&self, nargs: usize) -> Vec<ParamKind> {
        let mut kinds: Vec<ParamKind> = self.params[1..].to_vec();
        let last = *self.params.last().expect("func rule has no params");
        if self.is_variadic {
            if let Some(tail) = kinds.last_mut() {
                *tail = last;
            } else {
                kinds.push(last);
            }
        }
        while kinds.len() < nargs {
            kinds.push(last);
        }
        kinds
    }

    /// Number of arguments the rule tag must supply.
    pub fn required_args(&self) -> usize {
        self.params.len().saturating_sub(if self.is_variadic { 2 } else { 1 })
    }
}

/// Specification of a single rule: its type constraints and lowering strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSpec {
    /// Invokes the field's `IsValid() bool` method.
    IsValid,
    /// Membership among the typed constants of the field's named type.
    Enum,
    Basic(BasicRule),
    Func(FuncRule),
}

impl RuleSpec {
    pub fn is_custom(&self) -> bool {
        matches!(self, RuleSpec::Func(f) if f.is_custom)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Rule registration failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("rule name '{0}' is reserved")]
    ReservedName(String),
    #[error("custom rule function must take at least one parameter")]
    NoParams,
    #[error("custom rule function must return exactly one bool")]
    NonBoolResult,
}

/// Rule registry: the built-in catalogue plus user-registered rules.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    custom: HashMap<String, RuleSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a rule name; user registrations shadow the defaults.
    pub fn find(&self, name: &str) -> Option<&RuleSpec> {
        if let Some(spec) = self.custom.get(name) {
            return Some(spec);
        }
        builtin::DEFAULT_RULES.get(name)
    }

    /// Registers a custom predicate under the given rule name.
    ///
    /// The function must take the field value as its first parameter and
    /// return exactly one bool; reserved rule names are rejected.
    pub fn add_rule_func(
        &mut self,
        name: &str,
        func: FuncIdent,
        params: Vec<ParamKind>,
        results: Vec<ParamKind>,
        is_variadic: bool,
    ) -> Result<(), RegistryError> {
        if RESERVED_RULES.contains(&name) {
            return Err(RegistryError::ReservedName(name.to_string()));
        }
        if params.is_empty() {
            return Err(RegistryError::NoParams);
        }
        if results != [ParamKind::Bool] {
            return Err(RegistryError::NonBoolResult);
        }
        self.custom.insert(
            name.to_string(),
            RuleSpec::Func(FuncRule {
                func,
                params,
                is_variadic,
                conn: BoolConn::None,
                use_raw_string: false,
                check: None,
                is_custom: true,
            }),
        );
        Ok(())
    }
}
