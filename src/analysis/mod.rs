//! Analysis of validator struct types.
//!
//! The analyzer walks a target struct type, builds the intermediate
//! validation model, and type-checks every rule against its field and the
//! rule registry. Its output is immutable: the synthesizer reads the model
//! but never mutates it. Analysis is a pure function of its inputs and fails
//! fast on the first diagnostic.

pub mod check;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::diagnostics::{AnalysisError, ErrorKind, Reporter, SourceContext};
use crate::model::{FieldDecl, Span, Type, TypeId, TypeKind, TypeTable};
use crate::rules::Registry;
use crate::tag::{self, Rule, TagNode};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Analyzer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tag key holding the validation rules.
    pub validator_key: String,
    /// Tag key whose value provides the field key; `None` uses the field name.
    pub field_key_tag: Option<String>,
    /// Join nested field keys with their parents' keys.
    pub field_key_join: bool,
    /// Separator inserted between joined key parts.
    pub field_key_separator: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validator_key: "is".into(),
            field_key_tag: None,
            field_key_join: false,
            field_key_separator: ".".into(),
        }
    }
}

// ============================================================================
// INTERMEDIATE VALIDATION MODEL
// ============================================================================

/// The analyzed validator struct: root of the intermediate validation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub type_name: String,
    /// Import path of the package declaring the validator struct.
    pub pkg_path: String,
    pub fields: Vec<FieldInfo>,
    pub error_handler: Option<ErrorHandler>,
    pub context_option: Option<ContextOption>,
    /// Hook method names with original casing preserved.
    pub before_validate: Option<String>,
    pub after_validate: Option<String>,
}

/// A field whose type implements the error constructor or aggregator
/// capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandler {
    pub name: String,
    /// Aggregators collect failures and emit them from `Out()`; constructors
    /// produce one error per failure, halting validation.
    pub is_aggregator: bool,
}

/// The struct's `context` (case-insensitive) string field, when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOption {
    pub name: String,
}

/// One analyzed struct field, possibly with analyzed subfields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Unique identifier within the root struct; used in error messages and
    /// cross-field references.
    pub key: String,
    pub type_id: TypeId,
    pub tag: TagNode,
    pub is_embedded: bool,
    pub is_exported: bool,
    /// Position of the declaration in the declaring source.
    pub span: Span,
    /// Longest chain of nested struct fields reachable beneath this field.
    pub max_depth: usize,
    /// Analyzed subfields when the field's base type is a struct.
    pub children: Vec<FieldInfo>,
    /// Element shape when the base type is a slice, array, or map.
    pub elem: Option<Box<ShapeNode>>,
    /// Key shape when the base type is a map.
    pub key_shape: Option<Box<ShapeNode>>,
}

impl FieldInfo {
    /// Whether this field or any of its subfields carries rules.
    pub fn contains_rules(&self) -> bool {
        self.tag.contains_rules()
            || self.children.iter().any(FieldInfo::contains_rules)
            || self.elem.as_deref().is_some_and(ShapeNode::contains_rules)
            || self
                .key_shape
                .as_deref()
                .is_some_and(ShapeNode::contains_rules)
    }
}

/// The analyzed shape of a container's key or element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeNode {
    pub type_id: TypeId,
    /// Analyzed subfields when the base type is a struct.
    pub children: Vec<FieldInfo>,
    pub elem: Option<Box<ShapeNode>>,
    pub key_shape: Option<Box<ShapeNode>>,
}

impl ShapeNode {
    fn contains_rules(&self) -> bool {
        self.children.iter().any(FieldInfo::contains_rules)
            || self.elem.as_deref().is_some_and(ShapeNode::contains_rules)
            || self
                .key_shape
                .as_deref()
                .is_some_and(ShapeNode::contains_rules)
    }
}

/// One step of a selector chain from the root struct to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorStep {
    pub name: String,
    pub type_id: TypeId,
}

pub type Selector = Vec<SelectorStep>;

/// A typed constant belonging to an enum rule's target type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumConst {
    pub name: String,
    pub pkg_path: String,
}

/// The full result of a successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub validator: Validator,
    /// Field key to selector chain, for cross-field references.
    pub selectors: BTreeMap<String, Selector>,
    /// `pkg_path.TypeName` to the typed constants collected for enum rules.
    pub enums: BTreeMap<String, Vec<EnumConst>>,
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Analyzes the struct type `target` and produces the validation model.
///
/// `target` must be a named struct type; passing anything else is a loader
/// bug and panics.
pub fn analyze(
    table: &TypeTable,
    target: TypeId,
    src: &SourceContext,
    span: Span,
    config: &Config,
    registry: &Registry,
) -> Result<Analysis, AnalysisError> {
    let root = table.get(target);
    assert!(
        root.kind == TypeKind::Struct && root.is_named(),
        "analysis target must be a named struct type"
    );

    let reporter = Reporter::new(src, root.name.clone());
    let mut az = Analyzer {
        table,
        config,
        reporter,
        span,
        keys: HashMap::new(),
        selectors: BTreeMap::new(),
        selector_stack: Vec::new(),
        key_stack: Vec::new(),
        visited: HashSet::new(),
        container_depth: 0,
        error_handler: None,
        context_option: None,
    };

    az.visited
        .insert((root.pkg_path.clone(), root.name.clone()));
    let fields = az.analyze_fields(&root.fields, true, !root.is_imported)?;
    if fields.is_empty() {
        return Err(az.reporter.report(ErrorKind::EmptyValidator, span));
    }

    let validator = Validator {
        type_name: root.name.clone(),
        pkg_path: root.pkg_path.clone(),
        fields,
        error_handler: az.error_handler.take(),
        context_option: az.context_option.take(),
        before_validate: lookup_hook(table, root, "beforevalidate"),
        after_validate: lookup_hook(table, root, "aftervalidate"),
    };

    let mut checker = check::Checker {
        table,
        registry,
        reporter: &az.reporter,
        selectors: &az.selectors,
        context_option: validator.context_option.clone(),
        enums: BTreeMap::new(),
    };
    for field in &validator.fields {
        checker.check_field(field)?;
    }
    let enums = checker.enums;

    Ok(Analysis {
        validator,
        selectors: az.selectors,
        enums,
    })
}

// ============================================================================
// ANALYZER STATE
// ============================================================================

struct Analyzer<'a> {
    table: &'a TypeTable,
    config: &'a Config,
    reporter: Reporter,
    span: Span,
    /// Next disambiguation suffix per base key.
    keys: HashMap<String, u32>,
    selectors: BTreeMap<String, Selector>,
    selector_stack: Vec<SelectorStep>,
    key_stack: Vec<String>,
    /// Named struct types on the current descent path, for cycle breaking.
    visited: HashSet<(String, String)>,
    /// Non-zero while analyzing fields nested under a container type; such
    /// fields are keyed but not addressable through the selector map.
    container_depth: usize,
    error_handler: Option<ErrorHandler>,
    context_option: Option<ContextOption>,
}

impl<'a> Analyzer<'a> {
    fn analyze_fields(
        &mut self,
        decls: &[FieldDecl],
        root: bool,
        local: bool,
    ) -> Result<Vec<FieldInfo>, AnalysisError> {
        let mut fields = Vec::new();

        for decl in decls {
            // Imported, unexported fields cannot be referenced in generated code.
            if !local && !decl.is_exported {
                continue;
            }
            if decl.name == "_" {
                continue;
            }

            let rule_tag = tag::lookup_tag(&decl.tag, &self.config.validator_key);
            // Explicitly suppressed fields never enter the model; untagged
            // fields stay so sibling rules can reference them.
            if rule_tag.as_deref() == Some("-") {
                continue;
            }

            let Some(type_id) = decl.type_id else {
                continue;
            };

            if root && rule_tag.is_none() && self.register_special_field(decl, type_id)? {
                continue;
            }

            let key = self.resolve_key(decl)?;
            self.selector_stack.push(SelectorStep {
                name: decl.name.clone(),
                type_id,
            });
            if self.container_depth == 0 {
                self.selectors.insert(key.clone(), self.selector_stack.clone());
            }

            let mut node = match &rule_tag {
                Some(value) if !value.is_empty() => tag::parse_rule_tag(value),
                _ => TagNode::default(),
            };

            // Implicit isvalid fallback, unless the user opted out or already
            // named the rule explicitly.
            let base = self.table.ptr_base(type_id);
            let opted_out = node.rules.iter().any(|r| r.name == "-isvalid");
            node.rules.retain(|r| r.name != "-isvalid");
            if !opted_out && can_is_valid(self.table, self.table.get(base)) && !node.has_rule("isvalid")
            {
                node.rules.push(Rule::new("isvalid"));
            }

            let children = self.analyze_children(base, &key)?;
            let (elem, key_shape) = self.analyze_container(base, &key)?;
            let max_depth = children
                .iter()
                .map(|c| c.max_depth + 1)
                .max()
                .unwrap_or(0);

            self.selector_stack.pop();

            fields.push(FieldInfo {
                name: decl.name.clone(),
                key,
                type_id,
                tag: node,
                is_embedded: decl.is_embedded,
                is_exported: decl.is_exported,
                span: decl.span,
                max_depth,
                children,
                elem,
                key_shape,
            });
        }

        Ok(fields)
    }

    // Descends into struct-typed fields, guarding against type cycles.
    fn analyze_children(
        &mut self,
        base: TypeId,
        parent_key: &str,
    ) -> Result<Vec<FieldInfo>, AnalysisError> {
        let t = self.table.get(base);
        if t.kind != TypeKind::Struct || t.fields.is_empty() {
            return Ok(Vec::new());
        }

        let cycle_key = (t.pkg_path.clone(), t.name.clone());
        if t.is_named() {
            if self.visited.contains(&cycle_key) {
                return Ok(Vec::new());
            }
            self.visited.insert(cycle_key.clone());
        }

        if self.config.field_key_join {
            self.key_stack.push(parent_key.to_string());
        }
        let result = self.analyze_fields(&t.fields, false, !t.is_imported);
        if self.config.field_key_join {
            self.key_stack.pop();
        }

        if t.is_named() {
            self.visited.remove(&cycle_key);
        }
        result
    }

    // Analyzes the key/element shapes of a container-typed field.
    fn analyze_container(
        &mut self,
        base: TypeId,
        parent_key: &str,
    ) -> Result<(Option<Box<ShapeNode>>, Option<Box<ShapeNode>>), AnalysisError> {
        let kind = self.table.get(base).kind;
        if !matches!(kind, TypeKind::Slice | TypeKind::Array | TypeKind::Map) {
            return Ok((None, None));
        }

        self.container_depth += 1;
        let elem = self.analyze_shape(self.table.elem(base), parent_key);
        let key_shape = if kind == TypeKind::Map {
            self.analyze_shape(self.table.key(base), parent_key)
        } else {
            Ok(None)
        };
        self.container_depth -= 1;

        Ok((elem?, key_shape?))
    }

    // Analyzes the shape of one key/element type; returns None when nothing
    // beneath it can carry rules of its own.
    fn analyze_shape(
        &mut self,
        type_id: TypeId,
        parent_key: &str,
    ) -> Result<Option<Box<ShapeNode>>, AnalysisError> {
        let base = self.table.ptr_base(type_id);
        let children = self.analyze_children(base, parent_key)?;
        let (elem, key_shape) = self.analyze_container(base, parent_key)?;

        if children.is_empty() && elem.is_none() && key_shape.is_none() {
            return Ok(None);
        }
        Ok(Some(Box::new(ShapeNode {
            type_id,
            children,
            elem,
            key_shape,
        })))
    }

    // Resolves the field's key per the configured key function and ensures
    // uniqueness; collisions get deterministic "-N" suffixes, except for
    // user-nominated keys, which must not collide.
    fn resolve_key(&mut self, decl: &FieldDecl) -> Result<String, AnalysisError> {
        let mut nominated = false;
        let mut base = decl.name.clone();
        if let Some(tag_name) = &self.config.field_key_tag {
            if let Some(v) = tag::lookup_tag(&decl.tag, tag_name) {
                // a tag value may carry trailing options, e.g. `json:"k,omitempty"`
                let v = v.split(',').next().unwrap_or_default().to_string();
                if !v.is_empty() {
                    base = v;
                    nominated = true;
                }
            }
        }
        if self.config.field_key_join && !self.key_stack.is_empty() {
            base = format!(
                "{}{}{}",
                self.key_stack.join(&self.config.field_key_separator),
                self.config.field_key_separator,
                base
            );
        }

        match self.keys.get(&base).copied() {
            None => {
                self.keys.insert(base.clone(), 1);
                Ok(base)
            }
            Some(_) if nominated => Err(self.field_error(
                ErrorKind::FieldKeyConflict { key: base },
                decl,
            )),
            Some(mut n) => {
                let mut key = format!("{base}-{n}");
                while self.keys.contains_key(&key) {
                    n += 1;
                    key = format!("{base}-{n}");
                }
                self.keys.insert(base, n + 1);
                self.keys.insert(key.clone(), 1);
                Ok(key)
            }
        }
    }

    // Registers error-handler / context-option fields. Returns true when the
    // field was consumed as a special field.
    fn register_special_field(
        &mut self,
        decl: &FieldDecl,
        type_id: TypeId,
    ) -> Result<bool, AnalysisError> {
        let t = self.table.get(type_id);

        if is_error_aggregator(self.table, t) {
            return self.set_error_handler(decl, true).map(|_| true);
        }
        if is_error_constructor(self.table, t) {
            return self.set_error_handler(decl, false).map(|_| true);
        }

        if decl.name.eq_ignore_ascii_case("context") {
            if t.kind != TypeKind::String {
                return Err(self.field_error(
                    ErrorKind::ContextOptionType {
                        field: decl.name.clone(),
                        typ: self.table.display(type_id),
                    },
                    decl,
                ));
            }
            if self.context_option.is_some() {
                return Err(self.field_error(
                    ErrorKind::ContextOptionConflict {
                        field: decl.name.clone(),
                    },
                    decl,
                ));
            }
            self.context_option = Some(ContextOption {
                name: decl.name.clone(),
            });
            return Ok(true);
        }

        Ok(false)
    }

    fn set_error_handler(
        &mut self,
        decl: &FieldDecl,
        is_aggregator: bool,
    ) -> Result<(), AnalysisError> {
        if self.error_handler.is_some() {
            return Err(self.field_error(
                ErrorKind::ErrorHandlerConflict {
                    field: decl.name.clone(),
                },
                decl,
            ));
        }
        self.error_handler = Some(ErrorHandler {
            name: decl.name.clone(),
            is_aggregator,
        });
        Ok(())
    }

    fn field_error(&self, kind: ErrorKind, decl: &FieldDecl) -> AnalysisError {
        let typ = decl
            .type_id
            .map(|id| self.table.display(id))
            .unwrap_or_default();
        let span = if decl.span == Span::default() {
            self.span
        } else {
            decl.span
        };
        self.reporter
            .report_for_field(kind, span, &decl.name, &typ, &decl.tag)
    }
}

// ============================================================================
// CAPABILITY DETECTION
// ============================================================================

/// `IsValid() bool`.
pub fn can_is_valid(table: &TypeTable, t: &Type) -> bool {
    t.method("IsValid").is_some_and(|m| {
        m.params.is_empty() && m.results.len() == 1 && table.is_bool(m.results[0])
    })
}

/// `Error(key string, val any, rule string, args ...any) error`.
pub fn is_error_constructor(table: &TypeTable, t: &Type) -> bool {
    t.method("Error").is_some_and(|m| {
        m.is_variadic
            && m.params.len() == 4
            && table.is_string(m.params[0])
            && table.is_empty_interface(m.params[1])
            && table.is_string(m.params[2])
            && table.is_empty_interface_slice(m.params[3])
            && m.results.len() == 1
            && table.is_error(m.results[0])
    })
}

/// `Error(key string, val any, rule string, args ...any)` plus `Out() error`.
pub fn is_error_aggregator(table: &TypeTable, t: &Type) -> bool {
    let has_collect = t.method("Error").is_some_and(|m| {
        m.is_variadic
            && m.params.len() == 4
            && table.is_string(m.params[0])
            && table.is_empty_interface(m.params[1])
            && table.is_string(m.params[2])
            && table.is_empty_interface_slice(m.params[3])
            && m.results.is_empty()
    });
    let has_out = t.method("Out").is_some_and(|m| {
        m.params.is_empty() && m.results.len() == 1 && table.is_error(m.results[0])
    });
    has_collect && has_out
}

// Scans the method set for a hook with the given lowercase name and the
// signature `func() error`; the original casing is preserved for synthesis.
fn lookup_hook(table: &TypeTable, t: &Type, lower_name: &str) -> Option<String> {
    let m = t
        .methods
        .iter()
        .find(|m| m.name.to_lowercase() == lower_name)?;
    if !m.params.is_empty() || m.results.len() != 1 || !table.is_error(m.results[0]) {
        return None;
    }
    Some(m.name.clone())
}
