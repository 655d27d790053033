//! Rule type-checking.
//!
//! Runs after the per-field pass, once the selector map is complete. Every
//! rule is checked against its target field's type, its arguments against the
//! rule's declared constraints, and cross-field references against the
//! selector map. The first failure aborts the analysis.

use std::collections::BTreeMap;

use crate::diagnostics::{AnalysisError, ErrorKind, Reporter};
use crate::model::{TypeId, TypeKind, TypeTable};
use crate::rules::{BasicCheck, BasicRule, BoolConn, FuncRule, ParamKind, Registry, RuleSpec};
use crate::tag::{ArgType, Rule, RuleArg, TagNode};

use super::{can_is_valid, ContextOption, EnumConst, FieldInfo, Selector, ShapeNode};

pub(crate) struct Checker<'a> {
    pub table: &'a TypeTable,
    pub registry: &'a Registry,
    pub reporter: &'a Reporter,
    pub selectors: &'a BTreeMap<String, Selector>,
    pub context_option: Option<ContextOption>,
    /// Constants collected for enum rules, keyed by `pkg_path.TypeName`.
    pub enums: BTreeMap<String, Vec<EnumConst>>,
}

impl<'a> Checker<'a> {
    pub fn check_field(&mut self, f: &FieldInfo) -> Result<(), AnalysisError> {
        self.check_node(f, &f.tag, f.type_id)?;
        for child in &f.children {
            self.check_field(child)?;
        }
        if let Some(shape) = &f.elem {
            self.check_shape(shape)?;
        }
        if let Some(shape) = &f.key_shape {
            self.check_shape(shape)?;
        }
        Ok(())
    }

    fn check_shape(&mut self, shape: &ShapeNode) -> Result<(), AnalysisError> {
        for child in &shape.children {
            self.check_field(child)?;
        }
        if let Some(elem) = &shape.elem {
            self.check_shape(elem)?;
        }
        if let Some(key) = &shape.key_shape {
            self.check_shape(key)?;
        }
        Ok(())
    }

    fn check_node(
        &mut self,
        f: &FieldInfo,
        node: &TagNode,
        type_id: TypeId,
    ) -> Result<(), AnalysisError> {
        for rule in &node.rules {
            self.check_rule(f, rule, type_id)?;
        }

        let base = self.table.ptr_base(type_id);
        let base_kind = self.table.get(base).kind;

        if let Some(key_node) = &node.key {
            if base_kind != TypeKind::Map {
                return Err(self.rule_error(
                    f,
                    ErrorKind::FieldTypeNotComposite {
                        rule: "key".into(),
                        typ: self.table.display(type_id),
                    },
                ));
            }
            self.check_node(f, key_node, self.table.key(base))?;
        }
        if let Some(elem_node) = &node.elem {
            if !matches!(base_kind, TypeKind::Map | TypeKind::Slice | TypeKind::Array) {
                return Err(self.rule_error(
                    f,
                    ErrorKind::FieldTypeNotComposite {
                        rule: "elem".into(),
                        typ: self.table.display(type_id),
                    },
                ));
            }
            self.check_node(f, elem_node, self.table.elem(base))?;
        }
        Ok(())
    }

    fn check_rule(
        &mut self,
        f: &FieldInfo,
        rule: &Rule,
        type_id: TypeId,
    ) -> Result<(), AnalysisError> {
        if !rule.context.is_empty() && self.context_option.is_none() {
            return Err(self.rule_error(
                f,
                ErrorKind::RuleContextUnknown {
                    rule: rule.name.clone(),
                    context: rule.context.clone(),
                },
            ));
        }

        let base = self.table.ptr_base(type_id);

        // required and notnil are handled outside the registry; they get
        // dedicated slots during synthesis.
        match rule.name.as_str() {
            "required" | "notnil" => {
                if !rule.args.is_empty() {
                    return Err(self.rule_error(
                        f,
                        ErrorKind::RuleArgCount {
                            rule: rule.name.clone(),
                            expected: "0".into(),
                            actual: rule.args.len(),
                        },
                    ));
                }
                if rule.name == "notnil" && !self.table.get(type_id).kind.is_nilable() {
                    return Err(self.rule_error(
                        f,
                        ErrorKind::FieldTypeNotNilable {
                            rule: rule.name.clone(),
                            typ: self.table.display(type_id),
                        },
                    ));
                }
                return Ok(());
            }
            _ => {}
        }

        let Some(spec) = self.registry.find(&rule.name) else {
            return Err(self.rule_error(
                f,
                ErrorKind::RuleUnknown {
                    rule: rule.name.clone(),
                },
            ));
        };

        match spec {
            RuleSpec::IsValid => {
                if !can_is_valid(self.table, self.table.get(base)) {
                    return Err(self.rule_error(
                        f,
                        ErrorKind::IsValidUnsupported {
                            typ: self.table.display(type_id),
                        },
                    ));
                }
                Ok(())
            }
            RuleSpec::Enum => self.check_enum(f, base),
            RuleSpec::Basic(basic) => self.check_basic(f, rule, *basic, base),
            RuleSpec::Func(func) => self.check_func(f, rule, func.clone(), base),
        }
    }

    // ------------------------------------------------------------------------
    // enum rules
    // ------------------------------------------------------------------------

    fn check_enum(&mut self, f: &FieldInfo, base: TypeId) -> Result<(), AnalysisError> {
        let t = self.table.get(base);
        if !t.is_named() || !t.kind.is_basic() {
            return Err(self.rule_error(
                f,
                ErrorKind::EnumTypeUnnamed {
                    typ: self.table.display(base),
                },
            ));
        }

        let consts: Vec<EnumConst> = self
            .table
            .consts_of(base)
            .into_iter()
            .filter(|c| c.pkg_path == t.pkg_path)
            .map(|c| EnumConst {
                name: c.name.clone(),
                pkg_path: c.pkg_path.clone(),
            })
            .collect();
        if consts.is_empty() {
            return Err(self.rule_error(
                f,
                ErrorKind::EnumTypeNoConstants {
                    typ: self.table.display(base),
                },
            ));
        }

        self.enums
            .insert(format!("{}.{}", t.pkg_path, t.name), consts);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // basic rules
    // ------------------------------------------------------------------------

    fn check_basic(
        &mut self,
        f: &FieldInfo,
        rule: &Rule,
        spec: BasicRule,
        base: TypeId,
    ) -> Result<(), AnalysisError> {
        let base_kind = self.table.get(base).kind;

        match spec.check {
            BasicCheck::Comparable => {
                if rule.args.is_empty() {
                    return Err(self.arg_count(f, rule, "at least 1"));
                }
                if matches!(
                    base_kind,
                    TypeKind::Slice | TypeKind::Map | TypeKind::Func | TypeKind::Chan
                ) {
                    return Err(self.rule_error(
                        f,
                        ErrorKind::FieldTypeNotComparable {
                            rule: rule.name.clone(),
                            typ: self.table.display(base),
                        },
                    ));
                }
                for arg in &rule.args {
                    self.check_arg_against_type(f, rule, arg, base)?;
                }
            }
            BasicCheck::Ordered => {
                if rule.args.len() != 1 {
                    return Err(self.arg_count(f, rule, "1"));
                }
                if !base_kind.is_numeric() {
                    return Err(self.rule_error(
                        f,
                        ErrorKind::FieldTypeNotNumeric {
                            rule: rule.name.clone(),
                            typ: self.table.display(base),
                        },
                    ));
                }
                self.check_arg_against_type(f, rule, &rule.args[0], base)?;
            }
            BasicCheck::Length => {
                if !base_kind.has_length() {
                    return Err(self.rule_error(
                        f,
                        ErrorKind::FieldTypeNoLength {
                            rule: rule.name.clone(),
                            typ: self.table.display(base),
                        },
                    ));
                }
                if rule.args.is_empty() || rule.args.len() > 2 {
                    return Err(self.arg_count(f, rule, "1 or 2"));
                }
                for arg in &rule.args {
                    self.check_length_bound(f, rule, arg)?;
                }
                self.check_length_bounds_form(f, rule)?;
            }
            BasicCheck::Range => {
                if rule.args.len() != 2 {
                    return Err(self.arg_count(f, rule, "2"));
                }
                if !base_kind.is_numeric() {
                    return Err(self.rule_error(
                        f,
                        ErrorKind::FieldTypeNotNumeric {
                            rule: rule.name.clone(),
                            typ: self.table.display(base),
                        },
                    ));
                }
                for arg in &rule.args {
                    if arg.typ != ArgType::FieldRef && arg.is_empty() {
                        return Err(self.rule_error(
                            f,
                            ErrorKind::RuleArgKind {
                                rule: rule.name.clone(),
                                arg: arg.clone(),
                                expected: "a numeric bound".into(),
                            },
                        ));
                    }
                    self.check_arg_against_type(f, rule, arg, base)?;
                }
            }
        }
        Ok(())
    }

    // A length bound is an empty slot, a non-negative integer, or a
    // reference to an integer field.
    fn check_length_bound(
        &mut self,
        f: &FieldInfo,
        rule: &Rule,
        arg: &RuleArg,
    ) -> Result<(), AnalysisError> {
        match arg.typ {
            ArgType::Unknown if arg.is_empty() => Ok(()),
            ArgType::Int if arg.is_uint() => Ok(()),
            ArgType::FieldRef => {
                let leaf = self.resolve_ref(f, arg)?;
                let kind = self.table.get(self.table.ptr_base(leaf)).kind;
                if kind.is_integer() {
                    Ok(())
                } else {
                    Err(self.arg_type_error(f, rule, arg, TypeKind::Uint))
                }
            }
            _ => Err(self.arg_type_error(f, rule, arg, TypeKind::Uint)),
        }
    }

    fn check_length_bounds_form(&self, f: &FieldInfo, rule: &Rule) -> Result<(), AnalysisError> {
        let empty = |i: usize| rule.args[i].typ != ArgType::FieldRef && rule.args[i].is_empty();
        if rule.args.len() == 1 {
            if empty(0) {
                return Err(self.rule_error(
                    f,
                    ErrorKind::RuleArgValueLen {
                        rule: rule.name.clone(),
                        arg: rule.args[0].clone(),
                    },
                ));
            }
            return Ok(());
        }
        if empty(0) && empty(1) {
            return Err(self.rule_error(
                f,
                ErrorKind::RuleArgValueLen {
                    rule: rule.name.clone(),
                    arg: rule.args[1].clone(),
                },
            ));
        }
        if let (Ok(lo), Ok(hi)) = (
            rule.args[0].value.parse::<u64>(),
            rule.args[1].value.parse::<u64>(),
        ) {
            if lo > hi {
                return Err(self.rule_error(
                    f,
                    ErrorKind::RuleArgValueLen {
                        rule: rule.name.clone(),
                        arg: rule.args[1].clone(),
                    },
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // function rules
    // ------------------------------------------------------------------------

    fn check_func(
        &mut self,
        f: &FieldInfo,
        rule: &Rule,
        spec: FuncRule,
        base: TypeId,
    ) -> Result<(), AnalysisError> {
        let nargs = rule.args.len();

        // chaining replaces the arity check with "at least one argument"
        if spec.conn != BoolConn::None {
            if nargs == 0 {
                return Err(self.arg_count(f, rule, "at least 1"));
            }
        } else if spec.is_variadic {
            if nargs < spec.required_args() {
                return Err(self.arg_count(f, rule, &format!("at least {}", spec.required_args())));
            }
        } else if nargs != spec.params.len() - 1 {
            return Err(self.arg_count(f, rule, &(spec.params.len() - 1).to_string()));
        }

        if !self.field_accepts_param(base, spec.params[0]) {
            return Err(self.rule_error(
                f,
                ErrorKind::FieldTypeFuncIncompatible {
                    rule: rule.name.clone(),
                    typ: self.table.display(base),
                    func: format!("{}.{}", spec.func.pkg_name(), spec.func.name),
                },
            ));
        }

        let kinds = spec.params_for_args(nargs);
        for (arg, kind) in rule.args.iter().zip(kinds) {
            self.check_arg_against_param(f, rule, arg, kind)?;
        }

        if let Some(check) = spec.check {
            check(rule).map_err(|kind| self.rule_error(f, kind))?;
        }
        Ok(())
    }

    fn field_accepts_param(&self, base: TypeId, kind: ParamKind) -> bool {
        let t = self.table.get(base);
        match kind {
            ParamKind::Any => true,
            ParamKind::String => {
                t.kind == TypeKind::String
                    || (t.kind == TypeKind::Slice && {
                        let ek = self.table.get(self.table.elem(base)).kind;
                        ek == TypeKind::Uint8 || ek == TypeKind::Int32
                    })
            }
            ParamKind::Int => t.kind.is_integer(),
            ParamKind::Float => t.kind.is_numeric(),
            ParamKind::Bool => t.kind == TypeKind::Bool,
        }
    }

    fn check_arg_against_param(
        &self,
        f: &FieldInfo,
        rule: &Rule,
        arg: &RuleArg,
        kind: ParamKind,
    ) -> Result<(), AnalysisError> {
        match arg.typ {
            ArgType::Unknown => Ok(()),
            ArgType::FieldRef => {
                let leaf = self.resolve_ref(f, arg)?;
                if self.field_accepts_param(self.table.ptr_base(leaf), kind) {
                    Ok(())
                } else {
                    Err(self.param_type_error(f, rule, arg, kind))
                }
            }
            _ => {
                let ok = match kind {
                    ParamKind::Any | ParamKind::String => true,
                    ParamKind::Int => arg.typ == ArgType::Int,
                    ParamKind::Float => matches!(arg.typ, ArgType::Int | ArgType::Float),
                    ParamKind::Bool => arg.typ == ArgType::Bool,
                };
                if ok {
                    Ok(())
                } else {
                    Err(self.param_type_error(f, rule, arg, kind))
                }
            }
        }
    }

    // Literal-to-field-type conversion for basic rules.
    fn check_arg_against_type(
        &self,
        f: &FieldInfo,
        rule: &Rule,
        arg: &RuleArg,
        target: TypeId,
    ) -> Result<(), AnalysisError> {
        let t = self.table.get(target);
        match arg.typ {
            ArgType::Unknown => Ok(()),
            ArgType::FieldRef => {
                let leaf = self.resolve_ref(f, arg)?;
                if self.table.convertible(self.table.ptr_base(leaf), target) {
                    Ok(())
                } else {
                    Err(self.arg_type_error(f, rule, arg, t.kind))
                }
            }
            _ => {
                if t.is_empty_interface || t.kind == TypeKind::String {
                    return Ok(());
                }
                if t.kind == TypeKind::Slice {
                    let ek = self.table.get(self.table.elem(target)).kind;
                    if (ek == TypeKind::Uint8 || ek == TypeKind::Int32)
                        && arg.typ == ArgType::String
                    {
                        return Ok(());
                    }
                }
                let ok = if t.kind.is_unsigned() {
                    arg.is_uint()
                } else if t.kind.is_integer() {
                    arg.typ == ArgType::Int
                } else if t.kind.is_float() {
                    matches!(arg.typ, ArgType::Int | ArgType::Float)
                } else if t.kind == TypeKind::Bool {
                    arg.typ == ArgType::Bool
                } else {
                    false
                };
                if ok {
                    Ok(())
                } else {
                    Err(self.arg_type_error(f, rule, arg, t.kind))
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // shared helpers
    // ------------------------------------------------------------------------

    fn resolve_ref(&self, f: &FieldInfo, arg: &RuleArg) -> Result<TypeId, AnalysisError> {
        match self.selectors.get(&arg.value) {
            Some(sel) => Ok(sel.last().expect("selector chains are non-empty").type_id),
            None => Err(self.rule_error(
                f,
                ErrorKind::FieldKeyUnknown {
                    key: arg.value.clone(),
                },
            )),
        }
    }

    fn arg_count(&self, f: &FieldInfo, rule: &Rule, expected: &str) -> AnalysisError {
        self.rule_error(
            f,
            ErrorKind::RuleArgCount {
                rule: rule.name.clone(),
                expected: expected.into(),
                actual: rule.args.len(),
            },
        )
    }

    fn arg_type_error(
        &self,
        f: &FieldInfo,
        rule: &Rule,
        arg: &RuleArg,
        target: TypeKind,
    ) -> AnalysisError {
        let rule = rule.name.clone();
        let arg = arg.clone();
        let kind = if target.is_unsigned() {
            ErrorKind::RuleArgTypeUint { rule, arg }
        } else if target.is_integer() {
            ErrorKind::RuleArgTypeInt { rule, arg }
        } else if target.is_float() {
            ErrorKind::RuleArgTypeFloat { rule, arg }
        } else if target == TypeKind::Bool {
            ErrorKind::RuleArgTypeBool { rule, arg }
        } else {
            ErrorKind::RuleArgTypeString { rule, arg }
        };
        self.rule_error(f, kind)
    }

    fn param_type_error(
        &self,
        f: &FieldInfo,
        rule: &Rule,
        arg: &RuleArg,
        kind: ParamKind,
    ) -> AnalysisError {
        let target = match kind {
            ParamKind::Int => TypeKind::Int,
            ParamKind::Float => TypeKind::Float64,
            ParamKind::Bool => TypeKind::Bool,
            _ => TypeKind::String,
        };
        self.arg_type_error(f, rule, arg, target)
    }

    fn rule_error(&self, f: &FieldInfo, kind: ErrorKind) -> AnalysisError {
        self.reporter.report_for_field(
            kind,
            f.span,
            &f.name,
            &self.table.display(f.type_id),
            &f.tag.to_tag_string(),
        )
    }
}
