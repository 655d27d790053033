//! Code synthesis.
//!
//! Walks an analyzed validator and lowers each field into the descriptor AST:
//! nil-guards for pointer chains, zero-checks for `required`, if-else chains
//! for ordinary rules, for-range loops over containers, sub-blocks for nested
//! structs, and error construction. The synthesizer assumes the model is
//! well-typed; impossible states panic rather than propagate.

pub mod ast;

use std::collections::BTreeSet;

use crate::analysis::{Analysis, FieldInfo, ShapeNode};
use crate::model::{TypeId, TypeKind, TypeTable};
use crate::rules::builtin::PREDICATE_PKG;
use crate::rules::{BasicRule, BoolConn, CompareOp, FuncRule, JoinOp, ParamKind, Registry, RuleSpec};
use crate::tag::{ArgType, Rule, RuleArg, TagNode};

use ast::{BinaryOp, Expr, File, IfStmt, ImportSpec, MethodDecl, Stmt};

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Synthesizes one file containing the `Validate` methods of all targets.
pub fn synthesize_file(
    pkg_name: &str,
    targets: &[&Analysis],
    table: &TypeTable,
    registry: &Registry,
) -> File {
    let mut state = FileState::default();
    for an in targets {
        let mut s = Synthesizer {
            an,
            table,
            registry,
            recv: Expr::ident("v"),
            file: &mut state,
        };
        s.build_validate_method();
    }
    File {
        pkg_name: pkg_name.into(),
        imports: state.finish_imports(),
        init: state.init,
        decls: state.decls,
    }
}

/// Synthesizes a single target into its own file, named after the target's
/// declaring package.
pub fn synthesize(an: &Analysis, table: &TypeTable, registry: &Registry) -> File {
    let pkg = an
        .validator
        .pkg_path
        .rsplit('/')
        .next()
        .unwrap_or_default();
    synthesize_file(pkg, &[an], table, registry)
}

// ============================================================================
// FILE STATE
// ============================================================================

#[derive(Debug, Clone)]
struct ImpSpec {
    path: String,
    name: String,
    local: bool,
    /// Number of later imports sharing this import's name.
    num: u32,
}

#[derive(Default)]
struct FileState {
    imports: Vec<ImpSpec>,
    import_errors: bool,
    import_fmt: bool,
    init: Vec<Stmt>,
    /// Patterns already registered in the init block.
    registered_patterns: BTreeSet<String>,
    decls: Vec<MethodDecl>,
}

impl FileState {
    // Adds an import if not yet present and returns the package name that
    // qualifies its identifiers; namesakes get a numbered local name.
    fn add_import(&mut self, path: &str) -> String {
        if let Some(imp) = self.imports.iter().find(|s| s.path == path) {
            return imp.name.clone();
        }
        let base = path.rsplit('/').next().unwrap_or(path).to_string();
        let mut renamed = None;
        if let Some(namesake) = self.imports.iter_mut().find(|s| s.name == base) {
            namesake.num += 1;
            renamed = Some(format!("{base}{}", namesake.num));
        }
        let (name, local) = match renamed {
            Some(n) => (n, true),
            None => (base, false),
        };
        self.imports.push(ImpSpec {
            path: path.to_string(),
            name: name.clone(),
            local,
            num: 0,
        });
        name
    }

    // Final import list: standard library first, then external packages,
    // with the predicate support package trailing.
    fn finish_imports(&mut self) -> Vec<ImportSpec> {
        let mut specs = Vec::new();
        if self.import_errors {
            specs.push(ImportSpec {
                path: "errors".into(),
                name: "errors".into(),
                local: false,
            });
        }
        if self.import_fmt {
            specs.push(ImportSpec {
                path: "fmt".into(),
                name: "fmt".into(),
                local: false,
            });
        }
        let to_spec = |s: &ImpSpec| ImportSpec {
            path: s.path.clone(),
            name: s.name.clone(),
            local: s.local,
        };
        let std: Vec<_> = self
            .imports
            .iter()
            .filter(|s| !s.path.contains('.') && s.path != PREDICATE_PKG)
            .map(to_spec)
            .collect();
        let ext: Vec<_> = self
            .imports
            .iter()
            .filter(|s| s.path.contains('.') && s.path != PREDICATE_PKG)
            .map(to_spec)
            .collect();
        let support: Vec<_> = self
            .imports
            .iter()
            .filter(|s| s.path == PREDICATE_PKG)
            .map(to_spec)
            .collect();
        specs.extend(std);
        specs.extend(ext);
        specs.extend(support);
        specs
    }
}

// ============================================================================
// VARCODE
// ============================================================================

// Per-variable scratch: the current variable's type and access expression
// plus the partial AST nodes built for it. "Variable" covers struct fields
// and the individual keys/elements of container-typed fields.
struct VarCode<'a> {
    vtype: TypeId,
    vexpr: Expr,
    field: &'a FieldInfo,

    key: Option<Box<VarCode<'a>>>,
    elem: Option<Box<VarCode<'a>>>,
    fields: Vec<VarCode<'a>>,

    rules: Vec<&'a Rule>,
    required: Option<&'a Rule>,
    notnil: Option<&'a Rule>,

    rule_ifs: Vec<IfStmt>,
    rq_if: Option<IfStmt>,
    nn_if: Option<IfStmt>,

    /// Nil-guard expression for pointer chains.
    ng: Option<Expr>,
    /// Let-binding statements opening a sub-block.
    sb: Vec<Stmt>,
}

impl<'a> VarCode<'a> {
    fn new(vtype: TypeId, vexpr: Expr, field: &'a FieldInfo) -> Self {
        Self {
            vtype,
            vexpr,
            field,
            key: None,
            elem: None,
            fields: Vec::new(),
            rules: Vec::new(),
            required: None,
            notnil: None,
            rule_ifs: Vec::new(),
            rq_if: None,
            nn_if: None,
            ng: None,
            sb: Vec::new(),
        }
    }
}

// The analyzed subfield context of the variable under construction.
#[derive(Clone, Copy)]
struct ShapeRef<'a> {
    children: &'a [FieldInfo],
    elem: Option<&'a ShapeNode>,
    key: Option<&'a ShapeNode>,
}

impl<'a> ShapeRef<'a> {
    fn of_field(f: &'a FieldInfo) -> Self {
        Self {
            children: &f.children,
            elem: f.elem.as_deref(),
            key: f.key_shape.as_deref(),
        }
    }

    fn of_shape(s: Option<&'a ShapeNode>) -> Self {
        match s {
            Some(s) => Self {
                children: &s.children,
                elem: s.elem.as_deref(),
                key: s.key_shape.as_deref(),
            },
            None => Self {
                children: &[],
                elem: None,
                key: None,
            },
        }
    }
}

// Conversion target for rule argument expressions.
#[derive(Clone, Copy)]
enum Target {
    /// A concrete host type, for basic rules.
    Ty(TypeId),
    /// A declared predicate parameter kind.
    Param(ParamKind),
    /// The `int` result of the `len` builtin.
    IntLen,
}

// ============================================================================
// SYNTHESIZER
// ============================================================================

struct Synthesizer<'a> {
    an: &'a Analysis,
    table: &'a TypeTable,
    registry: &'a Registry,
    recv: Expr,
    file: &'a mut FileState,
}

impl<'a> Synthesizer<'a> {
    fn build_validate_method(&mut self) {
        let before = self.hook_stmt(self.an.validator.before_validate.as_deref());
        let after = self.hook_stmt(self.an.validator.after_validate.as_deref());

        let mut varcodes = Vec::new();
        for f in &self.an.validator.fields {
            if !f.contains_rules() {
                continue;
            }
            let expr = Expr::selector(self.recv.clone(), f.name.clone());
            let mut code = VarCode::new(f.type_id, expr, f);
            self.build_var_code(&mut code, &f.tag, ShapeRef::of_field(f));
            varcodes.push(code);
        }

        let mut body = Vec::new();
        if let Some(s) = before {
            body.push(s);
        }
        for code in &varcodes {
            body.extend(self.assemble_var_code(code));
        }
        if let Some(s) = after {
            body.push(s);
        }
        body.push(self.trailing_return());

        self.file.decls.push(MethodDecl {
            recv: "v".into(),
            recv_type: self.an.validator.type_name.clone(),
            name: "Validate".into(),
            body,
        });
    }

    // `if err := v.Hook(); err != nil { return err }`
    fn hook_stmt(&self, name: Option<&str>) -> Option<Stmt> {
        let name = name?;
        let call = Expr::call(Expr::selector(self.recv.clone(), name), vec![]);
        Some(Stmt::If(IfStmt {
            init: Some(Box::new(Stmt::Let {
                name: "err".into(),
                value: call,
            })),
            cond: Expr::binary(BinaryOp::Neq, Expr::ident("err"), Expr::nil()),
            body: vec![Stmt::Return(Expr::ident("err"))],
            else_branch: None,
        }))
    }

    // `return nil`, or `return v.EH.Out()` in aggregator mode.
    fn trailing_return(&self) -> Stmt {
        if let Some(eh) = &self.an.validator.error_handler {
            if eh.is_aggregator {
                let target =
                    Expr::selector(Expr::selector(self.recv.clone(), eh.name.clone()), "Out");
                return Stmt::Return(Expr::call(target, vec![]));
            }
        }
        Stmt::Return(Expr::nil())
    }

    // ------------------------------------------------------------------------
    // varcode construction
    // ------------------------------------------------------------------------

    fn build_var_code(&mut self, code: &mut VarCode<'a>, tn: &'a TagNode, shape: ShapeRef<'a>) {
        // required and notnil get dedicated slots; everything else stays in
        // declaration order.
        for r in &tn.rules {
            match r.name.as_str() {
                "required" => code.required = Some(r),
                "notnil" => code.notnil = Some(r),
                _ => code.rules.push(r),
            }
        }

        self.build_nil_guard(code);
        self.build_required(code);
        self.build_notnil(code);
        self.build_sub_block(code, shape);
        self.build_rule_ifs(code);

        match self.table.get(code.vtype).kind {
            TypeKind::Slice | TypeKind::Array => {
                if let Some(etn) = tn.elem.as_deref() {
                    let elem_type = self.table.elem(code.vtype);
                    let mut ec = VarCode::new(elem_type, Expr::ident("e"), code.field);
                    self.build_var_code(&mut ec, etn, ShapeRef::of_shape(shape.elem));
                    code.elem = Some(Box::new(ec));
                }
            }
            TypeKind::Map => {
                if let Some(ktn) = tn.key.as_deref() {
                    let key_type = self.table.key(code.vtype);
                    let mut kc = VarCode::new(key_type, Expr::ident("k"), code.field);
                    self.build_var_code(&mut kc, ktn, ShapeRef::of_shape(shape.key));
                    code.key = Some(Box::new(kc));
                }
                if let Some(etn) = tn.elem.as_deref() {
                    let elem_type = self.table.elem(code.vtype);
                    let mut ec = VarCode::new(elem_type, Expr::ident("e"), code.field);
                    self.build_var_code(&mut ec, etn, ShapeRef::of_shape(shape.elem));
                    code.elem = Some(Box::new(ec));
                }
            }
            TypeKind::Struct => {
                for f in shape.children {
                    if !f.contains_rules() {
                        continue;
                    }
                    let expr = Expr::selector(code.vexpr.clone(), f.name.clone());
                    let mut fc = VarCode::new(f.type_id, expr, f);
                    self.build_var_code(&mut fc, &f.tag, ShapeRef::of_field(f));
                    code.fields.push(fc);
                }
            }
            _ => {}
        }
    }

    // With required/notnil the guard fires when ANY pointer on the chain is
    // nil; with plain rules it permits evaluation when ALL are non-nil. Each
    // step peels one pointer kind and adds one indirection.
    fn build_nil_guard(&mut self, code: &mut VarCode<'a>) {
        if self.table.get(code.vtype).kind != TypeKind::Ptr {
            return;
        }

        let (lop, eop) = if code.required.is_some() || code.notnil.is_some() {
            (BinaryOp::LOr, BinaryOp::Eql)
        } else {
            (BinaryOp::LAnd, BinaryOp::Neq)
        };

        let mut cond = Expr::binary(eop, code.vexpr.clone(), Expr::nil());
        code.vexpr = Expr::deref(code.vexpr.clone());
        code.vtype = self.table.elem(code.vtype);

        while self.table.get(code.vtype).kind == TypeKind::Ptr {
            let step = Expr::binary(eop, code.vexpr.clone(), Expr::nil());
            cond = Expr::binary(lop, cond, step);
            code.vexpr = Expr::deref(code.vexpr.clone());
            code.vtype = self.table.elem(code.vtype);
        }

        code.ng = Some(cond);
    }

    fn build_required(&mut self, code: &mut VarCode<'a>) {
        let Some(rule) = code.required else {
            return;
        };

        let zero = self.required_expr(code);
        let cond = match (zero, &code.ng) {
            (Some(z), Some(ng)) => Some(Expr::binary(BinaryOp::LOr, ng.clone(), z)),
            (None, Some(ng)) => Some(ng.clone()),
            (z, None) => z,
        };
        let Some(mut cond) = cond else {
            return;
        };

        if !rule.context.is_empty() {
            cond = Expr::binary(BinaryOp::LAnd, cond, self.context_guard(rule));
        }

        let err = self.error_stmt(code, rule);
        code.rq_if = Some(IfStmt::new(cond, vec![err]));
    }

    fn build_notnil(&mut self, code: &mut VarCode<'a>) {
        let Some(rule) = code.notnil else {
            return;
        };

        let nil_check = match self.table.get(code.vtype).kind {
            TypeKind::Ptr | TypeKind::Slice | TypeKind::Map | TypeKind::Interface => Some(
                Expr::binary(BinaryOp::Eql, code.vexpr.clone(), Expr::nil()),
            ),
            _ => None,
        };
        let cond = match (nil_check, &code.ng) {
            (Some(c), Some(ng)) => Some(Expr::binary(BinaryOp::LOr, ng.clone(), c)),
            (None, Some(ng)) => Some(ng.clone()),
            (c, None) => c,
        };
        let Some(mut cond) = cond else {
            return;
        };

        if !rule.context.is_empty() {
            cond = Expr::binary(BinaryOp::LAnd, cond, self.context_guard(rule));
        }

        let err = self.error_stmt(code, rule);
        code.nn_if = Some(IfStmt::new(cond, vec![err]));
    }

    // Zero-value check whose form depends on the variable's kind.
    fn required_expr(&self, code: &VarCode<'a>) -> Option<Expr> {
        let kind = self.table.get(code.vtype).kind;
        let v = code.vexpr.clone();
        match kind {
            TypeKind::String | TypeKind::Map | TypeKind::Slice => Some(Expr::binary(
                BinaryOp::Eql,
                Expr::len(v),
                Expr::Lit("0".into()),
            )),
            k if k.is_integer() => Some(Expr::binary(BinaryOp::Eql, v, Expr::Lit("0".into()))),
            k if k.is_float() => Some(Expr::binary(BinaryOp::Eql, v, Expr::Lit("0.0".into()))),
            TypeKind::Bool => Some(Expr::binary(BinaryOp::Eql, v, Expr::Lit("false".into()))),
            TypeKind::Ptr | TypeKind::Interface => {
                Some(Expr::binary(BinaryOp::Eql, v, Expr::nil()))
            }
            _ => None,
        }
    }

    // A let-binding sub-block avoids repeating long dereference chains when
    // the variable has subfields or two or more rules.
    fn build_sub_block(&mut self, code: &mut VarCode<'a>, shape: ShapeRef<'a>) {
        if code.ng.is_none() {
            return;
        }
        let has_subfields =
            self.table.get(code.vtype).kind == TypeKind::Struct && !shape.children.is_empty();
        if !has_subfields && (code.nn_if.is_some() || code.rq_if.is_some()) {
            return;
        }
        if !has_subfields && code.rules.len() < 2 {
            return;
        }

        code.sb.push(Stmt::Let {
            name: "f".into(),
            value: code.vexpr.clone(),
        });
        code.vexpr = Expr::ident("f");
    }

    fn build_rule_ifs(&mut self, code: &mut VarCode<'a>) {
        let rules = code.rules.clone();
        for rule in rules {
            let mut ifs = self.rule_if_stmt(code, rule);
            if !rule.context.is_empty() {
                ifs.cond = Expr::paren(Expr::binary(
                    BinaryOp::LAnd,
                    ifs.cond,
                    self.context_guard(rule),
                ));
            }
            code.rule_ifs.push(ifs);
        }
    }

    fn context_guard(&self, rule: &Rule) -> Expr {
        let opt = self
            .an
            .validator
            .context_option
            .as_ref()
            .expect("context rule without context option field");
        Expr::binary(
            BinaryOp::Eql,
            Expr::selector(self.recv.clone(), opt.name.clone()),
            Expr::Str(rule.context.clone()),
        )
    }

    // ------------------------------------------------------------------------
    // rule lowering
    // ------------------------------------------------------------------------

    fn rule_if_stmt(&mut self, code: &VarCode<'a>, rule: &'a Rule) -> IfStmt {
        let registry = self.registry;
        let spec = registry
            .find(&rule.name)
            .expect("rule resolved during analysis");

        match spec {
            RuleSpec::IsValid => self.is_valid_if(code, rule),
            RuleSpec::Enum => self.enum_if(code, rule),
            RuleSpec::Basic(basic) => match rule.name.as_str() {
                "len" => self.len_if(code, rule),
                "rng" => self.rng_if(code, rule),
                _ => self.basic_if(code, rule, *basic),
            },
            RuleSpec::Func(func) => {
                let func = func.clone();
                if func.conn != BoolConn::None {
                    self.func_chain_if(code, rule, &func)
                } else {
                    self.func_if(code, rule, &func)
                }
            }
        }
    }

    fn is_valid_if(&mut self, code: &VarCode<'a>, rule: &'a Rule) -> IfStmt {
        let mut x = code.vexpr.clone();
        if matches!(x, Expr::Deref(_)) {
            x = Expr::paren(x);
        }
        let call = Expr::call(Expr::selector(x, "IsValid"), vec![]);
        let err = self.error_stmt(code, rule);
        IfStmt::new(Expr::not(call), vec![err])
    }

    fn enum_if(&mut self, code: &VarCode<'a>, rule: &'a Rule) -> IfStmt {
        let base = self.table.ptr_base(code.field.type_id);
        let t = self.table.get(base);
        let consts = &self.an.enums[&format!("{}.{}", t.pkg_path, t.name)];

        let mut cond: Option<Expr> = None;
        for c in consts {
            let ident = if c.pkg_path != self.an.validator.pkg_path {
                let pkg = self.file.add_import(&c.pkg_path);
                Expr::Qualified {
                    pkg,
                    name: c.name.clone(),
                }
            } else {
                Expr::ident(c.name.clone())
            };
            let ne = Expr::binary(BinaryOp::Neq, code.vexpr.clone(), ident);
            cond = Some(match cond {
                Some(prev) => Expr::binary(BinaryOp::LAnd, prev, ne),
                None => ne,
            });
        }

        let err = self.error_stmt(code, rule);
        IfStmt::new(cond.expect("enum rule with no constants"), vec![err])
    }

    fn basic_if(&mut self, code: &VarCode<'a>, rule: &'a Rule, spec: BasicRule) -> IfStmt {
        let target = Target::Ty(self.table.ptr_base(code.field.type_id));
        let binop = compare_op(spec.op);
        let join = spec.join.map(join_op).unwrap_or(BinaryOp::LAnd);

        let mut cond: Option<Expr> = None;
        for arg in &rule.args {
            let value = self.arg_value_expr(rule, arg, target, false);
            let c = Expr::binary(binop, code.vexpr.clone(), value);
            cond = Some(match cond {
                Some(prev) => Expr::binary(join, prev, c),
                None => c,
            });
        }

        let err = self.error_stmt(code, rule);
        IfStmt::new(cond.expect("basic rule with no arguments"), vec![err])
    }

    // len lowers to one of four forms: exact, min-only, max-only, or the
    // inclusive two-bound range.
    fn len_if(&mut self, code: &VarCode<'a>, rule: &'a Rule) -> IfStmt {
        let err = self.error_stmt(code, rule);
        let length = Expr::len(code.vexpr.clone());

        if rule.args.len() == 1 {
            let bound = self.arg_value_expr(rule, &rule.args[0], Target::IntLen, false);
            let cond = Expr::binary(BinaryOp::Neq, length, bound);
            return IfStmt::new(cond, vec![err]);
        }

        let (lo, hi) = (&rule.args[0], &rule.args[1]);
        let cond = if !lo.is_empty() && hi.is_empty() {
            let bound = self.arg_value_expr(rule, lo, Target::IntLen, false);
            Expr::binary(BinaryOp::Lss, length, bound)
        } else if lo.is_empty() && !hi.is_empty() {
            let bound = self.arg_value_expr(rule, hi, Target::IntLen, false);
            Expr::binary(BinaryOp::Gtr, length, bound)
        } else {
            let lo = self.arg_value_expr(rule, lo, Target::IntLen, false);
            let hi = self.arg_value_expr(rule, hi, Target::IntLen, false);
            Expr::paren(Expr::binary(
                BinaryOp::LOr,
                Expr::binary(BinaryOp::Lss, length.clone(), lo),
                Expr::binary(BinaryOp::Gtr, length, hi),
            ))
        };
        IfStmt::new(cond, vec![err])
    }

    // rng always uses the two-bound range form.
    fn rng_if(&mut self, code: &VarCode<'a>, rule: &'a Rule) -> IfStmt {
        let target = Target::Ty(self.table.ptr_base(code.field.type_id));
        let lo = self.arg_value_expr(rule, &rule.args[0], target, false);
        let hi = self.arg_value_expr(rule, &rule.args[1], target, false);
        let cond = Expr::paren(Expr::binary(
            BinaryOp::LOr,
            Expr::binary(BinaryOp::Lss, code.vexpr.clone(), lo),
            Expr::binary(BinaryOp::Gtr, code.vexpr.clone(), hi),
        ));
        let err = self.error_stmt(code, rule);
        IfStmt::new(cond, vec![err])
    }

    fn func_if(&mut self, code: &VarCode<'a>, rule: &'a Rule, spec: &FuncRule) -> IfStmt {
        let pkg = self.file.add_import(&spec.func.pkg_path);
        let func = Expr::Qualified {
            pkg,
            name: spec.func.name.clone(),
        };

        let mut args = vec![code.vexpr.clone()];
        let kinds = spec.params_for_args(rule.args.len());
        for (arg, kind) in rule.args.iter().zip(kinds) {
            args.push(self.arg_value_expr(rule, arg, Target::Param(kind), spec.use_raw_string));
            if rule.name == "re" {
                self.register_regex(&arg.value);
            }
        }

        let err = self.error_stmt(code, rule);
        IfStmt::new(Expr::not(Expr::call(func, args)), vec![err])
    }

    // Chained form: one call per argument, joined by the connective mode.
    fn func_chain_if(&mut self, code: &VarCode<'a>, rule: &'a Rule, spec: &FuncRule) -> IfStmt {
        let pkg = self.file.add_import(&spec.func.pkg_path);
        let kinds = spec.params_for_args(rule.args.len());

        let mut cond: Option<Expr> = None;
        for (arg, kind) in rule.args.iter().zip(kinds) {
            let func = Expr::Qualified {
                pkg: pkg.clone(),
                name: spec.func.name.clone(),
            };
            let value = self.arg_value_expr(rule, arg, Target::Param(kind), spec.use_raw_string);
            let call = Expr::call(func, vec![code.vexpr.clone(), value]);

            let (term, join) = match spec.conn {
                BoolConn::Not => (call, BinaryOp::LOr),
                BoolConn::And => (Expr::not(call), BinaryOp::LOr),
                BoolConn::Or => (Expr::not(call), BinaryOp::LAnd),
                BoolConn::None => unreachable!("chain lowering requires a connective"),
            };
            cond = Some(match cond {
                Some(prev) => Expr::binary(join, prev, term),
                None => term,
            });
        }

        let err = self.error_stmt(code, rule);
        IfStmt::new(cond.expect("chained rule with no arguments"), vec![err])
    }

    // Every regex pattern is registered in the file's init block exactly once.
    fn register_regex(&mut self, pattern: &str) {
        if !self.file.registered_patterns.insert(pattern.to_string()) {
            return;
        }
        let pkg = self.file.add_import(PREDICATE_PKG);
        let call = Expr::call(
            Expr::Qualified {
                pkg,
                name: "RegisterRegexp".into(),
            },
            vec![Expr::RawStr(pattern.to_string())],
        );
        self.file.init.push(Stmt::Expr(call));
    }

    // ------------------------------------------------------------------------
    // argument expressions
    // ------------------------------------------------------------------------

    fn arg_value_expr(&mut self, rule: &Rule, arg: &RuleArg, target: Target, raw: bool) -> Expr {
        if arg.typ == ArgType::FieldRef {
            return self.arg_field_expr(rule, arg, target);
        }
        self.arg_const_expr(arg, target, raw)
    }

    fn arg_field_expr(&mut self, _rule: &Rule, arg: &RuleArg, target: Target) -> Expr {
        let selector = &self.an.selectors[&arg.value];
        let mut x = self.recv.clone();
        for step in selector {
            x = Expr::selector(x, step.name.clone());
        }
        let leaf = selector.last().expect("selector chains are non-empty");

        let conv: Option<String> = match target {
            Target::Ty(id) => {
                if self.table.equal(id, leaf.type_id) || self.table.is_empty_interface(id) {
                    None
                } else {
                    Some(self.table.display(id))
                }
            }
            Target::Param(kind) => {
                let t = self.table.get(self.table.ptr_base(leaf.type_id));
                match kind {
                    ParamKind::Any => None,
                    ParamKind::String if t.kind == TypeKind::String && !t.is_named() => None,
                    ParamKind::String => Some("string".into()),
                    ParamKind::Int if t.kind == TypeKind::Int && !t.is_named() => None,
                    ParamKind::Int => Some("int".into()),
                    ParamKind::Float if t.kind == TypeKind::Float64 && !t.is_named() => None,
                    ParamKind::Float => Some("float64".into()),
                    ParamKind::Bool if t.kind == TypeKind::Bool && !t.is_named() => None,
                    ParamKind::Bool => Some("bool".into()),
                }
            }
            Target::IntLen => {
                let t = self.table.get(self.table.ptr_base(leaf.type_id));
                if t.kind == TypeKind::Int && !t.is_named() {
                    None
                } else {
                    Some("int".into())
                }
            }
        };

        match conv {
            Some(typ) => Expr::Conv {
                typ,
                x: Box::new(x),
            },
            None => x,
        }
    }

    fn arg_const_expr(&self, arg: &RuleArg, target: Target, raw: bool) -> Expr {
        let string_lit = |value: &str| {
            if raw {
                Expr::RawStr(value.to_string())
            } else {
                Expr::Str(value.to_string())
            }
        };

        match target {
            Target::IntLen => match arg.typ {
                ArgType::Unknown => Expr::Lit("0".into()),
                _ => Expr::Lit(arg.value.clone()),
            },
            Target::Param(kind) => match (arg.typ, kind) {
                (ArgType::String, _) | (_, ParamKind::String) => string_lit(&arg.value),
                (ArgType::Unknown, ParamKind::Int | ParamKind::Float) => Expr::Lit("0".into()),
                (ArgType::Unknown, ParamKind::Bool) => Expr::Lit("false".into()),
                (ArgType::Unknown, ParamKind::Any) => Expr::Str(String::new()),
                _ => Expr::Lit(arg.value.clone()),
            },
            Target::Ty(id) => {
                let t = self.table.get(id);
                if t.is_empty_interface {
                    return match arg.typ {
                        ArgType::String => string_lit(&arg.value),
                        ArgType::Unknown => Expr::Str(String::new()),
                        _ => Expr::Lit(arg.value.clone()),
                    };
                }
                if t.kind == TypeKind::String {
                    return string_lit(&arg.value);
                }
                match arg.typ {
                    ArgType::Unknown => match t.kind {
                        k if k.is_integer() => Expr::Lit("0".into()),
                        k if k.is_float() => Expr::Lit("0.0".into()),
                        TypeKind::Bool => Expr::Lit("false".into()),
                        _ => Expr::nil(),
                    },
                    ArgType::String => string_lit(&arg.value),
                    _ => Expr::Lit(arg.value.clone()),
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // error construction
    // ------------------------------------------------------------------------

    fn error_stmt(&mut self, code: &VarCode<'a>, rule: &'a Rule) -> Stmt {
        if let Some(eh) = &self.an.validator.error_handler {
            let mut args = vec![
                Expr::Str(code.field.key.clone()),
                code.vexpr.clone(),
                Expr::Str(rule.name.clone()),
            ];
            for arg in &rule.args {
                args.push(match arg.typ {
                    ArgType::FieldRef => self.ref_selector_expr(&arg.value),
                    ArgType::String => Expr::Str(arg.value.clone()),
                    ArgType::Unknown => Expr::Str(String::new()),
                    _ => Expr::Lit(arg.value.clone()),
                });
            }

            let target = Expr::selector(
                Expr::selector(self.recv.clone(), eh.name.clone()),
                "Error",
            );
            let call = Expr::call(target, args);
            return if eh.is_aggregator {
                Stmt::Expr(call)
            } else {
                Stmt::Return(call)
            };
        }

        Stmt::Return(self.error_expr(code, rule))
    }

    fn ref_selector_expr(&self, key: &str) -> Expr {
        let selector = &self.an.selectors[key];
        let mut x = self.recv.clone();
        for step in selector {
            x = Expr::selector(x, step.name.clone());
        }
        x
    }

    fn error_expr(&mut self, code: &VarCode<'a>, rule: &'a Rule) -> Expr {
        // enum, isvalid, and custom rules share a generic message
        let generic = match self.registry.find(&rule.name) {
            Some(RuleSpec::IsValid | RuleSpec::Enum) => true,
            Some(RuleSpec::Func(f)) => f.is_custom,
            _ => false,
        };
        if generic {
            let text = format!("{} is not valid", code.field.key);
            return self.errors_new(text);
        }

        let mut altform = 0;
        if rule.name == "len" && rule.args.len() == 2 {
            altform = match (rule.args[0].is_empty(), rule.args[1].is_empty()) {
                (false, true) => 1,
                (true, false) => 2,
                _ => 3,
            };
        }
        let conf = phrase(&rule.name, altform);

        let base_kind = self
            .table
            .get(self.table.ptr_base(code.field.type_id))
            .kind;
        let mut text = format!("{} {}", code.field.key, conf.text);
        let mut refs = Vec::new();

        if !conf.omit_args {
            let mut parts = Vec::new();
            for arg in &rule.args {
                // a numeric field renders an empty bound as zero
                let patched;
                let arg = if arg.typ == ArgType::Unknown && base_kind.is_numeric() {
                    patched = RuleArg::new(ArgType::Int, "0");
                    &patched
                } else {
                    arg
                };
                if arg.value.is_empty() {
                    continue;
                }

                if arg.typ == ArgType::FieldRef {
                    refs.push(self.ref_selector_expr(&arg.value));
                    parts.push("%v".to_string());
                } else if arg.typ == ArgType::String {
                    parts.push(format!("{:?}", arg.value));
                } else {
                    parts.push(arg.value.clone());
                }
            }
            if !parts.is_empty() {
                text.push_str(": ");
                text.push_str(&parts.join(conf.arg_sep));
            }
        }
        if !conf.suffix.is_empty() {
            text.push(' ');
            text.push_str(conf.suffix);
        }

        if refs.is_empty() {
            self.errors_new(text)
        } else {
            self.file.import_fmt = true;
            let mut args = vec![Expr::Str(text)];
            args.extend(refs);
            Expr::call(
                Expr::Qualified {
                    pkg: "fmt".into(),
                    name: "Errorf".into(),
                },
                args,
            )
        }
    }

    fn errors_new(&mut self, text: String) -> Expr {
        self.file.import_errors = true;
        Expr::call(
            Expr::Qualified {
                pkg: "errors".into(),
                name: "New".into(),
            },
            vec![Expr::Str(text)],
        )
    }

    // ------------------------------------------------------------------------
    // assembly
    // ------------------------------------------------------------------------

    fn assemble_var_code(&self, code: &VarCode<'a>) -> Vec<Stmt> {
        // subfield block
        let mut stmts = Vec::new();
        for fc in &code.fields {
            stmts.extend(self.assemble_var_code(fc));
        }
        if !stmts.is_empty() {
            return self.assemble_sub_block(code, stmts);
        }

        // if-chain for the variable's own rules
        if let Some(ifs) = self.assemble_rule_chain(code) {
            return self.assemble_sub_block(code, vec![Stmt::If(ifs)]);
        }

        // for-range over key/elem
        if code.key.is_some() || code.elem.is_some() {
            if let Some(stmt) = self.assemble_key_elem(code) {
                if let Some(ng) = &code.ng {
                    return vec![Stmt::If(IfStmt::new(ng.clone(), vec![stmt]))];
                }
                return self.assemble_sub_block(code, vec![stmt]);
            }
        }

        Vec::new()
    }

    // Places the given statements under the sub-block's let-binding and
    // behind the guard: the else branch of a required/notnil check, or the
    // body of a plain nil-guard.
    fn assemble_sub_block(&self, code: &VarCode<'a>, stmts: Vec<Stmt>) -> Vec<Stmt> {
        if code.sb.is_empty() {
            return stmts;
        }

        let mut block = code.sb.clone();
        block.extend(stmts);

        if let Some(rq) = &code.rq_if {
            let mut ifs = rq.clone();
            ifs.else_branch = Some(Box::new(Stmt::Block(block)));
            return vec![Stmt::If(ifs)];
        }
        if let Some(nn) = &code.nn_if {
            let mut ifs = nn.clone();
            ifs.else_branch = Some(Box::new(Stmt::Block(block)));
            return vec![Stmt::If(ifs)];
        }
        if let Some(ng) = &code.ng {
            return vec![Stmt::If(IfStmt::new(ng.clone(), block))];
        }
        vec![Stmt::Block(block)]
    }

    // Chains the required/notnil check and the rule if-statements into one
    // if-else-if ladder.
    fn assemble_rule_chain(&self, code: &VarCode<'a>) -> Option<IfStmt> {
        let mut iflist = Vec::new();
        if let Some(rq) = &code.rq_if {
            iflist.push(rq.clone());
        } else if let Some(nn) = &code.nn_if {
            iflist.push(nn.clone());
        }
        iflist.extend(code.rule_ifs.iter().cloned());

        let mut root: Option<IfStmt> = None;
        for mut ifs in iflist.into_iter().rev() {
            if let Some(prev) = root {
                ifs.else_branch = Some(Box::new(Stmt::If(prev)));
            }
            root = Some(ifs);
        }
        let mut root = root?;

        // A lone rule under a plain nil-guard merges into one condition;
        // multiple rules go through a sub-block instead, since else-ifs
        // would escape the guard.
        if code.ng.is_some()
            && code.rq_if.is_none()
            && code.nn_if.is_none()
            && code.rule_ifs.len() == 1
        {
            // an ||-joined rule condition must not leak out of the guard
            let cond = match root.cond {
                c @ Expr::Binary {
                    op: BinaryOp::LOr, ..
                } => Expr::paren(c),
                c => c,
            };
            root.cond = Expr::binary(
                BinaryOp::LAnd,
                code.ng.clone().expect("guard checked above"),
                cond,
            );
        }

        Some(root)
    }

    fn assemble_key_elem(&self, code: &VarCode<'a>) -> Option<Stmt> {
        let (key_name, value_name) = match self.table.get(code.vtype).kind {
            TypeKind::Slice | TypeKind::Array => ("_", "e"),
            TypeKind::Map => ("k", "e"),
            kind => unreachable!("cannot range over {kind}"),
        };

        let mut body = Vec::new();
        if let Some(kc) = &code.key {
            body.extend(self.assemble_var_code(kc));
        }
        if let Some(ec) = &code.elem {
            body.extend(self.assemble_var_code(ec));
        }
        if body.is_empty() {
            return None;
        }

        Some(Stmt::ForRange {
            key: key_name.into(),
            value: value_name.into(),
            x: code.vexpr.clone(),
            body,
        })
    }
}

// ============================================================================
// OPERATOR & PHRASE TABLES
// ============================================================================

fn compare_op(op: CompareOp) -> BinaryOp {
    match op {
        CompareOp::Eql => BinaryOp::Eql,
        CompareOp::Neq => BinaryOp::Neq,
        CompareOp::Lss => BinaryOp::Lss,
        CompareOp::Gtr => BinaryOp::Gtr,
        CompareOp::Leq => BinaryOp::Leq,
        CompareOp::Geq => BinaryOp::Geq,
    }
}

fn join_op(op: JoinOp) -> BinaryOp {
    match op {
        JoinOp::And => BinaryOp::LAnd,
        JoinOp::Or => BinaryOp::LOr,
    }
}

struct Phrase {
    text: String,
    suffix: &'static str,
    arg_sep: &'static str,
    omit_args: bool,
}

fn p(text: &str) -> Phrase {
    Phrase {
        text: text.to_string(),
        suffix: "",
        arg_sep: " ",
        omit_args: false,
    }
}

fn p_sep(text: &str, arg_sep: &'static str) -> Phrase {
    Phrase {
        arg_sep,
        ..p(text)
    }
}

fn p_omit(text: &str) -> Phrase {
    Phrase {
        omit_args: true,
        ..p(text)
    }
}

// Default error phrases; the exact text is a stable contract.
fn phrase(rule: &str, altform: usize) -> Phrase {
    match (rule, altform) {
        ("required", _) => p("is required"),
        ("notnil", _) => p("cannot be nil"),
        ("email", _) => p("must be a valid email"),
        ("url", _) => p("must be a valid URL"),
        ("uri", _) => p("must be a valid URI"),
        ("pan", _) => p("must be a valid PAN"),
        ("cvv", _) => p("must be a valid CVV"),
        ("ssn", _) => p("must be a valid SSN"),
        ("ein", _) => p("must be a valid EIN"),
        ("numeric", _) => p("string content must match a numeric value"),
        ("hex", _) => p("must be a valid hexadecimal string"),
        ("hexcolor", _) => p("must be a valid hex color code"),
        ("alnum", _) => p("must be an alphanumeric string"),
        ("cidr", _) => p("must be a valid CIDR"),
        ("phone", _) => p_omit("must be a valid phone number"),
        ("zip", _) => p_omit("must be a valid zip code"),
        ("uuid", _) => p_omit("must be a valid UUID"),
        ("ip", _) => p_omit("must be a valid IP"),
        ("mac", _) => p_omit("must be a valid MAC"),
        ("iso", _) => p("must be a valid ISO"),
        ("rfc", _) => p("must be a valid RFC"),
        ("re", _) => p("must match the regular expression"),
        ("prefix", _) => p_sep("must be prefixed with", " or "),
        ("suffix", _) => p_sep("must be suffixed with", " or "),
        ("contains", _) => p_sep("must contain substring", " or "),
        ("eq", _) => p_sep("must be equal to", " or "),
        ("ne", _) => p_sep("must not be equal to", " or "),
        ("gt", _) => p("must be greater than"),
        ("lt", _) => p("must be less than"),
        ("gte", _) | ("min", _) => p("must be greater than or equal to"),
        ("lte", _) | ("max", _) => p("must be less than or equal to"),
        ("rng", _) => p_sep("must be between", " and "),
        ("len", 1) => p("must be of length at least"),
        ("len", 2) => p("must be of length at most"),
        ("len", 3) => Phrase {
            suffix: "(inclusive)",
            ..p_sep("must be of length between", " and ")
        },
        ("len", _) => p("must be of length"),
        (other, _) => p(&format!("must be a valid {}", other.to_uppercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_match_the_stable_contract() {
        assert_eq!(phrase("required", 0).text, "is required");
        assert_eq!(phrase("len", 3).suffix, "(inclusive)");
        assert_eq!(phrase("ne", 0).arg_sep, " or ");
        assert_eq!(phrase("fqdn", 0).text, "must be a valid FQDN");
        assert!(phrase("uuid", 0).omit_args);
    }

    #[test]
    fn namesake_imports_get_numbered_names() {
        let mut state = FileState::default();
        assert_eq!(state.add_import("example.com/a/check"), "check");
        assert_eq!(state.add_import("example.com/a/check"), "check");
        assert_eq!(state.add_import("example.com/b/check"), "check1");
        assert_eq!(state.add_import("example.com/c/check"), "check2");
        let specs = state.finish_imports();
        assert_eq!(specs.len(), 3);
        assert!(specs[1].local);
    }

    #[test]
    fn import_groups_put_support_package_last() {
        let mut state = FileState::default();
        state.add_import(PREDICATE_PKG);
        state.add_import("strings");
        state.import_errors = true;
        let specs = state.finish_imports();
        let paths: Vec<&str> = specs.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["errors", "strings", PREDICATE_PKG]);
    }
}
