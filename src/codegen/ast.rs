//! The descriptor AST produced by the synthesizer.
//!
//! An immutable tree of statement and expression descriptors encoding the
//! validation logic of one generated file. The output writer pretty-prints
//! this tree into target-language text; `pretty()` here is a compact renderer
//! used for inspection and tests, not the writer itself.

use serde::{Deserialize, Serialize};

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eql,
    Neq,
    Lss,
    Gtr,
    Leq,
    Geq,
    LAnd,
    LOr,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eql => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lss => "<",
            BinaryOp::Gtr => ">",
            BinaryOp::Leq => "<=",
            BinaryOp::Geq => ">=",
            BinaryOp::LAnd => "&&",
            BinaryOp::LOr => "||",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A plain identifier; also used for `nil`, `true`, and other keywords.
    Ident(String),
    /// `pkg.Name`
    Qualified { pkg: String, name: String },
    /// `x.sel`
    Selector { x: Box<Expr>, sel: String },
    /// `*x`
    Deref(Box<Expr>),
    /// `(x)`
    Paren(Box<Expr>),
    /// `!x`
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        x: Box<Expr>,
        y: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `len(x)`
    Len(Box<Expr>),
    /// An explicit conversion, `T(x)`.
    Conv { typ: String, x: Box<Expr> },
    /// An unquoted literal value: integers, floats, booleans.
    Lit(String),
    /// A quoted string literal.
    Str(String),
    /// A raw (backquoted) string literal.
    RawStr(String),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn nil() -> Expr {
        Expr::Ident("nil".into())
    }

    pub fn selector(x: Expr, sel: impl Into<String>) -> Expr {
        Expr::Selector {
            x: Box::new(x),
            sel: sel.into(),
        }
    }

    pub fn deref(x: Expr) -> Expr {
        Expr::Deref(Box::new(x))
    }

    pub fn paren(x: Expr) -> Expr {
        Expr::Paren(Box::new(x))
    }

    pub fn not(x: Expr) -> Expr {
        Expr::Not(Box::new(x))
    }

    pub fn binary(op: BinaryOp, x: Expr, y: Expr) -> Expr {
        Expr::Binary {
            op,
            x: Box::new(x),
            y: Box::new(y),
        }
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            func: Box::new(func),
            args,
        }
    }

    pub fn len(x: Expr) -> Expr {
        Expr::Len(Box::new(x))
    }

    /// Compact single-line rendering.
    pub fn pretty(&self) -> String {
        match self {
            Expr::Ident(name) => name.clone(),
            Expr::Qualified { pkg, name } => format!("{pkg}.{name}"),
            Expr::Selector { x, sel } => format!("{}.{sel}", x.pretty()),
            Expr::Deref(x) => format!("*{}", x.pretty()),
            Expr::Paren(x) => format!("({})", x.pretty()),
            Expr::Not(x) => format!("!{}", x.pretty()),
            Expr::Binary { op, x, y } => {
                format!("{} {} {}", x.pretty(), op.as_str(), y.pretty())
            }
            Expr::Call { func, args } => {
                let args: Vec<String> = args.iter().map(Expr::pretty).collect();
                format!("{}({})", func.pretty(), args.join(", "))
            }
            Expr::Len(x) => format!("len({})", x.pretty()),
            Expr::Conv { typ, x } => format!("{typ}({})", x.pretty()),
            Expr::Lit(value) => value.clone(),
            Expr::Str(value) => format!("{value:?}"),
            Expr::RawStr(value) => format!("`{value}`"),
        }
    }
}

// ============================================================================
// STATEMENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    /// Optional init statement, `if init; cond { … }`.
    pub init: Option<Box<Stmt>>,
    pub cond: Expr,
    pub body: Vec<Stmt>,
    /// Either another `Stmt::If` (else-if) or a `Stmt::Block` (else).
    pub else_branch: Option<Box<Stmt>>,
}

impl IfStmt {
    pub fn new(cond: Expr, body: Vec<Stmt>) -> Self {
        Self {
            init: None,
            cond,
            body,
            else_branch: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    Return(Expr),
    If(IfStmt),
    Block(Vec<Stmt>),
    /// `for key, value := range x { … }`
    ForRange {
        key: String,
        value: String,
        x: Expr,
        body: Vec<Stmt>,
    },
    /// A short variable declaration, `name := value`.
    Let { name: String, value: Expr },
}

impl Stmt {
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, 0);
        out
    }

    fn render(&self, out: &mut String, depth: usize) {
        let pad = "\t".repeat(depth);
        match self {
            Stmt::Expr(x) => {
                out.push_str(&pad);
                out.push_str(&x.pretty());
                out.push('\n');
            }
            Stmt::Return(x) => {
                out.push_str(&pad);
                out.push_str("return ");
                out.push_str(&x.pretty());
                out.push('\n');
            }
            Stmt::If(ifs) => {
                out.push_str(&pad);
                ifs.render(out, depth);
            }
            Stmt::Block(stmts) => {
                out.push_str(&pad);
                out.push_str("{\n");
                for s in stmts {
                    s.render(out, depth + 1);
                }
                out.push_str(&pad);
                out.push_str("}\n");
            }
            Stmt::ForRange { key, value, x, body } => {
                out.push_str(&pad);
                out.push_str(&format!("for {key}, {value} := range {} {{\n", x.pretty()));
                for s in body {
                    s.render(out, depth + 1);
                }
                out.push_str(&pad);
                out.push_str("}\n");
            }
            Stmt::Let { name, value } => {
                out.push_str(&pad);
                out.push_str(&format!("{name} := {}\n", value.pretty()));
            }
        }
    }
}

impl IfStmt {
    // Renders "if … { … }" plus any else/else-if chain; the caller provides
    // leading indentation.
    fn render(&self, out: &mut String, depth: usize) {
        let pad = "\t".repeat(depth);
        out.push_str("if ");
        if let Some(init) = &self.init {
            let mut line = String::new();
            init.render(&mut line, 0);
            out.push_str(line.trim_end_matches('\n'));
            out.push_str("; ");
        }
        out.push_str(&self.cond.pretty());
        out.push_str(" {\n");
        for s in &self.body {
            s.render(out, depth + 1);
        }
        out.push_str(&pad);
        out.push('}');
        match self.else_branch.as_deref() {
            Some(Stmt::If(els)) => {
                out.push_str(" else ");
                els.render(out, depth);
            }
            Some(Stmt::Block(stmts)) => {
                out.push_str(" else {\n");
                for s in stmts {
                    s.render(out, depth + 1);
                }
                out.push_str(&pad);
                out.push_str("}\n");
            }
            Some(other) => {
                out.push_str(" else {\n");
                other.render(out, depth + 1);
                out.push_str(&pad);
                out.push_str("}\n");
            }
            None => out.push('\n'),
        }
    }
}

// ============================================================================
// DECLARATIONS
// ============================================================================

/// The generated `Validate() error` method of one validator struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub recv: String,
    pub recv_type: String,
    pub name: String,
    pub body: Vec<Stmt>,
}

impl MethodDecl {
    pub fn pretty(&self) -> String {
        let mut out = format!(
            "func ({} {}) {}() error {{\n",
            self.recv, self.recv_type, self.name
        );
        for s in &self.body {
            s.render(&mut out, 1);
        }
        out.push_str("}\n");
        out
    }
}

/// One import required by the generated file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSpec {
    pub path: String,
    /// Package name used to qualify identifiers.
    pub name: String,
    /// Whether the name must be spelled out in the import declaration
    /// because it differs from the path's last segment.
    pub local: bool,
}

/// The descriptor tree of one generated file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub pkg_name: String,
    pub imports: Vec<ImportSpec>,
    /// Statements of the file's init block; empty means no init is emitted.
    pub init: Vec<Stmt>,
    pub decls: Vec<MethodDecl>,
}

impl File {
    pub fn pretty(&self) -> String {
        let mut out = format!("package {}\n", self.pkg_name);
        for imp in &self.imports {
            if imp.local {
                out.push_str(&format!("import {} {:?}\n", imp.name, imp.path));
            } else {
                out.push_str(&format!("import {:?}\n", imp.path));
            }
        }
        if !self.init.is_empty() {
            out.push_str("func init() {\n");
            for s in &self.init {
                s.render(&mut out, 1);
            }
            out.push_str("}\n");
        }
        for decl in &self.decls {
            out.push_str(&decl.pretty());
        }
        out
    }
}
