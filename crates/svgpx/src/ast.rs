//! AST node definitions (spec §3, §4.2).
//!
//! Every node keeps a [`Span`] so the evaluator and parser can attach a
//! `(line, column)` to diagnostics, and so `log(...)` can recover the
//! original source text of an argument expression for its label.

/// A 1-based source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
}

/// A byte-offset range into the source text, plus the location of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub loc: Loc,
}

impl Span {
    pub fn new(start: u32, end: u32, loc: Loc) -> Self {
        Self { start, end, loc }
    }

    /// Slices the original source text this span came from.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start as usize..self.end as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    None,
    Rad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Str(String),
    Interp(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Number(f64, AngleUnit),
    Str(String),
    Template(Vec<TemplatePart>),
    Null,
    Ident(String),
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// A bare call, `name(args…)`. Resolved at eval time against the
    /// environment (user function) or the stdlib table (builtin).
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    MethodCall {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
    },
    Property {
        receiver: Box<Expr>,
        name: String,
    },
    Calc(Box<Expr>),
    /// `@{ … }` — captures a relative sub-program (spec §4.10).
    PathBlock(Vec<Stmt>),
    /// `${ … }` — an ordered list of kebab-case property / raw-text value
    /// pairs (spec §3 "Style block").
    StyleBlock(Vec<(String, String)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Path,
    Text,
}

#[derive(Debug, Clone)]
pub enum ForBinding {
    Single(String),
    ItemIndex(String, String),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Let {
        name: String,
        value: Expr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    /// A single path-command statement, e.g. `M x y` or `l 10 -5`.
    PathCommand {
        letter: char,
        args: Vec<Expr>,
    },
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    ForEach {
        binding: ForBinding,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_ifs: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    },
    FnDecl {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    LayerDefine {
        kind: LayerKind,
        name: Expr,
        style: Expr,
        is_default: bool,
    },
    LayerApply {
        name: Expr,
        body: Vec<Stmt>,
    },
    /// `text(x, y, …)`. The grammar allows a third positional `expression`
    /// (rotation) and a fourth `styleExpr`, but a bare 3-argument call is
    /// syntactically ambiguous between "rotation only" and "style only" —
    /// `extra` holds whatever trailing expressions were parsed and the
    /// evaluator resolves their role from the runtime value kind.
    Text {
        x: Expr,
        y: Expr,
        extra: Vec<Expr>,
        children: Vec<TextChild>,
    },
    /// An expression evaluated for its side effects (e.g. a bare function
    /// call that emits path commands) and then discarded.
    ExprStmt(Expr),
}

/// A node inside a `text(...)` block body (spec §4.2 `textChild`).
#[derive(Debug, Clone)]
pub enum TextChild {
    /// A template literal, contributing one `run` to the enclosing text
    /// element.
    Run(Expr),
    Tspan {
        dx: Option<Expr>,
        dy: Option<Expr>,
        rotation: Option<Expr>,
        text: Expr,
    },
    Let {
        name: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<TextChild>,
        else_ifs: Vec<(Expr, Vec<TextChild>)>,
        else_body: Option<Vec<TextChild>>,
    },
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<TextChild>,
    },
    ForEach {
        binding: ForBinding,
        iterable: Expr,
        body: Vec<TextChild>,
    },
}

pub type Program = Vec<Stmt>;
