//! Runtime value model (spec §3, §4.3).
//!
//! Grounded on the teacher's tagged `Value` enum, simplified from an
//! arena-backed `Heap` to plain `Rc<RefCell<_>>` handles (see DESIGN.md
//! "Simplifications recorded"): arrays never outlive a single `Compile`
//! call and cannot form cycles, so no GC bookkeeping is needed.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{AngleUnit, Stmt},
    environment::Environment,
    pathblock::PathBlockData,
};

pub type ArrayHandle = Rc<RefCell<Vec<Value>>>;
pub type StyleBlockHandle = Rc<IndexMap<String, String>>;
pub type PathBlockHandle = Rc<PathBlockData>;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    pub captured_env: Environment,
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction").field("name", &self.name).field("params", &self.params).finish()
    }
}

/// A `PathBlock` bound to an absolute origin (spec §3, §4.10).
#[derive(Debug, Clone)]
pub struct ProjectedPath {
    pub block: PathBlockHandle,
    pub origin: Point,
}

/// Handle to a named layer, exposed to user code as `layer(name)` (spec §4.6
/// Property on `LayerReference`).
#[derive(Debug, Clone)]
pub struct LayerReference {
    pub name: String,
}

#[derive(Clone)]
pub enum Value {
    Number(f64, AngleUnit),
    Str(Rc<str>),
    Null,
    Array(ArrayHandle),
    Point(Point),
    StyleBlock(StyleBlockHandle),
    PathBlock(PathBlockHandle),
    ProjectedPath(ProjectedPath),
    LayerReference(LayerReference),
    Function(Rc<UserFunction>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn number(v: f64) -> Self {
        Self::Number(v, AngleUnit::None)
    }

    /// Spec §9 "Open questions": truthiness is false only for `Null` and
    /// numeric `0.0`; everything else, including the empty string, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Number(v, _) => *v != 0.0,
            _ => true,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Number(..) => "Number",
            Self::Str(_) => "String",
            Self::Null => "Null",
            Self::Array(_) => "Array",
            Self::Point(_) => "Point",
            Self::StyleBlock(_) => "StyleBlock",
            Self::PathBlock(_) => "PathBlock",
            Self::ProjectedPath(_) => "ProjectedPath",
            Self::LayerReference(_) => "LayerReference",
            Self::Function(_) => "Function",
        }
    }

    /// Structural `==` per spec §4.6: numbers by value (ignoring unit),
    /// strings by content, `null == null` only, everything cross-kind is
    /// `false`.
    pub fn structural_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a, _), Self::Number(b, _)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Null, Self::Null) => true,
            _ => false,
        }
    }

    /// Display form used inside template-literal interpolation (spec §4.6
    /// TemplateLiteral).
    pub fn display_form(&self) -> String {
        match self {
            Self::Number(v, _) => crate::numeric::format_number(*v, None),
            Self::Str(s) => s.to_string(),
            Self::Null => "null".to_string(),
            Self::Point(p) => format!(
                "Point({}, {})",
                crate::numeric::format_number(p.x, None),
                crate::numeric::format_number(p.y, None)
            ),
            Self::Array(arr) => {
                let items: Vec<String> = arr.borrow().iter().map(Self::display_form).collect();
                format!("[{}]", items.join(", "))
            }
            Self::StyleBlock(_) => "[StyleBlock]".to_string(),
            Self::PathBlock(_) => "[PathBlock]".to_string(),
            Self::ProjectedPath(_) => "[ProjectedPath]".to_string(),
            Self::LayerReference(r) => format!("[Layer {}]", r.name),
            Self::Function(f) => format!("[Function {}]", f.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v, u) => write!(f, "Number({v}, {u:?})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Null => write!(f, "Null"),
            Self::Array(a) => write!(f, "Array({:?})", a.borrow()),
            Self::Point(p) => write!(f, "Point({}, {})", p.x, p.y),
            Self::StyleBlock(s) => write!(f, "StyleBlock({s:?})"),
            Self::PathBlock(_) => write!(f, "PathBlock(..)"),
            Self::ProjectedPath(p) => write!(f, "ProjectedPath(origin={:?})", p.origin),
            Self::LayerReference(r) => write!(f, "LayerReference({})", r.name),
            Self::Function(fun) => write!(f, "Function({})", fun.name),
        }
    }
}
