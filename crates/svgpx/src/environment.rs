//! Lexical scope chain (spec §4.3).
//!
//! Simplified from the teacher's slot-indexed `namespace.rs::Namespace` to a
//! name-keyed, parent-linked chain: `svgpx` has no bytecode compilation
//! stage to resolve slots ahead of time.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::{
    error::{CompileError, ErrorKind, Result},
    value::Value,
};

struct Scope {
    bindings: AHashMap<String, Value>,
    parent: Option<Environment>,
}

/// A scope handle; cheap to clone (`Rc` underneath), so closures can capture
/// it by value (spec §9 "Function closures").
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Scope>>);

impl Environment {
    pub fn root() -> Self {
        Self(Rc::new(RefCell::new(Scope { bindings: AHashMap::new(), parent: None })))
    }

    /// Pushes a fresh child scope (spec §4.3: blocks, function bodies,
    /// for-loop iterations, and apply blocks each get one).
    pub fn child(&self) -> Self {
        Self(Rc::new(RefCell::new(Scope { bindings: AHashMap::new(), parent: Some(self.clone()) })))
    }

    /// Declares `name` in *this* scope. Redeclaration in the same scope
    /// overwrites (spec §4.5 LetDeclaration).
    pub fn declare(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        if let Some(v) = scope.bindings.get(name) {
            return Some(v.clone());
        }
        scope.parent.as_ref().and_then(|p| p.lookup(name))
    }

    /// `assignNearest`: walks outward to the nearest scope that already
    /// declares `name` and overwrites it there.
    pub fn assign_nearest(&self, name: &str, value: Value) -> bool {
        let mut scope = self.0.borrow_mut();
        if let Some(slot) = scope.bindings.get_mut(name) {
            *slot = value;
            return true;
        }
        match &scope.parent {
            Some(parent) => {
                let parent = parent.clone();
                drop(scope);
                parent.assign_nearest(name, value)
            }
            None => false,
        }
    }
}

pub fn require_lookup(env: &Environment, name: &str, line: u32, column: u32) -> Result<Value> {
    env.lookup(name)
        .ok_or_else(|| CompileError::new(ErrorKind::UndefinedVariable, format!("undefined variable `{name}`"), crate::ast::Loc { line, column }))
}
