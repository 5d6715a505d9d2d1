//! Lexically nested variable environments.
//!
//! A scope maps identifiers to values with a constancy mark and an optional
//! parent link. Rites capture the scope they were defined in; bifurcated
//! branches share their enclosing scope.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::value::Value;

/// Shared handle to a scope. Scopes outlive their dynamic extent whenever a
/// rite captured them, so they are reference-counted.
pub type ScopeRef = Rc<RefCell<Scope>>;

/// Outcome of a failed assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    /// No binding with that name anywhere in the chain.
    Undefined,
    /// The nearest binding is marked constant.
    Constant,
}

/// One level of the environment chain.
#[derive(Debug, Default)]
pub struct Scope {
    variables: HashMap<String, Value>,
    constants: HashSet<String>,
    parent: Option<ScopeRef>,
}

impl Scope {
    /// Create a root scope.
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    /// Create a scope nested under `parent`.
    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            variables: HashMap::new(),
            constants: HashSet::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    /// Declare a binding in this scope. Re-declaration overwrites without a
    /// constancy check.
    pub fn define(&mut self, name: impl Into<String>, value: Value, constant: bool) {
        let name = name.into();
        if constant {
            self.constants.insert(name.clone());
        } else {
            self.constants.remove(&name);
        }
        self.variables.insert(name, value);
    }

    /// Look up a binding, walking the parent chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.borrow().get(name))
    }

    /// Mutate the nearest enclosing binding.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), AssignError> {
        if self.variables.contains_key(name) {
            if self.constants.contains(name) {
                return Err(AssignError::Constant);
            }
            self.variables.insert(name.to_string(), value);
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => Err(AssignError::Undefined),
        }
    }

    /// Whether a binding exists anywhere in the chain.
    pub fn has(&self, name: &str) -> bool {
        self.variables.contains_key(name)
            || self.parent.as_ref().is_some_and(|p| p.borrow().has(name))
    }

    /// Snapshot of this scope's own bindings, used for module exports.
    pub fn local_bindings(&self) -> Vec<(String, Value)> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
