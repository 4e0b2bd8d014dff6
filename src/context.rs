//! Caller-supplied evaluation environment: name bindings and user
//! functions.

use std::collections::HashMap;

use crate::error::EvalError;
use crate::value::Value;

/// Signature of a user-defined function.
pub type CelFunction = dyn Fn(&[Value]) -> Result<Value, EvalError>;

/// Default recursion limit for one evaluation.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Bindings and functions for one family of evaluations.
///
/// Bindings are ordered: iteration and error messages list names in
/// insertion order. User function names override built-ins of the same
/// name; context identifiers are never callable.
#[derive(Default)]
pub struct Context {
    bindings: Vec<(String, Value)>,
    functions: HashMap<String, Box<CelFunction>>,
    max_depth: usize,
}

impl Context {
    pub fn new() -> Self {
        Context {
            bindings: Vec::new(),
            functions: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Binds `name`, replacing any previous value at its original
    /// position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.bindings.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.bindings.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Registers a user function, shadowing a built-in of the same name.
    pub fn add_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    {
        self.functions.insert(name.into(), Box::new(function));
    }

    pub fn function(&self, name: &str) -> Option<&CelFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Overrides the evaluation recursion limit.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Context description used by unresolved-identifier errors:
    /// `{a, b}`, or a note that no bindings were supplied.
    pub(crate) fn describe_bindings(&self) -> String {
        if self.bindings.is_empty() {
            return "no context passed".to_string();
        }
        let names: Vec<&str> = self.bindings.iter().map(|(n, _)| n.as_str()).collect();
        format!("{{{}}}", names.join(", "))
    }
}
