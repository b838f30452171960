//! Command parameters.
//!
//! Parameters are ordered and remain mutable until the command executes.
//! Cloning a parameter collection is a deep copy; clones never alias the
//! source's values.

use smallvec::SmallVec;

use crate::value::Value;

/// A single command parameter.
///
/// Parameters are positional by default; a name may be attached for
/// stored-procedure invocations that bind by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: Option<String>,
    value: Value,
}

impl Param {
    /// Create a positional parameter.
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    /// Create a named parameter.
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }

    /// Get the parameter name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the parameter value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replace the parameter value.
    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = value.into();
    }
}

/// An ordered collection of command parameters.
///
/// Most statements carry only a handful of parameters, so the collection
/// stores a few inline before spilling to the heap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    items: SmallVec<[Param; 4]>,
}

impl Params {
    /// Create an empty parameter collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn push(&mut self, param: Param) {
        self.items.push(param);
    }

    /// Append a positional parameter value.
    pub fn push_value(&mut self, value: impl Into<Value>) {
        self.items.push(Param::positional(value));
    }

    /// Get a parameter by position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Param> {
        self.items.get(index)
    }

    /// Get a parameter by name (case-insensitive).
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Param> {
        self.items
            .iter()
            .find(|p| p.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove all parameters.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate over the parameters in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.items.iter()
    }

    /// View the parameters as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Param] {
        &self.items
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
