/// In-memory view of the current variable bindings.
use std::collections::BTreeMap;

/// Current name → value bindings.
///
/// These primitives never touch history. The executor records history around
/// `set`/`unset` itself, and undo/redo call them directly to replay.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    bindings: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from stored bindings. Later duplicates win.
    pub fn from_bindings<I>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// Binds `name` to `value`, replacing any existing binding.
    pub fn set(&mut self, name: &str, value: &str) {
        self.bindings.insert(name.to_string(), value.to_string());
    }

    /// Removes the binding for `name`, returning the value it held.
    pub fn unset(&mut self, name: &str) -> Option<String> {
        self.bindings.remove(name)
    }

    /// Number of bindings whose value equals `value` exactly.
    pub fn count_by_value(&self, value: &str) -> usize {
        self.bindings.values().filter(|v| v.as_str() == value).count()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates bindings ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
