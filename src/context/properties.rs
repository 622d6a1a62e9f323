//! Ambient context properties
//!
//! Key/value pairs carried by an execution context and inherited by its forks.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Value = Arc<dyn Any + Send + Sync>;

/// Immutable property map attached to an [`super::ExecutionContext`]
#[derive(Clone, Default)]
pub struct Properties {
    values: HashMap<&'static str, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, taking ownership of the value
    pub fn with<T: Any + Send + Sync>(self, key: &'static str, value: T) -> Self {
        self.with_shared(key, Arc::new(value))
    }

    /// Add a property from an already shared value
    pub fn with_shared<T: Any + Send + Sync>(mut self, key: &'static str, value: Arc<T>) -> Self {
        self.values.insert(key, value);
        self
    }

    /// Typed lookup. Returns `None` when the key is absent or holds another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of `self` with every key of `overlay` replacing or extending it
    pub fn merged(&self, overlay: &Properties) -> Properties {
        let mut values = self.values.clone();
        for (key, value) in &overlay.values {
            values.insert(key, value.clone());
        }
        Properties { values }
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Properties").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_lookup() {
        let props = Properties::new().with("answer", 42u32);
        assert_eq!(props.get::<u32>("answer").as_deref(), Some(&42));
        assert!(props.get::<String>("answer").is_none());
        assert!(props.get::<u32>("missing").is_none());
    }

    #[test]
    fn test_merge_overlays_keys() {
        let parent = Properties::new()
            .with("suite", "outer".to_string())
            .with("depth", 1u8);
        let child = parent.merged(&Properties::new().with("depth", 2u8));

        assert_eq!(child.len(), 2);
        assert_eq!(child.get::<String>("suite").as_deref().map(String::as_str), Some("outer"));
        assert_eq!(child.get::<u8>("depth").as_deref(), Some(&2));
        // the parent map is untouched
        assert_eq!(parent.get::<u8>("depth").as_deref(), Some(&1));
    }
}
