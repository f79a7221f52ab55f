//! Per-session counter name table

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use rocscope_shared::CounterId;

/// Maps counter ids handed out to clients back to counter names
#[derive(Debug, Default)]
pub struct CounterTable {
    names: Mutex<HashMap<CounterId, String>>,
}

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` under an id derived from its hash. Registering the same
    /// name twice yields the same id.
    pub fn add_counter_name(&self, name: &str) -> CounterId {
        let id = counter_id_of(name);
        self.add_counter_name_with_id(id, name);
        id
    }

    pub fn add_counter_name_with_id(&self, id: CounterId, name: &str) {
        self.names
            .lock()
            .unwrap()
            .insert(id, name.to_string());
    }

    pub fn counter_name(&self, id: CounterId) -> Option<String> {
        self.names.lock().unwrap().get(&id).cloned()
    }

    pub fn find_counter(&self, id: CounterId) -> bool {
        self.names.lock().unwrap().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn counter_id_of(name: &str) -> CounterId {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    CounterId(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_lookup() {
        let table = CounterTable::new();
        let id = table.add_counter_name("SQ_WAVES");
        assert_eq!(table.add_counter_name("SQ_WAVES"), id);
        assert_eq!(table.len(), 1);
        assert!(table.find_counter(id));
        assert_eq!(table.counter_name(id).as_deref(), Some("SQ_WAVES"));
    }

    #[test]
    fn test_explicit_id() {
        let table = CounterTable::new();
        table.add_counter_name_with_id(CounterId(42), "GRBM_COUNT");
        assert_eq!(table.counter_name(CounterId(42)).as_deref(), Some("GRBM_COUNT"));
        assert!(!table.find_counter(CounterId(43)));
    }
}
