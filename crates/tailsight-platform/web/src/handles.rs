use tailsight_core::collections::map::HashMap;
use tailsight_core::ElementId;

/// Maps [`ElementId`]s to platform objects.
///
/// Ids are never reused, so a handle that outlived its node resolves to
/// nothing instead of to a stranger.
pub struct HandleTable<T> {
    entries: HashMap<u64, T>,
    next_id: u64,
    /// First id this table hands out; lower ids belong to the caller.
    first_id: u64,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first_id: u64) -> Self {
        Self {
            entries: HashMap::default(),
            next_id: first_id,
            first_id,
        }
    }

    pub fn insert(&mut self, value: T) -> ElementId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, value);
        ElementId(id)
    }

    pub fn get(&self, id: ElementId) -> Option<&T> {
        self.entries.get(&id.0)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.entries.contains_key(&id.0)
    }

    pub fn remove(&mut self, id: ElementId) -> Option<T> {
        self.entries.remove(&id.0)
    }

    /// Drops every entry `keep` rejects and returns how many went.
    pub fn retain(&mut self, mut keep: impl FnMut(ElementId, &T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, value| keep(ElementId(*id), value));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of ids handed out so far, removed ones included.
    pub fn issued(&self) -> u64 {
        self.next_id - self.first_id
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_not_reused() {
        let mut table = HandleTable::new();
        let first = table.insert("a");
        table.remove(first);
        let second = table.insert("b");

        assert_ne!(first, second);
        assert_eq!(table.get(first), None);
        assert_eq!(table.get(second), Some(&"b"));
        assert_eq!(table.issued(), 2);
    }

    #[test]
    fn test_retain_reports_removed() {
        let mut table = HandleTable::starting_at(10);
        let kept = table.insert(true);
        table.insert(false);
        table.insert(false);

        assert_eq!(table.retain(|_, alive| *alive), 2);
        assert_eq!(table.len(), 1);
        assert!(table.contains(kept));
        assert_eq!(kept, ElementId(10));
    }
}
