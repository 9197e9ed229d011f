//! Collection handle model.

use std::sync::Arc;

/// Storage-side identity of a collection.
///
/// Cheap to clone; the registry hands the same handle to every caller of a
/// given name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionHandle {
    id: i64,
    name: Arc<str>,
}

impl CollectionHandle {
    pub fn new(id: i64, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Row id of the collection in the `collections` table.
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
