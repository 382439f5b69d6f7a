//! Loop index handles.
//!
//! An [`Index`] names one loop dimension. It is a cheap-clone handle: the
//! range and derivation data live in [`crate::domain::IterationDomain`], so a
//! kernel can capture an index before later splits reshape the tree without
//! ever holding a dangling reference.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_INDEX_ID: AtomicUsize = AtomicUsize::new(0);

/// A named, opaque handle for one loop dimension.
///
/// Identity is the process-unique `id`; two indices with the same name are
/// still distinct dimensions. Equality, hashing, and ordering all go through
/// the id only.
///
/// # Example
///
/// ```
/// use tessel_ir::Index;
///
/// let i = Index::new("i");
/// let j = Index::new("i");
/// assert_ne!(i, j);
/// assert_eq!(i.name(), j.name());
/// ```
#[derive(Clone)]
pub struct Index {
    name: Arc<str>,
    id: usize,
}

impl Index {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self { name: Arc::from(name.as_ref()), id: NEXT_INDEX_ID.fetch_add(1, Ordering::Relaxed) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Index {}

impl PartialOrd for Index {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Index {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for Index {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}
