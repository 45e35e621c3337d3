//! Snapshot cache for the geo tree.
//!
//! Replaces the singleton TTL cache the platform grew over time. Readers get
//! lock-free consistent snapshots; writers rebuild and swap, so invalidation
//! is synchronous with the write — there is no window where a committed zone
//! or ward is invisible to `zones_under`/`wards_under`.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::info;

use cleancare_common::CleanCareError;

use crate::geo::GeoTree;

pub struct GeoCache {
    inner: ArcSwap<GeoTree>,
    write_lock: Mutex<()>,
}

impl GeoCache {
    pub fn new(initial: GeoTree) -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(initial)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn empty() -> Self {
        Self::new(GeoTree::new())
    }

    /// Current snapshot. Owned `Arc`, so the view stays consistent even if a
    /// write swaps in new data mid-read.
    pub fn snapshot(&self) -> Arc<GeoTree> {
        self.inner.load_full()
    }

    /// Apply a mutation to a copy of the tree and swap it in. Serialized with
    /// other writes; the swap happens before this returns, so a caller that
    /// sees `Ok` knows every subsequent snapshot includes the change.
    ///
    /// A failed mutation leaves the published tree untouched.
    pub fn mutate<T>(
        &self,
        f: impl FnOnce(&mut GeoTree) -> Result<T, CleanCareError>,
    ) -> Result<T, CleanCareError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut tree = (**self.inner.load()).clone();
        let out = f(&mut tree)?;
        self.inner.store(Arc::new(tree));
        Ok(out)
    }

    /// Replace the whole tree (startup load from persistence).
    pub fn replace(&self, tree: GeoTree) {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.inner.store(Arc::new(tree));
        info!("Geo tree snapshot replaced");
    }
}

impl Default for GeoCache {
    fn default() -> Self {
        Self::empty()
    }
}
