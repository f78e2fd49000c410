use std::{any::Any, fmt};

use lru::LruCache;
use tracing::warn;

use super::{Object, Oid, UntypedOid};

/// Objects are immutable once written, so a plain LRU keyed by the untyped
/// OID is always coherent: there's no invalidation to worry about, only
/// eviction.
pub(super) struct Cache(LruCache<UntypedOid, Box<dyn Any>>);

impl Cache {
    const CAPACITY: usize = 5000;

    pub(super) fn new() -> Self {
        Self(LruCache::new(Self::CAPACITY))
    }

    pub(super) fn insert<O: Object + 'static>(&mut self, oid: Oid<O>, object: O) {
        self.0.put(oid.into_untyped(), Box::new(object));
    }

    pub(super) fn get<O>(&mut self, oid: &Oid<O>) -> Option<&O>
    where
        O: Object + 'static,
    {
        let object = self.0.get(oid.as_untyped())?.downcast_ref::<O>();
        if object.is_none() {
            warn!("Object stored in cache under different type than requested");
        }
        object
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.0.cap())
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}
