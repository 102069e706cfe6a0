//! Server-side table of objects handed out by reference.
//!
//! Entries hold a [`Weak`] handle, so the registry never keeps an object
//! alive. Ids are the lower-case hex address of the object, which makes
//! repeated returns of the same instance reuse one entry.
//!
//! A dead object's value is dropped right away, but its `Weak` still pins
//! the allocation until the entry goes. Lookups remove entries they find
//! dead, and [`RefRegistry::prune`] sweeps the whole table.

use crate::config::ProtocolConfig;
use crate::object::RemoteObject;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

/// Produces a reference url for a value that cannot be sent by copy.
pub trait MakeRef {
    fn make_ref(&self, obj: &Arc<dyn RemoteObject>) -> String;
}

impl<F> MakeRef for F
where
    F: Fn(&Arc<dyn RemoteObject>) -> String,
{
    fn make_ref(&self, obj: &Arc<dyn RemoteObject>) -> String {
        self(obj)
    }
}

/// Thread-safe id → weak object table shared by all requests.
#[derive(Default)]
pub struct RefRegistry {
    entries: Mutex<HashMap<String, Weak<dyn RemoteObject>>>,
}

impl RefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Weak<dyn RemoteObject>>> {
        // every mutation is a single map operation, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Id of an object: its address as lower-case hex.
    pub fn id_of(obj: &Arc<dyn RemoteObject>) -> String {
        format!("{:x}", Arc::as_ptr(obj) as *const () as usize)
    }

    /// Register `obj` and return its url, `/id/<id>/`.
    pub fn register(&self, obj: &Arc<dyn RemoteObject>) -> String {
        let id = Self::id_of(obj);
        self.entries().insert(id.clone(), Arc::downgrade(obj));
        debug!("Registered reference '{}' ({})", id, obj.type_name());
        format!("/{}/{}/", ProtocolConfig::REF_PREFIX, id)
    }

    /// Look up a live object by id (case-insensitive).
    ///
    /// Returns `None` if the id was never issued or its object has been dropped.
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn RemoteObject>> {
        let id = id.to_lowercase();
        let mut entries = self.entries();
        let obj = entries.get(&id)?.upgrade();
        if obj.is_none() {
            debug!("Reference '{}' has expired", id);
            entries.remove(&id);
        }
        obj
    }

    /// Drop every entry whose object is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Pruned {} expired references", removed);
        }
        removed
    }

    /// Number of entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl MakeRef for RefRegistry {
    fn make_ref(&self, obj: &Arc<dyn RemoteObject>) -> String {
        self.register(obj)
    }
}

impl std::fmt::Debug for RefRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefRegistry").field("entries", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ExposedObject;

    fn object(name: &str) -> Arc<dyn RemoteObject> {
        Arc::new(ExposedObject::new(name))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = RefRegistry::new();
        let obj = object("Stage");

        let url = registry.register(&obj);
        let id = RefRegistry::id_of(&obj);
        assert_eq!(url, format!("/id/{}/", id));

        let resolved = registry.resolve(&id).unwrap();
        assert!(Arc::ptr_eq(&resolved, &obj));
    }

    #[test]
    fn test_same_object_reuses_entry() {
        let registry = RefRegistry::new();
        let obj = object("Stage");

        let first = registry.register(&obj);
        let second = registry.register(&obj.clone());
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = RefRegistry::new();
        let obj = object("Stage");
        registry.register(&obj);

        let id = RefRegistry::id_of(&obj).to_uppercase();
        assert!(registry.resolve(&id).is_some());
    }

    #[test]
    fn test_registry_does_not_keep_objects_alive() {
        let registry = RefRegistry::new();
        let obj = object("Detector");
        let id = RefRegistry::id_of(&obj);
        registry.register(&obj);

        drop(obj);
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve(&id).is_none());
        // the lookup that found it dead removed it
        assert!(registry.is_empty());
    }

    #[test]
    fn test_prune_drops_only_dead_entries() {
        let registry = RefRegistry::new();
        let live = object("Stage");
        let dead = object("Detector");
        registry.register(&live);
        registry.register(&dead);

        drop(dead);
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve(&RefRegistry::id_of(&live)).is_some());
        assert_eq!(registry.prune(), 0);
    }

    #[test]
    fn test_unknown_id() {
        let registry = RefRegistry::new();
        assert!(registry.resolve("deadbeef").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_closure_make_ref() {
        let make_ref = |_: &Arc<dyn RemoteObject>| "/ref_url".to_string();
        assert_eq!(make_ref.make_ref(&object("X")), "/ref_url");
    }
}
