use crate::executor::{ExecutorId, YieldPolicy};
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

/// Shared flag through which the registry tells an executor it has been
/// killed. The first reason recorded wins.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    reason: Arc<OnceLock<String>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kill(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    pub fn is_killed(&self) -> bool {
        self.reason.get().is_some()
    }
}

#[derive(Debug)]
struct RegistryEntry {
    kill: KillSwitch,
    yield_policy: YieldPolicy,
}

/// Executors currently reading from a collection.
///
/// Lives inside the collection's catalog entry, so every access goes through
/// a [`CollectionLock`](super::CollectionLock).
#[derive(Debug, Default)]
pub struct CursorRegistry {
    entries: HashMap<ExecutorId, RegistryEntry>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and hands back the switch the registry will flip if the
    /// collection goes away underneath it.
    pub fn register(&mut self, id: ExecutorId, yield_policy: YieldPolicy) -> KillSwitch {
        let kill = KillSwitch::new();
        self.entries.insert(
            id,
            RegistryEntry {
                kill: kill.clone(),
                yield_policy,
            },
        );
        kill
    }

    /// Returns whether `id` was registered.
    pub fn deregister(&mut self, id: &ExecutorId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Policy `id` was registered with, or `None` if it is not registered.
    pub fn yield_policy(&self, id: &ExecutorId) -> Option<YieldPolicy> {
        self.entries.get(id).map(|e| e.yield_policy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kills every registered executor. Entries stay registered until each
    /// executor is disposed.
    pub fn kill_all(&mut self, reason: &str) -> usize {
        for entry in self.entries.values() {
            entry.kill.kill(reason);
        }
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let mut registry = CursorRegistry::new();
        let id = ExecutorId::new();

        registry.register(id, YieldPolicy::YieldAuto);
        assert_eq!(registry.yield_policy(&id), Some(YieldPolicy::YieldAuto));

        assert!(registry.deregister(&id));
        assert!(!registry.deregister(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_kill_all_flips_switches_once() {
        let mut registry = CursorRegistry::new();
        let a = registry.register(ExecutorId::new(), YieldPolicy::YieldAuto);
        let b = registry.register(ExecutorId::new(), YieldPolicy::NoYield);

        assert_eq!(registry.kill_all("collection dropped"), 2);
        a.kill("second reason");

        assert_eq!(a.reason(), Some("collection dropped"));
        assert!(b.is_killed());
        assert_eq!(registry.len(), 2);
    }
}
