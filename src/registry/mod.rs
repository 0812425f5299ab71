// src/registry/mod.rs

//! Concurrent name -> [`Script`] map.
//!
//! A single `RwLock` guards every operation, so a sweep that reads a
//! snapshot and then deletes can never drop an entry that was `put` in the
//! meantime: deletions from sweeps and self-deregistration go through
//! [`Registry::remove_if_same`], which re-checks identity under the write
//! lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use crate::errors::{Result, ScriptError};
use crate::script::Script;

type Entries = RwLock<HashMap<String, Script>>;

/// Shared handle to the set of live scripts. Cloning is cheap and every
/// clone sees the same entries.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<Entries>,
}

/// Non-owning registry handle held by scripts, so a registry that is
/// dropped while scripts still run is not kept alive by them.
#[derive(Clone, Default)]
pub(crate) struct WeakRegistry {
    entries: Weak<Entries>,
}

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.entries.upgrade().map(|entries| Registry { entries })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            entries: Arc::downgrade(&self.entries),
        }
    }

    /// Insert or replace the entry for `name`, returning the previous one.
    ///
    /// The previous script is not stopped here.
    pub fn put(&self, name: impl Into<String>, script: Script) -> Option<Script> {
        let name = name.into();
        let previous = self.entries.write().insert(name.clone(), script);
        if let Some(ref prev) = previous {
            debug!(script = %name, replaced_id = prev.id(), "registry entry replaced");
        }
        previous
    }

    /// Remove `name` if present. Removing an absent name is a no-op.
    pub fn delete(&self, name: &str) -> Option<Script> {
        self.entries.write().remove(name)
    }

    /// Remove `name` only if it still maps to this exact script instance.
    ///
    /// Returns true if something was removed.
    pub fn remove_if_same(&self, name: &str, script: &Script) -> bool {
        let mut entries = self.entries.write();
        match entries.get(name) {
            Some(current) if current.same_as(script) => {
                entries.remove(name);
                true
            }
            _ => false,
        }
    }

    pub fn fetch(&self, name: &str) -> Option<Script> {
        self.entries.read().get(name).cloned()
    }

    /// Like [`Registry::fetch`] but absence is an error.
    pub fn try_fetch(&self, name: &str) -> Result<Script> {
        self.fetch(name)
            .ok_or_else(|| ScriptError::NotFound(name.to_string()))
    }

    /// Point-in-time copy of all entries, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, Script> {
        self.entries
            .read()
            .iter()
            .map(|(name, script)| (name.clone(), script.clone()))
            .collect()
    }

    /// Visit a snapshot of the entries.
    ///
    /// The lock is not held while `f` runs, so `f` may freely call back into
    /// the registry (the third argument) to delete or insert.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Script, &Registry),
    {
        for (name, script) in self.snapshot() {
            f(&name, &script, self);
        }
    }

    /// True iff an entry exists for `name` and its thread is still running.
    pub fn is_running(&self, name: &str) -> bool {
        self.fetch(name).is_some_and(|script| script.is_alive())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
