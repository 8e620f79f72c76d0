//! Observable registries of live objects
//!
//! A registry is an observable set mapping stable IDs to live objects,
//! emitting `added`/`removed` signals synchronously after each mutation.
//! The server keeps one registry for connected vehicles and one for
//! connected clients; the registries themselves know nothing about the
//! device tree.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::signal::Signal;

/// Errors raised by registry mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The ID is already registered for a different object.
    #[error("registry ID already taken: {0:?}")]
    IdTaken(String),
}

/// An object that can live in a registry: anything with a stable string ID.
///
/// Equality is used to distinguish re-adding the same object (a no-op)
/// from registering a different object under a taken ID (an error).
pub trait RegistryItem: PartialEq {
    /// The stable ID of this object within its registry.
    fn registry_id(&self) -> &str;
}

/// A registry shared with the bindings that observe it.
pub type SharedRegistry<T> = Arc<Mutex<Registry<T>>>;

/// An observable collection of live objects keyed by their IDs.
pub struct Registry<T: RegistryItem> {
    entries: HashMap<String, T>,
    /// Emitted after an object has been registered.
    pub added: Signal<T>,
    /// Emitted after an object has been deregistered.
    pub removed: Signal<T>,
}

impl<T: RegistryItem> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            added: Signal::new(),
            removed: Signal::new(),
        }
    }

    /// Creates an empty registry ready to be shared with bindings.
    pub fn new_shared() -> SharedRegistry<T> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Registers an object under its own ID and emits `added`.
    ///
    /// Re-adding an object that is already registered is a no-op and emits
    /// nothing; registering a different object under a taken ID fails.
    pub fn add(&mut self, item: T) -> Result<(), RegistryError> {
        let id = item.registry_id().to_string();
        match self.entries.entry(id.clone()) {
            Entry::Occupied(existing) => {
                if *existing.get() == item {
                    return Ok(());
                }
                return Err(RegistryError::IdTaken(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
        }
        debug!(id = %id, "object registered");
        if let Some(stored) = self.entries.get(&id) {
            self.added.emit(stored);
        }
        Ok(())
    }

    /// Deregisters the given object (by its ID) and emits `removed`.
    /// Returns the removed object, or `None` if it was not registered.
    pub fn remove(&mut self, item: &T) -> Option<T> {
        self.remove_by_id(item.registry_id())
    }

    /// Deregisters the object with the given ID and emits `removed`.
    /// Returns the removed object, or `None` if no such ID was registered.
    pub fn remove_by_id(&mut self, id: &str) -> Option<T> {
        let item = self.entries.remove(id)?;
        debug!(id = %id, "object deregistered");
        self.removed.emit(&item);
        Some(item)
    }

    /// The object registered under the given ID, if any.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    /// Whether an object is registered under the given ID.
    pub fn contains_id(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Iterates over the IDs of all registered objects.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The number of registered objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: RegistryItem> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
