//! Aviary Registry - Observable registries of connected vehicles and clients
//!
//! This crate keeps the device tree in sync with the live sets of connected
//! vehicles and clients:
//! - A synchronous observer primitive (`Signal`) for add/remove notifications
//! - A generic observable registry mapping IDs to live objects
//! - Bindings that mirror registry changes into the device tree and purge
//!   the subscriptions of disconnected clients

pub mod binding;
pub mod registry;
pub mod signal;

pub use binding::{SubscriptionBinding, TreeBinding, Vehicle};
pub use registry::{Registry, RegistryError, RegistryItem, SharedRegistry};
pub use signal::{ListenerId, Signal};
