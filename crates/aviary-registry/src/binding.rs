//! Wiring between the registries and the device tree
//!
//! Two bindings keep the core consistent with the outside world:
//! [`TreeBinding`] mirrors the vehicle registry into the tree (one vehicle
//! subtree under the root per connected vehicle), and
//! [`SubscriptionBinding`] purges all subscriptions of a client when it is
//! removed from the client registry.
//!
//! Each binding is a two-state machine, unbound or bound to exactly one
//! registry. Rebinding to the same registry instance is a no-op; binding a
//! different registry detaches the old listeners first.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use aviary_model::{ClientId, SharedDeviceTree, SubscriptionManager, TreeNode};

use crate::registry::{RegistryItem, SharedRegistry};
use crate::signal::ListenerId;

/// The contract a vehicle object must fulfil to be mirrored into the tree.
///
/// The registry owns the vehicle object itself; the tree only ever owns the
/// nodes built to represent it.
pub trait Vehicle: RegistryItem {
    /// The pre-built subtree (device and channel nodes) to attach under the
    /// tree root when this vehicle connects, keyed by its registry ID.
    fn device_subtree(&self) -> TreeNode;
}

struct BoundVehicles<V: RegistryItem> {
    registry: SharedRegistry<V>,
    added: ListenerId,
    removed: ListenerId,
}

/// Keeps the tree's set of vehicle subtrees in lockstep with a vehicle
/// registry.
pub struct TreeBinding<V: Vehicle + 'static> {
    tree: SharedDeviceTree,
    bound: Option<BoundVehicles<V>>,
}

impl<V: Vehicle + 'static> TreeBinding<V> {
    /// Creates an unbound binding for the given tree.
    pub fn new(tree: SharedDeviceTree) -> Self {
        Self { tree, bound: None }
    }

    /// The tree this binding mutates.
    pub fn tree(&self) -> &SharedDeviceTree {
        &self.tree
    }

    /// Whether the binding is currently attached to a registry.
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Starts observing the given vehicle registry, unbinding any
    /// previously observed one first.
    pub fn bind(&mut self, registry: &SharedRegistry<V>) {
        if let Some(bound) = &self.bound {
            if Arc::ptr_eq(&bound.registry, registry) {
                return;
            }
        }
        self.unbind();

        let mut reg = registry.lock();
        let tree = Arc::clone(&self.tree);
        let added = reg
            .added
            .connect(move |vehicle: &V| attach_vehicle(&tree, vehicle));
        let tree = Arc::clone(&self.tree);
        let removed = reg
            .removed
            .connect(move |vehicle: &V| detach_vehicle(&tree, vehicle));
        drop(reg);

        debug!("vehicle registry bound to device tree");
        self.bound = Some(BoundVehicles {
            registry: Arc::clone(registry),
            added,
            removed,
        });
    }

    /// Stops observing the bound registry; a no-op when already unbound.
    pub fn unbind(&mut self) {
        if let Some(bound) = self.bound.take() {
            let mut reg = bound.registry.lock();
            reg.added.disconnect(bound.added);
            reg.removed.disconnect(bound.removed);
            debug!("vehicle registry unbound from device tree");
        }
    }
}

impl<V: Vehicle + 'static> Drop for TreeBinding<V> {
    fn drop(&mut self) {
        self.unbind();
    }
}

fn attach_vehicle<V: Vehicle>(tree: &SharedDeviceTree, vehicle: &V) {
    let id = vehicle.registry_id();
    let mut tree = tree.lock();
    match tree.root_mut().add_child(id, vehicle.device_subtree()) {
        Ok(_) => info!(vehicle = id, "vehicle subtree attached"),
        Err(err) => {
            // A duplicate ID here means the tree no longer mirrors the
            // registry. That is state corruption, not a recoverable error.
            error!(vehicle = id, %err, "device tree out of sync with vehicle registry");
            panic!("device tree out of sync with vehicle registry: {err}");
        }
    }
}

fn detach_vehicle<V: Vehicle>(tree: &SharedDeviceTree, vehicle: &V) {
    let id = vehicle.registry_id();
    let mut tree = tree.lock();
    // Subscriptions inside the detached subtree are left to go stale;
    // resolving their paths later fails with PathNotFound. Only client
    // removal purges subscriptions.
    match tree.root_mut().remove_child(id) {
        Ok(_) => info!(vehicle = id, "vehicle subtree detached"),
        Err(err) => warn!(vehicle = id, %err, "vehicle had no subtree to detach"),
    }
}

struct BoundClients<C: RegistryItem> {
    registry: SharedRegistry<C>,
    removed: ListenerId,
}

/// Purges a client's subscriptions from the whole tree when the client is
/// removed from a client registry.
///
/// Client addition has no structural effect, so only the `removed` signal
/// is observed; subscriptions are only ever established through explicit
/// subscribe calls.
pub struct SubscriptionBinding<C: RegistryItem + 'static> {
    manager: SubscriptionManager,
    bound: Option<BoundClients<C>>,
}

impl<C: RegistryItem + 'static> SubscriptionBinding<C> {
    /// Creates an unbound binding around the given subscription manager.
    pub fn new(manager: SubscriptionManager) -> Self {
        Self {
            manager,
            bound: None,
        }
    }

    /// The subscription manager this binding purges through.
    pub fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }

    /// Whether the binding is currently attached to a registry.
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Starts observing the given client registry, unbinding any previously
    /// observed one first.
    pub fn bind(&mut self, registry: &SharedRegistry<C>) {
        if let Some(bound) = &self.bound {
            if Arc::ptr_eq(&bound.registry, registry) {
                return;
            }
        }
        self.unbind();

        let manager = self.manager.clone();
        let removed = registry.lock().removed.connect(move |client: &C| {
            let client_id = ClientId::new(client.registry_id());
            info!(client = %client_id, "client disconnected, purging subscriptions");
            manager.purge_client(&client_id);
        });

        debug!("client registry bound to subscription manager");
        self.bound = Some(BoundClients {
            registry: Arc::clone(registry),
            removed,
        });
    }

    /// Stops observing the bound registry; a no-op when already unbound.
    pub fn unbind(&mut self) {
        if let Some(bound) = self.bound.take() {
            bound.registry.lock().removed.disconnect(bound.removed);
            debug!("client registry unbound from subscription manager");
        }
    }
}

impl<C: RegistryItem + 'static> Drop for SubscriptionBinding<C> {
    fn drop(&mut self) {
        self.unbind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aviary_model::{ChannelType, DeviceTree, TreePath};
    use crate::registry::Registry;

    #[derive(Debug, Clone)]
    struct TestVehicle {
        id: String,
        subtree: TreeNode,
    }

    impl TestVehicle {
        fn new(id: &str) -> Self {
            let mut subtree = TreeNode::vehicle();
            subtree
                .add_device("gps")
                .unwrap()
                .add_channel("lat", ChannelType::Number)
                .unwrap();
            Self {
                id: id.to_string(),
                subtree,
            }
        }

        fn bare(id: &str) -> Self {
            Self {
                id: id.to_string(),
                subtree: TreeNode::vehicle(),
            }
        }
    }

    impl PartialEq for TestVehicle {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl RegistryItem for TestVehicle {
        fn registry_id(&self) -> &str {
            &self.id
        }
    }

    impl Vehicle for TestVehicle {
        fn device_subtree(&self) -> TreeNode {
            self.subtree.clone()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestClient(String);

    impl RegistryItem for TestClient {
        fn registry_id(&self) -> &str {
            &self.0
        }
    }

    fn resolve_ok(tree: &SharedDeviceTree, raw: &str) -> bool {
        let path = TreePath::parse(raw).unwrap();
        tree.lock().resolve(&path).is_ok()
    }

    #[test]
    fn test_vehicle_lifecycle_is_mirrored() {
        let tree = DeviceTree::new_shared();
        let registry = Registry::<TestVehicle>::new_shared();
        let mut binding = TreeBinding::new(Arc::clone(&tree));
        binding.bind(&registry);

        registry.lock().add(TestVehicle::new("v1")).unwrap();
        assert!(resolve_ok(&tree, "/v1/gps/lat"));

        registry.lock().remove_by_id("v1");
        assert!(!resolve_ok(&tree, "/v1"));
    }

    #[test]
    fn test_vehicles_added_before_binding_are_not_mirrored() {
        let tree = DeviceTree::new_shared();
        let registry = Registry::<TestVehicle>::new_shared();
        registry.lock().add(TestVehicle::bare("early")).unwrap();

        let mut binding = TreeBinding::new(Arc::clone(&tree));
        binding.bind(&registry);
        assert!(!resolve_ok(&tree, "/early"));
    }

    #[test]
    #[should_panic(expected = "out of sync")]
    fn test_duplicate_vehicle_id_is_fatal() {
        let tree = DeviceTree::new_shared();
        let registry = Registry::<TestVehicle>::new_shared();
        let mut binding = TreeBinding::new(Arc::clone(&tree));
        binding.bind(&registry);

        // Seed the desync: the tree already has a node under the ID the
        // registry is about to announce.
        tree.lock()
            .root_mut()
            .add_child("v1", TreeNode::vehicle())
            .unwrap();
        registry.lock().add(TestVehicle::bare("v1")).unwrap();
    }

    #[test]
    fn test_rebinding_same_registry_is_a_noop() {
        let tree = DeviceTree::new_shared();
        let registry = Registry::<TestVehicle>::new_shared();
        let mut binding = TreeBinding::new(tree);

        binding.bind(&registry);
        binding.bind(&registry);
        let reg = registry.lock();
        assert_eq!(reg.added.listener_count(), 1);
        assert_eq!(reg.removed.listener_count(), 1);
    }

    #[test]
    fn test_binding_another_registry_unbinds_the_first() {
        let tree = DeviceTree::new_shared();
        let first = Registry::<TestVehicle>::new_shared();
        let second = Registry::<TestVehicle>::new_shared();
        let mut binding = TreeBinding::new(Arc::clone(&tree));

        binding.bind(&first);
        binding.bind(&second);
        assert_eq!(first.lock().added.listener_count(), 0);
        assert_eq!(second.lock().added.listener_count(), 1);

        // Events from the first registry no longer reach the tree.
        first.lock().add(TestVehicle::bare("v1")).unwrap();
        assert!(!resolve_ok(&tree, "/v1"));
    }

    #[test]
    fn test_unbind_detaches_listeners() {
        let tree = DeviceTree::new_shared();
        let registry = Registry::<TestVehicle>::new_shared();
        let mut binding = TreeBinding::new(tree);

        binding.bind(&registry);
        assert!(binding.is_bound());
        binding.unbind();
        binding.unbind(); // safe when already unbound
        assert!(!binding.is_bound());
        assert_eq!(registry.lock().added.listener_count(), 0);
    }

    #[test]
    fn test_dropping_the_binding_unbinds() {
        let registry = Registry::<TestVehicle>::new_shared();
        {
            let mut binding = TreeBinding::new(DeviceTree::new_shared());
            binding.bind(&registry);
            assert_eq!(registry.lock().added.listener_count(), 1);
        }
        assert_eq!(registry.lock().added.listener_count(), 0);
    }

    #[test]
    fn test_client_removal_purges_subscriptions() {
        let tree = DeviceTree::new_shared();
        tree.lock()
            .root_mut()
            .add_child("v1", TreeNode::vehicle())
            .unwrap();

        let manager = SubscriptionManager::new(Arc::clone(&tree));
        let clients = Registry::<TestClient>::new_shared();
        let mut binding = SubscriptionBinding::new(manager.clone());
        binding.bind(&clients);

        let gone = TestClient("gone".to_string());
        let stays = ClientId::new("stays");
        clients.lock().add(gone.clone()).unwrap();

        let path = TreePath::parse("/v1").unwrap();
        manager.subscribe(&ClientId::new("gone"), &path).unwrap();
        manager.subscribe(&ClientId::new("gone"), &path).unwrap();
        manager.subscribe(&stays, &path).unwrap();

        clients.lock().remove(&gone);

        assert!(manager
            .list_subscriptions(&ClientId::new("gone"), None)
            .unwrap()
            .is_empty());
        assert_eq!(manager.list_subscriptions(&stays, None).unwrap()["/v1"], 1);
    }
}
