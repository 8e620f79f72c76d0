//! The device tree: path resolution and whole-tree traversal

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::error::TreeError;
use crate::node::{DepthFirst, TreeNode};
use crate::path::TreePath;

/// A device tree shared between the subscription manager, the registry
/// bindings and the surrounding server, guarded by one coarse lock held
/// only for the duration of a single operation.
pub type SharedDeviceTree = Arc<Mutex<DeviceTree>>;

/// The live, hierarchical model of every connected vehicle: a single root
/// with one vehicle subtree per connected vehicle.
///
/// The tree is the sole authority for resolving [`TreePath`]s to nodes.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DeviceTree {
    root: TreeNode,
}

impl Default for DeviceTree {
    fn default() -> Self {
        Self {
            root: TreeNode::root(),
        }
    }
}

impl DeviceTree {
    /// Creates an empty device tree containing only the root node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty device tree ready to be shared.
    pub fn new_shared() -> SharedDeviceTree {
        Arc::new(Mutex::new(Self::new()))
    }

    /// The root node of the tree.
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Mutable access to the root node of the tree.
    pub fn root_mut(&mut self) -> &mut TreeNode {
        &mut self.root
    }

    /// Resolves the given path to the node it addresses.
    pub fn resolve(&self, path: &TreePath) -> Result<&TreeNode, TreeError> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node
                .child(segment)
                .ok_or_else(|| TreeError::PathNotFound(path.to_string()))?;
        }
        Ok(node)
    }

    /// Resolves the given path to a mutable reference to the node it
    /// addresses.
    pub fn resolve_mut(&mut self, path: &TreePath) -> Result<&mut TreeNode, TreeError> {
        let mut node = &mut self.root;
        for segment in path.segments() {
            node = node
                .child_mut(segment)
                .ok_or_else(|| TreeError::PathNotFound(path.to_string()))?;
        }
        Ok(node)
    }

    /// Iterates over every node in the tree in pre-order depth-first order,
    /// starting with the root (whose ID is `None`).
    pub fn traverse_dfs(&self) -> DepthFirst<'_> {
        self.root.traverse_dfs(None)
    }

    /// Snapshots the live channel values of the whole tree.
    pub fn collect_values(&self) -> serde_json::Value {
        self.root.collect_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ChannelType, NodeType};
    use serde_json::json;

    fn tree_with_vehicle() -> DeviceTree {
        let mut tree = DeviceTree::new();
        let vehicle = tree.root_mut().add_child("v1", TreeNode::vehicle()).unwrap();
        let gps = vehicle.add_device("gps").unwrap();
        gps.add_channel("lat", ChannelType::Number).unwrap();
        tree
    }

    #[test]
    fn test_resolve_root() {
        let tree = DeviceTree::new();
        let root = tree.resolve(&TreePath::root()).unwrap();
        assert_eq!(root.node_type(), NodeType::Root);
    }

    #[test]
    fn test_resolve_channel() {
        let tree = tree_with_vehicle();
        let path = TreePath::parse("/v1/gps/lat").unwrap();
        let node = tree.resolve(&path).unwrap();
        assert_eq!(node.node_type(), NodeType::Channel);
    }

    #[test]
    fn test_resolve_unknown_path_fails() {
        let tree = tree_with_vehicle();
        let path = TreePath::parse("/v1/imu").unwrap();
        let err = tree.resolve(&path).unwrap_err();
        assert_eq!(err, TreeError::PathNotFound("/v1/imu".to_string()));
    }

    #[test]
    fn test_resolve_after_vehicle_removal_fails() {
        let mut tree = tree_with_vehicle();
        tree.root_mut().remove_child("v1").unwrap();
        for raw in ["/v1", "/v1/gps", "/v1/gps/lat"] {
            let path = TreePath::parse(raw).unwrap();
            assert!(matches!(tree.resolve(&path), Err(TreeError::PathNotFound(_))));
        }
    }

    #[test]
    fn test_resolve_mut_writes_value() {
        let mut tree = tree_with_vehicle();
        let path = TreePath::parse("/v1/gps/lat").unwrap();
        tree.resolve_mut(&path)
            .unwrap()
            .set_value(json!(47.5))
            .unwrap();
        assert_eq!(tree.resolve(&path).unwrap().value(), Some(&json!(47.5)));
    }

    #[test]
    fn test_traverse_starts_at_root() {
        let tree = tree_with_vehicle();
        let mut walk = tree.traverse_dfs();
        let (id, node) = walk.next().unwrap();
        assert_eq!(id, None);
        assert_eq!(node.node_type(), NodeType::Root);
        assert_eq!(walk.count(), 3); // v1, gps, lat
    }

    #[test]
    fn test_collect_values_snapshot() {
        let tree = tree_with_vehicle();
        assert_eq!(
            tree.collect_values(),
            json!({"v1": {"gps": {"lat": null}}})
        );
    }
}
