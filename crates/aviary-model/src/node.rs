//! Tree nodes: the polymorphic units of the device tree
//!
//! A node is one of four variants: the tree root, a vehicle, a logical
//! device of a vehicle, or a channel leaf carrying one typed telemetry
//! value. All variants share child management, depth-first traversal and
//! per-client subscription counters.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TreeError;

/// Classification tag assigned to device nodes that do not declare one.
pub const DEFAULT_DEVICE_CLASS: &str = "miscellaneous";

/// Identity of a connected client, used as a subscription map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    /// Create a new ClientId from a stable identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identity of a node instance.
///
/// A fresh UID is assigned whenever a node is constructed, cloned or
/// deserialized, so a UID always refers to exactly one live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeUid(u64);

impl NodeUid {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// The variant of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Root,
    Vehicle,
    Device,
    Channel,
}

/// Declared type of the value a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Number,
    String,
    Boolean,
    Object,
}

impl ChannelType {
    /// Whether the given JSON value is compatible with this channel type.
    /// Null is always accepted; it marks a channel with no value yet.
    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (ChannelType::Number, Value::Number(_))
                | (ChannelType::String, Value::String(_))
                | (ChannelType::Boolean, Value::Bool(_))
                | (ChannelType::Object, Value::Object(_))
        )
    }
}

/// An operation a channel permits on its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOperation {
    Read,
    Write,
    Execute,
}

fn default_device_class() -> String {
    DEFAULT_DEVICE_CLASS.to_string()
}

fn default_operations() -> Vec<ChannelOperation> {
    vec![ChannelOperation::Read]
}

/// Per-variant data of a tree node. The variant is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum NodeKind {
    Root,
    Vehicle,
    Device {
        #[serde(rename = "deviceClass", default = "default_device_class")]
        class: String,
    },
    Channel {
        #[serde(rename = "subType")]
        subtype: ChannelType,
        #[serde(default = "default_operations")]
        operations: Vec<ChannelOperation>,
        #[serde(default)]
        value: Value,
    },
}

/// A single node in a device tree.
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(skip, default = "NodeUid::next")]
    uid: NodeUid,
    #[serde(flatten)]
    kind: NodeKind,
    /// Children keyed by ID, in insertion order. Always empty for channels.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    children: IndexMap<String, TreeNode>,
    /// Client -> subscription count; created lazily because most nodes
    /// never have any subscribers. A count of 0 is never stored.
    #[serde(skip)]
    subscribers: Option<HashMap<ClientId, u32>>,
}

impl Clone for TreeNode {
    fn clone(&self) -> Self {
        // A clone is a new node instance, so it gets its own UID.
        Self {
            uid: NodeUid::next(),
            kind: self.kind.clone(),
            children: self
                .children
                .iter()
                .map(|(id, child)| (id.clone(), child.clone()))
                .collect(),
            subscribers: self.subscribers.clone(),
        }
    }
}

impl TreeNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            uid: NodeUid::next(),
            kind,
            children: IndexMap::new(),
            subscribers: None,
        }
    }

    /// Creates the root node of a device tree.
    pub(crate) fn root() -> Self {
        Self::new(NodeKind::Root)
    }

    /// Creates a vehicle node. Vehicle nodes are attached under the tree
    /// root keyed by the vehicle's external ID.
    pub fn vehicle() -> Self {
        Self::new(NodeKind::Vehicle)
    }

    /// Creates a device node with the default classification tag.
    pub fn device() -> Self {
        Self::device_with_class(DEFAULT_DEVICE_CLASS)
    }

    /// Creates a device node with the given classification tag.
    pub fn device_with_class(class: impl Into<String>) -> Self {
        Self::new(NodeKind::Device { class: class.into() })
    }

    /// Creates a channel leaf permitting only reads.
    pub fn channel(subtype: ChannelType) -> Self {
        Self::channel_with_operations(subtype, default_operations())
    }

    /// Creates a channel leaf with an explicit set of permitted operations.
    pub fn channel_with_operations(
        subtype: ChannelType,
        operations: Vec<ChannelOperation>,
    ) -> Self {
        Self::new(NodeKind::Channel {
            subtype,
            operations,
            value: Value::Null,
        })
    }

    /// The process-unique identity of this node instance.
    pub fn uid(&self) -> NodeUid {
        self.uid
    }

    /// The variant of this node.
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Root => NodeType::Root,
            NodeKind::Vehicle => NodeType::Vehicle,
            NodeKind::Device { .. } => NodeType::Device,
            NodeKind::Channel { .. } => NodeType::Channel,
        }
    }

    /// Whether this node may have children. Channels are leaves.
    pub fn supports_children(&self) -> bool {
        !matches!(self.kind, NodeKind::Channel { .. })
    }

    /// The classification tag, for device nodes.
    pub fn device_class(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Device { class } => Some(class),
            _ => None,
        }
    }

    /// The declared value type, for channel nodes.
    pub fn channel_type(&self) -> Option<ChannelType> {
        match self.kind {
            NodeKind::Channel { subtype, .. } => Some(subtype),
            _ => None,
        }
    }

    /// The permitted operations, for channel nodes.
    pub fn operations(&self) -> Option<&[ChannelOperation]> {
        match &self.kind {
            NodeKind::Channel { operations, .. } => Some(operations),
            _ => None,
        }
    }

    /// The current value, for channel nodes.
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            NodeKind::Channel { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Stores a new value into a channel leaf.
    ///
    /// This is the write entry point used by transport adapters pushing
    /// telemetry. Checking the value against the declared channel type and
    /// the permitted operations is the caller's contract; see
    /// [`ChannelType::matches`].
    pub fn set_value(&mut self, value: Value) -> Result<(), TreeError> {
        match &mut self.kind {
            NodeKind::Channel { value: slot, .. } => {
                *slot = value;
                Ok(())
            }
            _ => Err(TreeError::NotSupported("only channel nodes carry a value")),
        }
    }

    /// Attaches `node` under this node keyed by `id` and returns a mutable
    /// reference to the attached node.
    pub fn add_child(
        &mut self,
        id: impl Into<String>,
        node: TreeNode,
    ) -> Result<&mut TreeNode, TreeError> {
        if !self.supports_children() {
            return Err(TreeError::NotSupported("channel nodes cannot have children"));
        }
        let id = id.into();
        if self.children.contains_key(&id) {
            return Err(TreeError::DuplicateChildId(id));
        }
        Ok(self.children.entry(id).or_insert(node))
    }

    /// Adds a device node with the given ID as a child of this node.
    pub fn add_device(&mut self, id: impl Into<String>) -> Result<&mut TreeNode, TreeError> {
        self.add_child(id, TreeNode::device())
    }

    /// Adds a channel leaf with the given ID and value type as a child of
    /// this node.
    pub fn add_channel(
        &mut self,
        id: impl Into<String>,
        subtype: ChannelType,
    ) -> Result<&mut TreeNode, TreeError> {
        self.add_child(id, TreeNode::channel(subtype))
    }

    /// Detaches and returns the child with the given ID.
    ///
    /// Subscriptions held on nodes inside the detached subtree are not
    /// purged; that cleanup is the caller's responsibility.
    pub fn remove_child(&mut self, id: &str) -> Result<TreeNode, TreeError> {
        self.children
            .shift_remove(id)
            .ok_or_else(|| TreeError::NoSuchChild(id.to_string()))
    }

    /// Detaches and returns the direct child with the given node UID.
    pub fn remove_child_by_uid(&mut self, uid: NodeUid) -> Result<TreeNode, TreeError> {
        let id = self
            .children
            .iter()
            .find(|(_, child)| child.uid == uid)
            .map(|(id, _)| id.clone())
            .ok_or(TreeError::NotAChild)?;
        self.children.shift_remove(&id).ok_or(TreeError::NotAChild)
    }

    /// The child with the given ID, if any.
    pub fn child(&self, id: &str) -> Option<&TreeNode> {
        self.children.get(id)
    }

    /// Mutable access to the child with the given ID, if any.
    pub fn child_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        self.children.get_mut(id)
    }

    /// Iterates over `(id, child)` pairs in insertion order; empty for
    /// leaves.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = (&str, &TreeNode)> {
        self.children.iter().map(|(id, child)| (id.as_str(), child))
    }

    /// Returns an iterator over the subtree of this node, the node itself
    /// first, in pre-order depth-first order. Children are visited in
    /// insertion order.
    ///
    /// `own_id` is the ID of this node in its parent, if known; it is
    /// yielded alongside the node itself and is `None` for the tree root.
    pub fn traverse_dfs<'a>(&'a self, own_id: Option<&'a str>) -> DepthFirst<'a> {
        DepthFirst {
            stack: vec![(own_id, self)],
        }
    }

    /// Snapshots the live values of this subtree.
    ///
    /// A channel maps to its current value; any other node maps to an
    /// object keyed by child ID with the recursive snapshot of each child.
    pub fn collect_values(&self) -> Value {
        match &self.kind {
            NodeKind::Channel { value, .. } => value.clone(),
            _ => Value::Object(
                self.children
                    .iter()
                    .map(|(id, child)| (id.clone(), child.collect_values()))
                    .collect(),
            ),
        }
    }

    /// How many times the given client is currently subscribed to this node.
    pub fn subscriber_count(&self, client: &ClientId) -> u32 {
        self.subscribers
            .as_ref()
            .and_then(|subs| subs.get(client))
            .copied()
            .unwrap_or(0)
    }

    /// Iterates over the clients currently subscribed to this node together
    /// with their subscription counts. Read by the notification fan-out to
    /// decide whom to notify when a value in this subtree changes.
    pub fn subscribers(&self) -> impl Iterator<Item = (&ClientId, u32)> {
        self.subscribers
            .iter()
            .flat_map(|subs| subs.iter().map(|(client, count)| (client, *count)))
    }

    pub(crate) fn subscribe(&mut self, client: &ClientId) {
        let subs = self.subscribers.get_or_insert_with(HashMap::new);
        *subs.entry(client.clone()).or_insert(0) += 1;
    }

    /// Decrements the client's subscription count by one, removing the
    /// entry when it reaches 0. With `force`, the entry is removed outright
    /// no matter how deep the subscription was, and a missing subscription
    /// is a silent no-op.
    ///
    /// Returns `false` if the client was not subscribed and `force` was not
    /// set; the caller translates that into a `NotSubscribed` error.
    pub(crate) fn unsubscribe(&mut self, client: &ClientId, force: bool) -> bool {
        let count = self.subscriber_count(client);
        if count == 0 {
            return force;
        }
        if let Some(subs) = self.subscribers.as_mut() {
            if force || count == 1 {
                subs.remove(client);
            } else if let Some(slot) = subs.get_mut(client) {
                *slot -= 1;
            }
        }
        true
    }

    /// Force-unsubscribes the client from this node and every node in its
    /// subtree, depth-first.
    pub(crate) fn purge_subscriber(&mut self, client: &ClientId) {
        self.unsubscribe(client, true);
        for child in self.children.values_mut() {
            child.purge_subscriber(client);
        }
    }
}

/// Pre-order depth-first iterator over a subtree; finite and one-shot.
pub struct DepthFirst<'a> {
    stack: Vec<(Option<&'a str>, &'a TreeNode)>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = (Option<&'a str>, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, node) = self.stack.pop()?;
        // Reversed push so the first-inserted child is visited first.
        for (child_id, child) in node.children().rev() {
            self.stack.push((Some(child_id), child));
        }
        Some((id, node))
    }
}
