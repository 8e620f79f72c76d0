//! Subscription management for device tree nodes
//!
//! All subscription state lives inside the tree nodes themselves; the
//! manager is the set of algorithms operating on it. A client may be
//! subscribed to the same node multiple times and must unsubscribe the
//! same number of times to stop receiving notifications, unless the
//! unsubscription is forced.

use std::collections::HashMap;
use tracing::debug;

use crate::error::TreeError;
use crate::node::{ClientId, TreeNode};
use crate::path::TreePath;
use crate::tree::SharedDeviceTree;

/// Manages client subscriptions against one shared device tree.
#[derive(Clone)]
pub struct SubscriptionManager {
    tree: SharedDeviceTree,
}

impl SubscriptionManager {
    /// Creates a manager operating on the given shared tree.
    pub fn new(tree: SharedDeviceTree) -> Self {
        Self { tree }
    }

    /// The tree whose subscriptions this manager operates on.
    pub fn tree(&self) -> &SharedDeviceTree {
        &self.tree
    }

    /// Subscribes the client to the node at the given path, incrementing
    /// its subscription count there by one.
    pub fn subscribe(&self, client: &ClientId, path: &TreePath) -> Result<(), TreeError> {
        let mut tree = self.tree.lock();
        tree.resolve_mut(path)?.subscribe(client);
        debug!(client = %client, path = %path, "client subscribed");
        Ok(())
    }

    /// Unsubscribes the client from the node at the given path.
    ///
    /// Each subscribe call must be matched by exactly one unsubscribe call.
    /// With `force`, the client is removed from the node no matter how many
    /// times it subscribed, and unsubscribing a client that was never
    /// subscribed is a silent no-op instead of a `NotSubscribed` error.
    pub fn unsubscribe(
        &self,
        client: &ClientId,
        path: &TreePath,
        force: bool,
    ) -> Result<(), TreeError> {
        let mut tree = self.tree.lock();
        if !tree.resolve_mut(path)?.unsubscribe(client, force) {
            return Err(TreeError::NotSubscribed {
                client: client.clone(),
                path: path.to_string(),
            });
        }
        debug!(client = %client, path = %path, force, "client unsubscribed");
        Ok(())
    }

    /// Lists every path under the given filter paths where the client holds
    /// a subscription, mapped to the subscription count there.
    ///
    /// `filters` defaults to the root path, covering the whole tree. A node
    /// reachable under more than one filter contributes its count once per
    /// filter; callers that do not want the counts summed must deduplicate
    /// the filters themselves.
    pub fn list_subscriptions(
        &self,
        client: &ClientId,
        filters: Option<&[TreePath]>,
    ) -> Result<HashMap<String, u32>, TreeError> {
        let root_filter = [TreePath::root()];
        let filters = filters.unwrap_or(&root_filter);

        let tree = self.tree.lock();
        let mut result = HashMap::new();
        for filter in filters {
            let node = tree.resolve(filter)?;
            let mut path = filter.clone();
            collect_subscriptions(client, &mut path, node, &mut result);
        }
        Ok(result)
    }

    /// Force-unsubscribes the client from every node in the tree. Called by
    /// the registry wiring when a client disconnects; never fails.
    pub fn purge_client(&self, client: &ClientId) {
        let mut tree = self.tree.lock();
        tree.root_mut().purge_subscriber(client);
        debug!(client = %client, "purged all subscriptions of client");
    }
}

/// Accumulates the client's subscription counts over the subtree of `node`
/// into `result`, keyed by canonical path string. `path` leads to `node`
/// and is extended and restored around each recursive descent.
fn collect_subscriptions(
    client: &ClientId,
    path: &mut TreePath,
    node: &TreeNode,
    result: &mut HashMap<String, u32>,
) {
    let count = node.subscriber_count(client);
    if count > 0 {
        *result.entry(path.to_string()).or_insert(0) += count;
    }
    for (child_id, child) in node.children() {
        path.push(child_id);
        collect_subscriptions(client, path, child, result);
        path.pop();
    }
}
