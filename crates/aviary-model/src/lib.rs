//! Aviary Model - Device tree state for a drone fleet telemetry server
//!
//! This crate provides the state-management core of the Aviary server:
//! - Slash-delimited tree paths with strict syntax rules
//! - The device tree itself (root/vehicle/device/channel nodes)
//! - Per-client, multiplicity-counted subscription bookkeeping

pub mod error;
pub mod node;
pub mod path;
pub mod subscription;
pub mod tree;

pub use error::TreeError;
pub use node::{
    ChannelOperation, ChannelType, ClientId, DepthFirst, NodeType, NodeUid, TreeNode,
};
pub use path::TreePath;
pub use subscription::SubscriptionManager;
pub use tree::{DeviceTree, SharedDeviceTree};
