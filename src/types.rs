//! Core identifiers shared across the crate.

/// Node identifier, unique within one tree and never reused by that tree
pub type NodeId = u64;

/// 32-byte digest carried by every node
pub type Hash = [u8; 32];

/// Id of the root node in every tree
pub const ROOT_ID: NodeId = 0;

/// Placeholder digest for nodes that have not been hashed yet
pub const EMPTY_HASH: Hash = [0u8; 32];
