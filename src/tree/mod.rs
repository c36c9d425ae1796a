//! Filesystem Merkle Tree
//!
//! Models one directory as a Merkle tree, where each node (file or directory)
//! carries a hash derived from its content, its name and its children.

pub mod builder;
pub mod codec;
pub mod hasher;
pub mod model;
pub mod node;
pub mod path;
pub mod walker;

pub use builder::TreeBuilder;
pub use hasher::{Blake3Hasher, NodeHasher, Sha256Hasher};
pub use model::Tree;
pub use node::Node;
