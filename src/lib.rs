//! Reflect: Directory Reflection Daemon
//!
//! Keeps a reflection of each registered directory in sync with its original.
//! Both sides are summarized as content-addressed Merkle trees; a backup diffs
//! the two trees and replays only the difference onto the reflection.

pub mod changemap;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod drive;
pub mod error;
pub mod executor;
pub mod fsops;
pub mod logging;
pub mod monitor;
pub mod reflector;
pub mod registry;
pub mod relay;
pub mod store;
pub mod tree;
pub mod types;
