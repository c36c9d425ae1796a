//! Integration tests for the reflect daemon

mod backup_scenario;
mod changelog_properties;
mod reflector_convergence;
mod relay_roundtrip;
mod store_backends;
mod test_utils;
mod tree_roundtrip;
