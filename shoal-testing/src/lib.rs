//! Test support for the shoal control plane: an in-memory fake cluster
//! implementing the admin capability, plus fixture builders. The integration
//! tests of the whole workspace live in this crate's `tests/` directory.

pub mod fixtures;
pub mod mock;

pub use fixtures::{desired_instance, desired_replicaset, desired_topology, member};
pub use mock::FakeCluster;
