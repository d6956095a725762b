//! # Shoal Leader
//!
//! Coordination algorithms that run upstream of, and independently from, the
//! reconciliation engine:
//!
//! - Control-instance election: which node subsequent admin calls go to
//! - Disabled-instance quorum detection: which nodes the rest of the cluster
//!   should treat as disabled, tolerating partial disagreement
//! - Failover leader promotion under stateful failover
//! - Failover parameter management

pub mod elector;
pub mod failover;
pub mod promote;
pub mod quorum;

pub use elector::{elect_control_instance, ControlInstance};
pub use failover::configure_failover;
pub use promote::{promote_leaders, PromoteTarget};
pub use quorum::{detect_disabled, DisabledSets, InstanceReport};
