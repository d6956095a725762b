//! # Shoal Core - Topology Reconciliation Building Blocks
//!
//! Shared foundation for the shoal control plane, which drives a sharded,
//! replicated storage cluster towards a declared target topology.
//!
//! This crate defines:
//!
//! - **Desired/Observed Model**: the declared target topology and the
//!   normalized view of what the cluster actually looks like
//! - **Patch Operations**: typed topology mutations with no-op elimination,
//!   batched for submission in dependency order
//! - **Admin Capability**: the [`AdminApi`] trait every transport and test
//!   double implements
//! - **Error Taxonomy**: validation, RPC, transport, and convergence-timeout
//!   failure classes with retry hints
//! - **Warnings**: an explicit accumulator for non-fatal findings, threaded
//!   through each component instead of living in ambient state
//!
//! The reconciliation algorithms live in `shoal-engine`; coordinator
//! election, disabled-instance voting, and leader promotion live in
//! `shoal-leader`; the wire transport lives in `shoal-rpc`.

pub mod admin;
pub mod error;
pub mod patch;
pub mod types;
pub mod warnings;

// Re-export commonly used types for convenience
pub use admin::*;
pub use error::*;
pub use patch::*;
pub use types::*;
pub use warnings::Warnings;
