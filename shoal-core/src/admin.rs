//! Admin capability consumed by the control plane.
//!
//! The coordinating node of the cluster exposes a request/response admin
//! interface over a single persistent channel. This module defines the
//! logical operations of that capability as a trait, plus the raw record
//! types it exchanges. The wire transport lives in `shoal-rpc`; the test
//! double lives in `shoal-testing`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::patch::TopologyPatch;
use crate::Result;

/// Raw per-server record as reported by the cluster.
///
/// `uuid` stays absent (or empty) until the server has been joined; records
/// without an alias cannot be matched against desired state and are dropped
/// during normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    #[serde(default)]
    pub uuid: Option<String>,
    pub uri: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub replicaset_uuid: Option<String>,
    /// Peers this server itself considers disabled, when it reports any
    #[serde(default)]
    pub known_disabled: Option<Vec<String>>,
    /// Checksum of the topology config this server runs with
    #[serde(default)]
    pub topology_checksum: Option<u32>,
}

/// Raw per-replica-set record as reported by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSetRecord {
    pub uuid: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub all_writable: bool,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub shard_group: Option<String>,
    /// Member aliases in failover-priority order
    #[serde(default)]
    pub members: Vec<String>,
    /// Alias of the current write leader
    #[serde(default)]
    pub leader: Option<String>,
}

/// Acknowledgement payload of [`AdminApi::edit_topology`], echoing the
/// servers and replica sets affected by the patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditTopologyReply {
    #[serde(default)]
    pub servers: Vec<ServerRecord>,
    #[serde(default)]
    pub replicasets: Vec<ReplicaSetRecord>,
}

/// One gossip membership entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub uri: String,
    /// Liveness status as gossiped, e.g. `alive`, `suspect`, `dead`
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub payload: Option<MemberPayload>,
}

impl MemberRecord {
    pub fn is_alive(&self) -> bool {
        self.status == "alive"
    }
}

/// Identity payload a member attaches to its gossip entry once it knows who
/// it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberPayload {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

impl MemberPayload {
    pub fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.alias.is_none()
    }
}

/// Failover mode the cluster is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMode {
    Disabled,
    Eventual,
    Stateful,
}

impl fmt::Display for FailoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailoverMode::Disabled => write!(f, "disabled"),
            FailoverMode::Eventual => write!(f, "eventual"),
            FailoverMode::Stateful => write!(f, "stateful"),
        }
    }
}

/// Failover parameters as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverParams {
    pub mode: FailoverMode,
    #[serde(default)]
    pub state_provider: Option<String>,
}

impl Default for FailoverParams {
    fn default() -> Self {
        Self {
            mode: FailoverMode::Disabled,
            state_provider: None,
        }
    }
}

/// Partial update of the failover parameters. Fields left as `None` are
/// untouched on the remote side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailoverParamsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<FailoverMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_provider: Option<String>,
}

impl FailoverParamsPatch {
    pub fn is_noop(&self) -> bool {
        self.mode.is_none() && self.state_provider.is_none()
    }
}

/// Options for a leader promotion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoteOpts {
    /// Promote even when the target replica is known to be behind
    #[serde(default)]
    pub force_inconsistency: bool,
}

/// The admin capability of the coordinating node.
///
/// One call is in flight at a time over one persistent channel; callers
/// sequence their requests. Every operation either returns its result or the
/// remote error verbatim inside [`crate::ShoalError::Rpc`], which is fatal
/// for the operation that observed it.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn get_servers(&mut self) -> Result<Vec<ServerRecord>>;

    async fn get_replicasets(&mut self) -> Result<Vec<ReplicaSetRecord>>;

    async fn get_membership_members(&mut self) -> Result<Vec<MemberRecord>>;

    /// Submits one batch of topology mutations. The acknowledgement echoes
    /// the affected entities so callers can refresh their view without a
    /// full re-read.
    async fn edit_topology(&mut self, patch: &TopologyPatch) -> Result<EditTopologyReply>;

    /// Whether the cluster considers its own state settled enough to accept
    /// further topology changes.
    async fn is_healthy(&mut self) -> Result<bool>;

    async fn get_failover_params(&mut self) -> Result<FailoverParams>;

    async fn set_failover_params(&mut self, patch: &FailoverParamsPatch) -> Result<()>;

    /// Makes the given instances the write leaders of their replica sets.
    /// Keys are replica-set uuids, values are instance uuids.
    async fn failover_promote(
        &mut self,
        leaders: &BTreeMap<Uuid, Uuid>,
        opts: PromoteOpts,
    ) -> Result<()>;

    /// Version of the two-phase commit protocol the instance at `uri` runs.
    async fn get_twophase_version(&mut self, uri: &str) -> Result<u32>;
}
