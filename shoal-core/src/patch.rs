//! Topology patch operations.
//!
//! A reconciliation run mutates the cluster exclusively through these patch
//! types, submitted in batches via [`crate::AdminApi::edit_topology`].
//! Creation targets a replica set by alias; every other mutation targets an
//! entity by its uuid, which only exists after the entity has been joined.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mutation of a single replica set.
///
/// Fields left as `None` are untouched on the remote side, so a patch
/// carrying nothing but its identifying field would be a no-op; such patches
/// are filtered out by [`TopologyPatch::push_replicaset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplicaSetPatch {
    /// Bring a new replica set into existence, joining `join` servers (by
    /// advertise uri, in order) as its initial members.
    Create {
        alias: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        roles: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        all_writable: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        weight: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        shard_group: Option<String>,
        join: Vec<String>,
    },
    /// Edit an existing replica set, optionally joining further servers.
    ///
    /// `failover_priority` is the full member ordering by instance uuid;
    /// it can only be expressed once every member has been joined.
    Edit {
        uuid: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        roles: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        all_writable: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        weight: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        shard_group: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        failover_priority: Option<Vec<Uuid>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        join: Vec<String>,
    },
}

impl ReplicaSetPatch {
    /// True when applying the patch would not change anything remotely.
    pub fn is_noop(&self) -> bool {
        match self {
            // A creation without servers to join is meaningless: a replica
            // set cannot exist without members.
            Self::Create { join, .. } => join.is_empty(),
            Self::Edit {
                roles,
                all_writable,
                weight,
                shard_group,
                failover_priority,
                join,
                ..
            } => {
                roles.is_none()
                    && all_writable.is_none()
                    && weight.is_none()
                    && shard_group.is_none()
                    && failover_priority.is_none()
                    && join.is_empty()
            }
        }
    }
}

/// Mutation of a single joined server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPatch {
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub expelled: bool,
}

impl ServerPatch {
    /// True when the patch carries nothing but the identifying uuid.
    pub fn is_noop(&self) -> bool {
        self.zone.is_none() && self.uri.is_none() && !self.expelled
    }
}

/// One batch of topology mutations, submitted as a single call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyPatch {
    #[serde(default)]
    pub replicasets: Vec<ReplicaSetPatch>,
    #[serde(default)]
    pub servers: Vec<ServerPatch>,
}

impl TopologyPatch {
    /// An empty batch must never be sent over the channel.
    pub fn is_empty(&self) -> bool {
        self.replicasets.is_empty() && self.servers.is_empty()
    }

    /// Adds a replica-set patch, discarding no-ops.
    pub fn push_replicaset(&mut self, patch: ReplicaSetPatch) {
        if !patch.is_noop() {
            self.replicasets.push(patch);
        }
    }

    /// Adds a server patch, discarding no-ops.
    pub fn push_server(&mut self, patch: ServerPatch) {
        if !patch.is_noop() {
            self.servers.push(patch);
        }
    }

    /// Uuids of servers this batch expels.
    pub fn expelled_uuids(&self) -> Vec<Uuid> {
        self.servers
            .iter()
            .filter(|server| server.expelled)
            .map(|server| server.uuid)
            .collect()
    }
}
