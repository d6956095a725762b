//! # Core Types
//!
//! Desired and observed topology models.
//!
//! Desired state is read once per reconciliation run and never mutated.
//! Observed state is built from the raw records of the admin capability,
//! updated in place from patch acknowledgements, and discarded at the end of
//! the run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::admin::{ReplicaSetRecord, ServerRecord};
use crate::{EditTopologyReply, Result, ShoalError};

/// A storage node as declared in the target topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredInstance {
    /// Unique name, matched against observed aliases
    pub name: String,
    /// Advertise address other nodes reach this instance at
    pub uri: String,
    #[serde(default)]
    pub zone: Option<String>,
    /// Alias of the replica set this instance belongs to
    #[serde(default)]
    pub replicaset: Option<String>,
    /// Marked for removal from the cluster
    #[serde(default)]
    pub expelled: bool,
    /// Statically disabled in the inventory, independent of runtime voting
    #[serde(default)]
    pub disabled: bool,
    /// External coordination-service process, never part of the topology
    #[serde(default)]
    pub stateboard: bool,
}

/// A replica set as declared in the target topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredReplicaSet {
    /// Unique alias
    pub alias: String,
    /// Member instance names; their order doubles as failover priority when
    /// no explicit priority list is given
    pub members: Vec<String>,
    /// Explicit failover priority, highest first; may name a subset of
    /// members, the first entry is the intended leader
    #[serde(default)]
    pub failover_priority: Option<Vec<String>>,
    /// Compared with set semantics
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub all_writable: Option<bool>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub shard_group: Option<String>,
}

impl DesiredReplicaSet {
    /// Member names in the order they should lead, highest priority first.
    pub fn priority(&self) -> &[String] {
        match &self.failover_priority {
            Some(priority) => priority,
            None => &self.members,
        }
    }

    /// Join order for a brand-new replica set: priority members first, then
    /// the remaining members. Joining in this order makes the initial member
    /// ordering match the failover priority without a second patch.
    pub fn join_order(&self) -> Vec<&String> {
        let mut order: Vec<&String> = Vec::new();
        if let Some(priority) = &self.failover_priority {
            for name in priority {
                if !order.contains(&name) {
                    order.push(name);
                }
            }
        }
        for name in &self.members {
            if !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }
}

/// The full declared target topology, keyed for lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesiredTopology {
    instances: BTreeMap<String, DesiredInstance>,
    replicasets: BTreeMap<String, DesiredReplicaSet>,
}

impl DesiredTopology {
    /// Builds the lookup maps, rejecting duplicate names and aliases.
    pub fn new(
        instances: Vec<DesiredInstance>,
        replicasets: Vec<DesiredReplicaSet>,
    ) -> Result<Self> {
        let mut instance_map = BTreeMap::new();
        for instance in instances {
            if let Some(previous) = instance_map.insert(instance.name.clone(), instance) {
                return Err(ShoalError::validation(format!(
                    "Duplicate instance name: {}",
                    previous.name
                )));
            }
        }
        let mut replicaset_map = BTreeMap::new();
        for replicaset in replicasets {
            if let Some(previous) = replicaset_map.insert(replicaset.alias.clone(), replicaset) {
                return Err(ShoalError::validation(format!(
                    "Duplicate replicaset alias: {}",
                    previous.alias
                )));
            }
        }
        Ok(Self {
            instances: instance_map,
            replicasets: replicaset_map,
        })
    }

    pub fn instance(&self, name: &str) -> Option<&DesiredInstance> {
        self.instances.get(name)
    }

    pub fn instances(&self) -> impl Iterator<Item = &DesiredInstance> {
        self.instances.values()
    }

    pub fn replicasets(&self) -> impl Iterator<Item = &DesiredReplicaSet> {
        self.replicasets.values()
    }

    /// Names statically marked disabled in the inventory, sorted.
    pub fn inventory_disabled(&self) -> Vec<String> {
        self.instances
            .values()
            .filter(|instance| instance.disabled)
            .map(|instance| instance.name.clone())
            .collect()
    }
}

/// Health of an observed instance as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Healthy,
    Dead,
    Other(String),
}

impl InstanceStatus {
    pub fn from_report(status: Option<&str>) -> Self {
        match status {
            Some("healthy") => Self::Healthy,
            Some("dead") => Self::Dead,
            Some(other) => Self::Other(other.to_string()),
            None => Self::Other(String::new()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Healthy => write!(f, "healthy"),
            InstanceStatus::Dead => write!(f, "dead"),
            InstanceStatus::Other(status) => write!(f, "{}", status),
        }
    }
}

/// A storage node as the cluster reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedInstance {
    pub alias: String,
    /// Cluster identity; absent until the instance has been joined. Every
    /// ordering constraint of the reconciliation protocol flows from this
    /// field.
    pub uuid: Option<Uuid>,
    pub uri: String,
    pub zone: Option<String>,
    pub replicaset_uuid: Option<Uuid>,
    pub status: InstanceStatus,
    /// Peers this instance itself considers disabled
    pub known_disabled: Option<BTreeSet<String>>,
    /// Checksum of the topology config this instance runs with
    pub topology_checksum: Option<u32>,
}

impl ObservedInstance {
    /// Normalizes a raw record; `None` when the record has no alias and can
    /// never be matched against desired state.
    pub fn from_record(record: &ServerRecord) -> Result<Option<Self>> {
        let alias = match record.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => return Ok(None),
        };
        Ok(Some(Self {
            alias,
            uuid: parse_uuid_field(record.uuid.as_deref(), "server")?,
            uri: record.uri.clone(),
            zone: record.zone.clone(),
            replicaset_uuid: parse_uuid_field(record.replicaset_uuid.as_deref(), "replicaset")?,
            status: InstanceStatus::from_report(record.status.as_deref()),
            known_disabled: record
                .known_disabled
                .as_ref()
                .map(|names| names.iter().cloned().collect()),
            topology_checksum: record.topology_checksum,
        }))
    }

    pub fn is_joined(&self) -> bool {
        self.uuid.is_some()
    }
}

/// A replica set as the cluster reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedReplicaSet {
    pub uuid: Uuid,
    pub alias: String,
    pub roles: Vec<String>,
    pub all_writable: bool,
    pub weight: f64,
    pub shard_group: Option<String>,
    /// Member aliases in failover-priority order
    pub members: Vec<String>,
    /// Alias of the current write leader
    pub leader: Option<String>,
}

impl ObservedReplicaSet {
    /// Normalizes a raw record; `None` when the record has no alias.
    pub fn from_record(record: &ReplicaSetRecord) -> Result<Option<Self>> {
        let alias = match record.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => return Ok(None),
        };
        let uuid = parse_uuid_field(Some(&record.uuid), "replicaset")?.ok_or_else(|| {
            ShoalError::decode(format!("replicaset {} reported without a uuid", alias))
        })?;
        Ok(Some(Self {
            uuid,
            alias,
            roles: record.roles.clone(),
            all_writable: record.all_writable,
            weight: record.weight,
            shard_group: record.shard_group.clone(),
            members: record.members.clone(),
            leader: record.leader.clone(),
        }))
    }
}

/// Observed cluster state for one reconciliation run, keyed by alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedTopology {
    pub instances: BTreeMap<String, ObservedInstance>,
    pub replicasets: BTreeMap<String, ObservedReplicaSet>,
}

impl ObservedTopology {
    /// Normalizes raw records into alias-keyed maps. An unbootstrapped
    /// cluster yields an empty topology, not an error.
    pub fn from_records(
        servers: &[ServerRecord],
        replicasets: &[ReplicaSetRecord],
    ) -> Result<Self> {
        let mut topology = Self::default();
        topology.absorb(&EditTopologyReply {
            servers: servers.to_vec(),
            replicasets: replicasets.to_vec(),
        })?;
        Ok(topology)
    }

    /// Folds a patch acknowledgement back into the local view, replacing the
    /// entries it echoes. Avoids a full re-read between the two batches of a
    /// run.
    pub fn absorb(&mut self, reply: &EditTopologyReply) -> Result<()> {
        for record in &reply.servers {
            if let Some(instance) = ObservedInstance::from_record(record)? {
                self.instances.insert(instance.alias.clone(), instance);
            }
        }
        for record in &reply.replicasets {
            if let Some(replicaset) = ObservedReplicaSet::from_record(record)? {
                self.replicasets
                    .insert(replicaset.alias.clone(), replicaset);
            }
        }
        Ok(())
    }

    /// Drops an expelled instance from the local view, including member
    /// lists and leader slots that still name it.
    pub fn remove_instance_by_uuid(&mut self, uuid: &Uuid) {
        let alias = self
            .instances
            .iter()
            .find(|(_, instance)| instance.uuid.as_ref() == Some(uuid))
            .map(|(alias, _)| alias.clone());
        if let Some(alias) = alias {
            self.instances.remove(&alias);
            for replicaset in self.replicasets.values_mut() {
                replicaset.members.retain(|member| member != &alias);
                if replicaset.leader.as_deref() == Some(alias.as_str()) {
                    replicaset.leader = None;
                }
            }
        }
    }

    pub fn instance_uuid(&self, alias: &str) -> Option<Uuid> {
        self.instances.get(alias).and_then(|instance| instance.uuid)
    }

    /// Current leader alias per replica-set alias.
    pub fn leaders(&self) -> BTreeMap<String, Option<String>> {
        self.replicasets
            .iter()
            .map(|(alias, replicaset)| (alias.clone(), replicaset.leader.clone()))
            .collect()
    }

    /// Checksum over the normalized view, comparable across nodes running
    /// the same topology config.
    pub fn checksum(&self) -> u32 {
        let serialized = serde_json::to_vec(self).unwrap_or_default();
        crc32fast::hash(&serialized)
    }
}

/// Parses an optional uuid field, treating an empty string the same as an
/// absent one.
pub fn parse_uuid_field(value: Option<&str>, what: &str) -> Result<Option<Uuid>> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => Uuid::parse_str(raw).map(Some).map_err(|e| {
            ShoalError::decode(format!("invalid {} uuid {:?}: {}", what, raw, e))
        }),
    }
}
