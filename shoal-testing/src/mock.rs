//! In-memory fake cluster implementing the admin capability.

use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use shoal_core::{
    AdminApi, EditTopologyReply, FailoverParams, FailoverParamsPatch, MemberRecord, PromoteOpts,
    ReplicaSetPatch, ReplicaSetRecord, Result, ServerPatch, ServerRecord, ShoalError,
    TopologyPatch,
};

/// Scriptable in-memory cluster for integration tests.
///
/// Patches are applied the way the remote admin implementation would apply
/// them: joins assign fresh uuids, edits rewrite fields, expels drop the
/// server, priority patches reorder members. Every capability call and every
/// submitted patch is recorded, so tests can assert exactly what did (and
/// did not) go over the channel.
#[derive(Debug, Default)]
pub struct FakeCluster {
    servers: Vec<ServerRecord>,
    replicasets: Vec<ReplicaSetRecord>,
    members: Vec<MemberRecord>,
    /// Reachable servers not yet joined, advertise uri to alias
    unjoined: BTreeMap<String, String>,
    failover: FailoverParams,
    twophase_versions: BTreeMap<String, u32>,
    /// Health probes to answer false before reporting healthy
    healthy_after: usize,
    health_polls: usize,
    edit_failure: Option<String>,
    /// Procedure names in call order
    pub calls: Vec<String>,
    /// Every patch submitted through `edit_topology`
    pub patches: Vec<TopologyPatch>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a server that is reachable but not yet part of the cluster.
    pub fn with_unjoined(mut self, alias: &str, uri: &str) -> Self {
        self.unjoined.insert(uri.to_string(), alias.to_string());
        self
    }

    /// Seeds an already-bootstrapped replica set of joined `(alias, uri)`
    /// members, first member leading.
    pub fn with_joined_replicaset(mut self, alias: &str, members: &[(&str, &str)]) -> Self {
        let rs_uuid = Uuid::new_v4().to_string();
        let mut member_aliases = Vec::new();
        for (member_alias, uri) in members {
            self.servers.push(ServerRecord {
                uuid: Some(Uuid::new_v4().to_string()),
                uri: uri.to_string(),
                alias: Some(member_alias.to_string()),
                status: Some("healthy".into()),
                replicaset_uuid: Some(rs_uuid.clone()),
                ..ServerRecord::default()
            });
            member_aliases.push(member_alias.to_string());
        }
        self.replicasets.push(ReplicaSetRecord {
            uuid: rs_uuid,
            alias: Some(alias.to_string()),
            roles: vec!["storage".into()],
            leader: member_aliases.first().cloned(),
            members: member_aliases,
            ..ReplicaSetRecord::default()
        });
        self
    }

    pub fn with_member(mut self, member: MemberRecord) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_failover(mut self, failover: FailoverParams) -> Self {
        self.failover = failover;
        self
    }

    pub fn with_twophase_version(mut self, uri: &str, version: u32) -> Self {
        self.twophase_versions.insert(uri.to_string(), version);
        self
    }

    pub fn with_healthy_after(mut self, polls: usize) -> Self {
        self.healthy_after = polls;
        self
    }

    /// Makes every subsequent `edit_topology` fail with the given remote
    /// error text.
    pub fn with_edit_failure(mut self, message: &str) -> Self {
        self.edit_failure = Some(message.to_string());
        self
    }

    pub fn set_status(&mut self, alias: &str, status: &str) {
        if let Some(server) = self.server_mut(alias) {
            server.status = Some(status.to_string());
        }
    }

    /// Attaches the disabled-instance voting report to a server.
    pub fn set_report(&mut self, alias: &str, disabled: &[&str], checksum: u32) {
        if let Some(server) = self.server_mut(alias) {
            server.known_disabled = Some(disabled.iter().map(|name| name.to_string()).collect());
            server.topology_checksum = Some(checksum);
        }
    }

    fn server_mut(&mut self, alias: &str) -> Option<&mut ServerRecord> {
        self.servers
            .iter_mut()
            .find(|server| server.alias.as_deref() == Some(alias))
    }

    pub fn server_uuid(&self, alias: &str) -> Option<Uuid> {
        self.servers
            .iter()
            .find(|server| server.alias.as_deref() == Some(alias))
            .and_then(|server| server.uuid.as_deref())
            .and_then(|uuid| Uuid::parse_str(uuid).ok())
    }

    pub fn members_of(&self, alias: &str) -> Vec<String> {
        self.replicasets
            .iter()
            .find(|record| record.alias.as_deref() == Some(alias))
            .map(|record| record.members.clone())
            .unwrap_or_default()
    }

    pub fn leader_of(&self, alias: &str) -> Option<String> {
        self.replicasets
            .iter()
            .find(|record| record.alias.as_deref() == Some(alias))
            .and_then(|record| record.leader.clone())
    }

    pub fn count_calls(&self, procedure: &str) -> usize {
        self.calls.iter().filter(|call| *call == procedure).count()
    }

    fn join_server(&mut self, uri: &str, rs_uuid: &str) -> Result<String> {
        let alias = self.unjoined.remove(uri).ok_or_else(|| {
            ShoalError::rpc(format!("Server {} is not in membership", uri))
        })?;
        self.servers.push(ServerRecord {
            uuid: Some(Uuid::new_v4().to_string()),
            uri: uri.to_string(),
            alias: Some(alias.clone()),
            status: Some("healthy".into()),
            replicaset_uuid: Some(rs_uuid.to_string()),
            ..ServerRecord::default()
        });
        Ok(alias)
    }

    fn apply_replicaset_patch(&mut self, patch: &ReplicaSetPatch) -> Result<()> {
        match patch {
            ReplicaSetPatch::Create {
                alias,
                roles,
                all_writable,
                weight,
                shard_group,
                join,
            } => {
                if self
                    .replicasets
                    .iter()
                    .any(|record| record.alias.as_deref() == Some(alias))
                {
                    return Err(ShoalError::rpc(format!(
                        "Replicaset {} already exists",
                        alias
                    )));
                }
                let rs_uuid = Uuid::new_v4().to_string();
                let mut member_aliases = Vec::new();
                for uri in join {
                    member_aliases.push(self.join_server(uri, &rs_uuid)?);
                }
                self.replicasets.push(ReplicaSetRecord {
                    uuid: rs_uuid,
                    alias: Some(alias.clone()),
                    roles: roles.clone().unwrap_or_default(),
                    all_writable: all_writable.unwrap_or(false),
                    weight: weight.unwrap_or(0.0),
                    shard_group: shard_group.clone(),
                    leader: member_aliases.first().cloned(),
                    members: member_aliases,
                });
                Ok(())
            }
            ReplicaSetPatch::Edit {
                uuid,
                roles,
                all_writable,
                weight,
                shard_group,
                failover_priority,
                join,
            } => {
                let uuid_str = uuid.to_string();
                if !self.replicasets.iter().any(|record| record.uuid == uuid_str) {
                    return Err(ShoalError::rpc(format!(
                        "Replicaset {} is not in the cluster",
                        uuid
                    )));
                }
                let mut joined_aliases = Vec::new();
                for uri in join {
                    joined_aliases.push(self.join_server(uri, &uuid_str)?);
                }
                let alias_by_uuid: BTreeMap<String, String> = self
                    .servers
                    .iter()
                    .filter_map(|server| match (&server.uuid, &server.alias) {
                        (Some(uuid), Some(alias)) => Some((uuid.clone(), alias.clone())),
                        _ => None,
                    })
                    .collect();

                let record = self
                    .replicasets
                    .iter_mut()
                    .find(|record| record.uuid == uuid_str)
                    .expect("presence checked above");
                record.members.extend(joined_aliases);
                if let Some(roles) = roles {
                    record.roles = roles.clone();
                }
                if let Some(all_writable) = all_writable {
                    record.all_writable = *all_writable;
                }
                if let Some(weight) = weight {
                    record.weight = *weight;
                }
                if let Some(group) = shard_group {
                    record.shard_group = Some(group.clone());
                }
                if let Some(priority) = failover_priority {
                    let mut members = Vec::new();
                    for member_uuid in priority {
                        let alias =
                            alias_by_uuid.get(&member_uuid.to_string()).ok_or_else(|| {
                                ShoalError::rpc(format!(
                                    "Server {} is not in the cluster",
                                    member_uuid
                                ))
                            })?;
                        members.push(alias.clone());
                    }
                    record.members = members;
                }
                let leader_is_member = record
                    .leader
                    .as_ref()
                    .map(|leader| record.members.contains(leader))
                    .unwrap_or(false);
                if !leader_is_member {
                    record.leader = record.members.first().cloned();
                }
                Ok(())
            }
        }
    }

    fn apply_server_patch(&mut self, patch: &ServerPatch) -> Result<()> {
        let uuid_str = patch.uuid.to_string();
        let Some(index) = self
            .servers
            .iter()
            .position(|server| server.uuid.as_deref() == Some(uuid_str.as_str()))
        else {
            return Err(ShoalError::rpc(format!(
                "Server {} is not in the cluster",
                patch.uuid
            )));
        };
        if patch.expelled {
            let removed = self.servers.remove(index);
            if let Some(alias) = removed.alias {
                for record in &mut self.replicasets {
                    record.members.retain(|member| member != &alias);
                    if record.leader.as_deref() == Some(alias.as_str()) {
                        record.leader = record.members.first().cloned();
                    }
                }
            }
            return Ok(());
        }
        let server = &mut self.servers[index];
        if let Some(zone) = &patch.zone {
            server.zone = Some(zone.clone());
        }
        if let Some(uri) = &patch.uri {
            server.uri = uri.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl AdminApi for FakeCluster {
    async fn get_servers(&mut self) -> Result<Vec<ServerRecord>> {
        self.calls.push("get_servers".into());
        Ok(self.servers.clone())
    }

    async fn get_replicasets(&mut self) -> Result<Vec<ReplicaSetRecord>> {
        self.calls.push("get_replicasets".into());
        Ok(self.replicasets.clone())
    }

    async fn get_membership_members(&mut self) -> Result<Vec<MemberRecord>> {
        self.calls.push("get_membership_members".into());
        Ok(self.members.clone())
    }

    async fn edit_topology(&mut self, patch: &TopologyPatch) -> Result<EditTopologyReply> {
        self.calls.push("edit_topology".into());
        self.patches.push(patch.clone());
        if let Some(message) = &self.edit_failure {
            return Err(ShoalError::rpc(message.clone()));
        }
        // An empty batch reaching the cluster is a caller bug.
        if patch.is_empty() {
            return Err(ShoalError::rpc("Topology is not changed"));
        }
        for replicaset_patch in &patch.replicasets {
            self.apply_replicaset_patch(replicaset_patch)?;
        }
        for server_patch in &patch.servers {
            self.apply_server_patch(server_patch)?;
        }
        Ok(EditTopologyReply {
            servers: self.servers.clone(),
            replicasets: self.replicasets.clone(),
        })
    }

    async fn is_healthy(&mut self) -> Result<bool> {
        self.calls.push("is_healthy".into());
        self.health_polls += 1;
        Ok(self.health_polls > self.healthy_after)
    }

    async fn get_failover_params(&mut self) -> Result<FailoverParams> {
        self.calls.push("get_failover_params".into());
        Ok(self.failover.clone())
    }

    async fn set_failover_params(&mut self, patch: &FailoverParamsPatch) -> Result<()> {
        self.calls.push("set_failover_params".into());
        if let Some(mode) = patch.mode {
            self.failover.mode = mode;
        }
        if let Some(provider) = &patch.state_provider {
            self.failover.state_provider = Some(provider.clone());
        }
        Ok(())
    }

    async fn failover_promote(
        &mut self,
        leaders: &BTreeMap<Uuid, Uuid>,
        _opts: PromoteOpts,
    ) -> Result<()> {
        self.calls.push("failover_promote".into());
        for (replicaset_uuid, leader_uuid) in leaders {
            let leader_alias = self
                .servers
                .iter()
                .find(|server| server.uuid.as_deref() == Some(leader_uuid.to_string().as_str()))
                .and_then(|server| server.alias.clone())
                .ok_or_else(|| {
                    ShoalError::rpc(format!("Server {} is not in the cluster", leader_uuid))
                })?;
            let record = self
                .replicasets
                .iter_mut()
                .find(|record| record.uuid == replicaset_uuid.to_string())
                .ok_or_else(|| {
                    ShoalError::rpc(format!(
                        "Replicaset {} is not in the cluster",
                        replicaset_uuid
                    ))
                })?;
            record.leader = Some(leader_alias);
        }
        Ok(())
    }

    async fn get_twophase_version(&mut self, uri: &str) -> Result<u32> {
        self.calls.push("get_twophase_version".into());
        self.twophase_versions
            .get(uri)
            .copied()
            .ok_or_else(|| ShoalError::rpc(format!("Server {} is not available", uri)))
    }
}
