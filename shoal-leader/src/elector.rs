//! Coordinator selection from gossip membership data.

use tracing::debug;
use uuid::Uuid;

use shoal_core::{
    parse_uuid_field, AdminApi, DesiredTopology, MemberRecord, Result, ShoalError, Warnings,
};

/// The node chosen to receive subsequent admin calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInstance {
    pub alias: String,
    pub uri: String,
    pub uuid: Option<Uuid>,
}

#[derive(Debug, Clone)]
struct Candidate {
    alias: String,
    uri: String,
    uuid: Option<Uuid>,
}

impl Candidate {
    fn into_control(self) -> ControlInstance {
        ControlInstance {
            alias: self.alias,
            uri: self.uri,
            uuid: self.uuid,
        }
    }
}

/// Picks exactly one coordinating node from the gossip membership view.
///
/// Members without a payload are skipped with a warning (they have not
/// started yet). A payload carrying a uuid but no alias is ambiguous and
/// fatal, as is an alias unknown to the static inventory. Among live
/// candidates that are already joined, the one running the lowest two-phase
/// commit protocol version wins: the oldest protocol is the common
/// denominator across a mixed-version cluster. Without any joined candidate,
/// a not-yet-joined one is picked, preferring instances that belong to a
/// configured replica set over standalone ones. All ties break on
/// lexicographic (alias, uri) order, so the outcome never depends on input
/// ordering.
pub async fn elect_control_instance<C: AdminApi + ?Sized>(
    chan: &mut C,
    members: &[MemberRecord],
    inventory: &DesiredTopology,
    warnings: &mut Warnings,
) -> Result<ControlInstance> {
    let mut joined: Vec<Candidate> = Vec::new();
    let mut unjoined: Vec<Candidate> = Vec::new();

    for member in members {
        let payload = match &member.payload {
            Some(payload) if !payload.is_empty() => payload,
            _ => {
                warnings.push(format!(
                    "Membership member {} reports no payload, skipping it",
                    member.uri
                ));
                continue;
            }
        };
        let uuid = parse_uuid_field(payload.uuid.as_deref(), "member")?;
        let alias = match payload.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => {
                return Err(ShoalError::validation(format!(
                    "Membership member {} reports a uuid but no alias",
                    member.uri
                )));
            }
        };
        if inventory.instance(&alias).is_none() {
            return Err(ShoalError::validation(format!(
                "Instance {} is not in the inventory",
                alias
            )));
        }
        if !member.is_alive() {
            debug!(
                "instance {} is {}, not considering it",
                alias, member.status
            );
            continue;
        }

        let candidate = Candidate {
            alias,
            uri: member.uri.clone(),
            uuid,
        };
        if candidate.uuid.is_some() {
            joined.push(candidate);
        } else {
            unjoined.push(candidate);
        }
    }

    joined.sort_by(|a, b| (&a.alias, &a.uri).cmp(&(&b.alias, &b.uri)));
    unjoined.sort_by(|a, b| (&a.alias, &a.uri).cmp(&(&b.alias, &b.uri)));

    let mut best: Option<(u32, Candidate)> = None;
    for candidate in joined {
        let version = chan.get_twophase_version(&candidate.uri).await?;
        debug!(
            "instance {} runs two-phase commit version {}",
            candidate.alias, version
        );
        let better = match &best {
            None => true,
            Some((best_version, _)) => version < *best_version,
        };
        if better {
            best = Some((version, candidate));
        }
    }
    if let Some((_, winner)) = best {
        debug!("elected control instance {}", winner.alias);
        return Ok(winner.into_control());
    }

    if let Some(candidate) = unjoined
        .iter()
        .find(|candidate| {
            inventory
                .instance(&candidate.alias)
                .map(|instance| instance.replicaset.is_some())
                .unwrap_or(false)
        })
        .or_else(|| unjoined.first())
    {
        debug!("elected unjoined control instance {}", candidate.alias);
        return Ok(candidate.clone().into_control());
    }

    Err(ShoalError::validation(
        "No alive instance to act as coordinator",
    ))
}
