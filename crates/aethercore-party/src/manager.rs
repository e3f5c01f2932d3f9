//! The party manager: invites, membership, leadership.
//!
//! Every method is synchronous; the caller holds the manager's mutex
//! for the duration of one operation and never across an await.
//!
//! Pending invites expire after a TTL. Expiry is enforced lazily (every
//! operation purges first) and by a periodic sweep the server runs, so
//! an invite can't be accepted late no matter which path touches it
//! first.

use std::collections::HashMap;
use std::time::Duration;

use aethercore_protocol::{PartyId, SessionId};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::PartyError;

/// Tunables for party behavior.
#[derive(Debug, Clone)]
pub struct PartyConfig {
    /// How long an invite stays answerable.
    pub invite_ttl: Duration,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            invite_ttl: Duration::from_secs(30),
        }
    }
}

/// One party. The leader is always a member.
#[derive(Debug, Clone, PartialEq)]
pub struct Party {
    pub id: PartyId,
    pub leader: SessionId,
    /// Join order; leadership transfers to the longest-standing member.
    pub members: Vec<SessionId>,
}

/// An unanswered invite, keyed by `(party_id, target)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInvite {
    pub party_id: PartyId,
    pub inviter: SessionId,
    pub target: SessionId,
    pub expires_at: Instant,
}

/// Result of accepting an invite.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOutcome {
    pub party: Party,
    pub inviter: SessionId,
    /// `true` when this acceptance created the party.
    pub created: bool,
}

/// Result of leaving (or being forgotten from) a party.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveOutcome {
    pub party_id: PartyId,
    pub remaining: Vec<SessionId>,
    /// Set when leadership moved because the leader left.
    pub new_leader: Option<SessionId>,
    pub dissolved: bool,
}

/// Result of the disconnect path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForgetOutcome {
    pub left: Option<LeaveOutcome>,
    /// Invites naming the session as target or inviter, now void.
    pub dropped_invites: Vec<PendingInvite>,
}

/// Owns every party and pending invite on the server.
#[derive(Debug, Default)]
pub struct PartyManager {
    parties: HashMap<PartyId, Party>,
    member_parties: HashMap<SessionId, PartyId>,
    invites: HashMap<(PartyId, SessionId), PendingInvite>,
    /// Party ids promised to inviters who aren't in a party yet, so
    /// repeated invites from the same inviter name the same party.
    reserved: HashMap<SessionId, PartyId>,
    next_party_id: u64,
    config: PartyConfig,
}

impl PartyManager {
    pub fn new(config: PartyConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Creates a pending invite from `inviter` to `target`.
    ///
    /// # Errors
    /// - [`PartyError::SelfInvite`] for self-targeted invites
    /// - [`PartyError::AlreadyInParty`] if the target is partied
    pub fn invite(
        &mut self,
        inviter: SessionId,
        target: SessionId,
    ) -> Result<PendingInvite, PartyError> {
        self.purge_expired();
        if inviter == target {
            return Err(PartyError::SelfInvite(inviter));
        }
        if self.member_parties.contains_key(&target) {
            return Err(PartyError::AlreadyInParty(target));
        }

        let party_id = self.party_id_for_inviter(inviter);
        let invite = PendingInvite {
            party_id,
            inviter,
            target,
            expires_at: Instant::now() + self.config.invite_ttl,
        };
        // A re-invite refreshes the TTL.
        self.invites.insert((party_id, target), invite.clone());
        debug!(%party_id, %inviter, %target, "party invite pending");
        Ok(invite)
    }

    /// Accepts a pending invite.
    ///
    /// The first acceptance creates the party with the inviter as
    /// leader; later ones just add the target.
    ///
    /// # Errors
    /// - [`PartyError::InviteNotFound`] if no live invite matches
    /// - [`PartyError::AlreadyInParty`] if the target joined another
    ///   party since being invited
    pub fn accept(
        &mut self,
        target: SessionId,
        party_id: PartyId,
    ) -> Result<AcceptOutcome, PartyError> {
        self.purge_expired();
        if self.member_parties.contains_key(&target) {
            return Err(PartyError::AlreadyInParty(target));
        }
        let invite = self
            .invites
            .remove(&(party_id, target))
            .ok_or(PartyError::InviteNotFound(party_id))?;

        let created = !self.parties.contains_key(&party_id);
        let party = self.parties.entry(party_id).or_insert_with(|| {
            info!(%party_id, leader = %invite.inviter, "party created");
            Party {
                id: party_id,
                leader: invite.inviter,
                members: vec![invite.inviter],
            }
        });
        party.members.push(target);
        let snapshot = party.clone();

        self.member_parties.insert(target, party_id);
        if created {
            self.member_parties.insert(invite.inviter, party_id);
            self.reserved.remove(&invite.inviter);
        }
        // Any other invite targeting this session is moot now.
        self.invites.retain(|_, i| i.target != target);

        Ok(AcceptOutcome {
            party: snapshot,
            inviter: invite.inviter,
            created,
        })
    }

    /// Declines a pending invite, returning it so the caller can notify
    /// the inviter.
    pub fn decline(
        &mut self,
        target: SessionId,
        party_id: PartyId,
    ) -> Result<PendingInvite, PartyError> {
        self.purge_expired();
        self.invites
            .remove(&(party_id, target))
            .ok_or(PartyError::InviteNotFound(party_id))
    }

    /// Removes a session from its party, if it has one.
    ///
    /// Transfers leadership when the leader leaves and dissolves the
    /// party when the last member is gone.
    pub fn leave(&mut self, session_id: SessionId) -> Option<LeaveOutcome> {
        let party_id = self.member_parties.remove(&session_id)?;
        let party = self
            .parties
            .get_mut(&party_id)
            .expect("member pointer without party");
        party.members.retain(|&m| m != session_id);

        if party.members.is_empty() {
            self.parties.remove(&party_id);
            info!(%party_id, "party dissolved");
            return Some(LeaveOutcome {
                party_id,
                remaining: Vec::new(),
                new_leader: None,
                dissolved: true,
            });
        }

        let new_leader = if party.leader == session_id {
            party.leader = party.members[0];
            Some(party.leader)
        } else {
            None
        };
        Some(LeaveOutcome {
            party_id,
            remaining: party.members.clone(),
            new_leader,
            dissolved: false,
        })
    }

    /// Disconnect path: drops membership and every invite naming the
    /// session as target or inviter.
    pub fn forget(&mut self, session_id: SessionId) -> ForgetOutcome {
        let left = self.leave(session_id);
        self.reserved.remove(&session_id);

        let mut dropped = Vec::new();
        self.invites.retain(|_, invite| {
            if invite.target == session_id || invite.inviter == session_id {
                dropped.push(invite.clone());
                false
            } else {
                true
            }
        });
        ForgetOutcome {
            left,
            dropped_invites: dropped,
        }
    }

    /// Removes expired invites, returning them so the periodic sweep
    /// can notify inviters.
    pub fn purge_expired(&mut self) -> Vec<PendingInvite> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.invites.retain(|_, invite| {
            if invite.expires_at <= now {
                expired.push(invite.clone());
                false
            } else {
                true
            }
        });
        for invite in &expired {
            debug!(party_id = %invite.party_id, target = %invite.target, "invite expired");
        }
        expired
    }

    /// The party a session belongs to, if any.
    pub fn party_of(&self, session_id: SessionId) -> Option<&Party> {
        let party_id = self.member_parties.get(&session_id)?;
        self.parties.get(party_id)
    }

    /// The party id an invite from this session names: the inviter's
    /// current party, their reservation, or a freshly minted id.
    fn party_id_for_inviter(&mut self, inviter: SessionId) -> PartyId {
        if let Some(&id) = self.member_parties.get(&inviter) {
            return id;
        }
        if let Some(&id) = self.reserved.get(&inviter) {
            return id;
        }
        self.next_party_id += 1;
        let id = PartyId(self.next_party_id);
        self.reserved.insert(inviter, id);
        id
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(id: u64) -> SessionId {
        SessionId(id)
    }

    fn manager() -> PartyManager {
        PartyManager::new(PartyConfig::default())
    }

    /// A two-member party (1 leads, 2 joined), returning the party id.
    fn duo(manager: &mut PartyManager) -> PartyId {
        let invite = manager.invite(sid(1), sid(2)).unwrap();
        manager.accept(sid(2), invite.party_id).unwrap();
        invite.party_id
    }

    #[test]
    fn test_invite_self_is_rejected() {
        let mut manager = manager();
        let result = manager.invite(sid(1), sid(1));
        assert!(matches!(result, Err(PartyError::SelfInvite(_))));
    }

    #[test]
    fn test_invite_partied_target_is_rejected() {
        let mut manager = manager();
        duo(&mut manager);
        let result = manager.invite(sid(3), sid(2));
        assert!(matches!(result, Err(PartyError::AlreadyInParty(_))));
    }

    #[test]
    fn test_repeat_invites_reuse_reserved_party_id() {
        let mut manager = manager();
        let first = manager.invite(sid(1), sid(2)).unwrap();
        let second = manager.invite(sid(1), sid(3)).unwrap();
        assert_eq!(first.party_id, second.party_id);
    }

    #[test]
    fn test_accept_creates_party_with_inviter_as_leader() {
        let mut manager = manager();
        let invite = manager.invite(sid(1), sid(2)).unwrap();
        let outcome = manager.accept(sid(2), invite.party_id).unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.party.leader, sid(1));
        assert_eq!(outcome.party.members, vec![sid(1), sid(2)]);
        assert_eq!(manager.party_of(sid(1)).unwrap().id, invite.party_id);
    }

    #[test]
    fn test_second_accept_joins_existing_party() {
        let mut manager = manager();
        let party_id = duo(&mut manager);
        let invite = manager.invite(sid(1), sid(3)).unwrap();
        assert_eq!(invite.party_id, party_id);

        let outcome = manager.accept(sid(3), party_id).unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.party.members, vec![sid(1), sid(2), sid(3)]);
    }

    #[test]
    fn test_accept_without_invite_is_not_found() {
        let mut manager = manager();
        let result = manager.accept(sid(2), PartyId(99));
        assert!(matches!(result, Err(PartyError::InviteNotFound(_))));
    }

    #[test]
    fn test_accept_consumes_competing_invites() {
        let mut manager = manager();
        let from_one = manager.invite(sid(1), sid(3)).unwrap();
        let from_two = manager.invite(sid(2), sid(3)).unwrap();

        manager.accept(sid(3), from_one.party_id).unwrap();
        let result = manager.decline(sid(3), from_two.party_id);
        assert!(matches!(result, Err(PartyError::InviteNotFound(_))));
    }

    #[test]
    fn test_decline_removes_invite_and_returns_it() {
        let mut manager = manager();
        let invite = manager.invite(sid(1), sid(2)).unwrap();
        let declined = manager.decline(sid(2), invite.party_id).unwrap();
        assert_eq!(declined.inviter, sid(1));

        let again = manager.decline(sid(2), invite.party_id);
        assert!(matches!(again, Err(PartyError::InviteNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_invite_cannot_be_accepted() {
        let mut manager = manager();
        let invite = manager.invite(sid(1), sid(2)).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        let result = manager.accept(sid(2), invite.party_id);
        assert!(matches!(result, Err(PartyError::InviteNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_returns_expired_invites() {
        let mut manager = manager();
        manager.invite(sid(1), sid(2)).unwrap();

        assert!(manager.purge_expired().is_empty());
        tokio::time::advance(Duration::from_secs(31)).await;
        let expired = manager.purge_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].target, sid(2));
    }

    #[test]
    fn test_leader_leaving_transfers_leadership() {
        let mut manager = manager();
        let party_id = duo(&mut manager);
        let invite = manager.invite(sid(1), sid(3)).unwrap();
        manager.accept(sid(3), invite.party_id).unwrap();

        let outcome = manager.leave(sid(1)).unwrap();
        assert_eq!(outcome.party_id, party_id);
        assert_eq!(outcome.new_leader, Some(sid(2)));
        assert_eq!(outcome.remaining, vec![sid(2), sid(3)]);
        assert!(!outcome.dissolved);
    }

    #[test]
    fn test_last_member_leaving_dissolves_party() {
        let mut manager = manager();
        duo(&mut manager);
        manager.leave(sid(1)).unwrap();

        let outcome = manager.leave(sid(2)).unwrap();
        assert!(outcome.dissolved);
        assert!(manager.party_of(sid(2)).is_none());
    }

    #[test]
    fn test_leave_without_party_is_none() {
        let mut manager = manager();
        assert!(manager.leave(sid(7)).is_none());
    }

    #[test]
    fn test_forget_target_drops_their_pending_invites() {
        let mut manager = manager();
        let invite = manager.invite(sid(1), sid(2)).unwrap();

        let outcome = manager.forget(sid(2));
        assert!(outcome.left.is_none());
        assert_eq!(outcome.dropped_invites.len(), 1);

        // The invite is gone: accepting after a reconnect must fail.
        let result = manager.accept(sid(2), invite.party_id);
        assert!(matches!(result, Err(PartyError::InviteNotFound(_))));
    }

    #[test]
    fn test_forget_inviter_drops_outbound_invites_and_membership() {
        let mut manager = manager();
        duo(&mut manager);
        manager.invite(sid(1), sid(3)).unwrap();

        let outcome = manager.forget(sid(1));
        assert_eq!(outcome.dropped_invites.len(), 1);
        let left = outcome.left.unwrap();
        assert_eq!(left.new_leader, Some(sid(2)));
    }
}
