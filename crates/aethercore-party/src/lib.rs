//! Ad-hoc parties layered over room membership.
//!
//! A party is a small cross-room group: invites, membership, and
//! leadership only. Chat and stat-sync broadcasts use the party scope
//! but are routed elsewhere; this crate owns the membership rules.
//!
//! One [`PartyManager`] lives in the server state behind a
//! `tokio::sync::Mutex` — the single writer for every party aggregate.

mod error;
mod manager;

pub use error::PartyError;
pub use manager::{
    AcceptOutcome, ForgetOutcome, LeaveOutcome, Party, PartyConfig,
    PartyManager, PendingInvite,
};
