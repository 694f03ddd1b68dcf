//! `flowforge-core`: identifiers, error taxonomy and time source shared by
//! every FlowForge crate.
//!
//! This crate has no IO and no policy.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{InviteId, MembershipId, OrgId, UserId};
