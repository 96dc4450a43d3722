//! Scan outcomes and their payloads.
//!
//! Rejections are ordinary values, not errors: a scan that is refused at the
//! gate is an expected business result. Only storage failures travel through
//! `Result::Err`.

use crate::types::{GroupId, GroupSnapshot, Role, Ticket, TicketCode, TicketId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Who a group is, as shown to the gate operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupIdentity {
    /// Group ID
    pub group_id: GroupId,
    /// Primary ticket code
    pub primary_code: TicketCode,
    /// Primary registrant's name
    pub primary_name: String,
}

impl GroupIdentity {
    /// Identity of the group in `snapshot`.
    #[must_use]
    pub fn of(snapshot: &GroupSnapshot) -> Self {
        Self {
            group_id: snapshot.group.id,
            primary_code: snapshot.group.primary_code.clone(),
            primary_name: snapshot
                .primary()
                .map(|t| t.full_name.clone())
                .unwrap_or_default(),
        }
    }
}

/// One member of a group with their entry status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberView {
    /// Ticket ID
    pub ticket_id: TicketId,
    /// Ticket code
    pub code: TicketCode,
    /// Full name
    pub full_name: String,
    /// Primary or companion
    pub role: Role,
    /// Relationship to the primary
    pub relationship: Option<String>,
    /// Whether marked as entered
    pub admitted: bool,
    /// When marked as entered
    pub admitted_at: Option<DateTime<Utc>>,
}

impl From<&Ticket> for MemberView {
    fn from(ticket: &Ticket) -> Self {
        Self {
            ticket_id: ticket.id,
            code: ticket.code.clone(),
            full_name: ticket.full_name.clone(),
            role: ticket.role,
            relationship: ticket.relationship.clone(),
            admitted: ticket.admitted,
            admitted_at: ticket.admitted_at,
        }
    }
}

/// Payload of a granted admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admitted {
    /// Group identity
    pub group: GroupIdentity,
    /// The member marked as entered by this scan
    pub member: MemberView,
    /// Admissions granted including this one
    pub consumed: u32,
    /// Group capacity
    pub capacity: u32,
    /// `capacity - consumed`
    pub remaining: u32,
    /// Days with an admission, including today
    pub admitted_days: BTreeSet<NaiveDate>,
    /// Days the group registered for
    pub eligible_days: BTreeSet<NaiveDate>,
    /// Event-local date of the scan
    pub today: NaiveDate,
    /// Full roster after the commit
    pub members: Vec<MemberView>,
}

/// Payload of a scan refused because the group already entered today.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlreadyAdmittedToday {
    /// Group identity
    pub group: GroupIdentity,
    /// Days with an admission
    pub admitted_days: BTreeSet<NaiveDate>,
    /// Event-local date of the scan
    pub today: NaiveDate,
}

/// Payload of a scan refused because the group used all its capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtCapacity {
    /// Group identity
    pub group: GroupIdentity,
    /// Admissions granted
    pub consumed: u32,
    /// Group capacity
    pub capacity: u32,
    /// Always zero
    pub remaining: u32,
}

/// Payload of a scan refused because today is not a registered day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotEligibleToday {
    /// Group identity
    pub group: GroupIdentity,
    /// Days the group registered for
    pub eligible_days: BTreeSet<NaiveDate>,
    /// Event-local date of the scan
    pub today: NaiveDate,
}

/// Terminal outcome of one scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// One admission granted
    Admitted(Admitted),
    /// The group already entered today
    AlreadyAdmittedToday(AlreadyAdmittedToday),
    /// The group has no capacity left
    AtCapacity(AtCapacity),
    /// Today is not one of the group's days
    NotEligibleToday(NotEligibleToday),
    /// The code does not belong to any ticket
    Invalid {
        /// The scanned code
        code: String,
    },
}

impl Outcome {
    /// Stable label used in logs, metrics and the HTTP `status` field.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Admitted(_) => "admitted",
            Self::AlreadyAdmittedToday(_) => "already_admitted_today",
            Self::AtCapacity(_) => "at_capacity",
            Self::NotEligibleToday(_) => "not_eligible_today",
            Self::Invalid { .. } => "invalid",
        }
    }

    /// Whether the scan let someone in
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Result of the bookkeeping run when a scan hits a full group: members not
/// yet individually marked are marked as entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityCleanup {
    /// Members marked by this cleanup run (zero when already clean)
    pub newly_marked: usize,
}

/// What `verify` returns: the decision outcome plus any side effect it ran.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// The scan outcome
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Set when an `AtCapacity` scan ran the member cleanup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CapacityCleanup>,
}

impl Verification {
    /// An outcome with no side effect.
    #[must_use]
    pub const fn plain(outcome: Outcome) -> Self {
        Self {
            outcome,
            cleanup: None,
        }
    }
}

/// Result of an administrative manual entry mark.
///
/// The ticket is marked as entered but the group's counters are untouched:
/// no capacity is consumed and no day is recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualMark {
    /// The ticket after marking
    pub ticket: Ticket,
    /// Group counters, unchanged by the mark
    pub group_consumed: u32,
    /// Group capacity
    pub group_capacity: u32,
    /// Group admission days, unchanged by the mark
    pub group_admitted_days: BTreeSet<NaiveDate>,
}
