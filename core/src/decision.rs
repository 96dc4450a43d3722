//! The admission decision.
//!
//! [`decide`] is the functional core of a scan: it reads a [`GroupSnapshot`]
//! and returns what should happen. It performs no I/O. The runtime executes
//! the returned [`Decision`] (commit, cleanup, or plain rejection) and
//! re-runs `decide` on fresh state whenever a commit loses a race.
//!
//! Rules are evaluated in a fixed order; each is exclusive of the ones before:
//!
//! ```text
//! eligible_days non-empty and today ∉ eligible_days  → NotEligibleToday
//! today ∈ admitted_days                              → AlreadyAdmittedToday
//! consumed >= capacity                               → AtCapacity
//! otherwise                                          → Admit { member }
//! ```

use crate::types::{GroupSnapshot, TicketId};
use chrono::NaiveDate;

/// What a scan should do to a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Today is not one of the group's registered days
    NotEligibleToday,
    /// The group already used its admission for today
    AlreadyAdmittedToday,
    /// Every unit of capacity has been consumed
    AtCapacity,
    /// Commit one admission and mark `member` as entered
    Admit {
        /// Member to mark as physically entered
        member: TicketId,
    },
}

impl Decision {
    /// Whether this decision consumes capacity
    #[must_use]
    pub const fn is_admit(&self) -> bool {
        matches!(self, Self::Admit { .. })
    }
}

/// Decide the outcome of a scan on `today` against `snapshot`.
///
/// The member to mark is the first member in group order not yet marked as
/// entered. If every member is already marked (possible after manual
/// overrides) the primary is marked again; capacity and the day rule have
/// already guaranteed room for one more admission.
#[must_use]
pub fn decide(snapshot: &GroupSnapshot, today: NaiveDate) -> Decision {
    let group = &snapshot.group;

    if !group.is_eligible_on(today) {
        return Decision::NotEligibleToday;
    }

    if group.admitted_on(today) {
        return Decision::AlreadyAdmittedToday;
    }

    if group.is_exhausted() {
        return Decision::AtCapacity;
    }

    let member = snapshot
        .pending_members()
        .next()
        .map_or(group.primary_ticket, |t| t.id);

    Decision::Admit { member }
}
