//! Group store trait and related types.
//!
//! The store is the persistence seam for admission groups. It is deliberately
//! narrow: lookups, one conditional admission commit, group creation and two
//! bookkeeping writes on individual tickets.
//!
//! # Optimistic Concurrency
//!
//! [`GroupStore::commit_admission`] carries the `version` of the snapshot the
//! decision was computed on. The store must apply the commit as one
//! indivisible operation and only if the group is still at that version;
//! otherwise it returns [`StoreError::Conflict`] and the caller recomputes the
//! whole decision on fresh state.
//!
//! # Implementations
//!
//! - `PostgresGroupStore` (in `gatepass-postgres`): row lock + version check
//!   inside one transaction
//! - `InMemoryGroupStore` (in `gatepass-testing`): per-group mutex
//!
//! # Dyn Compatibility
//!
//! Methods return `BoxFuture` instead of using `async fn` so the engine can
//! hold an `Arc<dyn GroupStore>`.

use crate::types::{Group, GroupId, GroupSnapshot, Ticket, TicketId};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors that can occur during group store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No ticket or group matches the lookup.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The group changed since the snapshot the commit was based on.
    ///
    /// Transient: the caller must re-read and re-decide, not just re-write.
    #[error("Concurrency conflict on group {group_id}: expected version {expected}, found {actual}")]
    Conflict {
        /// Group being committed
        group_id: GroupId,
        /// Version the decision was computed on
        expected: u64,
        /// Version found in the store
        actual: u64,
    },

    /// A generated ticket code is already taken.
    #[error("Ticket code already issued: {0}")]
    DuplicateCode(String),

    /// The email is already registered on another ticket.
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// Storage could not be reached or returned an unusable result.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the operation may succeed if recomputed on fresh state.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// One admission to apply atomically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionCommit {
    /// Group to admit
    pub group_id: GroupId,
    /// Group version the decision was computed on
    pub expected_version: u64,
    /// Event-local day of the admission
    pub day: NaiveDate,
    /// Member to mark as entered
    pub member: TicketId,
    /// Timestamp recorded on the member
    pub at: DateTime<Utc>,
}

/// A fully built group ready for insertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewGroup {
    /// Group with zeroed counters
    pub group: Group,
    /// Primary first, then companions in creation order
    pub tickets: Vec<Ticket>,
}

/// Persistence abstraction for admission groups.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares one store across
/// all concurrent scans. Scans of *different* groups must not contend.
pub trait GroupStore: Send + Sync {
    /// Resolve any ticket code (primary or companion) to its group's state.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if no ticket has this code
    /// - [`StoreError::Unavailable`] on storage failure
    fn resolve_group<'a>(&'a self, code: &'a str)
    -> BoxFuture<'a, Result<GroupSnapshot, StoreError>>;

    /// Members of a group: primary first, then companions in creation order.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the group does not exist
    /// - [`StoreError::Unavailable`] on storage failure
    fn members(&self, group_id: GroupId) -> BoxFuture<'_, Result<Vec<Ticket>, StoreError>>;

    /// Apply one admission as an indivisible operation: increment `consumed`,
    /// add the day to `admitted_days`, bump `version`, and mark the member.
    ///
    /// Returns the group state after the commit.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if the group is no longer at
    ///   `expected_version`, or the commit would break a group invariant
    /// - [`StoreError::NotFound`] if the group or member does not exist
    /// - [`StoreError::Unavailable`] on storage failure
    fn commit_admission(
        &self,
        commit: AdmissionCommit,
    ) -> BoxFuture<'_, Result<GroupSnapshot, StoreError>>;

    /// Insert a group and all of its tickets, all or nothing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateCode`] if any ticket code is taken
    /// - [`StoreError::DuplicateEmail`] if any email is taken
    /// - [`StoreError::Unavailable`] on storage failure
    fn create_group(&self, group: NewGroup) -> BoxFuture<'_, Result<GroupSnapshot, StoreError>>;

    /// Mark every member not yet marked as entered. Group counters are not
    /// touched. Returns how many members were newly marked.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the group does not exist
    /// - [`StoreError::Unavailable`] on storage failure
    fn mark_members_admitted(
        &self,
        group_id: GroupId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<usize, StoreError>>;

    /// Mark one ticket as entered without touching its group's counters.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the ticket does not exist
    /// - [`StoreError::Unavailable`] on storage failure
    fn force_mark_ticket(
        &self,
        ticket_id: TicketId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Ticket, StoreError>>;

    /// Load one ticket.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the ticket does not exist
    /// - [`StoreError::Unavailable`] on storage failure
    fn ticket(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Ticket, StoreError>>;

    /// Check that storage is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if it is not.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}
