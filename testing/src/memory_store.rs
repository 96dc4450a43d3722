//! In-memory [`GroupStore`] with a per-group serialization point.
//!
//! The code/ticket index sits behind one `RwLock` that is only held long
//! enough to find a group. Each group lives behind its own `Mutex`, held
//! across the version check and the mutation of a commit, so scans of
//! different groups never wait on each other.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use gatepass_core::store::{AdmissionCommit, GroupStore, NewGroup, StoreError};
use gatepass_core::types::{GroupId, GroupSnapshot, Ticket, TicketId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

type GroupRecord = Arc<Mutex<GroupSnapshot>>;

#[derive(Default)]
struct Index {
    by_code: HashMap<String, GroupId>,
    by_ticket: HashMap<TicketId, GroupId>,
    emails: HashSet<String>,
    groups: HashMap<GroupId, GroupRecord>,
}

/// Group store kept in process memory.
///
/// Usable as the production store of a single gate server, and as the
/// deterministic store in tests. Test hooks can inject commit conflicts,
/// simulate an outage, or widen the read-to-commit race window.
#[derive(Default)]
pub struct InMemoryGroupStore {
    index: RwLock<Index>,
    injected_conflicts: AtomicUsize,
    unavailable: AtomicBool,
    fail_member_marks: AtomicBool,
    read_delay: Option<Duration>,
}

impl InMemoryGroupStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep after every snapshot read, so concurrent scans are more likely
    /// to decide on the same version and race on commit.
    #[must_use]
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Make the next `count` admission commits fail with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Simulate a storage outage (every call fails with `Unavailable`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make `mark_members_admitted` fail with `Unavailable` while every
    /// other call keeps working.
    pub fn fail_member_marks(&self, fail: bool) {
        self.fail_member_marks.store(fail, Ordering::SeqCst);
    }

    /// Number of registered groups
    pub async fn group_count(&self) -> usize {
        self.index.read().await.groups.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn record(&self, group_id: GroupId) -> Result<GroupRecord, StoreError> {
        self.index
            .read()
            .await
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("group {group_id}")))
    }

    async fn record_for_ticket(&self, ticket_id: TicketId) -> Result<GroupRecord, StoreError> {
        let group_id = self
            .index
            .read()
            .await
            .by_ticket
            .get(&ticket_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("ticket {ticket_id}")))?;
        self.record(group_id).await
    }
}

impl GroupStore for InMemoryGroupStore {
    fn resolve_group<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<GroupSnapshot, StoreError>> {
        Box::pin(async move {
            self.check_available()?;
            let group_id = self
                .index
                .read()
                .await
                .by_code
                .get(code)
                .copied()
                .ok_or_else(|| StoreError::NotFound(format!("code {code}")))?;
            let snapshot = self.record(group_id).await?.lock().await.clone();

            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(snapshot)
        })
    }

    fn members(&self, group_id: GroupId) -> BoxFuture<'_, Result<Vec<Ticket>, StoreError>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.record(group_id).await?.lock().await.members.clone())
        })
    }

    fn commit_admission(
        &self,
        commit: AdmissionCommit,
    ) -> BoxFuture<'_, Result<GroupSnapshot, StoreError>> {
        Box::pin(async move {
            self.check_available()?;
            let record = self.record(commit.group_id).await?;
            let mut snapshot = record.lock().await;

            let conflict = StoreError::Conflict {
                group_id: commit.group_id,
                expected: commit.expected_version,
                actual: snapshot.group.version,
            };
            if self.take_injected_conflict() || snapshot.group.version != commit.expected_version {
                return Err(conflict);
            }

            let position = snapshot
                .members
                .iter()
                .position(|t| t.id == commit.member)
                .ok_or_else(|| StoreError::NotFound(format!("ticket {}", commit.member)))?;

            // Member looked up before the group is touched: all or nothing
            snapshot
                .group
                .record_admission(commit.day)
                .map_err(|_| conflict)?;
            snapshot.members[position].mark_admitted(commit.at);

            tracing::debug!(
                group_id = %commit.group_id,
                version = snapshot.group.version,
                day = %commit.day,
                "Admission committed"
            );
            Ok(snapshot.clone())
        })
    }

    fn create_group(&self, new: NewGroup) -> BoxFuture<'_, Result<GroupSnapshot, StoreError>> {
        Box::pin(async move {
            self.check_available()?;
            let mut index = self.index.write().await;

            let mut codes = HashSet::new();
            for ticket in &new.tickets {
                let code = ticket.code.as_str();
                if index.by_code.contains_key(code) || !codes.insert(code) {
                    return Err(StoreError::DuplicateCode(code.to_string()));
                }
                if let Some(email) = &ticket.email {
                    if index.emails.contains(email) {
                        return Err(StoreError::DuplicateEmail(email.clone()));
                    }
                }
            }

            let group_id = new.group.id;
            for ticket in &new.tickets {
                index.by_code.insert(ticket.code.as_str().to_string(), group_id);
                index.by_ticket.insert(ticket.id, group_id);
                if let Some(email) = &ticket.email {
                    index.emails.insert(email.clone());
                }
            }

            let mut members = new.tickets;
            members.sort_by_key(|t| t.position);
            let snapshot = GroupSnapshot {
                group: new.group,
                members,
            };
            index
                .groups
                .insert(group_id, Arc::new(Mutex::new(snapshot.clone())));
            Ok(snapshot)
        })
    }

    fn mark_members_admitted(
        &self,
        group_id: GroupId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            self.check_available()?;
            if self.fail_member_marks.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("member marks rejected".to_string()));
            }
            let record = self.record(group_id).await?;
            let mut snapshot = record.lock().await;
            let mut marked = 0;
            for ticket in snapshot.members.iter_mut().filter(|t| !t.admitted) {
                ticket.mark_admitted(at);
                marked += 1;
            }
            Ok(marked)
        })
    }

    fn force_mark_ticket(
        &self,
        ticket_id: TicketId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Ticket, StoreError>> {
        Box::pin(async move {
            self.check_available()?;
            let record = self.record_for_ticket(ticket_id).await?;
            let mut snapshot = record.lock().await;
            let ticket = snapshot
                .members
                .iter_mut()
                .find(|t| t.id == ticket_id)
                .ok_or_else(|| StoreError::NotFound(format!("ticket {ticket_id}")))?;
            ticket.mark_admitted(at);
            Ok(ticket.clone())
        })
    }

    fn ticket(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Ticket, StoreError>> {
        Box::pin(async move {
            self.check_available()?;
            let record = self.record_for_ticket(ticket_id).await?;
            let snapshot = record.lock().await;
            snapshot
                .member(ticket_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("ticket {ticket_id}")))
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { self.check_available() })
    }
}
