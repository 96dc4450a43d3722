//! The gate verification engine.
//!
//! [`GateEngine::verify`] runs one scan to a terminal outcome:
//!
//! 1. resolve the code to a fresh [`GroupSnapshot`]
//! 2. derive today from `now` in the event time zone
//! 3. [`decide`] on the snapshot
//! 4. execute the decision: commit an admission, run the capacity cleanup,
//!    or report a rejection
//!
//! A commit that loses an optimistic-concurrency race comes back as
//! [`StoreError::Conflict`]; the engine then re-runs steps 1-4 on fresh state
//! under the configured [`RetryPolicy`]. Running out of attempts escalates to
//! [`GateError::StorageUnavailable`].

use crate::error::GateError;
use crate::health::{HealthCheck, HealthReport};
use crate::metrics::GateMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, NaiveDate, Utc};
use gatepass_core::calendar::EventCalendar;
use gatepass_core::decision::{Decision, decide};
use gatepass_core::outcome::{
    Admitted, AlreadyAdmittedToday, AtCapacity, CapacityCleanup, GroupIdentity, ManualMark,
    MemberView, NotEligibleToday, Outcome, Verification,
};
use gatepass_core::registration::{Registration, RegistrationError, RegistrationPolicy};
use gatepass_core::store::{AdmissionCommit, GroupStore, StoreError};
use gatepass_core::types::{GroupSnapshot, Ticket, TicketId};
use std::sync::Arc;
use std::time::Instant;

/// Attempts at issuing a unique set of ticket codes for one registration.
const MAX_CODE_ATTEMPTS: u32 = 5;

/// Admission control over a shared [`GroupStore`].
///
/// Cheap to share: wrap in an `Arc` and call from any number of tasks.
pub struct GateEngine {
    store: Arc<dyn GroupStore>,
    calendar: EventCalendar,
    registration: RegistrationPolicy,
    retry: RetryPolicy,
    capacity_cleanup: bool,
}

impl GateEngine {
    /// Engine over `store` for an event following `calendar`.
    ///
    /// Registration uses the default policy bound to the same calendar;
    /// capacity cleanup is enabled.
    #[must_use]
    pub fn new(store: Arc<dyn GroupStore>, calendar: EventCalendar) -> Self {
        let registration = RegistrationPolicy {
            calendar: calendar.clone(),
            ..RegistrationPolicy::default()
        };
        Self {
            store,
            calendar,
            registration,
            retry: RetryPolicy::default(),
            capacity_cleanup: true,
        }
    }

    /// Set the retry policy for lost commit races.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the registration policy. Its calendar is replaced by the engine's.
    #[must_use]
    pub fn with_registration_policy(mut self, policy: RegistrationPolicy) -> Self {
        self.registration = RegistrationPolicy {
            calendar: self.calendar.clone(),
            ..policy
        };
        self
    }

    /// Enable or disable marking all members entered when a group is full.
    #[must_use]
    pub const fn with_capacity_cleanup(mut self, enabled: bool) -> Self {
        self.capacity_cleanup = enabled;
        self
    }

    /// The event calendar
    #[must_use]
    pub const fn calendar(&self) -> &EventCalendar {
        &self.calendar
    }

    /// Event-local date of `now`
    #[must_use]
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.calendar.today(now)
    }

    // ========================================================================
    // Scans
    // ========================================================================

    /// Run one scan of `code` at `now` to its terminal outcome.
    ///
    /// Rejections (`Invalid`, `NotEligibleToday`, `AlreadyAdmittedToday`,
    /// `AtCapacity`) are `Ok` outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::StorageUnavailable`] when storage fails or when
    /// every attempt lost its commit race.
    pub async fn verify(&self, code: &str, now: DateTime<Utc>) -> Result<Verification, GateError> {
        let started = Instant::now();
        let code = code.trim();

        let result = if code.is_empty() {
            Ok(Verification::plain(Outcome::Invalid {
                code: String::new(),
            }))
        } else {
            let today = self.calendar.today(now);
            let mut attempts = 0u32;
            let result = retry_with_predicate(
                &self.retry,
                || {
                    attempts += 1;
                    self.attempt(code, today, now)
                },
                StoreError::is_conflict,
            )
            .await;
            result.map_err(|err| Self::storage_failure(code, attempts, err))
        };

        match &result {
            Ok(verification) => {
                let outcome = &verification.outcome;
                tracing::info!(code, outcome = outcome.label(), "Scan verified");
                GateMetrics::record_scan(outcome.label(), started.elapsed());
            }
            Err(_) => GateMetrics::record_scan("error", started.elapsed()),
        }
        result
    }

    /// One pass of resolve, decide, execute.
    async fn attempt(
        &self,
        code: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Verification, StoreError> {
        let snapshot = match self.store.resolve_group(code).await {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound(_)) => {
                return Ok(Verification::plain(Outcome::Invalid {
                    code: code.to_string(),
                }));
            }
            Err(err) => return Err(err),
        };

        let group = GroupIdentity::of(&snapshot);
        match decide(&snapshot, today) {
            Decision::NotEligibleToday => Ok(Verification::plain(Outcome::NotEligibleToday(
                NotEligibleToday {
                    group,
                    eligible_days: snapshot.group.eligible_days,
                    today,
                },
            ))),
            Decision::AlreadyAdmittedToday => Ok(Verification::plain(
                Outcome::AlreadyAdmittedToday(AlreadyAdmittedToday {
                    group,
                    admitted_days: snapshot.group.admitted_days,
                    today,
                }),
            )),
            Decision::AtCapacity => {
                let cleanup = self.capacity_cleanup(&snapshot, now).await;
                Ok(Verification {
                    outcome: Outcome::AtCapacity(AtCapacity {
                        group,
                        consumed: snapshot.group.consumed,
                        capacity: snapshot.group.capacity,
                        remaining: snapshot.group.remaining(),
                    }),
                    cleanup,
                })
            }
            Decision::Admit { member } => {
                let commit = AdmissionCommit {
                    group_id: snapshot.group.id,
                    expected_version: snapshot.group.version,
                    day: today,
                    member,
                    at: now,
                };
                let after = self.store.commit_admission(commit).await.inspect_err(|err| {
                    if err.is_conflict() {
                        GateMetrics::record_conflict();
                        tracing::warn!(
                            code,
                            error = %err,
                            "Admission commit lost a race, retrying"
                        );
                    }
                })?;
                admitted(&after, member, today).map(Verification::plain)
            }
        }
    }

    /// Mark every member of a full group as entered. Failure is logged and
    /// does not change the scan outcome.
    async fn capacity_cleanup(
        &self,
        snapshot: &GroupSnapshot,
        now: DateTime<Utc>,
    ) -> Option<CapacityCleanup> {
        if !self.capacity_cleanup {
            return None;
        }
        if snapshot.pending_members().next().is_none() {
            return Some(CapacityCleanup { newly_marked: 0 });
        }

        match self.store.mark_members_admitted(snapshot.group.id, now).await {
            Ok(newly_marked) => {
                tracing::debug!(
                    group_id = %snapshot.group.id,
                    newly_marked,
                    "Marked remaining members of a full group"
                );
                Some(CapacityCleanup { newly_marked })
            }
            Err(err) => {
                tracing::warn!(
                    group_id = %snapshot.group.id,
                    error = %err,
                    "Capacity cleanup failed"
                );
                None
            }
        }
    }

    fn storage_failure(subject: &str, attempts: u32, err: StoreError) -> GateError {
        GateMetrics::record_storage_failure();
        let reason = match err {
            StoreError::Conflict { .. } => "admission contention did not settle".to_string(),
            other => other.to_string(),
        };
        tracing::error!(subject, attempts, reason = %reason, "Storage unavailable");
        GateError::StorageUnavailable { attempts, reason }
    }

    // ========================================================================
    // Registration and administration
    // ========================================================================

    /// Register a primary and companions as one group.
    ///
    /// Ticket code collisions are retried with fresh codes.
    ///
    /// # Errors
    ///
    /// Returns a validation error, [`RegistrationError::DuplicateEmail`] when
    /// an email is taken, [`RegistrationError::CodeSpaceExhausted`] when no
    /// unique codes could be issued, or [`RegistrationError::Storage`].
    pub async fn create_group(
        &self,
        registration: &Registration,
        now: DateTime<Utc>,
    ) -> Result<GroupSnapshot, RegistrationError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let new = {
                let mut rng = rand::thread_rng();
                self.registration.build_group(registration, now, &mut rng)?
            };

            match self.store.create_group(new).await {
                Ok(snapshot) => {
                    GateMetrics::record_registration();
                    tracing::info!(
                        group_id = %snapshot.group.id,
                        primary_code = %snapshot.group.primary_code,
                        capacity = snapshot.group.capacity,
                        "Group registered"
                    );
                    return Ok(snapshot);
                }
                Err(StoreError::DuplicateCode(code)) => {
                    tracing::debug!(attempt, code, "Ticket code collision, reissuing");
                }
                Err(StoreError::DuplicateEmail(email)) => {
                    return Err(RegistrationError::DuplicateEmail(email));
                }
                Err(err) => return Err(RegistrationError::Storage(err)),
            }
        }

        Err(RegistrationError::CodeSpaceExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }

    /// Mark one ticket as entered without consuming group capacity.
    ///
    /// The returned [`ManualMark`] carries the group counters, which this
    /// operation never changes.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::TicketNotFound`] or
    /// [`GateError::StorageUnavailable`].
    pub async fn force_mark_individual(
        &self,
        ticket_id: TicketId,
        now: DateTime<Utc>,
    ) -> Result<ManualMark, GateError> {
        let not_found = |err: StoreError| match err {
            StoreError::NotFound(_) => GateError::TicketNotFound(ticket_id),
            other => Self::storage_failure(&ticket_id.to_string(), 1, other),
        };

        let ticket = self
            .store
            .force_mark_ticket(ticket_id, now)
            .await
            .map_err(not_found)?;
        let snapshot = self
            .store
            .resolve_group(ticket.code.as_str())
            .await
            .map_err(not_found)?;

        GateMetrics::record_manual_mark();
        tracing::warn!(
            ticket_id = %ticket_id,
            group_id = %snapshot.group.id,
            consumed = snapshot.group.consumed,
            "Manual entry mark; group capacity untouched"
        );

        Ok(ManualMark {
            ticket,
            group_consumed: snapshot.group.consumed,
            group_capacity: snapshot.group.capacity,
            group_admitted_days: snapshot.group.admitted_days,
        })
    }

    /// Read-only lookup of the group behind any member code.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::StorageUnavailable`] on storage failure.
    pub async fn lookup(&self, code: &str) -> Result<Option<GroupSnapshot>, GateError> {
        let code = code.trim();
        match self.store.resolve_group(code).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(Self::storage_failure(code, 1, err)),
        }
    }

    /// Read one ticket by ID.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::TicketNotFound`] or
    /// [`GateError::StorageUnavailable`].
    pub async fn ticket(&self, ticket_id: TicketId) -> Result<Ticket, GateError> {
        self.store.ticket(ticket_id).await.map_err(|err| match err {
            StoreError::NotFound(_) => GateError::TicketNotFound(ticket_id),
            other => Self::storage_failure(&ticket_id.to_string(), 1, other),
        })
    }

    /// Readiness of the engine's storage.
    pub async fn health(&self, now: DateTime<Utc>) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => HealthCheck::healthy("group_store"),
            Err(err) => HealthCheck::unhealthy("group_store", err.to_string()),
        };
        HealthReport::new(vec![store], now)
    }
}

fn admitted(
    after: &GroupSnapshot,
    member: TicketId,
    today: NaiveDate,
) -> Result<Outcome, StoreError> {
    let member = after
        .member(member)
        .map(MemberView::from)
        .ok_or_else(|| StoreError::Unavailable(format!("committed member {member} missing")))?;

    Ok(Outcome::Admitted(Admitted {
        group: GroupIdentity::of(after),
        member,
        consumed: after.group.consumed,
        capacity: after.group.capacity,
        remaining: after.group.remaining(),
        admitted_days: after.group.admitted_days.clone(),
        eligible_days: after.group.eligible_days.clone(),
        today,
        members: after.members.iter().map(MemberView::from).collect(),
    }))
}
