//! # Gatepass Core
//!
//! Domain model and admission decision for gate admission control at a
//! multi-day event.
//!
//! A single scannable code belongs to a *group*: one primary registrant plus
//! optional companions. Every member gets their own code, but the group shares
//! one admission budget:
//!
//! - at most one admission per group per calendar day,
//! - at most `capacity` admissions in total (`capacity = 1 + companions`),
//! - admission only on the days the group registered for (when it picked any).
//!
//! ## Core Concepts
//!
//! - **Group**: the owner of the shared counters (`consumed`, `admitted_days`)
//! - **Ticket**: one per person, holding a weak reference to its group
//! - **Decision**: pure function `(GroupSnapshot, today) → Decision`
//! - **`GroupStore`**: the persistence seam; `commit_admission` is the only
//!   mutation of group counters and is conditional on the snapshot version
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell: [`decision::decide`] never touches I/O,
//!   the runtime crate executes what it returns
//! - Time zones are explicit ([`calendar::EventCalendar`]), never ambient
//! - Dependencies are injected as traits ([`store::GroupStore`],
//!   [`environment::Clock`])
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_core::decision::{Decision, decide};
//!
//! let snapshot = store.resolve_group("GJ25-ALU-7QK2ZD").await?;
//! match decide(&snapshot, today) {
//!     Decision::Admit { member } => { /* commit_admission */ }
//!     rejection => { /* report */ }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calendar;
pub mod decision;
pub mod outcome;
pub mod registration;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};

/// Environment module - Dependency injection traits
///
/// All ambient dependencies the engine needs are abstracted behind traits and
/// injected, so tests can pin the current instant.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gatepass_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system wall clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use calendar::EventCalendar;
pub use decision::{Decision, decide};
pub use environment::{Clock, SystemClock};
pub use outcome::{CapacityCleanup, ManualMark, Outcome, Verification};
pub use registration::{PersonInfo, Registration, RegistrationError, RegistrationPolicy};
pub use store::{AdmissionCommit, GroupStore, NewGroup, StoreError};
pub use types::{Designation, Group, GroupId, GroupSnapshot, Role, Ticket, TicketCode, TicketId};
