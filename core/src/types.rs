//! Domain types for gate admission.
//!
//! Contains the identifiers, value objects and entities shared by every crate:
//! tickets (one per person), admission groups (one per primary registrant)
//! and the snapshot the decision procedure works on.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an admission group
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Creates a new random `GroupId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `GroupId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket (one per registered person)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable scannable code, e.g. `GJ25-ALU-7QK2ZD`.
///
/// Immutable once issued. Encoded into the QR artifact by an external renderer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketCode(String);

impl TicketCode {
    /// Wrap an already-issued code.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Whether a ticket is the group's primary registrant or a companion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The registrant; root of the group
    Primary,
    /// Registered alongside the primary
    Companion,
}

impl Role {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Companion => "companion",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "companion" => Ok(Self::Companion),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Attendee category. Drives the middle segment of the ticket code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Designation {
    /// Current student
    Student,
    /// Former student
    Alumni,
    /// Staff member
    Staff,
    /// Invited guest
    Guest,
    /// Very important person
    #[serde(rename = "VIP")]
    Vip,
    /// Anything not covered above
    Other,
}

impl Designation {
    /// Three-letter code segment for this designation.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Student => "STU",
            Self::Alumni => "ALU",
            Self::Staff => "STF",
            Self::Guest => "GST",
            Self::Vip => "VIP",
            Self::Other => "GEN",
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Alumni => "Alumni",
            Self::Staff => "Staff",
            Self::Guest => "Guest",
            Self::Vip => "VIP",
            Self::Other => "Other",
        }
    }
}

impl FromStr for Designation {
    type Err = std::convert::Infallible;

    /// Unknown designations map to [`Designation::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Student" => Self::Student,
            "Alumni" => Self::Alumni,
            "Staff" => Self::Staff,
            "Guest" => Self::Guest,
            "VIP" => Self::Vip,
            _ => Self::Other,
        })
    }
}

impl fmt::Display for Designation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// One registered person.
///
/// `admitted` is reporting state only: it records that this particular person
/// walked through a gate. Admission itself is decided on the [`Group`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Scannable code
    pub code: TicketCode,
    /// Owning group (weak reference, the group owns admission state)
    pub group_id: GroupId,
    /// Primary or companion
    pub role: Role,
    /// Creation order inside the group; the primary is always 0
    pub position: u32,
    /// Full name
    pub full_name: String,
    /// Contact email, if given
    pub email: Option<String>,
    /// Contact phone, if given
    pub phone: Option<String>,
    /// Attendee category
    pub designation: Designation,
    /// Relationship to the primary (companions only)
    pub relationship: Option<String>,
    /// Age, if given
    pub age: Option<u32>,
    /// Whether this person has been marked as entered
    pub admitted: bool,
    /// When this person was marked as entered
    pub admitted_at: Option<DateTime<Utc>>,
    /// When the ticket was issued
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Mark this person as entered. Keeps the first timestamp on repeat calls.
    pub fn mark_admitted(&mut self, at: DateTime<Utc>) {
        self.admitted = true;
        if self.admitted_at.is_none() {
            self.admitted_at = Some(at);
        }
    }
}

/// Shared admission budget of a primary registrant and their companions.
///
/// # Invariants
///
/// - `consumed <= capacity`
/// - `consumed == admitted_days.len()` (one admission per day)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group ID
    pub id: GroupId,
    /// The primary ticket, root of the group
    pub primary_ticket: TicketId,
    /// Code of the primary ticket; the group's identity in responses
    pub primary_code: TicketCode,
    /// Total admissions allowed (`1 + companions`)
    pub capacity: u32,
    /// Admissions granted so far
    pub consumed: u32,
    /// Days the group registered for; empty means any day
    pub eligible_days: BTreeSet<NaiveDate>,
    /// Days on which an admission was granted
    pub admitted_days: BTreeSet<NaiveDate>,
    /// Optimistic concurrency token, bumped on every admission commit
    pub version: u64,
    /// When the group was registered
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Admissions left (`capacity - consumed`)
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.consumed)
    }

    /// Whether every unit of capacity has been consumed
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.consumed >= self.capacity
    }

    /// Whether the group may attend on `day` (empty set means any day)
    #[must_use]
    pub fn is_eligible_on(&self, day: NaiveDate) -> bool {
        self.eligible_days.is_empty() || self.eligible_days.contains(&day)
    }

    /// Whether an admission was already granted on `day`
    #[must_use]
    pub fn admitted_on(&self, day: NaiveDate) -> bool {
        self.admitted_days.contains(&day)
    }

    /// Check the counter invariants.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        self.consumed <= self.capacity && self.admitted_days.len() == self.consumed as usize
    }

    /// Apply one admission on `day`.
    ///
    /// # Errors
    ///
    /// Returns the rule that would be violated; the group is left untouched.
    pub fn record_admission(&mut self, day: NaiveDate) -> Result<(), AdmissionViolation> {
        if self.admitted_on(day) {
            return Err(AdmissionViolation::DayAlreadyAdmitted(day));
        }
        if self.is_exhausted() {
            return Err(AdmissionViolation::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        self.admitted_days.insert(day);
        self.consumed += 1;
        self.version += 1;
        Ok(())
    }
}

/// Why an admission could not be applied to a group record.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionViolation {
    /// The group already has an admission on this day
    #[error("group already admitted on {0}")]
    DayAlreadyAdmitted(NaiveDate),
    /// Every unit of capacity is used
    #[error("group capacity of {capacity} exhausted")]
    CapacityExhausted {
        /// Group capacity
        capacity: u32,
    },
}

/// A group together with its ordered members, as read at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    /// Group counters
    pub group: Group,
    /// Members ordered by `position` (primary first)
    pub members: Vec<Ticket>,
}

impl GroupSnapshot {
    /// The primary ticket, if present in the member list
    #[must_use]
    pub fn primary(&self) -> Option<&Ticket> {
        self.members.iter().find(|t| t.role == Role::Primary)
    }

    /// Look up a member by ticket ID
    #[must_use]
    pub fn member(&self, id: TicketId) -> Option<&Ticket> {
        self.members.iter().find(|t| t.id == id)
    }

    /// Members that have not yet been individually marked as entered
    pub fn pending_members(&self) -> impl Iterator<Item = &Ticket> {
        self.members.iter().filter(|t| !t.admitted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn group(capacity: u32) -> Group {
        Group {
            id: GroupId::new(),
            primary_ticket: TicketId::new(),
            primary_code: TicketCode::new("GJ25-STU-AAAAAA"),
            capacity,
            consumed: 0,
            eligible_days: BTreeSet::new(),
            admitted_days: BTreeSet::new(),
            version: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_admission_updates_counters() {
        let mut g = group(2);
        assert!(g.record_admission(day(1)).is_ok());
        assert_eq!(g.consumed, 1);
        assert_eq!(g.version, 1);
        assert_eq!(g.remaining(), 1);
        assert!(g.invariants_hold());
    }

    #[test]
    fn test_record_admission_rejects_same_day() {
        let mut g = group(3);
        assert!(g.record_admission(day(1)).is_ok());
        assert_eq!(
            g.record_admission(day(1)),
            Err(AdmissionViolation::DayAlreadyAdmitted(day(1)))
        );
        assert_eq!(g.consumed, 1);
    }

    #[test]
    fn test_record_admission_rejects_when_exhausted() {
        let mut g = group(1);
        assert!(g.record_admission(day(1)).is_ok());
        assert_eq!(
            g.record_admission(day(2)),
            Err(AdmissionViolation::CapacityExhausted { capacity: 1 })
        );
        assert!(g.is_exhausted());
        assert!(g.invariants_hold());
    }

    #[test]
    fn test_empty_eligible_days_means_any_day() {
        let mut g = group(1);
        assert!(g.is_eligible_on(day(9)));
        g.eligible_days.insert(day(1));
        assert!(!g.is_eligible_on(day(9)));
        assert!(g.is_eligible_on(day(1)));
    }

    #[test]
    fn test_designation_prefixes() {
        assert_eq!(Designation::Alumni.code_prefix(), "ALU");
        assert_eq!(Designation::Vip.code_prefix(), "VIP");
        assert_eq!("Parent".parse::<Designation>().ok(), Some(Designation::Other));
        assert_eq!(Designation::Other.code_prefix(), "GEN");
    }

    #[test]
    fn test_mark_admitted_keeps_first_timestamp() {
        let first = Utc::now();
        let mut ticket = Ticket {
            id: TicketId::new(),
            code: TicketCode::new("GJ25-STU-AAAAAA"),
            group_id: GroupId::new(),
            role: Role::Primary,
            position: 0,
            full_name: "Asha".to_string(),
            email: None,
            phone: None,
            designation: Designation::Student,
            relationship: None,
            age: None,
            admitted: false,
            admitted_at: None,
            created_at: first,
        };
        ticket.mark_admitted(first);
        ticket.mark_admitted(first + chrono::Duration::hours(1));
        assert!(ticket.admitted);
        assert_eq!(ticket.admitted_at, Some(first));
    }
}
