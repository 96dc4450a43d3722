//! Group registration.
//!
//! Turns a [`Registration`] (primary + companions + chosen days) into a
//! [`NewGroup`] with issued ticket codes, ready for
//! [`GroupStore::create_group`](crate::store::GroupStore::create_group).
//!
//! Ticket codes look like `GJ25-ALU-7QK2ZD`: event prefix, designation
//! prefix, six random uppercase alphanumerics.

use crate::calendar::EventCalendar;
use crate::store::{NewGroup, StoreError};
use crate::types::{Designation, Group, GroupId, Role, Ticket, TicketCode, TicketId};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_SUFFIX_LEN: usize = 6;

/// Errors from validating or storing a registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A person has no name.
    #[error("Full name is required (member {position})")]
    MissingName {
        /// 0 for the primary, 1.. for companions
        position: u32,
    },

    /// The primary registrant has no designation.
    #[error("Designation is required for the primary registrant")]
    MissingDesignation,

    /// An email address is malformed.
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// The email is used by another ticket.
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// More companions than a single code may carry.
    #[error("At most {max} companions allowed, got {requested}")]
    TooManyCompanions {
        /// Configured maximum
        max: u32,
        /// Companions in the request
        requested: u32,
    },

    /// A selected day is not one of the event's days.
    #[error("{0} is not an event day")]
    DayOutsideEvent(NaiveDate),

    /// Could not find unused ticket codes.
    #[error("Could not issue unique ticket codes after {attempts} attempts")]
    CodeSpaceExhausted {
        /// Attempts made
        attempts: u32,
    },

    /// Storage failure while creating the group.
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

/// Details of one person in a registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonInfo {
    /// Full name (required)
    pub full_name: String,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone
    #[serde(default)]
    pub phone: Option<String>,
    /// Attendee category; companions inherit the primary's when absent
    #[serde(default)]
    pub designation: Option<Designation>,
    /// Relationship to the primary (companions)
    #[serde(default)]
    pub relationship: Option<String>,
    /// Age
    #[serde(default)]
    pub age: Option<u32>,
}

/// A registration request: one primary, optional companions, chosen days.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// The primary registrant
    pub primary: PersonInfo,
    /// Companions entering on the primary's group budget
    #[serde(default)]
    pub companions: Vec<PersonInfo>,
    /// Days the group will attend; empty means any day
    #[serde(default)]
    pub eligible_days: Vec<NaiveDate>,
}

/// Rules applied to every registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationPolicy {
    /// Event segment of every ticket code, e.g. `GJ25`
    pub code_prefix: String,
    /// Maximum companions per group
    pub max_companions: u32,
    /// Event days allowed for selection
    pub calendar: EventCalendar,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            code_prefix: "GJ25".to_string(),
            max_companions: 10,
            calendar: EventCalendar::default(),
        }
    }
}

impl RegistrationPolicy {
    /// Check a registration without issuing anything.
    ///
    /// # Errors
    ///
    /// Returns the first rule the registration breaks.
    pub fn validate(&self, registration: &Registration) -> Result<(), RegistrationError> {
        let requested = u32::try_from(registration.companions.len()).unwrap_or(u32::MAX);
        if requested > self.max_companions {
            return Err(RegistrationError::TooManyCompanions {
                max: self.max_companions,
                requested,
            });
        }

        if registration.primary.designation.is_none() {
            return Err(RegistrationError::MissingDesignation);
        }

        let mut seen_emails = HashSet::new();
        for (position, person) in people(registration) {
            if person.full_name.trim().is_empty() {
                return Err(RegistrationError::MissingName { position });
            }
            if let Some(email) = normalized_email(person) {
                if !is_valid_email(&email) {
                    return Err(RegistrationError::InvalidEmail(email));
                }
                if !seen_emails.insert(email.clone()) {
                    return Err(RegistrationError::DuplicateEmail(email));
                }
            }
        }

        for day in &registration.eligible_days {
            if !self.calendar.is_event_day(*day) {
                return Err(RegistrationError::DayOutsideEvent(*day));
            }
        }

        Ok(())
    }

    /// Validate and build a group with freshly issued codes.
    ///
    /// # Errors
    ///
    /// Returns the first rule the registration breaks.
    pub fn build_group<R: Rng>(
        &self,
        registration: &Registration,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<NewGroup, RegistrationError> {
        self.validate(registration)?;

        let primary_designation = registration
            .primary
            .designation
            .unwrap_or(Designation::Other);
        let group_id = GroupId::new();
        let eligible_days: BTreeSet<NaiveDate> =
            registration.eligible_days.iter().copied().collect();

        let tickets: Vec<Ticket> = people(registration)
            .map(|(position, person)| {
                let designation = person.designation.unwrap_or(primary_designation);
                Ticket {
                    id: TicketId::new(),
                    code: self.issue_code(designation, rng),
                    group_id,
                    role: if position == 0 {
                        Role::Primary
                    } else {
                        Role::Companion
                    },
                    position,
                    full_name: person.full_name.trim().to_string(),
                    email: normalized_email(person),
                    phone: person.phone.clone().filter(|p| !p.trim().is_empty()),
                    designation,
                    relationship: person.relationship.clone(),
                    age: person.age,
                    admitted: false,
                    admitted_at: None,
                    created_at: now,
                }
            })
            .collect();

        let (primary_ticket, primary_code) = tickets
            .first()
            .map(|t| (t.id, t.code.clone()))
            .ok_or(RegistrationError::MissingName { position: 0 })?;

        let group = Group {
            id: group_id,
            primary_ticket,
            primary_code,
            capacity: u32::try_from(tickets.len()).unwrap_or(u32::MAX),
            consumed: 0,
            eligible_days,
            admitted_days: BTreeSet::new(),
            version: 0,
            created_at: now,
        };

        Ok(NewGroup { group, tickets })
    }

    /// Issue one ticket code for `designation`.
    pub fn issue_code<R: Rng>(&self, designation: Designation, rng: &mut R) -> TicketCode {
        let suffix: String = (0..CODE_SUFFIX_LEN)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        TicketCode::new(format!(
            "{}-{}-{suffix}",
            self.code_prefix,
            designation.code_prefix()
        ))
    }
}

/// Primary at position 0 followed by companions.
fn people(registration: &Registration) -> impl Iterator<Item = (u32, &PersonInfo)> {
    std::iter::once(&registration.primary)
        .chain(registration.companions.iter())
        .zip(0u32..)
        .map(|(person, position)| (position, person))
}

fn normalized_email(person: &PersonInfo) -> Option<String> {
    person
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
}

/// `local@domain.tld` with no whitespace.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    matches!(domain.rsplit_once('.'), Some((host, tld)) if !host.is_empty() && !tld.is_empty())
}
