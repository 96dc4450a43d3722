//! Builders for dates, timestamps and registrations used across the test
//! suites.

use chrono::{DateTime, NaiveDate, Utc};
use gatepass_core::registration::{PersonInfo, Registration, RegistrationPolicy};
use gatepass_core::store::NewGroup;
use gatepass_core::types::Designation;

/// A calendar date.
///
/// # Panics
///
/// Panics if the date does not exist.
#[must_use]
#[allow(clippy::expect_used)]
pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("fixture date should exist")
}

/// `hour`:00 UTC on `day`.
///
/// # Panics
///
/// Panics if `hour` is not a valid hour.
#[must_use]
#[allow(clippy::expect_used)]
pub fn at(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    day.and_hms_opt(hour, 0, 0)
        .expect("fixture hour should be valid")
        .and_utc()
}

/// A person with just a name.
#[must_use]
pub fn person(full_name: &str) -> PersonInfo {
    PersonInfo {
        full_name: full_name.to_string(),
        ..PersonInfo::default()
    }
}

/// A student registration with `companions` unnamed guests and no emails.
#[must_use]
pub fn registration(companions: usize, eligible_days: &[NaiveDate]) -> Registration {
    Registration {
        primary: PersonInfo {
            designation: Some(Designation::Student),
            ..person("Primary Registrant")
        },
        companions: (1..=companions)
            .map(|i| PersonInfo {
                relationship: Some("friend".to_string()),
                ..person(&format!("Companion {i}"))
            })
            .collect(),
        eligible_days: eligible_days.to_vec(),
    }
}

/// A group built from [`registration`] under the default policy.
///
/// # Panics
///
/// Panics if the default policy rejects the registration.
#[must_use]
#[allow(clippy::expect_used)]
pub fn new_group(companions: usize, eligible_days: &[NaiveDate]) -> NewGroup {
    RegistrationPolicy::default()
        .build_group(
            &registration(companions, eligible_days),
            at(day(2025, 11, 1), 12),
            &mut rand::thread_rng(),
        )
        .expect("fixture registration should be valid")
}
