//! # Gatepass Testing
//!
//! Test doubles and fixtures for Gatepass.
//!
//! This crate provides:
//! - [`InMemoryGroupStore`]: a complete [`GroupStore`](gatepass_core::GroupStore)
//!   with fault injection hooks
//! - [`FixedClock`]: a settable clock
//! - [`fixtures`]: dates, timestamps and registrations
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_testing::{InMemoryGroupStore, fixtures};
//!
//! #[tokio::test]
//! async fn test_first_scan_admits() {
//!     let store = InMemoryGroupStore::new();
//!     let group = store.create_group(fixtures::new_group(2, &[])).await?;
//!     // ... run a GateEngine over the store
//! }
//! ```

pub mod fixtures;
pub mod memory_store;

/// Mock implementations of environment traits.
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use gatepass_core::environment::Clock;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Settable clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::set`] or
    /// [`FixedClock::advance`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use gatepass_testing::mocks::FixedClock;
    /// use gatepass_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    ///
    /// clock.advance(Duration::days(1));
    /// assert_eq!(clock.now() - time1, Duration::days(1));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-12-01 09:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-12-01T09:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use memory_store::InMemoryGroupStore;
pub use mocks::{FixedClock, test_clock};
