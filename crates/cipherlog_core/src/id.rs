//! Surrogate storage identifiers.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;

/// Width of the zero-padded random suffix.
const RANDOM_WIDTH: usize = 19;

/// System-generated storage key for a record.
///
/// A surrogate id is a UTC timestamp with nanosecond precision joined to
/// a fixed-width, zero-padded random non-negative integer:
///
/// ```text
/// 20230927T214614.645818376_0001234567890123456
/// ```
///
/// The timestamp component gives rough chronological ordering under
/// enumeration; the random component makes same-instant collisions
/// astronomically unlikely. Generation alone does **not** guarantee
/// global uniqueness - the ingestion engine re-checks the store and
/// regenerates on collision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurrogateId(String);

impl SurrogateId {
    /// Generates an id for the current instant.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Generates an id for an explicit instant.
    ///
    /// The random suffix is still drawn fresh; use [`SurrogateId::from_parts`]
    /// for fully deterministic ids in tests.
    #[must_use]
    pub fn generate_at(at: DateTime<Utc>) -> Self {
        Self::from_parts(at, rand::thread_rng().gen_range(0..=i64::MAX))
    }

    /// Builds an id from an instant and an explicit random suffix.
    #[must_use]
    pub fn from_parts(at: DateTime<Utc>, random: i64) -> Self {
        debug_assert!(random >= 0);
        Self(format!(
            "{}_{:0width$}",
            at.format("%Y%m%dT%H%M%S%.9f"),
            random,
            width = RANDOM_WIDTH
        ))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id, returning the underlying string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SurrogateId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Source of surrogate ids for the ingestion engine.
///
/// The engine is generic over this trait so tests can script collisions;
/// production code uses [`RandomIdGenerator`].
pub trait IdGenerator {
    /// Produces the next candidate id. Never fails.
    fn next_id(&mut self) -> SurrogateId;
}

/// The production id source: fresh timestamp, fresh randomness per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&mut self) -> SurrogateId {
        SurrogateId::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_stamp_underscore_random() {
        let at = Utc.with_ymd_and_hms(2023, 9, 27, 21, 46, 14).unwrap()
            + chrono::Duration::nanoseconds(645_818_376);
        let id = SurrogateId::from_parts(at, 42);
        assert_eq!(
            id.as_str(),
            "20230927T214614.645818376_0000000000000000042"
        );
    }

    #[test]
    fn random_suffix_is_fixed_width() {
        let id = SurrogateId::generate();
        let (stamp, random) = id.as_str().split_once('_').unwrap();
        assert_eq!(stamp.len(), "20230927T214614.645818376".len());
        assert_eq!(random.len(), 19);
        assert!(random.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn ids_order_by_timestamp() {
        let early = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Maximal random on the early id still sorts before the late one.
        let a = SurrogateId::from_parts(early, i64::MAX);
        let b = SurrogateId::from_parts(late, 0);
        assert!(a < b);
    }

    #[test]
    fn generated_ids_differ() {
        let a = SurrogateId::generate();
        let b = SurrogateId::generate();
        assert_ne!(a, b);
    }
}
