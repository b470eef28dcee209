//! Human-readable ticket numbers: `PREFIX-<BASE36 ms timestamp>-<BASE36 random>`.
//!
//! The format is embedded in every QR payload and scanned at the door, so it
//! must stay stable. Collision probability is negligible but not zero; the
//! unique constraint in the store is the actual guarantee.

use boxoffice_types::constants::{DEFAULT_TICKET_PREFIX, TICKET_RANDOM_LEN};
use chrono::Utc;
use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Anything that can hand out candidate ticket numbers.
pub trait TicketNumberSource: Send + Sync {
    fn next_number(&self) -> String;
}

/// Default generator: wall-clock milliseconds plus a random suffix.
#[derive(Debug, Clone)]
pub struct TicketNumberGenerator {
    prefix: String,
}

impl TicketNumberGenerator {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Deterministic core: format a number from a timestamp and an RNG.
    pub fn generate_with<R: Rng + ?Sized>(&self, millis: u64, rng: &mut R) -> String {
        let random: String = (0..TICKET_RANDOM_LEN)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();
        format!("{}-{}-{random}", self.prefix, to_base36(millis))
    }

    /// Whether `candidate` has this generator's shape.
    #[must_use]
    pub fn is_well_formed(&self, candidate: &str) -> bool {
        let mut parts = candidate.splitn(3, '-');
        let (Some(prefix), Some(ts), Some(random)) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let is_b36 = |s: &str| !s.is_empty() && s.bytes().all(|b| BASE36.contains(&b));
        prefix == self.prefix && is_b36(ts) && random.len() == TICKET_RANDOM_LEN && is_b36(random)
    }
}

impl Default for TicketNumberGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TICKET_PREFIX)
    }
}

impl TicketNumberSource for TicketNumberGenerator {
    fn next_number(&self) -> String {
        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        self.generate_with(millis, &mut rand::thread_rng())
    }
}

/// Uppercase base36 rendering of `n`.
#[must_use]
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[usize::try_from(n % 36).unwrap_or_default()]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        // 2023-11-14T22:13:20Z in ms
        assert_eq!(to_base36(1_700_000_000_000), "LOYW3V28");
    }

    #[test]
    fn format_is_prefix_timestamp_random() {
        let generator = TicketNumberGenerator::default();
        let mut rng = StdRng::seed_from_u64(7);
        let number = generator.generate_with(1_700_000_000_000, &mut rng);
        assert!(number.starts_with("MIP-LOYW3V28-"), "got {number}");
        assert_eq!(number.rsplit('-').next().unwrap().len(), TICKET_RANDOM_LEN);
        assert!(generator.is_well_formed(&number));
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let generator = TicketNumberGenerator::new("FEST");
        let a = generator.generate_with(42, &mut StdRng::seed_from_u64(1));
        let b = generator.generate_with(42, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn live_numbers_are_distinct() {
        let generator = TicketNumberGenerator::default();
        let numbers: HashSet<String> = (0..200).map(|_| generator.next_number()).collect();
        assert_eq!(numbers.len(), 200);
        assert!(numbers.iter().all(|n| generator.is_well_formed(n)));
    }

    #[test]
    fn well_formed_rejects_foreign_shapes() {
        let generator = TicketNumberGenerator::default();
        assert!(!generator.is_well_formed("MIP-LOYW3V28"));
        assert!(!generator.is_well_formed("XYZ-LOYW3V28-ABCDEF"));
        assert!(!generator.is_well_formed("MIP-loyw3v28-ABCDEF"));
        assert!(!generator.is_well_formed("MIP-LOYW3V28-ABC"));
    }
}
