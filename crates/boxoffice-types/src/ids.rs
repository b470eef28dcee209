//! Globally unique identifiers used throughout Boxoffice.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! They render as the bare hyphenated UUID because the reservation ID is
//! embedded verbatim in signed QR payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Aggregate root
// ---------------------------------------------------------------------------

uuid_id!(
    /// Identifier of a reservation (the aggregate every other entity hangs off).
    ReservationId
);

// ---------------------------------------------------------------------------
// Subordinate entities
// ---------------------------------------------------------------------------

uuid_id!(
    /// Identifier of one payment applied to a reservation.
    PaymentId
);

uuid_id!(
    /// Identifier of an issued ticket row. Distinct from the human-readable
    /// ticket number printed on the artifact.
    TicketId
);

uuid_id!(
    /// Identifier of an attendee listed under a reservation.
    ParticipantId
);

uuid_id!(
    /// Identifier of an append-only audit entry.
    AuditEntryId
);

uuid_id!(
    /// Identifier of a pack (event offering) in the catalogue.
    PackId
);

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

uuid_id!(
    /// Identifier of a back-office user (cashier, scanner, admin).
    UserId
);

impl UserId {
    /// Extract the embedded timestamp (milliseconds since UNIX epoch) from UUIDv7.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_id_uniqueness() {
        let a = ReservationId::new();
        let b = ReservationId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = PaymentId::new();
        let b = PaymentId::new();
        assert!(a < b);
    }

    #[test]
    fn display_parses_back() {
        let id = ReservationId::new();
        let parsed: ReservationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn garbage_does_not_parse() {
        assert!("not-a-uuid".parse::<TicketId>().is_err());
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = ParticipantId::from_bytes([7u8; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn user_id_timestamp_extraction() {
        let before = chrono::Utc::now().timestamp_millis() as u64;
        let id = UserId::new();
        let after = chrono::Utc::now().timestamp_millis() as u64;
        let ts = id.timestamp_ms();
        assert!(
            ts >= before && ts <= after,
            "ts={ts}, before={before}, after={after}"
        );
    }
}
