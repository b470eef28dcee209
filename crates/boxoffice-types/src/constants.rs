//! System-wide constants for the Boxoffice back office.

/// Default prefix of human-readable ticket numbers (`MIP-<ts>-<rand>`).
pub const DEFAULT_TICKET_PREFIX: &str = "MIP";

/// Length of the random base36 segment of a ticket number.
pub const TICKET_RANDOM_LEN: usize = 6;

/// How many fresh ticket numbers issuance tries before giving up on a
/// unique-constraint collision.
pub const MAX_TICKET_NUMBER_ATTEMPTS: u32 = 5;

/// Field separator of the signed QR message: `ticket_number|reservation_id|timestamp`.
pub const PAYLOAD_SEPARATOR: char = '|';

/// Default duplicate-request window in milliseconds.
pub const DEFAULT_DUPLICATE_WINDOW_MS: u64 = 10_000;

/// Default number of request fingerprints the duplicate guard remembers.
pub const DEFAULT_DUPLICATE_CACHE_SIZE: usize = 10_000;

/// Default number of delivery attempts for a notification job.
pub const DEFAULT_NOTIFY_MAX_ATTEMPTS: u32 = 3;

/// Default initial backoff between notification attempts (milliseconds).
pub const DEFAULT_NOTIFY_INITIAL_BACKOFF_MS: u64 = 500;

/// Default ceiling for notification backoff (milliseconds).
pub const DEFAULT_NOTIFY_MAX_BACKOFF_MS: u64 = 10_000;

/// Default directory for payment proof uploads.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "info";

