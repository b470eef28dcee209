//! Duplicate-request guard: rejects double-submitted payments.
//!
//! A cashier double-clicking "add payment" sends two indistinguishable
//! requests. The guard remembers a fingerprint of each accepted request for a
//! short window and rejects a second one with
//! [`BoxofficeError::DuplicateRequest`].
//!
//! This is best-effort and local to one process. It bounds memory like an LRU
//! (oldest fingerprint evicted at capacity) and forgets entries once their
//! window has passed. It is **not** a correctness guarantee: the row lock and
//! the balance invariant are.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use boxoffice_types::{
    Amount, BoxofficeError, GuardConfig, PaymentMethod, ReservationId, Result, UserId,
};
use sha2::{Digest, Sha256};

/// SHA-256 over the identifying fields of a request.
pub type Fingerprint = [u8; 32];

/// Fingerprint of an add-payment request.
///
/// With a `request_id` two equal instalments taken back to back are told
/// apart; without one they collide inside the window.
#[must_use]
pub fn payment_fingerprint(
    reservation_id: ReservationId,
    actor: UserId,
    amount: Amount,
    method: PaymentMethod,
    request_id: Option<&str>,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(b"boxoffice:payment:v1:");
    hasher.update(reservation_id.0.as_bytes());
    hasher.update(b"|");
    hasher.update(actor.0.as_bytes());
    hasher.update(b"|");
    hasher.update(amount.to_le_bytes());
    hasher.update(b"|");
    hasher.update(method.as_str().as_bytes());
    if let Some(request_id) = request_id {
        hasher.update(b"|req:");
        hasher.update(request_id.as_bytes());
    }

    let digest = hasher.finalize();
    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&digest);
    fingerprint
}

#[derive(Debug, Default)]
struct GuardState {
    /// Fingerprint -> time it was accepted.
    seen: HashMap<Fingerprint, Instant>,
    /// Acceptance order for eviction (front = oldest).
    order: VecDeque<Fingerprint>,
}

/// Bounded TTL set of recently accepted fingerprints.
#[derive(Debug)]
pub struct DuplicateGuard {
    state: Mutex<GuardState>,
    window: Duration,
    capacity: usize,
}

impl DuplicateGuard {
    /// # Errors
    /// Returns `Configuration` if `capacity` is zero.
    pub fn new(config: &GuardConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(BoxofficeError::Configuration(
                "duplicate guard capacity must be > 0".to_string(),
            ));
        }
        Ok(Self {
            state: Mutex::new(GuardState::default()),
            window: config.window(),
            capacity: config.capacity,
        })
    }

    /// Accept `fingerprint` at `now`, or reject it if it was accepted less
    /// than one window ago.
    ///
    /// # Errors
    /// Returns `DuplicateRequest` for a repeat inside the window.
    pub fn claim(&self, fingerprint: Fingerprint, now: Instant) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BoxofficeError::Internal("duplicate guard poisoned".to_string()))?;

        self.expire(&mut state, now);

        if state.seen.contains_key(&fingerprint) {
            return Err(BoxofficeError::DuplicateRequest);
        }

        if state.seen.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.seen.remove(&oldest);
            }
        }

        state.seen.insert(fingerprint, now);
        state.order.push_back(fingerprint);
        Ok(())
    }

    /// Forget `fingerprint`, e.g. because the guarded operation failed and a
    /// corrected retry must not be blocked.
    pub fn release(&self, fingerprint: &Fingerprint) {
        if let Ok(mut state) = self.state.lock() {
            if state.seen.remove(fingerprint).is_some() {
                state.order.retain(|f| f != fingerprint);
            }
        }
    }

    /// Number of fingerprints currently tracked.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.seen.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(&self, state: &mut GuardState, now: Instant) {
        while let Some(oldest) = state.order.front().copied() {
            let expired = state
                .seen
                .get(&oldest)
                .is_none_or(|at| now.saturating_duration_since(*at) >= self.window);
            if !expired {
                break;
            }
            state.order.pop_front();
            state.seen.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(window_ms: u64, capacity: usize) -> DuplicateGuard {
        DuplicateGuard::new(&GuardConfig {
            window_ms,
            capacity,
        })
        .unwrap()
    }

    fn fp(n: u8) -> Fingerprint {
        [n; 32]
    }

    #[test]
    fn first_claim_ok() {
        let g = guard(10_000, 100);
        g.claim(fp(1), Instant::now()).unwrap();
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn repeat_inside_window_blocked() {
        let g = guard(10_000, 100);
        let t0 = Instant::now();
        g.claim(fp(1), t0).unwrap();
        let err = g.claim(fp(1), t0 + Duration::from_secs(9)).unwrap_err();
        assert!(
            matches!(err, BoxofficeError::DuplicateRequest),
            "Expected DuplicateRequest, got: {err:?}"
        );
    }

    #[test]
    fn repeat_after_window_accepted() {
        let g = guard(10_000, 100);
        let t0 = Instant::now();
        g.claim(fp(1), t0).unwrap();
        g.claim(fp(1), t0 + Duration::from_secs(10)).unwrap();
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn released_fingerprint_can_be_reclaimed() {
        let g = guard(10_000, 100);
        let t0 = Instant::now();
        g.claim(fp(1), t0).unwrap();
        g.release(&fp(1));
        assert!(g.is_empty());
        g.claim(fp(1), t0).unwrap();
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let g = guard(60_000, 3);
        let t0 = Instant::now();
        for n in 1..=4 {
            g.claim(fp(n), t0).unwrap();
        }
        assert_eq!(g.len(), 3);
        // fp(1) was evicted, so it is accepted again.
        g.claim(fp(1), t0).unwrap();
        assert!(matches!(
            g.claim(fp(4), t0),
            Err(BoxofficeError::DuplicateRequest)
        ));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(DuplicateGuard::new(&GuardConfig {
            window_ms: 1,
            capacity: 0
        })
        .is_err());
    }

    #[test]
    fn fingerprint_covers_every_field() {
        let r = ReservationId::new();
        let u = UserId::new();
        let base = payment_fingerprint(r, u, 4_000, PaymentMethod::Cash, None);
        assert_eq!(base, payment_fingerprint(r, u, 4_000, PaymentMethod::Cash, None));
        assert_ne!(base, payment_fingerprint(ReservationId::new(), u, 4_000, PaymentMethod::Cash, None));
        assert_ne!(base, payment_fingerprint(r, UserId::new(), 4_000, PaymentMethod::Cash, None));
        assert_ne!(base, payment_fingerprint(r, u, 4_001, PaymentMethod::Cash, None));
        assert_ne!(base, payment_fingerprint(r, u, 4_000, PaymentMethod::Card, None));
    }

    #[test]
    fn request_id_separates_equal_instalments() {
        let r = ReservationId::new();
        let u = UserId::new();
        let first = payment_fingerprint(r, u, 5_000, PaymentMethod::Cash, Some("form-1"));
        let second = payment_fingerprint(r, u, 5_000, PaymentMethod::Cash, Some("form-2"));
        assert_ne!(first, second);
        assert_eq!(first, payment_fingerprint(r, u, 5_000, PaymentMethod::Cash, Some("form-1")));
        assert_ne!(first, payment_fingerprint(r, u, 5_000, PaymentMethod::Cash, None));
    }
}
