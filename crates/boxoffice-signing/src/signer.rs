//! HMAC-SHA256 signing of ticket QR payloads.
//!
//! The signature binds ticket number, reservation and issuance time, so a
//! payload cannot be replayed against another ticket or forged without the
//! secret.
//!
//! # Security Properties
//!
//! - The key comes from a `SecretString` and is never logged
//! - Verification compares digests with `subtle::ConstantTimeEq`
//! - Malformed hex is treated as a mismatch, never as a panic

use std::fmt;

use boxoffice_types::{
    BoxofficeError, ReservationId, Result, SignedPayload, SigningConfig, signing_message,
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded SHA-256 MAC.
const SIGNATURE_HEX_LEN: usize = 64;

/// Keyed signer. Holds a pre-keyed MAC state that is cloned per message.
#[derive(Clone)]
pub struct TicketSigner {
    mac: HmacSha256,
}

impl TicketSigner {
    /// Build a signer from a secret.
    ///
    /// # Errors
    /// Returns `Configuration` if the secret is empty.
    pub fn new(secret: &SecretString) -> Result<Self> {
        let key = secret.expose_secret().as_bytes();
        if key.is_empty() {
            return Err(BoxofficeError::Configuration(
                "QR signing secret must not be empty".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| BoxofficeError::Configuration(format!("QR signing key: {e}")))?;
        Ok(Self { mac })
    }

    /// # Errors
    /// Returns `Configuration` if the configured secret is empty.
    pub fn from_config(config: &SigningConfig) -> Result<Self> {
        Self::new(&config.qr_secret)
    }

    /// Lowercase hex HMAC-SHA256 of `message`.
    #[must_use]
    pub fn sign(&self, message: &str) -> String {
        hex::encode(self.digest(message.as_bytes()))
    }

    /// Constant-time check of `signature_hex` against `message`.
    #[must_use]
    pub fn verify(&self, message: &str, signature_hex: &str) -> bool {
        if signature_hex.len() != SIGNATURE_HEX_LEN {
            return false;
        }
        let Ok(supplied) = hex::decode(signature_hex) else {
            return false;
        };
        let computed = self.digest(message.as_bytes());
        computed.as_slice().ct_eq(supplied.as_slice()).into()
    }

    /// Build the signed payload for a freshly numbered ticket.
    #[must_use]
    pub fn issue(
        &self,
        ticket_number: &str,
        reservation_id: ReservationId,
        timestamp: i64,
    ) -> SignedPayload {
        let signature = self.sign(&signing_message(ticket_number, reservation_id, timestamp));
        SignedPayload {
            ticket_number: ticket_number.to_string(),
            reservation_id,
            timestamp,
            signature,
        }
    }

    /// # Errors
    /// Returns `InvalidSignature` if the payload was not signed with this key
    /// or any signed field was altered.
    pub fn verify_payload(&self, payload: &SignedPayload) -> Result<()> {
        if self.verify(&payload.message(), &payload.signature) {
            Ok(())
        } else {
            tracing::warn!(
                ticket_number = %payload.ticket_number,
                "ticket payload signature verification failed"
            );
            Err(BoxofficeError::InvalidSignature)
        }
    }

    /// Serialize a payload into the string embedded in the QR code.
    ///
    /// # Errors
    /// Returns `Serialization` if JSON encoding fails.
    pub fn encode_payload(payload: &SignedPayload) -> Result<String> {
        Ok(serde_json::to_string(payload)?)
    }

    /// Parse a scanned QR string. Does **not** verify the signature.
    ///
    /// # Errors
    /// Returns `MalformedPayload` if the input is not a well-formed payload.
    pub fn decode_payload(raw: &str) -> Result<SignedPayload> {
        let payload: SignedPayload =
            serde_json::from_str(raw.trim()).map_err(|e| BoxofficeError::MalformedPayload {
                reason: e.to_string(),
            })?;
        if payload.ticket_number.trim().is_empty() {
            return Err(BoxofficeError::MalformedPayload {
                reason: "empty ticket_number".to_string(),
            });
        }
        if payload.signature.is_empty() {
            return Err(BoxofficeError::MalformedPayload {
                reason: "missing signature".to_string(),
            });
        }
        Ok(payload)
    }

    fn digest(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}

impl fmt::Debug for TicketSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> TicketSigner {
        TicketSigner::new(&SecretString::from(secret)).unwrap()
    }

    #[test]
    fn sign_then_verify() {
        let s = signer("test-secret-key");
        let sig = s.sign("MIP-ABC-123456|r|1700000000");
        assert_eq!(sig.len(), SIGNATURE_HEX_LEN);
        assert!(s.verify("MIP-ABC-123456|r|1700000000", &sig));
    }

    #[test]
    fn signing_is_deterministic() {
        let s = signer("k");
        assert_eq!(s.sign("hello"), s.sign("hello"));
        assert_ne!(s.sign("hello"), s.sign("hellp"));
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        let s = signer("Jefe");
        assert_eq!(
            s.sign("what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn wrong_secret_rejected() {
        let sig = signer("secret-a").sign("msg");
        assert!(!signer("secret-b").verify("msg", &sig));
    }

    #[test]
    fn every_message_byte_matters() {
        let s = signer("k");
        let msg = "MIP-LX2A9K-7QF3ZD|0190f6a2-0000-7000-8000-000000000000|1700000000";
        let sig = s.sign(msg);
        for i in 0..msg.len() {
            let mut bytes = msg.as_bytes().to_vec();
            bytes[i] ^= 0x01;
            let altered = String::from_utf8(bytes).unwrap();
            assert!(!s.verify(&altered, &sig), "byte {i} not covered");
        }
    }

    #[test]
    fn every_signature_char_matters() {
        let s = signer("k");
        let sig = s.sign("msg");
        for i in 0..sig.len() {
            let mut chars: Vec<char> = sig.chars().collect();
            chars[i] = if chars[i] == '0' { '1' } else { '0' };
            let altered: String = chars.into_iter().collect();
            assert!(!s.verify("msg", &altered), "char {i} not covered");
        }
    }

    #[test]
    fn malformed_signatures_are_mismatches() {
        let s = signer("k");
        assert!(!s.verify("msg", ""));
        assert!(!s.verify("msg", "abc"));
        assert!(!s.verify("msg", &"zz".repeat(32)));
    }

    #[test]
    fn empty_secret_rejected() {
        let err = TicketSigner::new(&SecretString::from("")).unwrap_err();
        assert!(matches!(err, BoxofficeError::Configuration(_)));
    }

    #[test]
    fn payload_roundtrip_through_qr_string() {
        let s = signer("k");
        let rid = ReservationId::new();
        let payload = s.issue("MIP-LX2A9K-7QF3ZD", rid, 1_700_000_000);
        let raw = TicketSigner::encode_payload(&payload).unwrap();
        let decoded = TicketSigner::decode_payload(&raw).unwrap();
        assert_eq!(decoded, payload);
        s.verify_payload(&decoded).unwrap();
    }

    #[test]
    fn payload_bound_to_reservation() {
        let s = signer("k");
        let mut payload = s.issue("MIP-A-B", ReservationId::new(), 1);
        payload.reservation_id = ReservationId::new();
        assert!(matches!(
            s.verify_payload(&payload),
            Err(BoxofficeError::InvalidSignature)
        ));
    }

    #[test]
    fn payload_bound_to_timestamp() {
        let s = signer("k");
        let mut payload = s.issue("MIP-A-B", ReservationId::new(), 1);
        payload.timestamp += 1;
        assert!(s.verify_payload(&payload).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        for raw in ["", "not json", "{}", r#"{"ticket_number":"X"}"#] {
            assert!(
                matches!(
                    TicketSigner::decode_payload(raw),
                    Err(BoxofficeError::MalformedPayload { .. })
                ),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn debug_hides_key() {
        let dbg = format!("{:?}", signer("hunter2"));
        assert!(!dbg.contains("hunter2"));
    }
}
