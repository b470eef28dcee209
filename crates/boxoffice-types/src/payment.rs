//! Payment records applied against a reservation's balance.
//!
//! Payments are immutable once written. The only other mutation is deletion,
//! and only while the owning reservation has no ticket.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, BoxofficeError, PaymentId, ReservationId, UserId};

/// How the money was collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// MTN MoMo, Orange Money and similar wallets.
    MobileMoney,
    Card,
    Other,
}

impl PaymentMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::MobileMoney => "mobile_money",
            Self::Card => "card",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = BoxofficeError;

    /// Accepts the canonical names plus the wallet brands cashiers type in.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(Self::Cash),
            "mobile_money" | "mobile-money" | "momo" | "orange" => Ok(Self::MobileMoney),
            "card" => Ok(Self::Card),
            "other" => Ok(Self::Other),
            _ => Err(BoxofficeError::InvalidPaymentMethod(s.to_string())),
        }
    }
}

/// One discrete amount applied toward a reservation's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub reservation_id: ReservationId,
    /// Always positive.
    pub amount: Amount,
    pub method: PaymentMethod,
    pub comment: Option<String>,
    /// Storage reference of the uploaded proof, if any.
    pub proof_ref: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Cashier input for a new payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: Amount,
    pub method: PaymentMethod,
    pub comment: Option<String>,
    /// Client-generated id of the submission (one per form render). Two
    /// submissions with the same id are the same request; without one, the
    /// duplicate guard falls back to matching on amount and method.
    #[serde(default)]
    pub request_id: Option<String>,
}

impl NewPayment {
    #[must_use]
    pub fn new(amount: Amount, method: PaymentMethod) -> Self {
        Self {
            amount,
            method,
            comment: None,
            request_id: None,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Shape check done before any lock is taken.
    ///
    /// # Errors
    /// Returns `InvalidAmount` unless `amount > 0`.
    pub fn validate(&self) -> crate::Result<()> {
        if self.amount <= 0 {
            return Err(BoxofficeError::InvalidAmount {
                amount: self.amount,
            });
        }
        Ok(())
    }
}

/// Uploaded proof-of-payment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_aliases_parse() {
        assert_eq!("momo".parse::<PaymentMethod>().unwrap(), PaymentMethod::MobileMoney);
        assert_eq!("Orange".parse::<PaymentMethod>().unwrap(), PaymentMethod::MobileMoney);
        assert_eq!(" CASH ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
    }

    #[test]
    fn unknown_method_rejected() {
        let err = "cheque".parse::<PaymentMethod>().unwrap_err();
        assert!(matches!(err, BoxofficeError::InvalidPaymentMethod(m) if m == "cheque"));
    }

    #[test]
    fn new_payment_validation() {
        assert!(NewPayment::new(1, PaymentMethod::Card).validate().is_ok());
        assert!(NewPayment::new(0, PaymentMethod::Card).validate().is_err());
        assert!(NewPayment::new(-100, PaymentMethod::Cash).validate().is_err());
    }

    #[test]
    fn method_serde_uses_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::MobileMoney).unwrap();
        assert_eq!(json, "\"mobile_money\"");
    }
}
