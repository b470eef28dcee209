//! Shared fakes and fixtures for the ledger integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use boxoffice_ledger::{
    ArtifactRenderer, Backoffice, Collaborators, NewReservation, Notifier, ProofStorage,
    RenderRequest, RenderedPdf,
};
use boxoffice_signing::{TicketNumberGenerator, TicketNumberSource};
use boxoffice_store::MemoryStore;
use boxoffice_types::{
    Actor, BoxofficeConfig, BoxofficeError, NewParticipant, NewPayment, PackId, PackSnapshot,
    Participant, Payer, Payment, PaymentId, PaymentMethod, ProofUpload, Reservation,
    ReservationId, Result, RetryPolicy, Role, SignedPayload, Ticket, TicketTemplate, UserId,
};

pub const SECRET: &str = "test-qr-secret";

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub reservation_id: ReservationId,
    pub payment_id: PaymentId,
    pub history_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub ticket_number: String,
    pub participants: usize,
    pub pdf: Option<Vec<u8>>,
}

/// Records what was sent; can be told to fail the next N attempts.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub confirmations: Mutex<Vec<Confirmation>>,
    pub deliveries: Mutex<Vec<Delivery>>,
    pub attempts: AtomicU32,
    failures_left: AtomicU32,
}

impl RecordingNotifier {
    pub fn failing(times: u32) -> Self {
        let notifier = Self::default();
        notifier.failures_left.store(times, Ordering::SeqCst);
        notifier
    }

    pub fn confirmations(&self) -> Vec<Confirmation> {
        self.confirmations.lock().unwrap().clone()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    fn attempt(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            Err(BoxofficeError::Io("smtp unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_payment_confirmation(
        &self,
        reservation: &Reservation,
        payment: &Payment,
        all_payments: &[Payment],
    ) -> Result<()> {
        self.attempt()?;
        self.confirmations.lock().unwrap().push(Confirmation {
            reservation_id: reservation.id,
            payment_id: payment.id,
            history_len: all_payments.len(),
        });
        Ok(())
    }

    async fn send_ticket_delivery(
        &self,
        _reservation: &Reservation,
        ticket: &Ticket,
        participants: &[Participant],
        pdf: Option<&[u8]>,
    ) -> Result<()> {
        self.attempt()?;
        self.deliveries.lock().unwrap().push(Delivery {
            ticket_number: ticket.ticket_number.clone(),
            participants: participants.len(),
            pdf: pdf.map(<[u8]>::to_vec),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Produces deterministic references; can be switched into failure mode.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    pub fail: AtomicBool,
    pub qr_calls: AtomicU32,
    pub last_payload: Mutex<Option<SignedPayload>>,
    pub last_template: Mutex<Option<TicketTemplate>>,
}

impl FakeRenderer {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactRenderer for FakeRenderer {
    async fn render_qr(&self, payload: &SignedPayload) -> Result<String> {
        self.qr_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BoxofficeError::Io("renderer offline".into()));
        }
        *self.last_payload.lock().unwrap() = Some(payload.clone());
        Ok(format!("/uploads/qr/{}.png", payload.ticket_number))
    }

    async fn render_pdf(&self, request: &RenderRequest<'_>) -> Result<RenderedPdf> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BoxofficeError::Io("renderer offline".into()));
        }
        *self.last_template.lock().unwrap() = Some(request.template);
        Ok(RenderedPdf {
            pdf_ref: format!("/uploads/tickets/{}.pdf", request.ticket_number),
            bytes: format!("%PDF-1.4 {}", request.ticket_number).into_bytes(),
        })
    }
}

// ---------------------------------------------------------------------------
// Proof storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryProofs {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    counter: AtomicU32,
}

impl MemoryProofs {
    pub fn stored(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl ProofStorage for MemoryProofs {
    async fn store(&self, reservation_id: ReservationId, upload: &ProofUpload) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let proof_ref = format!("payments/{reservation_id}-{n}");
        self.files
            .lock()
            .unwrap()
            .insert(proof_ref.clone(), upload.bytes.clone());
        Ok(proof_ref)
    }

    async fn remove(&self, proof_ref: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .remove(proof_ref)
            .map(|_| ())
            .ok_or_else(|| BoxofficeError::Io(format!("no such proof: {proof_ref}")))
    }
}

// ---------------------------------------------------------------------------
// Ticket numbers
// ---------------------------------------------------------------------------

/// Hands out scripted numbers first, then real ones.
#[derive(Debug)]
pub struct ScriptedNumbers {
    script: Mutex<VecDeque<String>>,
    fallback: TicketNumberGenerator,
}

impl ScriptedNumbers {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(script: I) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Into::into).collect()),
            fallback: TicketNumberGenerator::default(),
        }
    }
}

impl TicketNumberSource for ScriptedNumbers {
    fn next_number(&self) -> String {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.next_number())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub backoffice: Backoffice,
    pub store: MemoryStore,
    pub notifier: Arc<RecordingNotifier>,
    pub renderer: Arc<FakeRenderer>,
    pub proofs: Arc<MemoryProofs>,
    pub superadmin: Actor,
    pub admin: Actor,
    pub cashier: Actor,
    pub scanner: Actor,
}

pub fn config() -> BoxofficeConfig {
    let mut config = BoxofficeConfig::with_secret(SECRET);
    config.notifications = RetryPolicy::no_retry();
    config
}

pub fn harness() -> Harness {
    harness_with(config(), MemoryStore::new(), RecordingNotifier::default())
}

pub fn harness_with(
    config: BoxofficeConfig,
    store: MemoryStore,
    notifier: RecordingNotifier,
) -> Harness {
    let notifier = Arc::new(notifier);
    let renderer = Arc::new(FakeRenderer::default());
    let proofs = Arc::new(MemoryProofs::default());
    let backoffice = Backoffice::new(
        config,
        Arc::new(store.clone()),
        Collaborators {
            renderer: renderer.clone(),
            notifier: notifier.clone(),
            proofs: proofs.clone(),
        },
    )
    .expect("backoffice builds");

    Harness {
        backoffice,
        store,
        notifier,
        renderer,
        proofs,
        superadmin: Actor::new(UserId::new(), Role::Superadmin),
        admin: Actor::new(UserId::new(), Role::Admin).with_ip("10.0.0.2"),
        cashier: Actor::new(UserId::new(), Role::Cashier).with_ip("10.0.0.3"),
        scanner: Actor::new(UserId::new(), Role::Scanner).with_user_agent("gate-scanner/2.0"),
    }
}

pub fn pack(unit_price: i64, template: TicketTemplate) -> PackSnapshot {
    PackSnapshot {
        pack_id: PackId::new(),
        name: "Soirée Soolouf".to_string(),
        unit_price,
        template,
    }
}

pub fn payer() -> Payer {
    Payer {
        name: "Awa Ndiaye".to_string(),
        phone: "+237600000000".to_string(),
        email: Some("awa@example.com".to_string()),
    }
}

impl Harness {
    /// One-seat reservation at `total_price` with the given participants.
    pub async fn reservation(&self, total_price: i64, participants: &[&str]) -> Reservation {
        self.backoffice
            .create_reservation(
                NewReservation {
                    payer: payer(),
                    pack: pack(total_price, TicketTemplate::Simple),
                    quantity: 1,
                    participants: participants
                        .iter()
                        .map(|name| NewParticipant::named(*name))
                        .collect(),
                },
                &self.admin,
            )
            .await
            .expect("reservation created")
    }

    /// Reservation fully paid in one cash payment.
    pub async fn paid_reservation(&self, total_price: i64, participants: &[&str]) -> Reservation {
        let reservation = self.reservation(total_price, participants).await;
        self.backoffice
            .add_payment(
                reservation.id,
                NewPayment::new(total_price, PaymentMethod::Cash),
                &self.cashier,
                None,
            )
            .await
            .expect("full payment accepted");
        reservation
    }
}
