//! The service handle every operation hangs off.

use std::sync::Arc;

use boxoffice_signing::{TicketNumberGenerator, TicketNumberSource, TicketSigner};
use boxoffice_store::Store;
use boxoffice_types::{
    Actor, AuditEntry, BoxofficeConfig, Permission, PermissionTable, Reservation, ReservationId,
    Result, TemplateTable,
};

use crate::guard::DuplicateGuard;
use crate::notify::{NotificationDispatcher, Notifier};
use crate::proof::ProofStorage;
use crate::renderer::ArtifactRenderer;

/// External collaborators the core calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn ArtifactRenderer>,
    pub notifier: Arc<dyn Notifier>,
    pub proofs: Arc<dyn ProofStorage>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Payment ledger, ticket issuance, entrance scanning and the reservation
/// desk over one [`Store`].
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
pub struct Backoffice {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) signer: TicketSigner,
    pub(crate) numbers: Arc<dyn TicketNumberSource>,
    pub(crate) renderer: Arc<dyn ArtifactRenderer>,
    pub(crate) proofs: Arc<dyn ProofStorage>,
    pub(crate) notifications: NotificationDispatcher,
    pub(crate) guard: DuplicateGuard,
    pub(crate) permissions: PermissionTable,
    pub(crate) templates: TemplateTable,
}

impl std::fmt::Debug for Backoffice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoffice")
            .field("signer", &self.signer)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl Backoffice {
    /// Wire the services together and start the notification worker.
    ///
    /// Must be called from inside a Tokio runtime.
    ///
    /// # Errors
    /// Returns `Configuration` for an unusable signing secret or guard size.
    pub fn new(
        config: BoxofficeConfig,
        store: Arc<dyn Store>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let signer = TicketSigner::from_config(&config.signing)?;
        let guard = DuplicateGuard::new(&config.guard)?;
        let numbers = Arc::new(TicketNumberGenerator::new(
            config.signing.ticket_prefix.clone(),
        ));
        let notifications =
            NotificationDispatcher::spawn(collaborators.notifier, config.notifications);

        tracing::info!(
            prefix = %config.signing.ticket_prefix,
            guard_window_ms = config.guard.window_ms,
            notify_attempts = config.notifications.max_attempts,
            "boxoffice ready"
        );

        Ok(Self {
            store,
            signer,
            numbers,
            renderer: collaborators.renderer,
            proofs: collaborators.proofs,
            notifications,
            guard,
            permissions: config.permissions,
            templates: config.templates,
        })
    }

    /// Replace the ticket number source.
    #[must_use]
    pub fn with_ticket_numbers(mut self, numbers: Arc<dyn TicketNumberSource>) -> Self {
        self.numbers = numbers;
        self
    }

    /// Committed-state store handle, for read paths and inspection.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Full audit trail about one entity, oldest first.
    ///
    /// # Errors
    /// Propagates storage failures.
    pub async fn audit_trail(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        self.store.audit_for(entity_id).await
    }

    /// Drain queued notifications and stop the worker.
    pub async fn shutdown(&self) {
        self.notifications.shutdown().await;
        tracing::info!("boxoffice stopped");
    }

    pub(crate) fn authorize(&self, actor: &Actor, permission: Permission) -> Result<()> {
        self.permissions.check(actor.role, permission)
    }

    pub(crate) async fn load_reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.store
            .reservation(id)
            .await?
            .ok_or(boxoffice_types::BoxofficeError::ReservationNotFound(id))
    }
}
