//! Outcome handling shared by every mutating operation.
//!
//! Successful mutations stage their audit entry inside their own transaction.
//! This module covers the other side: once an operation has failed and its
//! transaction is gone, log the failure at the right level and, for business
//! rejections, leave a `failed` entry in a separate transaction. That entry
//! never touches the rejected entity.

use boxoffice_store::Store;
use boxoffice_types::{
    Actor, AuditAction, AuditEntry, BoxofficeError, EntityType, Permission, Result,
};
use serde_json::json;

/// What an operation was trying to do, for failure reporting.
#[derive(Debug, Clone)]
pub(crate) struct Attempt<'a> {
    pub actor: &'a Actor,
    pub permission: Permission,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl<'a> Attempt<'a> {
    pub(crate) fn new(
        actor: &'a Actor,
        permission: Permission,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            actor,
            permission,
            action,
            entity_type,
            entity_id: entity_id.to_string(),
        }
    }

    /// Start the success entry for this attempt.
    pub(crate) fn entry(&self) -> AuditEntry {
        AuditEntry::new(
            self.actor,
            self.permission,
            self.action,
            self.entity_type,
            &self.entity_id,
        )
    }
}

/// Pass `result` through, reporting it first if it is an error.
pub(crate) async fn settle<T>(
    store: &dyn Store,
    attempt: &Attempt<'_>,
    result: Result<T>,
) -> Result<T> {
    if let Err(err) = &result {
        record_failure(store, attempt, err).await;
    }
    result
}

async fn record_failure(store: &dyn Store, attempt: &Attempt<'_>, err: &BoxofficeError) {
    let action = attempt.action.as_str();
    let entity_id = attempt.entity_id.as_str();
    let actor = attempt.actor.user_id;

    if !err.is_rejection() {
        if err.kind().is_retryable() {
            tracing::error!(action, entity_id, %actor, error = %err, "operation failed, rolled back");
        } else {
            tracing::warn!(action, entity_id, %actor, error = %err, "operation refused");
        }
        return;
    }

    tracing::warn!(action, entity_id, %actor, error = %err, "operation rejected");

    let entry = attempt
        .entry()
        .describe(format!("{action} rejected: {err}"))
        .with_changes(json!({
            "error_kind": format!("{:?}", err.kind()),
            "status_code": err.http_status(),
        }))
        .failed();

    if let Err(audit_err) = append_alone(store, entry).await {
        tracing::error!(
            action,
            entity_id,
            error = %audit_err,
            "failed to record rejected attempt in audit trail"
        );
    }
}

async fn append_alone(store: &dyn Store, entry: AuditEntry) -> Result<()> {
    let mut tx = store.begin().await?;
    tx.append_audit(entry).await?;
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_store::MemoryStore;
    use boxoffice_types::{AuditStatus, ReservationId, Role, UserId};

    fn attempt(actor: &Actor) -> Attempt<'_> {
        Attempt::new(
            actor,
            Permission::PaymentsAdd,
            AuditAction::PaymentAdd,
            EntityType::Reservation,
            ReservationId::new(),
        )
    }

    #[tokio::test]
    async fn rejection_leaves_failed_entry() {
        let store = MemoryStore::new();
        let actor = Actor::new(UserId::new(), Role::Cashier);
        let a = attempt(&actor);

        let result: Result<()> = Err(BoxofficeError::DuplicateRequest);
        assert!(settle(&store, &a, result).await.is_err());

        let log = store.audit_for(&a.entity_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, AuditStatus::Failed);
        assert_eq!(log[0].action, AuditAction::PaymentAdd);
        assert_eq!(log[0].changes["status_code"], 409);
    }

    #[tokio::test]
    async fn infrastructure_failure_not_audited() {
        let store = MemoryStore::new();
        let actor = Actor::new(UserId::new(), Role::Admin);
        let a = attempt(&actor);

        let result: Result<()> = Err(BoxofficeError::Storage("disk full".into()));
        assert!(settle(&store, &a, result).await.is_err());
        let not_found: Result<()> = Err(BoxofficeError::ReservationNotFound(ReservationId::new()));
        assert!(settle(&store, &a, not_found).await.is_err());

        assert!(store.audit_log().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn success_passes_through_silently() {
        let store = MemoryStore::new();
        let actor = Actor::new(UserId::new(), Role::Admin);
        let value = settle(&store, &attempt(&actor), Ok(7)).await.unwrap();
        assert_eq!(value, 7);
        assert!(store.audit_log().await.unwrap().is_empty());
    }
}
