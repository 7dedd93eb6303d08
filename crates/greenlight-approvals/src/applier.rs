//! Decision fan-out to every surface showing a request.
//!
//! Each surface is updated independently and reports its own outcome. One
//! surface failing never stops the others, and nothing here returns an error
//! to the caller. Updating a surface means replacing its text content with
//! the terminal status and clearing the reaction affordances. The rendered
//! summary is left as it was.

use std::sync::{Arc, RwLock};

use greenlight_types::config::ApprovalConfig;
use greenlight_types::{
    ApprovalRecord, GreenlightError, MessageId, MessageRef, OutboundMessage, RequestId, SurfaceId,
    SurfaceRenderer,
};

use crate::store::ApprovalStore;

/// Result of updating one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOutcome {
    /// The original message now shows the decision.
    Updated,
    /// The original message was unreachable; a new message was sent to the
    /// requester's direct surface instead.
    NotifiedRequester { surface_id: SurfaceId },
    /// The message is gone and no fallback applies.
    Unresolved,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceReport {
    pub message: MessageRef,
    pub outcome: SurfaceOutcome,
}

pub struct DecisionApplier {
    store: Arc<ApprovalStore>,
    renderer: Arc<dyn SurfaceRenderer>,
    approval: RwLock<ApprovalConfig>,
}

impl DecisionApplier {
    pub fn new(
        store: Arc<ApprovalStore>,
        renderer: Arc<dyn SurfaceRenderer>,
        approval: ApprovalConfig,
    ) -> Self {
        Self {
            store,
            renderer,
            approval: RwLock::new(approval),
        }
    }

    pub fn set_config(&self, approval: ApprovalConfig) {
        *self
            .approval
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = approval;
    }

    pub fn config(&self) -> ApprovalConfig {
        self.approval
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply a decision to every known surface of `request_id` and drop the
    /// record. A request with no record yields no reports.
    pub async fn apply(&self, request_id: RequestId, approved: bool) -> Vec<SurfaceReport> {
        match self.store.snapshot(request_id) {
            Some(record) => self.apply_record(&record, approved).await,
            None => {
                tracing::debug!(request_id, "no approval record to apply");
                Vec::new()
            }
        }
    }

    /// Apply a decision to the surfaces of `record` and drop it from the store.
    pub async fn apply_record(&self, record: &ApprovalRecord, approved: bool) -> Vec<SurfaceReport> {
        let mut reports = Vec::with_capacity(record.messages.len());
        for message in &record.messages {
            let outcome = self.apply_to_message(record, message, approved).await;
            if let SurfaceOutcome::Failed(reason) = &outcome {
                tracing::warn!(
                    request_id = record.request_id,
                    surface_id = message.surface_id,
                    message_id = message.message_id,
                    error = %reason,
                    "failed to update approval surface"
                );
            }
            reports.push(SurfaceReport {
                message: message.clone(),
                outcome,
            });
        }

        self.store.remove(record.request_id);

        let updated = reports
            .iter()
            .filter(|r| !matches!(r.outcome, SurfaceOutcome::Failed(_) | SurfaceOutcome::Unresolved))
            .count();
        tracing::info!(
            request_id = record.request_id,
            approved,
            surfaces = reports.len(),
            updated,
            "approval decision applied"
        );
        reports
    }

    /// Update one surface of a record.
    pub async fn apply_to_message(
        &self,
        record: &ApprovalRecord,
        message: &MessageRef,
        approved: bool,
    ) -> SurfaceOutcome {
        let content = self.status_content(&record.requester_username, message.is_admin_surface, approved);

        let resolved = match self.renderer.fetch(message.surface_id, message.message_id).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) if message.is_direct_message => {
                tracing::debug!(error = %e, surface_id = message.surface_id, "direct surface unreachable, trying fallback");
                false
            }
            Err(e) => return SurfaceOutcome::Failed(e.to_string()),
        };

        if resolved {
            return match self.update(message.surface_id, message.message_id, &content).await {
                Ok(()) => SurfaceOutcome::Updated,
                Err(e) => SurfaceOutcome::Failed(e.to_string()),
            };
        }

        if !message.is_direct_message {
            return SurfaceOutcome::Unresolved;
        }

        match self.notify_requester(record, message, &content).await {
            Ok(outcome) => outcome,
            Err(e) => SurfaceOutcome::Failed(e.to_string()),
        }
    }

    /// Update a single message that has no record, e.g. one decided by a
    /// reaction after its record was lost.
    pub async fn apply_to_unrecorded(
        &self,
        surface_id: SurfaceId,
        message_id: MessageId,
        requester_username: &str,
        is_admin_surface: bool,
        approved: bool,
    ) -> SurfaceOutcome {
        let content = self.status_content(requester_username, is_admin_surface, approved);
        match self.update(surface_id, message_id, &content).await {
            Ok(()) => SurfaceOutcome::Updated,
            Err(e) => SurfaceOutcome::Failed(e.to_string()),
        }
    }

    /// Text shown on a surface once a decision is made. Admin surfaces get
    /// the summary template unless the requester is unknown.
    pub fn status_content(&self, requester_username: &str, is_admin_surface: bool, approved: bool) -> String {
        let approval = self
            .approval
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let status = approval.status_text(approved);
        if is_admin_surface && !requester_username.trim().is_empty() {
            approval
                .admin_summary_template
                .replace("[AuthorUsername]", requester_username)
                .replace("[RequestStatus]", status)
        } else {
            status.to_string()
        }
    }

    async fn update(&self, surface_id: SurfaceId, message_id: MessageId, content: &str) -> Result<(), GreenlightError> {
        self.renderer.edit_content(surface_id, message_id, content).await?;
        self.renderer.clear_reactions(surface_id, message_id).await
    }

    /// The requester may have left the surface that hosted the message. Look
    /// the message up in their direct surface, or send the status there.
    async fn notify_requester(
        &self,
        record: &ApprovalRecord,
        message: &MessageRef,
        content: &str,
    ) -> Result<SurfaceOutcome, GreenlightError> {
        if record.requester_user_id == 0 {
            return Ok(SurfaceOutcome::Unresolved);
        }
        let Some(direct) = self.renderer.direct_surface(record.requester_user_id).await? else {
            return Ok(SurfaceOutcome::Unresolved);
        };

        if direct != message.surface_id {
            if let Ok(Some(_)) = self.renderer.fetch(direct, message.message_id).await {
                self.update(direct, message.message_id, content).await?;
                return Ok(SurfaceOutcome::Updated);
            }
        }

        self.renderer
            .send(
                direct,
                &OutboundMessage {
                    content: content.to_string(),
                    summary: None,
                },
            )
            .await?;
        Ok(SurfaceOutcome::NotifiedRequester { surface_id: direct })
    }
}
