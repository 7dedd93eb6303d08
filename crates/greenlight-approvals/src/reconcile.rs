//! Reconciliation of locally pending records against the mediation authority.
//!
//! One sweep walks every record in the store:
//! 1. Authority status unavailable or unknown: leave pending for a later sweep
//! 2. Authority still pending: infer a decision from human reactions across all
//!    surfaces; exactly one of approve/deny present decides, anything else waits
//! 3. Authority terminal: apply its decision regardless of local reactions
//!
//! Sweeps are gated: a sweep requested while another is in flight returns
//! immediately with `SweepOutcome::Busy` instead of queueing.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use greenlight_types::config::{EmojiPair, GreenlightConfig};
use greenlight_types::{
    ApprovalRecord, Decision, GreenlightError, MediationAuthority, RequestId, SurfaceRenderer,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::applier::DecisionApplier;
use crate::locks::RequestLocks;
use crate::store::ApprovalStore;

/// Where a sweep's decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Authority,
    Reactions,
}

/// What human reactions across a record's surfaces say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionInference {
    Approve,
    Deny,
    /// Both approve and deny reactions are present.
    Conflicting,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied { decision: Decision, source: DecisionSource },
    StillPending(ReactionInference),
    Unavailable,
    /// Another path decided the request while this sweep waited for it.
    AlreadyGone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub sweep_id: Uuid,
    pub outcomes: Vec<(RequestId, RecordOutcome)>,
    pub failed: Vec<(RequestId, String)>,
}

impl SweepReport {
    pub fn applied(&self) -> impl Iterator<Item = RequestId> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RecordOutcome::Applied { .. }))
            .map(|(id, _)| *id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Another sweep holds the gate.
    Busy,
    /// Nothing delegates approval to an authority.
    Disabled,
    Completed(SweepReport),
}

/// Settings a sweep reads, replaced on configuration changes.
#[derive(Debug, Clone)]
struct SweepSettings {
    enabled: bool,
    emojis: EmojiPair,
    stale_after: chrono::Duration,
}

impl SweepSettings {
    fn from_config(config: &GreenlightConfig) -> Self {
        // Duration::hours panics past i64::MAX milliseconds.
        let hours = i64::try_from(config.reconcile.stale_warning_hours)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 3_600_000);
        Self {
            enabled: config.delegates_approval(),
            emojis: config.approval.emojis(),
            stale_after: chrono::Duration::hours(hours),
        }
    }
}

/// Dependencies of the reconciler.
pub struct ReconcilerDeps {
    pub store: Arc<ApprovalStore>,
    pub applier: Arc<DecisionApplier>,
    pub renderer: Arc<dyn SurfaceRenderer>,
    pub authority: Option<Arc<dyn MediationAuthority>>,
    pub locks: Arc<RequestLocks>,
}

pub struct Reconciler {
    deps: ReconcilerDeps,
    settings: RwLock<SweepSettings>,
    gate: tokio::sync::Mutex<()>,
}

impl Reconciler {
    pub fn new(deps: ReconcilerDeps, config: &GreenlightConfig) -> Self {
        Self {
            deps,
            settings: RwLock::new(SweepSettings::from_config(config)),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Pick up a new configuration for subsequent sweeps.
    pub fn apply_config(&self, config: &GreenlightConfig) {
        *self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = SweepSettings::from_config(config);
        self.deps.applier.set_config(config.approval.clone());
    }

    fn settings(&self) -> SweepSettings {
        self.settings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run one sweep unless another is in flight.
    pub async fn sweep(&self) -> SweepOutcome {
        let Ok(_gate) = self.gate.try_lock() else {
            tracing::debug!("reconciliation already running, trigger dropped");
            return SweepOutcome::Busy;
        };

        let settings = self.settings();
        let authority = match &self.deps.authority {
            Some(authority) if settings.enabled => authority.clone(),
            _ => {
                tracing::debug!("no category delegates approval, skipping reconciliation");
                return SweepOutcome::Disabled;
            }
        };

        let sweep_id = Uuid::new_v4();
        let span = tracing::info_span!("reconcile", %sweep_id);
        let report = self
            .run(sweep_id, authority.as_ref(), &settings)
            .instrument(span)
            .await;
        SweepOutcome::Completed(report)
    }

    async fn run(
        &self,
        sweep_id: Uuid,
        authority: &dyn MediationAuthority,
        settings: &SweepSettings,
    ) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport {
            sweep_id,
            outcomes: Vec::new(),
            failed: Vec::new(),
        };

        let records = self.deps.store.snapshots();
        if records.is_empty() {
            tracing::debug!("no pending approval records");
            return report;
        }

        for request_id in records.iter().map(|r| r.request_id) {
            match self.reconcile_record(request_id, authority, settings).await {
                Ok(outcome) => report.outcomes.push((request_id, outcome)),
                Err(e) => {
                    tracing::warn!(error = %e, request_id, "failed to reconcile approval record");
                    report.failed.push((request_id, e.to_string()));
                }
            }
        }

        tracing::info!(
            examined = report.outcomes.len() + report.failed.len(),
            applied = report.applied().count(),
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reconciliation sweep completed"
        );
        report
    }

    async fn reconcile_record(
        &self,
        request_id: RequestId,
        authority: &dyn MediationAuthority,
        settings: &SweepSettings,
    ) -> Result<RecordOutcome, GreenlightError> {
        let _guard = self.deps.locks.acquire(request_id).await;
        // A reaction may have decided it while we waited.
        let Some(record) = self.deps.store.snapshot(request_id) else {
            return Ok(RecordOutcome::AlreadyGone);
        };

        let status = match authority.status(request_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, request_id, "authority status unavailable, leaving pending");
                return Ok(RecordOutcome::Unavailable);
            }
        };

        match status.decision() {
            None => {
                tracing::debug!(request_id, "authority has no record, leaving pending");
                Ok(RecordOutcome::Unavailable)
            }
            Some(decision) if decision.is_terminal() => {
                self.deps
                    .applier
                    .apply_record(&record, decision == Decision::Approved)
                    .await;
                Ok(RecordOutcome::Applied {
                    decision,
                    source: DecisionSource::Authority,
                })
            }
            Some(_) => {
                let inference = self.infer_decision(&record, &settings.emojis).await;
                let approved = match inference {
                    ReactionInference::Approve => true,
                    ReactionInference::Deny => false,
                    ReactionInference::Conflicting | ReactionInference::None => {
                        self.warn_if_stale(&record, inference, settings);
                        return Ok(RecordOutcome::StillPending(inference));
                    }
                };

                if approved {
                    authority.approve(request_id).await?;
                } else {
                    authority.deny(request_id).await?;
                }
                self.deps.applier.apply_record(&record, approved).await;
                Ok(RecordOutcome::Applied {
                    decision: Decision::from_approved(approved),
                    source: DecisionSource::Reactions,
                })
            }
        }
    }

    /// Aggregate human reactions over every reachable surface of a record.
    /// The bot's own reactions do not count.
    pub async fn infer_decision(&self, record: &ApprovalRecord, emojis: &EmojiPair) -> ReactionInference {
        let mut approvals = 0u32;
        let mut denials = 0u32;

        // Admin surfaces first; they are where reviewers usually react.
        let mut messages: Vec<_> = record.messages.iter().collect();
        messages.sort_by_key(|m| !m.is_admin_surface);

        for message in messages {
            match self.deps.renderer.fetch(message.surface_id, message.message_id).await {
                Ok(Some(surface)) => {
                    approvals += surface.human_reactions(&emojis.approve);
                    denials += surface.human_reactions(&emojis.deny);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        request_id = record.request_id,
                        surface_id = message.surface_id,
                        "could not read reactions"
                    );
                }
            }
        }

        match (approvals > 0, denials > 0) {
            (true, false) => ReactionInference::Approve,
            (false, true) => ReactionInference::Deny,
            (true, true) => ReactionInference::Conflicting,
            (false, false) => ReactionInference::None,
        }
    }

    fn warn_if_stale(&self, record: &ApprovalRecord, inference: ReactionInference, settings: &SweepSettings) {
        let Some(registered_at) = record.registered_at else {
            return;
        };
        let age = Utc::now() - registered_at;
        if inference == ReactionInference::Conflicting && age > settings.stale_after {
            tracing::warn!(
                request_id = record.request_id,
                age_hours = age.num_hours(),
                "conflicting approval reactions, request remains pending"
            );
        }
    }
}
