//! Reaction-driven decisions.
//!
//! An admin reacting with the approve or deny emoji on one of the bot's
//! request messages decides the request. The request id is recovered from the
//! `Request ID: N` marker the wizard writes into the message, so a decision
//! can be applied even when the approval record was lost.

use std::sync::{Arc, OnceLock};

use greenlight_types::{
    Decision, GreenlightError, MediationAuthority, ReactionEvent, RequestId, SurfaceRenderer,
};
use regex::Regex;

use crate::applier::DecisionApplier;
use crate::locks::RequestLocks;
use crate::store::ApprovalStore;

/// Prefix of the request marker placed in request message footers.
pub const REQUEST_ID_MARKER: &str = "Request ID:";

/// Footer text identifying a request.
pub fn request_marker(request_id: RequestId) -> String {
    format!("{REQUEST_ID_MARKER} {request_id}")
}

/// Find a request marker in free text.
pub fn extract_request_id(text: &str) -> Option<RequestId> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)Request ID:\s*(\d+)").expect("request marker pattern is valid")
    });
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    FromBot,
    NotAdmin,
    UnknownEmoji,
    MessageUnavailable,
    NotOwnMessage,
    NoRequestMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    Ignored(IgnoreReason),
    /// The reaction's decision was pushed and applied.
    Applied { request_id: RequestId, decision: Decision },
    /// The authority had already decided; its decision was applied instead.
    AlreadyDecided { request_id: RequestId, decision: Decision },
    Failed { request_id: RequestId, reason: String },
}

pub struct ReactionHandler {
    store: Arc<ApprovalStore>,
    applier: Arc<DecisionApplier>,
    renderer: Arc<dyn SurfaceRenderer>,
    authority: Option<Arc<dyn MediationAuthority>>,
    locks: Arc<RequestLocks>,
}

impl ReactionHandler {
    pub fn new(
        store: Arc<ApprovalStore>,
        applier: Arc<DecisionApplier>,
        renderer: Arc<dyn SurfaceRenderer>,
        authority: Option<Arc<dyn MediationAuthority>>,
        locks: Arc<RequestLocks>,
    ) -> Self {
        Self {
            store,
            applier,
            renderer,
            authority,
            locks,
        }
    }

    pub async fn handle(&self, event: &ReactionEvent) -> ReactionOutcome {
        if event.user_is_bot {
            return ReactionOutcome::Ignored(IgnoreReason::FromBot);
        }

        let approval = self.applier.config();
        let is_admin = !approval.admin_role_ids.is_empty()
            && event
                .member_role_ids
                .iter()
                .any(|r| approval.admin_role_ids.contains(r));
        if !is_admin {
            return ReactionOutcome::Ignored(IgnoreReason::NotAdmin);
        }

        let Some(approved) = approval.emojis().classify(&event.emoji) else {
            return ReactionOutcome::Ignored(IgnoreReason::UnknownEmoji);
        };

        let message = match self.renderer.fetch(event.surface_id, event.message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => return ReactionOutcome::Ignored(IgnoreReason::MessageUnavailable),
            Err(e) => {
                tracing::warn!(error = %e, surface_id = event.surface_id, "could not read reacted message");
                return ReactionOutcome::Ignored(IgnoreReason::MessageUnavailable);
            }
        };
        if message.author_id != self.renderer.bot_user_id() {
            return ReactionOutcome::Ignored(IgnoreReason::NotOwnMessage);
        }

        let request_id = extract_request_id(&message.content)
            .or_else(|| message.footer().and_then(extract_request_id));
        let Some(request_id) = request_id else {
            return ReactionOutcome::Ignored(IgnoreReason::NoRequestMarker);
        };

        let _guard = self.locks.acquire(request_id).await;
        let is_admin_surface = approval.admin_surface_ids.contains(&event.surface_id);

        match self.decide(request_id, approved).await {
            Ok(Some(existing)) => {
                self.apply(request_id, event, is_admin_surface, existing == Decision::Approved)
                    .await;
                ReactionOutcome::AlreadyDecided {
                    request_id,
                    decision: existing,
                }
            }
            Ok(None) => {
                self.apply(request_id, event, is_admin_surface, approved).await;
                ReactionOutcome::Applied {
                    request_id,
                    decision: Decision::from_approved(approved),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, request_id, "reaction decision not applied");
                ReactionOutcome::Failed {
                    request_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Push the decision to the authority unless it already holds a terminal
    /// one, which is returned instead.
    async fn decide(
        &self,
        request_id: RequestId,
        approved: bool,
    ) -> Result<Option<Decision>, GreenlightError> {
        let Some(authority) = &self.authority else {
            return Ok(None);
        };

        match authority.status(request_id).await {
            Ok(status) => match status.decision() {
                Some(decision) if decision.is_terminal() => return Ok(Some(decision)),
                Some(_) => {}
                None => {
                    return Err(GreenlightError::Authority(format!(
                        "authority has no record of request {request_id}"
                    )))
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, request_id, "authority status unavailable, pushing decision anyway");
            }
        }

        if approved {
            authority.approve(request_id).await?;
        } else {
            authority.deny(request_id).await?;
        }
        Ok(None)
    }

    async fn apply(&self, request_id: RequestId, event: &ReactionEvent, is_admin_surface: bool, approved: bool) {
        match self.store.snapshot(request_id) {
            Some(record) => {
                self.applier.apply_record(&record, approved).await;
            }
            None => {
                // Without a record the requester is unknown.
                let outcome = self
                    .applier
                    .apply_to_unrecorded(event.surface_id, event.message_id, "", is_admin_surface, approved)
                    .await;
                tracing::info!(request_id, ?outcome, "decision applied to unrecorded message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use greenlight_types::config::ApprovalConfig;
    use greenlight_types::{AuthorityStatus, EntitySummary, MessageRef};

    const ADMIN_ROLE: u64 = 55;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<ApprovalStore>,
        renderer: Arc<MockRenderer>,
        authority: Arc<MockAuthority>,
        handler: ReactionHandler,
    }

    fn setup(with_authority: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ApprovalStore::open(dir.path()));
        let renderer = MockRenderer::new();
        let authority = MockAuthority::new();
        let applier = Arc::new(DecisionApplier::new(
            store.clone(),
            renderer.clone(),
            ApprovalConfig {
                admin_role_ids: vec![ADMIN_ROLE],
                admin_surface_ids: vec![2],
                ..Default::default()
            },
        ));
        let handler = ReactionHandler::new(
            store.clone(),
            applier,
            renderer.clone(),
            if with_authority {
                Some(authority.clone() as Arc<dyn MediationAuthority>)
            } else {
                None
            },
            Arc::new(RequestLocks::new()),
        );
        Fixture {
            _dir: dir,
            store,
            renderer,
            authority,
            handler,
        }
    }

    fn reaction(surface_id: u64, message_id: u64, emoji: &str) -> ReactionEvent {
        ReactionEvent {
            surface_id,
            message_id,
            user_id: 1,
            user_is_bot: false,
            member_role_ids: vec![ADMIN_ROLE],
            emoji: emoji.to_string(),
        }
    }

    fn seed_request(f: &Fixture, request_id: RequestId) {
        f.renderer.seed(1, 10, "pending");
        f.renderer.seed(2, 20, &format!("alice is asking. {}", request_marker(request_id)));
        f.store.add_message(
            request_id,
            "alice",
            7,
            MessageRef {
                surface_id: 1,
                message_id: 10,
                is_admin_surface: false,
                is_direct_message: false,
            },
        );
        f.store.add_message(
            request_id,
            "",
            0,
            MessageRef {
                surface_id: 2,
                message_id: 20,
                is_admin_surface: true,
                is_direct_message: false,
            },
        );
    }

    #[test]
    fn test_extract_request_id() {
        assert_eq!(extract_request_id("Request ID: 42"), Some(42));
        assert_eq!(extract_request_id("foo request id:7 bar"), Some(7));
        assert_eq!(extract_request_id("Request ID: none"), None);
        assert_eq!(extract_request_id(&request_marker(1234)), Some(1234));
    }

    #[tokio::test]
    async fn test_admin_approve_pushes_and_applies() {
        let f = setup(true);
        seed_request(&f, 42);
        f.authority.set(42, AuthorityStatus::Pending);

        let outcome = f.handler.handle(&reaction(2, 20, "✅")).await;

        assert_eq!(
            outcome,
            ReactionOutcome::Applied {
                request_id: 42,
                decision: Decision::Approved
            }
        );
        assert_eq!(f.authority.pushed(), vec![(42, Decision::Approved)]);
        assert_eq!(f.renderer.content(1, 10).unwrap(), "Your request has been approved.");
        assert!(f.store.snapshot(42).is_none());
    }

    #[tokio::test]
    async fn test_terminal_authority_status_wins() {
        let f = setup(true);
        seed_request(&f, 42);
        f.authority.set(42, AuthorityStatus::Denied);

        let outcome = f.handler.handle(&reaction(2, 20, "✅")).await;

        assert_eq!(
            outcome,
            ReactionOutcome::AlreadyDecided {
                request_id: 42,
                decision: Decision::Denied
            }
        );
        assert!(f.authority.pushed().is_empty());
        assert_eq!(f.renderer.content(1, 10).unwrap(), "Your request has been denied.");
    }

    #[tokio::test]
    async fn test_failed_push_leaves_record_pending() {
        let f = setup(true);
        seed_request(&f, 42);
        f.authority.set(42, AuthorityStatus::Pending);
        *f.authority.fail_push.lock().unwrap() = true;

        let outcome = f.handler.handle(&reaction(2, 20, "❌")).await;

        assert!(matches!(outcome, ReactionOutcome::Failed { request_id: 42, .. }));
        assert!(f.store.snapshot(42).is_some());
    }

    #[tokio::test]
    async fn test_unrecorded_admin_message_gets_plain_status() {
        let f = setup(false);
        f.renderer.seed(2, 20, &format!("alice is asking. {}", request_marker(9)));

        let outcome = f.handler.handle(&reaction(2, 20, "✅")).await;

        assert_eq!(
            outcome,
            ReactionOutcome::Applied {
                request_id: 9,
                decision: Decision::Approved
            }
        );
        assert_eq!(f.renderer.content(2, 20).unwrap(), "Your request has been approved.");
    }

    #[tokio::test]
    async fn test_marker_in_footer_is_found() {
        let f = setup(false);
        f.renderer.seed(3, 30, "pending");
        f.renderer.messages.lock().unwrap().get_mut(&(3, 30)).unwrap().summary = Some(EntitySummary {
            footer: Some(request_marker(8)),
            ..Default::default()
        });

        let outcome = f.handler.handle(&reaction(3, 30, "❌")).await;

        assert_eq!(
            outcome,
            ReactionOutcome::Applied {
                request_id: 8,
                decision: Decision::Denied
            }
        );
        assert_eq!(f.renderer.content(3, 30).unwrap(), "Your request has been denied.");
    }

    #[tokio::test]
    async fn test_ignores_non_admins_bots_and_foreign_messages() {
        let f = setup(true);
        seed_request(&f, 42);

        let mut event = reaction(2, 20, "✅");
        event.user_is_bot = true;
        assert_eq!(f.handler.handle(&event).await, ReactionOutcome::Ignored(IgnoreReason::FromBot));

        let mut event = reaction(2, 20, "✅");
        event.member_role_ids = vec![1];
        assert_eq!(f.handler.handle(&event).await, ReactionOutcome::Ignored(IgnoreReason::NotAdmin));

        assert_eq!(
            f.handler.handle(&reaction(2, 20, "🎉")).await,
            ReactionOutcome::Ignored(IgnoreReason::UnknownEmoji)
        );

        f.renderer.messages.lock().unwrap().get_mut(&(2, 20)).unwrap().author_id = 12;
        assert_eq!(
            f.handler.handle(&reaction(2, 20, "✅")).await,
            ReactionOutcome::Ignored(IgnoreReason::NotOwnMessage)
        );

        assert_eq!(
            f.handler.handle(&reaction(1, 10, "✅")).await,
            ReactionOutcome::Ignored(IgnoreReason::NoRequestMarker)
        );
        assert!(f.store.snapshot(42).is_some());
    }
}
