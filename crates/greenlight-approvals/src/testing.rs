//! In-memory collaborators shared by this crate's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use greenlight_types::config::{AuthorityConfig, CategoryConfig, GreenlightConfig, RestrictionConfig};
use greenlight_types::*;
use tokio::sync::Notify;

pub const BOT_ID: UserId = 999;

/// Calls recorded by `MockRenderer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Send(SurfaceId, String),
    Edit(SurfaceId, MessageId, String),
    React(SurfaceId, MessageId, String),
    Clear(SurfaceId, MessageId),
}

#[derive(Default)]
pub struct MockRenderer {
    pub messages: Mutex<HashMap<(SurfaceId, MessageId), SurfaceMessage>>,
    pub direct_surfaces: Mutex<HashMap<UserId, SurfaceId>>,
    pub failing_fetch: Mutex<HashSet<SurfaceId>>,
    pub failing_edit: Mutex<HashSet<SurfaceId>>,
    pub calls: Mutex<Vec<SurfaceCall>>,
    next_id: AtomicU64,
}

impl MockRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(5000),
            ..Default::default()
        })
    }

    /// Seed a bot-authored message.
    pub fn seed(&self, surface_id: SurfaceId, message_id: MessageId, content: &str) {
        self.messages.lock().unwrap().insert(
            (surface_id, message_id),
            SurfaceMessage {
                surface_id,
                message_id,
                author_id: BOT_ID,
                content: content.to_string(),
                summary: None,
                reactions: Vec::new(),
            },
        );
    }

    /// Set the reaction tally for an emoji, with the bot's own reaction included.
    pub fn set_reactions(&self, surface_id: SurfaceId, message_id: MessageId, emoji: &str, humans: u32) {
        let mut messages = self.messages.lock().unwrap();
        let message = messages.get_mut(&(surface_id, message_id)).unwrap();
        message.reactions.retain(|r| r.emoji != emoji);
        message.reactions.push(ReactionTally {
            emoji: emoji.to_string(),
            count: humans + 1,
            me: true,
        });
    }

    pub fn content(&self, surface_id: SurfaceId, message_id: MessageId) -> Option<String> {
        self.messages
            .lock()
            .unwrap()
            .get(&(surface_id, message_id))
            .map(|m| m.content.clone())
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SurfaceRenderer for MockRenderer {
    fn bot_user_id(&self) -> UserId {
        BOT_ID
    }

    async fn send(
        &self,
        surface: SurfaceId,
        message: &OutboundMessage,
    ) -> Result<PostedMessage, GreenlightError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push(SurfaceCall::Send(surface, message.content.clone()));
        self.messages.lock().unwrap().insert(
            (surface, message_id),
            SurfaceMessage {
                surface_id: surface,
                message_id,
                author_id: BOT_ID,
                content: message.content.clone(),
                summary: message.summary.clone(),
                reactions: Vec::new(),
            },
        );
        let is_direct_message = self
            .direct_surfaces
            .lock()
            .unwrap()
            .values()
            .any(|s| *s == surface);
        Ok(PostedMessage {
            surface_id: surface,
            message_id,
            is_direct_message,
        })
    }

    async fn fetch(
        &self,
        surface: SurfaceId,
        message: MessageId,
    ) -> Result<Option<SurfaceMessage>, GreenlightError> {
        if self.failing_fetch.lock().unwrap().contains(&surface) {
            return Err(GreenlightError::Surface(format!("missing access to {surface}")));
        }
        Ok(self.messages.lock().unwrap().get(&(surface, message)).cloned())
    }

    async fn edit_content(
        &self,
        surface: SurfaceId,
        message: MessageId,
        content: &str,
    ) -> Result<(), GreenlightError> {
        if self.failing_edit.lock().unwrap().contains(&surface) {
            return Err(GreenlightError::Surface(format!("cannot edit in {surface}")));
        }
        self.calls
            .lock()
            .unwrap()
            .push(SurfaceCall::Edit(surface, message, content.to_string()));
        if let Some(m) = self.messages.lock().unwrap().get_mut(&(surface, message)) {
            m.content = content.to_string();
        }
        Ok(())
    }

    async fn add_reaction(
        &self,
        surface: SurfaceId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), GreenlightError> {
        self.calls
            .lock()
            .unwrap()
            .push(SurfaceCall::React(surface, message, emoji.to_string()));
        Ok(())
    }

    async fn clear_reactions(
        &self,
        surface: SurfaceId,
        message: MessageId,
    ) -> Result<(), GreenlightError> {
        self.calls
            .lock()
            .unwrap()
            .push(SurfaceCall::Clear(surface, message));
        if let Some(m) = self.messages.lock().unwrap().get_mut(&(surface, message)) {
            m.reactions.clear();
        }
        Ok(())
    }

    async fn direct_surface(&self, user: UserId) -> Result<Option<SurfaceId>, GreenlightError> {
        Ok(self.direct_surfaces.lock().unwrap().get(&user).copied())
    }
}

#[derive(Default)]
pub struct MockAuthority {
    pub statuses: Mutex<HashMap<RequestId, AuthorityStatus>>,
    pub failing_status: Mutex<HashSet<RequestId>>,
    pub fail_push: Mutex<bool>,
    pub pushed: Mutex<Vec<(RequestId, Decision)>>,
    pub status_calls: AtomicUsize,
    /// When set, `status` waits for a notification before answering.
    pub hold: Mutex<Option<Arc<Notify>>>,
}

impl MockAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, request_id: RequestId, status: AuthorityStatus) {
        self.statuses.lock().unwrap().insert(request_id, status);
    }

    pub fn pushed(&self) -> Vec<(RequestId, Decision)> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn push(&self, request_id: RequestId, decision: Decision) -> Result<(), GreenlightError> {
        if *self.fail_push.lock().unwrap() {
            return Err(GreenlightError::Authority("503 Service Unavailable".to_string()));
        }
        self.pushed.lock().unwrap().push((request_id, decision));
        let status = if decision == Decision::Approved {
            AuthorityStatus::Approved
        } else {
            AuthorityStatus::Denied
        };
        self.set(request_id, status);
        Ok(())
    }
}

#[async_trait]
impl MediationAuthority for MockAuthority {
    async fn status(&self, request_id: RequestId) -> Result<AuthorityStatus, GreenlightError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        if self.failing_status.lock().unwrap().contains(&request_id) {
            return Err(GreenlightError::Authority("connection refused".to_string()));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&request_id)
            .copied()
            .unwrap_or(AuthorityStatus::Unknown))
    }

    async fn approve(&self, request_id: RequestId) -> Result<(), GreenlightError> {
        self.push(request_id, Decision::Approved)
    }

    async fn deny(&self, request_id: RequestId) -> Result<(), GreenlightError> {
        self.push(request_id, Decision::Denied)
    }
}

/// A config with one delegating category and an authority.
pub fn delegating_config() -> GreenlightConfig {
    GreenlightConfig {
        categories: vec![CategoryConfig {
            id: 1,
            name: "movies".to_string(),
            delegates_approval: true,
            restrictions: RestrictionConfig::default(),
        }],
        authority: Some(AuthorityConfig {
            base_url: "http://authority".to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }),
        ..Default::default()
    }
}
