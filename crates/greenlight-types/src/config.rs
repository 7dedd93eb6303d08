/// Configuration types, parsed from `config/greenlight.yaml`.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{CategoryId, RoleId, SurfaceId};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreenlightConfig {
    /// Directory holding `approval_requests.json`.
    #[serde(default = "default_settings_dir")]
    pub settings_dir: PathBuf,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
    /// Mediation authority. Absent means no category can delegate approval.
    #[serde(default)]
    pub authority: Option<AuthorityConfig>,
}

impl Default for GreenlightConfig {
    fn default() -> Self {
        Self {
            settings_dir: default_settings_dir(),
            approval: ApprovalConfig::default(),
            reconcile: ReconcileConfig::default(),
            notifications: NotificationConfig::default(),
            categories: Vec::new(),
            authority: None,
        }
    }
}

impl GreenlightConfig {
    /// True when an authority is configured and at least one category hands
    /// approval to it.
    pub fn delegates_approval(&self) -> bool {
        self.authority.is_some() && self.categories.iter().any(|c| c.delegates_approval)
    }

    pub fn category(&self, id: CategoryId) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.id == id)
    }
}

fn default_settings_dir() -> PathBuf {
    PathBuf::from("config")
}

// ============================================================
// Approval
// ============================================================

/// How pending requests are presented and decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_approve_emoji")]
    pub approve_emoji: String,
    #[serde(default = "default_deny_emoji")]
    pub deny_emoji: String,
    /// Channels that receive a mirror of every pending request.
    #[serde(default)]
    pub admin_surface_ids: Vec<SurfaceId>,
    /// Roles allowed to decide by reacting. Empty disables reaction decisions.
    #[serde(default)]
    pub admin_role_ids: Vec<RoleId>,
    /// Also mirror accepted and denied outcomes to admin surfaces.
    #[serde(default)]
    pub mirror_all_requests: bool,
    /// Skip reactions on the requester's own message.
    #[serde(default)]
    pub purge_command_messages: bool,
    #[serde(default = "default_approved_text")]
    pub approved_text: String,
    #[serde(default = "default_denied_text")]
    pub denied_text: String,
    /// Supports `[AuthorUsername]` and `[RequestStatus]`.
    #[serde(default = "default_admin_summary_template")]
    pub admin_summary_template: String,
    /// Supports `[AuthorUsername]`, `[ApproveEmoji]` and `[DenyEmoji]`.
    #[serde(default = "default_admin_pending_template")]
    pub admin_pending_template: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            approve_emoji: default_approve_emoji(),
            deny_emoji: default_deny_emoji(),
            admin_surface_ids: Vec::new(),
            admin_role_ids: Vec::new(),
            mirror_all_requests: false,
            purge_command_messages: false,
            approved_text: default_approved_text(),
            denied_text: default_denied_text(),
            admin_summary_template: default_admin_summary_template(),
            admin_pending_template: default_admin_pending_template(),
        }
    }
}

impl ApprovalConfig {
    /// Approve and deny emojis with surrounding whitespace removed.
    pub fn emojis(&self) -> EmojiPair {
        EmojiPair {
            approve: self.approve_emoji.trim().to_string(),
            deny: self.deny_emoji.trim().to_string(),
        }
    }

    pub fn status_text(&self, approved: bool) -> &str {
        if approved {
            &self.approved_text
        } else {
            &self.denied_text
        }
    }
}

/// Trimmed approve/deny emoji pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiPair {
    pub approve: String,
    pub deny: String,
}

impl EmojiPair {
    /// `Some(true)` for approve, `Some(false)` for deny.
    pub fn classify(&self, emoji: &str) -> Option<bool> {
        let emoji = emoji.trim();
        if emoji == self.approve {
            Some(true)
        } else if emoji == self.deny {
            Some(false)
        } else {
            None
        }
    }
}

fn default_approve_emoji() -> String {
    "✅".to_string()
}

fn default_deny_emoji() -> String {
    "❌".to_string()
}

fn default_approved_text() -> String {
    "Your request has been approved.".to_string()
}

fn default_denied_text() -> String {
    "Your request has been denied.".to_string()
}

fn default_admin_summary_template() -> String {
    "Request from [AuthorUsername]: [RequestStatus]".to_string()
}

fn default_admin_pending_template() -> String {
    "[AuthorUsername] is asking for approval. React with [ApproveEmoji] to approve or [DenyEmoji] to deny.".to_string()
}

// ============================================================
// Reconciliation
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Delays after each trigger at which further sweeps run.
    #[serde(default = "default_schedule_secs")]
    pub schedule_secs: Vec<u64>,
    /// Ambiguous records older than this are logged at warn level.
    #[serde(default = "default_stale_warning_hours")]
    pub stale_warning_hours: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            schedule_secs: default_schedule_secs(),
            stale_warning_hours: default_stale_warning_hours(),
        }
    }
}

impl ReconcileConfig {
    pub fn schedule(&self) -> Vec<std::time::Duration> {
        self.schedule_secs
            .iter()
            .map(|s| std::time::Duration::from_secs(*s))
            .collect()
    }
}

fn default_schedule_secs() -> Vec<u64> {
    vec![30, 120, 300]
}

fn default_stale_warning_hours() -> u64 {
    24
}

// ============================================================
// Notifications
// ============================================================

/// Availability notifications for already-requested entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Subscribe the requester as soon as a request goes through.
    #[serde(default = "default_auto_subscribe")]
    pub auto_subscribe_requesters: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            auto_subscribe_requesters: default_auto_subscribe(),
        }
    }
}

fn default_auto_subscribe() -> bool {
    true
}

// ============================================================
// Categories
// ============================================================

/// A request category (movies, tv, music) served by one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub id: CategoryId,
    pub name: String,
    /// Whether this category's backend hands approval to the authority.
    #[serde(default)]
    pub delegates_approval: bool,
    #[serde(default)]
    pub restrictions: RestrictionConfig,
}

/// Allow/deny lists shaping bulk-selection affordances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionConfig {
    #[serde(default = "default_allow_bulk")]
    pub allow_bulk: bool,
    /// Filter values for which bulk selection is never offered.
    #[serde(default)]
    pub denied_filters: Vec<String>,
    /// When non-empty, only these filter values may offer bulk selection.
    #[serde(default)]
    pub allowed_filters: Vec<String>,
}

impl Default for RestrictionConfig {
    fn default() -> Self {
        Self {
            allow_bulk: default_allow_bulk(),
            denied_filters: Vec::new(),
            allowed_filters: Vec::new(),
        }
    }
}

fn default_allow_bulk() -> bool {
    true
}

// ============================================================
// Authority
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}
