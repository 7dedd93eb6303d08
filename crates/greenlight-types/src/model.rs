/// Shared data model for greenlight.
///
/// Durable types (`ApprovalRecord`, `MessageRef`) keep the PascalCase field
/// names of the on-disk approval file. Everything else is in-process only.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type RequestId = i64;
pub type SurfaceId = u64;
pub type MessageId = u64;
pub type UserId = u64;
pub type RoleId = u64;
pub type CategoryId = u32;

// ============================================================
// Approval records
// ============================================================

/// One rendered message showing a request's status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageRef {
    #[serde(rename = "ChannelId", default)]
    pub surface_id: SurfaceId,
    #[serde(default)]
    pub message_id: MessageId,
    #[serde(rename = "IsAdmin", default)]
    pub is_admin_surface: bool,
    #[serde(default)]
    pub is_direct_message: bool,
}

impl MessageRef {
    /// Identity of a ref within a record; flags are not part of it.
    pub fn key(&self) -> (SurfaceId, MessageId) {
        (self.surface_id, self.message_id)
    }
}

/// Every surface currently displaying a pending request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApprovalRecord {
    pub request_id: RequestId,
    pub requester_username: String,
    pub requester_user_id: UserId,
    pub messages: Vec<MessageRef>,
    /// When the first surface was registered. Absent in files written by
    /// older deployments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
}

impl ApprovalRecord {
    pub fn contains(&self, surface_id: SurfaceId, message_id: MessageId) -> bool {
        self.messages
            .iter()
            .any(|m| m.surface_id == surface_id && m.message_id == message_id)
    }

    pub fn find(&self, surface_id: SurfaceId, message_id: MessageId) -> Option<&MessageRef> {
        self.messages
            .iter()
            .find(|m| m.surface_id == surface_id && m.message_id == message_id)
    }
}

/// Human decision on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Approved,
    Denied,
}

impl Decision {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            Decision::Approved
        } else {
            Decision::Denied
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::Pending)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Pending => write!(f, "pending"),
            Decision::Approved => write!(f, "approved"),
            Decision::Denied => write!(f, "denied"),
        }
    }
}

/// Canonical status reported by the mediation authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityStatus {
    Pending,
    Approved,
    Denied,
    /// The authority has no record of the request.
    Unknown,
}

impl AuthorityStatus {
    /// The decision this status represents, `None` when unknown.
    pub fn decision(&self) -> Option<Decision> {
        match self {
            AuthorityStatus::Pending => Some(Decision::Pending),
            AuthorityStatus::Approved => Some(Decision::Approved),
            AuthorityStatus::Denied => Some(Decision::Denied),
            AuthorityStatus::Unknown => None,
        }
    }
}

// ============================================================
// Catalog
// ============================================================

/// A top-level catalog result (movie, series, artist).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntity {
    pub id: String,
    pub title: String,
    pub overview: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub available: bool,
    pub requested: bool,
}

/// A requestable sub-item of an entity (an album of an artist).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: String,
    pub title: String,
    /// Secondary filter dimension, e.g. "Album", "Single", "EP".
    pub release_type: String,
    pub release_date: Option<NaiveDate>,
    pub available: bool,
    pub requested: bool,
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterIdentity {
    pub user_id: UserId,
    pub username: String,
}

/// Result of submitting a request to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted,
    PendingApproval { request_id: RequestId },
    Denied,
}

// ============================================================
// Surfaces
// ============================================================

/// Rich summary rendered under a message (embed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySummary {
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub footer: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl EntitySummary {
    pub fn for_entity(entity: &CatalogEntity) -> Self {
        Self {
            title: entity.title.clone(),
            description: entity.overview.clone(),
            url: entity.url.clone(),
            image_url: entity.image_url.clone(),
            footer: None,
            fields: Vec::new(),
        }
    }
}

/// Message to post on a surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: String,
    pub summary: Option<EntitySummary>,
}

/// Where a message landed after posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostedMessage {
    pub surface_id: SurfaceId,
    pub message_id: MessageId,
    pub is_direct_message: bool,
}

/// Reaction count for one emoji on a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionTally {
    pub emoji: String,
    pub count: u32,
    /// Whether the bot itself is among the reactors.
    pub me: bool,
}

impl ReactionTally {
    /// Reactions left by anyone other than the bot.
    pub fn human_count(&self) -> u32 {
        self.count.saturating_sub(u32::from(self.me))
    }
}

/// A message read back from a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceMessage {
    pub surface_id: SurfaceId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub content: String,
    pub summary: Option<EntitySummary>,
    pub reactions: Vec<ReactionTally>,
}

impl SurfaceMessage {
    /// Human reactions for `emoji`.
    pub fn human_reactions(&self, emoji: &str) -> u32 {
        self.reactions
            .iter()
            .filter(|r| r.emoji == emoji)
            .map(ReactionTally::human_count)
            .sum()
    }

    pub fn footer(&self) -> Option<&str> {
        self.summary.as_ref().and_then(|s| s.footer.as_deref())
    }
}

// ============================================================
// Wizard views
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    pub description: Option<String>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectMenu {
    /// Encoded wizard token.
    pub custom_id: String,
    pub placeholder: String,
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Request,
    Previous,
    Next,
    Requested,
    Available,
    Accepted,
    Pending,
    Denied,
    /// Subscribe to an availability notification.
    Notify,
    Subscribed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Encoded wizard token.
    pub custom_id: String,
    pub kind: ButtonKind,
    pub disabled: bool,
}

/// A message component. Its custom id is the only state the platform keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Select(SelectMenu),
    Button(Button),
}

impl Component {
    pub fn custom_id(&self) -> &str {
        match self {
            Component::Select(menu) => &menu.custom_id,
            Component::Button(button) => &button.custom_id,
        }
    }
}

/// What the user is told. The renderer owns the localized wording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ChooseCandidate { count: usize },
    NotFound { query: String },
    ChooseItem { page: u32, page_count: u32 },
    ConfirmEntity,
    ConfirmItem,
    AlreadyAvailable,
    AlreadyRequested,
    /// Already requested; the user may subscribe to availability.
    NotifyOffer,
    AlreadySubscribed,
    Subscribed,
    IndividualConfirmationRequired,
    RequestAccepted,
    RequestPending { request_id: RequestId },
    RequestDenied,
    TryAgain,
}

/// A full wizard response: notice, optional summary and components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardView {
    pub notice: Notice,
    pub summary: Option<EntitySummary>,
    pub components: Vec<Component>,
}

impl WizardView {
    pub fn leaf(notice: Notice) -> Self {
        Self {
            notice,
            summary: None,
            components: Vec::new(),
        }
    }
}

// ============================================================
// Platform events
// ============================================================

/// A component activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInteraction {
    pub custom_id: String,
    /// Selected option values for select menus; empty for buttons.
    pub values: Vec<String>,
}

/// A reaction added to some message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub surface_id: SurfaceId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub user_is_bot: bool,
    pub member_role_ids: Vec<RoleId>,
    pub emoji: String,
}

/// Gateway lifecycle notifications that drive reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEvent {
    Connected,
    Disconnected,
    ConfigurationApplied,
}
