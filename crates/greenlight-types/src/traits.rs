/// Capability contracts consumed by the core.
///
/// The wizard, store, applier and reconciler never talk to a chat platform or
/// a media backend directly. They receive narrow trait objects at
/// construction, which keeps every component testable with in-memory mocks.
use async_trait::async_trait;

use crate::errors::GreenlightError;
use crate::model::*;

// ============================================================
// Media backends
// ============================================================

/// Read side of a media backend.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Free-text search within a category.
    async fn search(
        &self,
        category: CategoryId,
        query: &str,
    ) -> Result<Vec<CatalogEntity>, GreenlightError>;

    /// Fetch one entity with fresh availability and request status.
    async fn entity(
        &self,
        category: CategoryId,
        id: &str,
    ) -> Result<Option<CatalogEntity>, GreenlightError>;

    /// Requestable sub-items of an entity. Empty for single-item categories.
    async fn items(
        &self,
        category: CategoryId,
        entity: &CatalogEntity,
    ) -> Result<Vec<CatalogItem>, GreenlightError>;
}

/// Write side of a media backend.
#[async_trait]
pub trait Requester: Send + Sync {
    async fn request_entity(
        &self,
        category: CategoryId,
        entity: &CatalogEntity,
        requester: &RequesterIdentity,
    ) -> Result<RequestOutcome, GreenlightError>;

    /// Request one or more items of an entity as a single backend request.
    async fn request_items(
        &self,
        category: CategoryId,
        entity: &CatalogEntity,
        items: &[CatalogItem],
        requester: &RequesterIdentity,
    ) -> Result<RequestOutcome, GreenlightError>;
}

/// Availability subscriptions. Delivering the notification itself is the
/// host's concern.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn has_subscription(
        &self,
        user: UserId,
        category: CategoryId,
        entity_id: &str,
    ) -> Result<bool, GreenlightError>;

    /// Subscribing twice is a no-op.
    async fn subscribe(
        &self,
        user: UserId,
        category: CategoryId,
        entity_id: &str,
    ) -> Result<(), GreenlightError>;
}

// ============================================================
// Mediation authority
// ============================================================

/// External system of record for approval decisions.
#[async_trait]
pub trait MediationAuthority: Send + Sync {
    async fn status(&self, request_id: RequestId) -> Result<AuthorityStatus, GreenlightError>;

    async fn approve(&self, request_id: RequestId) -> Result<(), GreenlightError>;

    async fn deny(&self, request_id: RequestId) -> Result<(), GreenlightError>;
}

// ============================================================
// Chat platform
// ============================================================

/// Message-level operations on the chat platform.
#[async_trait]
pub trait SurfaceRenderer: Send + Sync {
    /// User id the bot posts as.
    fn bot_user_id(&self) -> UserId;

    async fn send(
        &self,
        surface: SurfaceId,
        message: &OutboundMessage,
    ) -> Result<PostedMessage, GreenlightError>;

    /// Read a message back. `Ok(None)` means the surface or message is gone.
    async fn fetch(
        &self,
        surface: SurfaceId,
        message: MessageId,
    ) -> Result<Option<SurfaceMessage>, GreenlightError>;

    /// Replace the text content. The rendered summary is left untouched.
    async fn edit_content(
        &self,
        surface: SurfaceId,
        message: MessageId,
        content: &str,
    ) -> Result<(), GreenlightError>;

    async fn add_reaction(
        &self,
        surface: SurfaceId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), GreenlightError>;

    async fn clear_reactions(
        &self,
        surface: SurfaceId,
        message: MessageId,
    ) -> Result<(), GreenlightError>;

    /// Open (or reuse) the direct-message surface for a user.
    async fn direct_surface(&self, user: UserId) -> Result<Option<SurfaceId>, GreenlightError>;
}

/// One in-flight component or command interaction.
#[async_trait]
pub trait InteractionSurface: Send + Sync {
    /// The user who triggered the interaction.
    fn actor(&self) -> &RequesterIdentity;

    /// Components currently attached to the message the interaction came from.
    async fn current_components(&self) -> Result<Vec<Component>, GreenlightError>;

    /// Render the response, replacing the interaction's message.
    async fn respond(&self, view: &WizardView) -> Result<PostedMessage, GreenlightError>;
}
