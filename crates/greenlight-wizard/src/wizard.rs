//! Selection wizard.
//!
//! Drives a user from a free-text query to one concrete request:
//! 1. Search: no match, one match (straight to the entity), or a candidate list
//! 2. Entity: detail with a request button, or a paged and filtered item list.
//!    An entity someone already requested offers an availability subscription
//! 3. Confirm: one item, or every requestable item in the filtered view
//! 4. Submit: re-check catalog status, request, render the outcome
//!
//! Nothing is kept between interactions. Each step is derived from the
//! activated component's token plus a fresh catalog read. Catalog and backend
//! failures end in a generic "try again" leaf.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use greenlight_approvals::{request_marker, ApprovalStore};
use greenlight_types::config::{ApprovalConfig, EmojiPair, GreenlightConfig};
use greenlight_types::{
    CatalogEntity, CatalogItem, CategoryId, Component, EntitySummary, GreenlightError, InteractionSurface,
    MediaCatalog, MessageRef, Notice, Notifier, OutboundMessage, PostedMessage, RequestOutcome, Requester,
    RequesterIdentity, SurfaceRenderer, WizardView,
};

use crate::context::SelectionContext;
use crate::paging;
use crate::policy::RestrictionPolicy;
use crate::token::{ActionKind, ALL_VALUE, DELIMITER};
use crate::views::{self, ItemPage, TokenScope};

/// Where an interaction left the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStep {
    NotFound,
    CandidatesShown { count: usize },
    EntitySelected,
    FilteredListShown { page: u32 },
    ConfirmShown,
    Submitted(RequestOutcome),
    AlreadyAvailable,
    AlreadyRequested,
    NotificationOffered,
    AlreadySubscribed,
    Subscribed,
    IndividualConfirmationRequired,
    Failed,
}

/// All trait-object dependencies of the wizard.
pub struct WizardDeps {
    pub catalog: Arc<dyn MediaCatalog>,
    pub requester: Arc<dyn Requester>,
    pub renderer: Arc<dyn SurfaceRenderer>,
    pub store: Arc<ApprovalStore>,
    /// Absent when availability notifications are disabled.
    pub notifier: Option<Arc<dyn Notifier>>,
}

/// A response ready to send, plus what to do once it is posted.
struct Rendered {
    step: WizardStep,
    view: WizardView,
    submitted: Option<(RequestOutcome, EntitySummary)>,
}

impl Rendered {
    fn new(step: WizardStep, view: WizardView) -> Self {
        Self {
            step,
            view,
            submitted: None,
        }
    }

    /// Step implied by a detail or confirm view.
    fn from_view(default: WizardStep, view: WizardView) -> Self {
        let step = match view.notice {
            Notice::AlreadyAvailable => WizardStep::AlreadyAvailable,
            Notice::AlreadyRequested => WizardStep::AlreadyRequested,
            Notice::NotifyOffer => WizardStep::NotificationOffered,
            Notice::AlreadySubscribed => WizardStep::AlreadySubscribed,
            Notice::Subscribed => WizardStep::Subscribed,
            _ => default,
        };
        Self::new(step, view)
    }

    fn leaf(step: WizardStep, notice: Notice, entity: Option<&CatalogEntity>) -> Self {
        Self::new(step, views::notice(notice, entity))
    }
}

pub struct SelectionWizard {
    deps: WizardDeps,
    config: RwLock<GreenlightConfig>,
}

impl SelectionWizard {
    pub fn new(deps: WizardDeps, config: GreenlightConfig) -> Self {
        Self {
            deps,
            config: RwLock::new(config),
        }
    }

    pub fn set_config(&self, config: GreenlightConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
    }

    /// Apply every configuration the loader publishes until its sender is
    /// dropped. Subscribe with a receiver of the same channel the
    /// `ConnectionMonitor` gets.
    pub fn follow_config(self: &Arc<Self>, mut rx: watch::Receiver<GreenlightConfig>) -> JoinHandle<()> {
        let wizard = Arc::clone(self);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let config = rx.borrow_and_update().clone();
                wizard.set_config(config);
                tracing::info!("wizard configuration reloaded");
            }
            tracing::debug!("config channel closed, wizard keeps last configuration");
        })
    }

    fn policy(&self, category: CategoryId) -> RestrictionPolicy {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .category(category)
            .map(|c| RestrictionPolicy::from(&c.restrictions))
            .unwrap_or_default()
    }

    fn approval(&self) -> ApprovalConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .approval
            .clone()
    }

    fn auto_subscribe(&self) -> bool {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .notifications
            .auto_subscribe_requesters
    }

    // ============================================================
    // Entry points
    // ============================================================

    /// Start a wizard from a slash-command query.
    pub async fn search(
        &self,
        surface: &dyn InteractionSurface,
        category: CategoryId,
        query: &str,
    ) -> WizardStep {
        let scope = TokenScope {
            actor_id: surface.actor().user_id,
            category_id: category,
        };
        let result = self.render_search(scope, query).await;
        self.finish(surface, result).await
    }

    /// Continue a wizard from a decoded component interaction.
    pub async fn handle(&self, surface: &dyn InteractionSurface, ctx: SelectionContext) -> WizardStep {
        let result = self.render_interaction(&ctx).await;
        self.finish(surface, result).await
    }

    async fn finish(
        &self,
        surface: &dyn InteractionSurface,
        result: Result<Rendered, GreenlightError>,
    ) -> WizardStep {
        let rendered = match result {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(error = %e, user_id = surface.actor().user_id, "wizard step failed");
                if let Err(e) = surface.respond(&WizardView::leaf(Notice::TryAgain)).await {
                    tracing::warn!(error = %e, "failed to render retry notice");
                }
                return WizardStep::Failed;
            }
        };

        let posted = match surface.respond(&rendered.view).await {
            Ok(posted) => Some(posted),
            Err(e) => {
                tracing::warn!(error = %e, step = ?rendered.step, "failed to render wizard response");
                None
            }
        };

        if let Some((outcome, summary)) = rendered.submitted {
            self.after_submit(surface.actor(), posted, outcome, summary).await;
        }
        rendered.step
    }

    // ============================================================
    // Steps
    // ============================================================

    async fn render_search(&self, scope: TokenScope, query: &str) -> Result<Rendered, GreenlightError> {
        let query = query.replace('.', " ");
        let query = query.trim();
        let entities = self.deps.catalog.search(scope.category_id, query).await?;

        match entities.as_slice() {
            [] => Ok(Rendered::leaf(
                WizardStep::NotFound,
                Notice::NotFound {
                    query: query.to_string(),
                },
                None,
            )),
            [entity] => self.enter_entity(scope, entity, None).await,
            _ => {
                let view = views::candidates(scope, &entities)?;
                let count = entities.len().min(views::MAX_CANDIDATES);
                Ok(Rendered::new(WizardStep::CandidatesShown { count }, view))
            }
        }
    }

    async fn render_interaction(&self, ctx: &SelectionContext) -> Result<Rendered, GreenlightError> {
        let scope = TokenScope {
            actor_id: ctx.token.actor_id(),
            category_id: ctx.token.category_id(),
        };
        match ctx.token.action() {
            ActionKind::SelectCandidate => self.select_candidate(scope, ctx).await,
            ActionKind::SelectItem => self.select_item(scope, ctx).await,
            ActionKind::SelectFilter => self.select_filter(scope, ctx).await,
            ActionKind::PageForward => self.turn_page(scope, ctx, true).await,
            ActionKind::PageBack => self.turn_page(scope, ctx, false).await,
            ActionKind::SubmitEntity => self.submit_entity(scope, ctx).await,
            ActionKind::SubmitItem => self.submit_items(scope, ctx).await,
            ActionKind::Subscribe => self.subscribe(scope, ctx).await,
            ActionKind::Inert => Err(GreenlightError::Internal(
                "inert component activated".to_string(),
            )),
        }
    }

    async fn select_candidate(
        &self,
        scope: TokenScope,
        ctx: &SelectionContext,
    ) -> Result<Rendered, GreenlightError> {
        let id = ctx
            .selected_value()
            .ok_or_else(|| GreenlightError::Internal("candidate menu without a value".to_string()))?;
        let Some(entity) = self.deps.catalog.entity(scope.category_id, id).await? else {
            return Ok(not_found(id));
        };
        let carried = ctx.carried_candidates(&entity.id, &entity.title);
        self.enter_entity(scope, &entity, carried).await
    }

    async fn enter_entity(
        &self,
        scope: TokenScope,
        entity: &CatalogEntity,
        carried: Option<Component>,
    ) -> Result<Rendered, GreenlightError> {
        let items = self.deps.catalog.items(scope.category_id, entity).await?;
        if items.is_empty() {
            if entity.requested && !entity.available {
                return self.requested_entity(scope, entity, carried).await;
            }
            let view = views::entity_detail(scope, entity, carried)?;
            return Ok(Rendered::from_view(WizardStep::EntitySelected, view));
        }
        self.list(scope, entity, items, 0, None, carried)
    }

    async fn select_filter(&self, scope: TokenScope, ctx: &SelectionContext) -> Result<Rendered, GreenlightError> {
        let Some((entity, items)) = self.load_entity(scope, ctx).await? else {
            return Ok(not_found(ctx.token.entity_ref().unwrap_or_default()));
        };
        let filter = ctx.selected_value().filter(|v| *v != ALL_VALUE);
        let carried = carry(ctx);
        self.list(scope, &entity, items, 0, filter, carried)
    }

    async fn turn_page(
        &self,
        scope: TokenScope,
        ctx: &SelectionContext,
        forward: bool,
    ) -> Result<Rendered, GreenlightError> {
        let Some((entity, items)) = self.load_entity(scope, ctx).await? else {
            return Ok(not_found(ctx.token.entity_ref().unwrap_or_default()));
        };
        let filter = ctx.token.filter();
        let total = filtered(&items, filter).len();
        let current = ctx.token.page_index().unwrap_or(0);
        let page = if forward {
            paging::forward(current, total)
        } else {
            paging::back(current, total)
        };
        let carried = carry(ctx);
        self.list(scope, &entity, items, page, filter, carried)
    }

    async fn select_item(&self, scope: TokenScope, ctx: &SelectionContext) -> Result<Rendered, GreenlightError> {
        let Some((entity, items)) = self.load_entity(scope, ctx).await? else {
            return Ok(not_found(ctx.token.entity_ref().unwrap_or_default()));
        };
        let filter = ctx.token.filter();
        let value = ctx
            .selected_value()
            .ok_or_else(|| GreenlightError::Internal("item menu without a value".to_string()))?;

        if value == ALL_VALUE {
            let targets = match self.bulk_targets(scope, &entity, &items, filter) {
                Ok(targets) => targets,
                Err(leaf) => return Ok(leaf),
            };
            let view = views::bulk_confirm(scope, &entity, filter, targets.len(), carry(ctx))?;
            return Ok(Rendered::new(WizardStep::ConfirmShown, view));
        }

        let Some(item) = items.iter().find(|i| i.id == value) else {
            return Ok(not_found(value));
        };
        let view = views::item_confirm(scope, &entity, item, carry(ctx))?;
        Ok(Rendered::from_view(WizardStep::ConfirmShown, view))
    }

    async fn submit_entity(&self, scope: TokenScope, ctx: &SelectionContext) -> Result<Rendered, GreenlightError> {
        let id = ctx.token.entity_ref().unwrap_or_default();
        let Some(entity) = self.deps.catalog.entity(scope.category_id, id).await? else {
            return Ok(not_found(id));
        };

        // A stale confirm button must not submit twice.
        if entity.available {
            return Ok(Rendered::leaf(WizardStep::AlreadyAvailable, Notice::AlreadyAvailable, Some(&entity)));
        }
        if entity.requested {
            return self.requested_entity(scope, &entity, carry(ctx)).await;
        }

        let outcome = self
            .deps
            .requester
            .request_entity(scope.category_id, &entity, &ctx.actor)
            .await?;
        if outcome != RequestOutcome::Denied && self.auto_subscribe() {
            if let Some(notifier) = &self.deps.notifier {
                if let Err(e) = notifier.subscribe(scope.actor_id, scope.category_id, &entity.id).await {
                    tracing::warn!(error = %e, entity_id = %entity.id, "failed to subscribe requester");
                }
            }
        }
        submitted(scope, EntitySummary::for_entity(&entity), outcome)
    }

    async fn subscribe(&self, scope: TokenScope, ctx: &SelectionContext) -> Result<Rendered, GreenlightError> {
        let notifier = self
            .deps
            .notifier
            .as_ref()
            .ok_or_else(|| GreenlightError::Internal("notifications are disabled".to_string()))?;
        let id = ctx.token.entity_ref().unwrap_or_default();
        let Some(entity) = self.deps.catalog.entity(scope.category_id, id).await? else {
            return Ok(not_found(id));
        };
        let carried = carry(ctx);

        if entity.available {
            let view = views::entity_detail(scope, &entity, carried)?;
            return Ok(Rendered::from_view(WizardStep::AlreadyAvailable, view));
        }
        if notifier.has_subscription(scope.actor_id, scope.category_id, &entity.id).await? {
            let view = views::subscribed(scope, &entity, true, carried)?;
            return Ok(Rendered::from_view(WizardStep::AlreadySubscribed, view));
        }
        notifier.subscribe(scope.actor_id, scope.category_id, &entity.id).await?;
        tracing::info!(user_id = scope.actor_id, entity_id = %entity.id, "subscribed to availability");
        let view = views::subscribed(scope, &entity, false, carried)?;
        Ok(Rendered::from_view(WizardStep::Subscribed, view))
    }

    async fn submit_items(&self, scope: TokenScope, ctx: &SelectionContext) -> Result<Rendered, GreenlightError> {
        let Some((entity, items)) = self.load_entity(scope, ctx).await? else {
            return Ok(not_found(ctx.token.entity_ref().unwrap_or_default()));
        };
        let item_ref = ctx.token.entity_refs().get(1).map(String::as_str).unwrap_or_default();

        let (targets, summary) = if item_ref == ALL_VALUE {
            match self.bulk_targets(scope, &entity, &items, ctx.token.filter()) {
                Ok(targets) => (targets, EntitySummary::for_entity(&entity)),
                Err(leaf) => return Ok(leaf),
            }
        } else {
            let Some(item) = items.iter().find(|i| i.id == item_ref) else {
                return Ok(not_found(item_ref));
            };
            if item.available {
                return Ok(Rendered::leaf(WizardStep::AlreadyAvailable, Notice::AlreadyAvailable, Some(&entity)));
            }
            if item.requested {
                return Ok(Rendered::leaf(WizardStep::AlreadyRequested, Notice::AlreadyRequested, Some(&entity)));
            }
            (vec![item.clone()], views::item_summary(&entity, item))
        };

        let outcome = self
            .deps
            .requester
            .request_items(scope.category_id, &entity, &targets, &ctx.actor)
            .await?;
        submitted(scope, summary, outcome)
    }

    // ============================================================
    // Helpers
    // ============================================================

    /// Already-requested entity: offer an availability subscription when
    /// notifications are enabled.
    async fn requested_entity(
        &self,
        scope: TokenScope,
        entity: &CatalogEntity,
        carried: Option<Component>,
    ) -> Result<Rendered, GreenlightError> {
        let Some(notifier) = &self.deps.notifier else {
            let view = views::entity_detail(scope, entity, carried)?;
            return Ok(Rendered::from_view(WizardStep::AlreadyRequested, view));
        };
        let view = if notifier.has_subscription(scope.actor_id, scope.category_id, &entity.id).await? {
            views::subscribed(scope, entity, true, carried)?
        } else {
            views::notify_offer(scope, entity, carried)?
        };
        Ok(Rendered::from_view(WizardStep::NotificationOffered, view))
    }

    async fn load_entity(
        &self,
        scope: TokenScope,
        ctx: &SelectionContext,
    ) -> Result<Option<(CatalogEntity, Vec<CatalogItem>)>, GreenlightError> {
        let id = ctx.token.entity_ref().unwrap_or_default();
        let Some(entity) = self.deps.catalog.entity(scope.category_id, id).await? else {
            return Ok(None);
        };
        let items = self.deps.catalog.items(scope.category_id, &entity).await?;
        Ok(Some((entity, items)))
    }

    /// Requestable items for a bulk request, or the leaf explaining why there
    /// are none.
    fn bulk_targets(
        &self,
        scope: TokenScope,
        entity: &CatalogEntity,
        items: &[CatalogItem],
        filter: Option<&str>,
    ) -> Result<Vec<CatalogItem>, Rendered> {
        if !self.policy(scope.category_id).permits_bulk(filter) {
            return Err(Rendered::leaf(
                WizardStep::IndividualConfirmationRequired,
                Notice::IndividualConfirmationRequired,
                Some(entity),
            ));
        }
        let in_view = filtered(items, filter);
        let targets: Vec<CatalogItem> = in_view
            .iter()
            .filter(|i| requestable(i))
            .map(|i| (*i).clone())
            .collect();
        if targets.is_empty() {
            let all_available = !in_view.is_empty() && in_view.iter().all(|i| i.available);
            return Err(if all_available {
                Rendered::leaf(WizardStep::AlreadyAvailable, Notice::AlreadyAvailable, Some(entity))
            } else {
                Rendered::leaf(WizardStep::AlreadyRequested, Notice::AlreadyRequested, Some(entity))
            });
        }
        Ok(targets)
    }

    fn list(
        &self,
        scope: TokenScope,
        entity: &CatalogEntity,
        mut items: Vec<CatalogItem>,
        page: u32,
        filter: Option<&str>,
        carried: Option<Component>,
    ) -> Result<Rendered, GreenlightError> {
        // Newest first; undated items last.
        items.sort_by(|a, b| b.release_date.cmp(&a.release_date));

        let filters: Vec<String> = items
            .iter()
            .map(|i| i.release_type.as_str())
            .filter(|t| !t.is_empty() && !t.contains(DELIMITER))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let filter = filter.filter(|f| filters.iter().any(|known| known.as_str() == *f));

        let in_view = filtered(&items, filter);
        let page = paging::clamp(page, in_view.len());
        let page_items: Vec<CatalogItem> = paging::slice(&in_view, page)
            .iter()
            .map(|i| (*i).clone())
            .collect();
        let offer_all = self.policy(scope.category_id).permits_bulk(filter)
            && in_view.iter().any(|i| requestable(i));

        let listing = ItemPage {
            items: &page_items,
            page,
            page_count: paging::page_count(in_view.len()),
            filter,
            filters: &filters,
            offer_all,
        };
        let view = views::item_list(scope, entity, &listing, carried)?;
        Ok(Rendered::new(WizardStep::FilteredListShown { page }, view))
    }

    /// Register a pending request's surfaces and mirror outcomes to admins.
    async fn after_submit(
        &self,
        actor: &RequesterIdentity,
        posted: Option<PostedMessage>,
        outcome: RequestOutcome,
        summary: EntitySummary,
    ) {
        let approval = self.approval();
        let emojis = approval.emojis();

        match outcome {
            RequestOutcome::PendingApproval { request_id } => {
                if let Some(posted) = posted {
                    self.deps.store.add_message(
                        request_id,
                        &actor.username,
                        actor.user_id,
                        MessageRef {
                            surface_id: posted.surface_id,
                            message_id: posted.message_id,
                            is_admin_surface: false,
                            is_direct_message: posted.is_direct_message,
                        },
                    );
                    if !approval.purge_command_messages {
                        self.add_reactions(posted, &emojis).await;
                    }
                }

                let content = approval
                    .admin_pending_template
                    .replace("[AuthorUsername]", &actor.username)
                    .replace("[ApproveEmoji]", &emojis.approve)
                    .replace("[DenyEmoji]", &emojis.deny);
                let message = OutboundMessage {
                    content,
                    summary: Some(summary),
                };
                for &surface_id in &approval.admin_surface_ids {
                    match self.deps.renderer.send(surface_id, &message).await {
                        Ok(admin) => {
                            self.deps.store.add_message(
                                request_id,
                                &actor.username,
                                actor.user_id,
                                MessageRef {
                                    surface_id: admin.surface_id,
                                    message_id: admin.message_id,
                                    is_admin_surface: true,
                                    is_direct_message: false,
                                },
                            );
                            self.add_reactions(admin, &emojis).await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, request_id, surface_id, "failed to mirror pending request");
                        }
                    }
                }
                tracing::info!(request_id, user_id = actor.user_id, "request pending approval");
            }
            RequestOutcome::Accepted | RequestOutcome::Denied if approval.mirror_all_requests => {
                let status = approval.status_text(outcome == RequestOutcome::Accepted);
                let message = OutboundMessage {
                    content: approval
                        .admin_summary_template
                        .replace("[AuthorUsername]", &actor.username)
                        .replace("[RequestStatus]", status),
                    summary: Some(summary),
                };
                for &surface_id in &approval.admin_surface_ids {
                    if let Err(e) = self.deps.renderer.send(surface_id, &message).await {
                        tracing::warn!(error = %e, surface_id, "failed to mirror request outcome");
                    }
                }
            }
            _ => {}
        }
    }

    async fn add_reactions(&self, posted: PostedMessage, emojis: &EmojiPair) {
        for emoji in [&emojis.approve, &emojis.deny] {
            if let Err(e) = self
                .deps
                .renderer
                .add_reaction(posted.surface_id, posted.message_id, emoji)
                .await
            {
                tracing::warn!(error = %e, surface_id = posted.surface_id, "failed to add approval reaction");
            }
        }
    }
}

fn submitted(scope: TokenScope, summary: EntitySummary, outcome: RequestOutcome) -> Result<Rendered, GreenlightError> {
    let footer = match outcome {
        RequestOutcome::PendingApproval { request_id } => Some(request_marker(request_id)),
        _ => None,
    };
    let view = views::outcome(scope, summary, outcome, footer)?;
    let summary = view.summary.clone().unwrap_or_default();
    Ok(Rendered {
        step: WizardStep::Submitted(outcome),
        view,
        submitted: Some((outcome, summary)),
    })
}

fn not_found(query: &str) -> Rendered {
    Rendered::leaf(
        WizardStep::NotFound,
        Notice::NotFound {
            query: query.to_string(),
        },
        None,
    )
}

fn carry(ctx: &SelectionContext) -> Option<Component> {
    ctx.candidate_menu()
        .cloned()
        .map(Component::Select)
}

fn filtered<'a>(items: &'a [CatalogItem], filter: Option<&str>) -> Vec<&'a CatalogItem> {
    items
        .iter()
        .filter(|i| filter.map_or(true, |f| i.release_type == f))
        .collect()
}

fn requestable(item: &CatalogItem) -> bool {
    !item.available && !item.requested
}
