//! In-memory collaborators and a harness for wizard tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use greenlight_approvals::ApprovalStore;
use greenlight_types::config::GreenlightConfig;
use greenlight_types::*;

use crate::dispatch::{DispatchOutcome, InteractionDispatcher};
use crate::token::{ActionKind, WizardToken};
use crate::wizard::{SelectionWizard, WizardDeps};

pub const USER_ID: UserId = 7;
pub const USER_SURFACE: SurfaceId = 300;

pub fn entity(id: &str, title: &str) -> CatalogEntity {
    CatalogEntity {
        id: id.to_string(),
        title: title.to_string(),
        overview: format!("About {title}"),
        url: None,
        image_url: None,
        available: false,
        requested: false,
    }
}

pub fn item(id: &str, release_type: &str, year: i32) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        title: format!("Release {id}"),
        release_type: release_type.to_string(),
        release_date: NaiveDate::from_ymd_opt(year, 1, 1),
        available: false,
        requested: false,
    }
}

#[derive(Default)]
pub struct MockCatalog {
    pub entities: Mutex<Vec<CatalogEntity>>,
    pub items: Mutex<HashMap<String, Vec<CatalogItem>>>,
    pub fail: Mutex<bool>,
    pub queries: Mutex<Vec<String>>,
}

impl MockCatalog {
    fn check(&self) -> Result<(), GreenlightError> {
        if *self.fail.lock().unwrap() {
            return Err(GreenlightError::Catalog("backend returned 502".to_string()));
        }
        Ok(())
    }

    pub fn update_entity(&self, id: &str, f: impl FnOnce(&mut CatalogEntity)) {
        let mut entities = self.entities.lock().unwrap();
        f(entities.iter_mut().find(|e| e.id == id).unwrap());
    }
}

#[async_trait]
impl MediaCatalog for MockCatalog {
    async fn search(&self, _category: CategoryId, query: &str) -> Result<Vec<CatalogEntity>, GreenlightError> {
        self.check()?;
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.entities.lock().unwrap().clone())
    }

    async fn entity(&self, _category: CategoryId, id: &str) -> Result<Option<CatalogEntity>, GreenlightError> {
        self.check()?;
        Ok(self.entities.lock().unwrap().iter().find(|e| e.id == id).cloned())
    }

    async fn items(&self, _category: CategoryId, entity: &CatalogEntity) -> Result<Vec<CatalogItem>, GreenlightError> {
        self.check()?;
        Ok(self.items.lock().unwrap().get(&entity.id).cloned().unwrap_or_default())
    }
}

pub struct MockRequester {
    pub outcome: Mutex<RequestOutcome>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl MockRequester {
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Requester for MockRequester {
    async fn request_entity(
        &self,
        _category: CategoryId,
        entity: &CatalogEntity,
        _requester: &RequesterIdentity,
    ) -> Result<RequestOutcome, GreenlightError> {
        self.calls.lock().unwrap().push(vec![entity.id.clone()]);
        Ok(*self.outcome.lock().unwrap())
    }

    async fn request_items(
        &self,
        _category: CategoryId,
        _entity: &CatalogEntity,
        items: &[CatalogItem],
        _requester: &RequesterIdentity,
    ) -> Result<RequestOutcome, GreenlightError> {
        self.calls
            .lock()
            .unwrap()
            .push(items.iter().map(|i| i.id.clone()).collect());
        Ok(*self.outcome.lock().unwrap())
    }
}

#[derive(Default)]
pub struct MockRenderer {
    pub sent: Mutex<Vec<(SurfaceId, OutboundMessage)>>,
    pub reactions: Mutex<Vec<(SurfaceId, MessageId, String)>>,
    next_id: AtomicU64,
}

#[async_trait]
impl SurfaceRenderer for MockRenderer {
    fn bot_user_id(&self) -> UserId {
        999
    }

    async fn send(&self, surface: SurfaceId, message: &OutboundMessage) -> Result<PostedMessage, GreenlightError> {
        self.sent.lock().unwrap().push((surface, message.clone()));
        Ok(PostedMessage {
            surface_id: surface,
            message_id: 9000 + self.next_id.fetch_add(1, Ordering::SeqCst),
            is_direct_message: false,
        })
    }

    async fn fetch(&self, _surface: SurfaceId, _message: MessageId) -> Result<Option<SurfaceMessage>, GreenlightError> {
        Ok(None)
    }

    async fn edit_content(&self, _surface: SurfaceId, _message: MessageId, _content: &str) -> Result<(), GreenlightError> {
        Ok(())
    }

    async fn add_reaction(&self, surface: SurfaceId, message: MessageId, emoji: &str) -> Result<(), GreenlightError> {
        self.reactions
            .lock()
            .unwrap()
            .push((surface, message, emoji.to_string()));
        Ok(())
    }

    async fn clear_reactions(&self, _surface: SurfaceId, _message: MessageId) -> Result<(), GreenlightError> {
        Ok(())
    }

    async fn direct_surface(&self, _user: UserId) -> Result<Option<SurfaceId>, GreenlightError> {
        Ok(None)
    }
}

#[derive(Default)]
pub struct MockNotifier {
    pub subscriptions: Mutex<HashSet<(UserId, CategoryId, String)>>,
}

impl MockNotifier {
    pub fn is_subscribed(&self, user: UserId, category: CategoryId, entity_id: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .contains(&(user, category, entity_id.to_string()))
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn has_subscription(&self, user: UserId, category: CategoryId, entity_id: &str) -> Result<bool, GreenlightError> {
        Ok(self.is_subscribed(user, category, entity_id))
    }

    async fn subscribe(&self, user: UserId, category: CategoryId, entity_id: &str) -> Result<(), GreenlightError> {
        self.subscriptions
            .lock()
            .unwrap()
            .insert((user, category, entity_id.to_string()));
        Ok(())
    }
}

/// The message a wizard lives in. Each response replaces its components.
pub struct MockSurface {
    pub actor: RequesterIdentity,
    pub components: Mutex<Vec<Component>>,
    pub responses: Mutex<Vec<WizardView>>,
}

#[async_trait]
impl InteractionSurface for MockSurface {
    fn actor(&self) -> &RequesterIdentity {
        &self.actor
    }

    async fn current_components(&self) -> Result<Vec<Component>, GreenlightError> {
        Ok(self.components.lock().unwrap().clone())
    }

    async fn respond(&self, view: &WizardView) -> Result<PostedMessage, GreenlightError> {
        self.responses.lock().unwrap().push(view.clone());
        *self.components.lock().unwrap() = view.components.clone();
        Ok(PostedMessage {
            surface_id: USER_SURFACE,
            message_id: 700,
            is_direct_message: false,
        })
    }
}

pub struct Harness {
    _dir: tempfile::TempDir,
    pub catalog: Arc<MockCatalog>,
    pub requester: Arc<MockRequester>,
    pub renderer: Arc<MockRenderer>,
    pub store: Arc<ApprovalStore>,
    pub notifier: Arc<MockNotifier>,
    pub wizard: Arc<SelectionWizard>,
    pub dispatcher: InteractionDispatcher,
    pub surface: MockSurface,
}

pub fn harness(config: GreenlightConfig) -> Harness {
    harness_with_notifier(config, true)
}

/// A harness whose wizard has notifications enabled or disabled.
pub fn harness_with_notifier(config: GreenlightConfig, notifications: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(MockCatalog::default());
    let requester = Arc::new(MockRequester {
        outcome: Mutex::new(RequestOutcome::Accepted),
        calls: Mutex::new(Vec::new()),
    });
    let renderer = Arc::new(MockRenderer::default());
    let store = Arc::new(ApprovalStore::open(dir.path()));
    let notifier = Arc::new(MockNotifier::default());
    let wizard = Arc::new(SelectionWizard::new(
        WizardDeps {
            catalog: catalog.clone(),
            requester: requester.clone(),
            renderer: renderer.clone(),
            store: store.clone(),
            notifier: notifications.then(|| notifier.clone() as Arc<dyn Notifier>),
        },
        config,
    ));
    Harness {
        _dir: dir,
        catalog,
        requester,
        renderer,
        store,
        notifier,
        dispatcher: InteractionDispatcher::new(wizard.clone()),
        wizard,
        surface: MockSurface {
            actor: RequesterIdentity {
                user_id: USER_ID,
                username: "alice".to_string(),
            },
            components: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
        },
    }
}

impl Harness {
    pub fn last_view(&self) -> WizardView {
        self.surface.responses.lock().unwrap().last().cloned().unwrap()
    }

    /// Component of the last response whose token has the given action.
    pub fn component(&self, action: ActionKind) -> Option<Component> {
        self.last_view()
            .components
            .into_iter()
            .find(|c| WizardToken::decode(c.custom_id()).map(|t| t.action()) == Ok(action))
    }

    pub fn option_values(&self, action: ActionKind) -> Vec<String> {
        match self.component(action) {
            Some(Component::Select(menu)) => menu.options.into_iter().map(|o| o.value).collect(),
            _ => Vec::new(),
        }
    }

    /// Activate a component of the last response.
    pub async fn click(&self, action: ActionKind, value: Option<&str>) -> DispatchOutcome {
        let component = self.component(action).unwrap_or_else(|| panic!("no {action} component"));
        let interaction = ComponentInteraction {
            custom_id: component.custom_id().to_string(),
            values: value.map(|v| vec![v.to_string()]).unwrap_or_default(),
        };
        self.dispatcher.dispatch(&self.surface, &interaction).await
    }
}
