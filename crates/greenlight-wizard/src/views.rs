//! Builders for wizard responses.
//!
//! Every interactive component gets a freshly encoded token. Disabled status
//! buttons get an inert token.

use greenlight_types::{
    Button, ButtonKind, CatalogEntity, CatalogItem, CategoryId, Component, EntitySummary, Notice,
    RequestOutcome, SelectMenu, SelectOption, UserId, WizardView,
};

use crate::token::{ActionKind, TokenError, WizardToken, ALL_VALUE};

/// Select menu options the platform accepts per menu, minus headroom for the
/// synthetic "all" option.
pub const MAX_CANDIDATES: usize = 15;

/// Platform limit on option labels and descriptions.
const MAX_LABEL_LEN: usize = 100;

/// Who and what a view's tokens are scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenScope {
    pub actor_id: UserId,
    pub category_id: CategoryId,
}

impl TokenScope {
    pub fn token(
        &self,
        action: ActionKind,
        refs: Vec<String>,
        page: Option<u32>,
        filter: Option<&str>,
    ) -> Result<String, TokenError> {
        WizardToken::new(
            action,
            self.actor_id,
            self.category_id,
            refs,
            page,
            filter.map(str::to_string),
        )
        .map(|t| t.encode())
    }

    fn status_button(&self, kind: ButtonKind) -> Result<Component, TokenError> {
        Ok(Component::Button(Button {
            custom_id: self.token(ActionKind::Inert, Vec::new(), None, None)?,
            kind,
            disabled: true,
        }))
    }
}

/// One page of a filtered item list.
#[derive(Debug, Clone)]
pub struct ItemPage<'a> {
    pub items: &'a [CatalogItem],
    pub page: u32,
    pub page_count: u32,
    pub filter: Option<&'a str>,
    /// Distinct filter values across the unfiltered list.
    pub filters: &'a [String],
    pub offer_all: bool,
}

pub fn candidates(scope: TokenScope, entities: &[CatalogEntity]) -> Result<WizardView, TokenError> {
    let options = entities
        .iter()
        .take(MAX_CANDIDATES)
        .map(|e| SelectOption {
            label: truncate(&e.title, MAX_LABEL_LEN),
            value: e.id.clone(),
            description: non_empty(&e.overview).map(|o| truncate(o, MAX_LABEL_LEN)),
            selected: false,
        })
        .collect::<Vec<_>>();

    Ok(WizardView {
        notice: Notice::ChooseCandidate {
            count: options.len(),
        },
        summary: None,
        components: vec![Component::Select(SelectMenu {
            custom_id: scope.token(ActionKind::SelectCandidate, Vec::new(), None, None)?,
            placeholder: String::new(),
            options,
        })],
    })
}

/// Detail of an entity that has no sub-items.
pub fn entity_detail(
    scope: TokenScope,
    entity: &CatalogEntity,
    carried: Option<Component>,
) -> Result<WizardView, TokenError> {
    let mut components: Vec<Component> = carried.into_iter().collect();
    let notice = if entity.available {
        components.push(scope.status_button(ButtonKind::Available)?);
        Notice::AlreadyAvailable
    } else if entity.requested {
        components.push(scope.status_button(ButtonKind::Requested)?);
        Notice::AlreadyRequested
    } else {
        components.push(Component::Button(Button {
            custom_id: scope.token(ActionKind::SubmitEntity, vec![entity.id.clone()], None, None)?,
            kind: ButtonKind::Request,
            disabled: false,
        }));
        Notice::ConfirmEntity
    };

    Ok(WizardView {
        notice,
        summary: Some(EntitySummary::for_entity(entity)),
        components,
    })
}

pub fn item_list(
    scope: TokenScope,
    entity: &CatalogEntity,
    listing: &ItemPage<'_>,
    carried: Option<Component>,
) -> Result<WizardView, TokenError> {
    let entity_ref = || vec![entity.id.clone()];
    let mut components: Vec<Component> = carried.into_iter().collect();

    if listing.filters.len() > 1 {
        let mut options = vec![SelectOption {
            label: "All types".to_string(),
            value: ALL_VALUE.to_string(),
            description: None,
            selected: listing.filter.is_none(),
        }];
        options.extend(listing.filters.iter().map(|f| SelectOption {
            label: truncate(f, MAX_LABEL_LEN),
            value: f.clone(),
            description: None,
            selected: listing.filter == Some(f.as_str()),
        }));
        components.push(Component::Select(SelectMenu {
            custom_id: scope.token(ActionKind::SelectFilter, entity_ref(), None, None)?,
            placeholder: listing.filter.unwrap_or_default().to_string(),
            options,
        }));
    }

    let mut options = Vec::with_capacity(listing.items.len() + 1);
    if listing.offer_all {
        options.push(SelectOption {
            label: "All".to_string(),
            value: ALL_VALUE.to_string(),
            description: None,
            selected: false,
        });
    }
    options.extend(listing.items.iter().map(|item| SelectOption {
        label: truncate(&item.title, MAX_LABEL_LEN),
        value: item.id.clone(),
        description: Some(item_description(item)),
        selected: false,
    }));
    components.push(Component::Select(SelectMenu {
        custom_id: scope.token(ActionKind::SelectItem, entity_ref(), Some(listing.page), listing.filter)?,
        placeholder: String::new(),
        options,
    }));

    if listing.page_count > 1 {
        components.push(Component::Button(Button {
            custom_id: scope.token(ActionKind::PageBack, entity_ref(), Some(listing.page), listing.filter)?,
            kind: ButtonKind::Previous,
            disabled: listing.page == 0,
        }));
        components.push(Component::Button(Button {
            custom_id: scope.token(ActionKind::PageForward, entity_ref(), Some(listing.page), listing.filter)?,
            kind: ButtonKind::Next,
            disabled: listing.page + 1 >= listing.page_count,
        }));
    }

    Ok(WizardView {
        notice: Notice::ChooseItem {
            page: listing.page,
            page_count: listing.page_count,
        },
        summary: Some(EntitySummary::for_entity(entity)),
        components,
    })
}

/// Confirmation for a single item. The submit token carries only the two refs.
pub fn item_confirm(
    scope: TokenScope,
    entity: &CatalogEntity,
    item: &CatalogItem,
    carried: Option<Component>,
) -> Result<WizardView, TokenError> {
    let mut components: Vec<Component> = carried.into_iter().collect();
    let notice = if item.available {
        components.push(scope.status_button(ButtonKind::Available)?);
        Notice::AlreadyAvailable
    } else if item.requested {
        components.push(scope.status_button(ButtonKind::Requested)?);
        Notice::AlreadyRequested
    } else {
        components.push(Component::Button(Button {
            custom_id: scope.token(
                ActionKind::SubmitItem,
                vec![entity.id.clone(), item.id.clone()],
                None,
                None,
            )?,
            kind: ButtonKind::Request,
            disabled: false,
        }));
        Notice::ConfirmItem
    };

    Ok(WizardView {
        notice,
        summary: Some(item_summary(entity, item)),
        components,
    })
}

/// Confirmation for every requestable item in the filtered view.
pub fn bulk_confirm(
    scope: TokenScope,
    entity: &CatalogEntity,
    filter: Option<&str>,
    count: usize,
    carried: Option<Component>,
) -> Result<WizardView, TokenError> {
    let mut summary = EntitySummary::for_entity(entity);
    summary
        .fields
        .push(("Items".to_string(), count.to_string()));
    if let Some(filter) = filter {
        summary
            .fields
            .push(("Release type".to_string(), filter.to_string()));
    }

    let mut components: Vec<Component> = carried.into_iter().collect();
    components.push(Component::Button(Button {
        custom_id: scope.token(
            ActionKind::SubmitItem,
            vec![entity.id.clone(), ALL_VALUE.to_string()],
            None,
            filter,
        )?,
        kind: ButtonKind::Request,
        disabled: false,
    }));

    Ok(WizardView {
        notice: Notice::ConfirmItem,
        summary: Some(summary),
        components,
    })
}

/// Already-requested entity with a button to subscribe to its availability.
pub fn notify_offer(
    scope: TokenScope,
    entity: &CatalogEntity,
    carried: Option<Component>,
) -> Result<WizardView, TokenError> {
    let mut components: Vec<Component> = carried.into_iter().collect();
    components.push(Component::Button(Button {
        custom_id: scope.token(ActionKind::Subscribe, vec![entity.id.clone()], None, None)?,
        kind: ButtonKind::Notify,
        disabled: false,
    }));
    Ok(WizardView {
        notice: Notice::NotifyOffer,
        summary: Some(EntitySummary::for_entity(entity)),
        components,
    })
}

pub fn subscribed(
    scope: TokenScope,
    entity: &CatalogEntity,
    already: bool,
    carried: Option<Component>,
) -> Result<WizardView, TokenError> {
    let mut components: Vec<Component> = carried.into_iter().collect();
    components.push(scope.status_button(ButtonKind::Subscribed)?);
    Ok(WizardView {
        notice: if already {
            Notice::AlreadySubscribed
        } else {
            Notice::Subscribed
        },
        summary: Some(EntitySummary::for_entity(entity)),
        components,
    })
}

/// Terminal view after a submission.
pub fn outcome(
    scope: TokenScope,
    mut summary: EntitySummary,
    outcome: RequestOutcome,
    footer: Option<String>,
) -> Result<WizardView, TokenError> {
    let (notice, kind) = match outcome {
        RequestOutcome::Accepted => (Notice::RequestAccepted, ButtonKind::Accepted),
        RequestOutcome::PendingApproval { request_id } => {
            (Notice::RequestPending { request_id }, ButtonKind::Pending)
        }
        RequestOutcome::Denied => (Notice::RequestDenied, ButtonKind::Denied),
    };
    if footer.is_some() {
        summary.footer = footer;
    }
    Ok(WizardView {
        notice,
        summary: Some(summary),
        components: vec![scope.status_button(kind)?],
    })
}

/// Leaf with a notice and the entity summary when one is known.
pub fn notice(notice: Notice, entity: Option<&CatalogEntity>) -> WizardView {
    WizardView {
        notice,
        summary: entity.map(EntitySummary::for_entity),
        components: Vec::new(),
    }
}

pub fn item_summary(entity: &CatalogEntity, item: &CatalogItem) -> EntitySummary {
    let mut summary = EntitySummary::for_entity(entity);
    summary.title = format!("{} - {}", entity.title, item.title);
    summary
        .fields
        .push(("Release type".to_string(), item.release_type.clone()));
    if let Some(date) = item.release_date {
        summary
            .fields
            .push(("Released".to_string(), date.format("%Y-%m-%d").to_string()));
    }
    summary
}

fn item_description(item: &CatalogItem) -> String {
    match item.release_date {
        Some(date) => format!("{} · {}", item.release_type, date.format("%Y")),
        None => item.release_type.clone(),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('…');
    out
}
