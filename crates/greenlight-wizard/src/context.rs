//! Per-interaction selection context.
//!
//! Rebuilt from the incoming token and the components already on the
//! message, then discarded once the response is sent. Prior choices are
//! recovered only from component tokens, never from rendered labels.

use greenlight_types::{Component, RequesterIdentity, SelectMenu};

use crate::token::{ActionKind, WizardToken};

#[derive(Debug, Clone)]
pub struct SelectionContext {
    pub token: WizardToken,
    /// Selected option values; empty for buttons.
    pub values: Vec<String>,
    pub actor: RequesterIdentity,
    previous: Vec<Component>,
}

impl SelectionContext {
    pub fn new(
        token: WizardToken,
        values: Vec<String>,
        actor: RequesterIdentity,
        previous: Vec<Component>,
    ) -> Self {
        Self {
            token,
            values,
            actor,
            previous,
        }
    }

    pub fn selected_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// The candidate menu already on the message, if it belongs to this
    /// actor and category.
    pub fn candidate_menu(&self) -> Option<&SelectMenu> {
        self.previous.iter().find_map(|component| match component {
            Component::Select(menu) => WizardToken::decode(&menu.custom_id)
                .ok()
                .filter(|t| {
                    t.action() == ActionKind::SelectCandidate
                        && t.actor_id() == self.token.actor_id()
                        && t.category_id() == self.token.category_id()
                })
                .map(|_| menu),
            Component::Button(_) => None,
        })
    }

    /// Candidate menu to re-render, showing `chosen_title` as its placeholder
    /// and `chosen_id` as the selected option.
    pub fn carried_candidates(&self, chosen_id: &str, chosen_title: &str) -> Option<Component> {
        self.candidate_menu().map(|menu| {
            let mut menu = menu.clone();
            menu.placeholder = chosen_title.to_string();
            for option in &mut menu.options {
                option.selected = option.value == chosen_id;
            }
            Component::Select(menu)
        })
    }
}
