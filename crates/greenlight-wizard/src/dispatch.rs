//! Component interaction dispatch.
//!
//! Decodes the activated component's token and hands it to the wizard. Foreign,
//! stale or malformed tokens and other users' clicks are dropped quietly.

use std::sync::Arc;

use greenlight_types::{ComponentInteraction, InteractionSurface};

use crate::context::SelectionContext;
use crate::token::{ActionKind, DecodeError, WizardToken};
use crate::wizard::{SelectionWizard, WizardStep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled(WizardStep),
    Malformed(DecodeError),
    /// The component belongs to another user's wizard.
    ForeignActor,
    Inert,
}

pub struct InteractionDispatcher {
    wizard: Arc<SelectionWizard>,
}

impl InteractionDispatcher {
    pub fn new(wizard: Arc<SelectionWizard>) -> Self {
        Self { wizard }
    }

    pub async fn dispatch(
        &self,
        surface: &dyn InteractionSurface,
        interaction: &ComponentInteraction,
    ) -> DispatchOutcome {
        let token = match WizardToken::decode(&interaction.custom_id) {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(error = %e, custom_id = %interaction.custom_id, "ignoring foreign component");
                return DispatchOutcome::Malformed(e);
            }
        };

        let actor = surface.actor();
        if token.actor_id() != actor.user_id {
            tracing::debug!(
                owner = token.actor_id(),
                user_id = actor.user_id,
                "ignoring interaction on another user's wizard"
            );
            return DispatchOutcome::ForeignActor;
        }
        if token.action() == ActionKind::Inert {
            tracing::debug!(custom_id = %interaction.custom_id, "ignoring inert component");
            return DispatchOutcome::Inert;
        }

        let previous = surface.current_components().await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "could not read current components");
            Vec::new()
        });
        let ctx = SelectionContext::new(token, interaction.values.clone(), actor.clone(), previous);
        DispatchOutcome::Handled(self.wizard.handle(surface, ctx).await)
    }
}
