//! Reconciliation triggers and the retry schedule.
//!
//! The supervisor owns the backoff schedule as data. Each trigger runs a
//! sweep at once and arms a fresh schedule task that runs another sweep after
//! each delay, replacing whatever schedule was pending. The connection monitor
//! turns gateway lifecycle events and configuration changes into triggers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use greenlight_types::config::GreenlightConfig;
use greenlight_types::GatewayEvent;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::reconcile::{Reconciler, SweepOutcome};

pub struct ReconcileSupervisor {
    reconciler: Arc<Reconciler>,
    schedule: Mutex<Vec<Duration>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ReconcileSupervisor {
    pub fn new(reconciler: Arc<Reconciler>, schedule: Vec<Duration>) -> Self {
        Self {
            reconciler,
            schedule: Mutex::new(schedule),
            pending: Mutex::new(None),
        }
    }

    /// Sweep now and restart the retry schedule. Must be called from within
    /// a tokio runtime.
    pub fn trigger(&self) {
        spawn_sweep(self.reconciler.clone(), 0);

        let schedule = self.schedule();
        let reconciler = self.reconciler.clone();
        let handle = tokio::spawn(async move {
            for (attempt, delay) in schedule.into_iter().enumerate() {
                tokio::time::sleep(delay).await;
                // Detached so cancelling the schedule never interrupts a sweep.
                spawn_sweep(reconciler.clone(), attempt + 1);
            }
        });

        if let Some(previous) = self.lock_pending().replace(handle) {
            previous.abort();
        }
    }

    /// Replace the delays used by future triggers.
    pub fn set_schedule(&self, schedule: Vec<Duration>) {
        *self
            .schedule
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = schedule;
    }

    pub fn schedule(&self) -> Vec<Duration> {
        self.schedule
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Drop pending retries. An in-flight sweep runs to completion.
    pub fn cancel(&self) {
        if let Some(handle) = self.lock_pending().take() {
            handle.abort();
        }
    }

    pub fn has_pending_retries(&self) -> bool {
        self.lock_pending()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ReconcileSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn spawn_sweep(reconciler: Arc<Reconciler>, attempt: usize) {
    tokio::spawn(async move {
        match reconciler.sweep().await {
            SweepOutcome::Completed(report) => {
                tracing::debug!(attempt, sweep_id = %report.sweep_id, "scheduled sweep finished");
            }
            SweepOutcome::Busy => tracing::debug!(attempt, "sweep skipped, another is running"),
            SweepOutcome::Disabled => {}
        }
    });
}

enum Signal {
    Event(GatewayEvent),
    ConfigChanged,
    ConfigClosed,
    Closed,
}

/// Turns gateway events and configuration changes into reconciliation triggers.
pub struct ConnectionMonitor {
    supervisor: Arc<ReconcileSupervisor>,
    reconciler: Arc<Reconciler>,
    events: mpsc::Receiver<GatewayEvent>,
    config: Option<watch::Receiver<GreenlightConfig>>,
}

impl ConnectionMonitor {
    pub fn new(
        supervisor: Arc<ReconcileSupervisor>,
        reconciler: Arc<Reconciler>,
        events: mpsc::Receiver<GatewayEvent>,
    ) -> Self {
        Self {
            supervisor,
            reconciler,
            events,
            config: None,
        }
    }

    /// Also react to configuration changes from the config loader.
    pub fn with_config(mut self, config: watch::Receiver<GreenlightConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Run until the event channel closes.
    pub async fn run(mut self) {
        tracing::info!("connection monitor started");

        loop {
            let signal = {
                let events = &mut self.events;
                let config = &mut self.config;
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => Signal::Event(event),
                        None => Signal::Closed,
                    },
                    ok = async {
                        match config.as_mut() {
                            Some(rx) => rx.changed().await.is_ok(),
                            None => std::future::pending().await,
                        }
                    } => if ok { Signal::ConfigChanged } else { Signal::ConfigClosed },
                }
            };

            match signal {
                Signal::Event(event) => self.on_event(event),
                Signal::ConfigChanged => self.on_config_change(),
                Signal::ConfigClosed => {
                    tracing::debug!("config channel closed");
                    self.config = None;
                }
                Signal::Closed => break,
            }
        }

        self.supervisor.cancel();
        tracing::info!("connection monitor stopped");
    }

    fn on_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected => {
                tracing::info!("gateway connected, reconciling");
                self.supervisor.trigger();
            }
            GatewayEvent::ConfigurationApplied => {
                tracing::info!("configuration applied, reconciling");
                self.supervisor.trigger();
            }
            GatewayEvent::Disconnected => {
                tracing::warn!("gateway disconnected");
            }
        }
    }

    /// Only the reconciler side is updated here. The wizard follows its own
    /// receiver through `SelectionWizard::follow_config`.
    fn on_config_change(&mut self) {
        let Some(rx) = self.config.as_mut() else {
            return;
        };
        let config = rx.borrow_and_update().clone();
        self.reconciler.apply_config(&config);
        self.supervisor.set_schedule(config.reconcile.schedule());
        tracing::info!("configuration changed, reconciling");
        self.supervisor.trigger();
    }
}
