/// Config directory loader with validation and hot-reload support.
///
/// Reads `greenlight.yaml` from a directory, validates on load, watches the
/// directory via `notify`, and publishes accepted changes on a
/// `tokio::sync::watch` channel. Every accepted change counts as a
/// configuration-apply event for reconciliation.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::config::*;
use crate::errors::GreenlightError;

/// File name of the main configuration inside the config directory.
pub const CONFIG_FILE: &str = "greenlight.yaml";

/// Delimiter reserved by the wizard token grammar.
const TOKEN_DELIMITER: char = '/';

/// Loads, validates, and watches configuration from a directory.
///
/// Expected directory structure:
/// ```text
/// config/
/// └── greenlight.yaml
/// ```
pub struct ConfigLoader {
    /// Root config directory path.
    config_dir: PathBuf,
    /// Watch sender for broadcasting config changes.
    tx: watch::Sender<GreenlightConfig>,
    /// File watcher handle (kept alive to maintain the watch).
    _watcher: Option<RecommendedWatcher>,
}

impl ConfigLoader {
    /// Load and validate configuration, returning the loader and a receiver
    /// for subsequent changes.
    pub fn load(
        config_dir: &Path,
    ) -> Result<(Self, watch::Receiver<GreenlightConfig>), GreenlightError> {
        let config = Self::load_all(config_dir)?;
        Self::validate(&config)?;

        let (tx, rx) = watch::channel(config);

        Ok((
            Self {
                config_dir: config_dir.to_path_buf(),
                tx,
                _watcher: None,
            },
            rx,
        ))
    }

    /// Start watching the config directory for changes.
    ///
    /// Invalid configs are logged and the previous config stays in effect.
    pub fn watch(&mut self) -> Result<(), GreenlightError> {
        let config_dir = self.config_dir.clone();
        let tx = self.tx.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        match Self::load_all(&config_dir).and_then(|config| {
                            Self::validate(&config)?;
                            Ok(config)
                        }) {
                            Ok(config) => {
                                // Editors often emit several events per save.
                                let changed = tx.send_if_modified(|current| {
                                    if *current == config {
                                        false
                                    } else {
                                        *current = config;
                                        true
                                    }
                                });
                                if changed {
                                    tracing::info!("config reloaded successfully");
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "config reload rejected, keeping previous config");
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "file watcher error");
                }
            }
        })
        .map_err(|e| GreenlightError::Config(format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(&self.config_dir, RecursiveMode::NonRecursive)
            .map_err(|e| GreenlightError::Config(format!("failed to watch config directory: {e}")))?;

        self._watcher = Some(watcher);
        tracing::info!(dir = %self.config_dir.display(), "started watching config directory");
        Ok(())
    }

    /// Current configuration.
    pub fn current(&self) -> GreenlightConfig {
        self.tx.borrow().clone()
    }

    /// Load `greenlight.yaml` from the config directory.
    pub fn load_all(config_dir: &Path) -> Result<GreenlightConfig, GreenlightError> {
        let path = config_dir.join(CONFIG_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            GreenlightError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            GreenlightError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Validate the config for internal consistency.
    ///
    /// Checks:
    /// - Approve and deny emojis are non-empty and distinct
    /// - Reconcile schedule delays are positive
    /// - Category ids are unique
    /// - Filter values never contain the token delimiter
    /// - A configured authority has a base url
    pub fn validate(config: &GreenlightConfig) -> Result<(), GreenlightError> {
        Self::validate_approval(&config.approval)?;
        Self::validate_reconcile(&config.reconcile)?;

        let mut ids = HashSet::new();
        for category in &config.categories {
            if !ids.insert(category.id) {
                return Err(GreenlightError::Config(format!(
                    "duplicate category id {}",
                    category.id
                )));
            }
            validate_restrictions(&category.name, &category.restrictions)?;
        }

        if let Some(authority) = &config.authority {
            if authority.base_url.trim().is_empty() {
                return Err(GreenlightError::Config(
                    "authority.base_url must not be empty".to_string(),
                ));
            }
            if authority.timeout_secs == 0 {
                return Err(GreenlightError::Config(
                    "authority.timeout_secs must be positive".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn validate_approval(config: &ApprovalConfig) -> Result<(), GreenlightError> {
        let emojis = config.emojis();
        if emojis.approve.is_empty() || emojis.deny.is_empty() {
            return Err(GreenlightError::Config(
                "approval emojis must not be empty".to_string(),
            ));
        }
        if emojis.approve == emojis.deny {
            return Err(GreenlightError::Config(format!(
                "approve and deny emojis must differ (both are '{}')",
                emojis.approve
            )));
        }
        Ok(())
    }

    fn validate_reconcile(config: &ReconcileConfig) -> Result<(), GreenlightError> {
        if config.schedule_secs.iter().any(|s| *s == 0) {
            return Err(GreenlightError::Config(
                "reconcile.schedule_secs entries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_restrictions(category: &str, config: &RestrictionConfig) -> Result<(), GreenlightError> {
    for filter in config.denied_filters.iter().chain(&config.allowed_filters) {
        if filter.is_empty() || filter.contains(TOKEN_DELIMITER) {
            return Err(GreenlightError::Config(format!(
                "category '{category}': invalid filter value '{filter}' (must be non-empty and must not contain '{TOKEN_DELIMITER}')"
            )));
        }
    }
    Ok(())
}
