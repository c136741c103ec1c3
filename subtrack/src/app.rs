//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::config::{AppConfig, CONFIG_FILE_NAME};
use crate::database::MirrorDatabase;
use crate::dates::{Clock, SystemClock};
use crate::error::Result;
use crate::remote::{FirestoreClient, RemoteStore};
use crate::services::{Notifier, RenewalMonitor, SyncService, TracingNotifier};
use crate::storage::LocalMirror;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub config: AppConfig,
    pub sync_service: SyncService,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        app_data_dir: PathBuf,
        config: AppConfig,
        sync_service: SyncService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            app_data_dir,
            config,
            sync_service,
            notifier,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.sync_service.clock().today()
    }

    /// Renewal monitor over this state's services; call `start` to run it
    pub fn renewal_monitor(&self) -> RenewalMonitor {
        RenewalMonitor::new(
            self.sync_service.clone(),
            self.notifier.clone(),
            self.config.expiring_threshold_days,
            self.config.notice_interval(),
        )
    }
}

/// Application setup - called once on startup
pub async fn setup(app_data_dir: &Path) -> Result<AppState> {
    tracing::info!("Initializing application");
    tracing::info!("App data directory: {:?}", app_data_dir);

    tokio::fs::create_dir_all(app_data_dir).await?;

    let config = AppConfig::load(&app_data_dir.join(CONFIG_FILE_NAME)).await?;

    let repository = MirrorDatabase::in_dir(app_data_dir).open().await?;
    let mirror = LocalMirror::new(Arc::new(repository));

    let remote = connect_remote(&config);
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sync_service = SyncService::new(mirror, remote, notifier.clone(), clock)
        .with_local_poll_interval(config.local_poll_interval());

    tracing::info!("Application initialized successfully");

    Ok(AppState::new(
        app_data_dir.to_path_buf(),
        config,
        sync_service,
        notifier,
    ))
}

fn connect_remote(config: &AppConfig) -> Option<Arc<dyn RemoteStore>> {
    let Some(remote_config) = config.usable_remote() else {
        tracing::warn!("Remote store not configured, using local mirror only");
        return None;
    };

    match FirestoreClient::new(remote_config, config.remote_poll_interval()) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::error!("Failed to set up remote store, using local mirror only: {}", e);
            None
        }
    }
}
