//! Commands exposed to front ends
//!
//! This module organizes commands into logical submodules:
//! - `subscriptions`: Subscription CRUD, import/export and migration
//! - `renewals`: Renewal calendar and expiry notices
//! - `dashboard`: Status summary and filtered listing

pub mod dashboard;
pub mod renewals;
pub mod subscriptions;

use crate::app::AppState;
use crate::error::Result;

pub use dashboard::*;
pub use renewals::*;
pub use subscriptions::*;

// ===== General Commands =====

/// Get application information
pub async fn get_app_info(state: &AppState) -> Result<AppInfo> {
    Ok(AppInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        app_data_dir: state.app_data_dir.to_string_lossy().to_string(),
        remote_configured: state.sync_service.is_remote_configured(),
    })
}

/// Application information structure
#[derive(Debug, serde::Serialize)]
pub struct AppInfo {
    pub version: String,
    pub app_data_dir: String,
    pub remote_configured: bool,
}
