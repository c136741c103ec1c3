//! Services module
//!
//! Business logic services that coordinate between commands, the remote
//! store and the local mirror.

pub mod dashboard;
pub mod notifier;
pub mod renewals;
pub mod sync;

pub use dashboard::{DashboardSummary, StatusFilter, SubscriptionQuery, SubscriptionStatus};
pub use notifier::{Alert, AlertKind, ChannelNotifier, Notifier, TracingNotifier};
pub use renewals::{renewal_notices, MonitorHandle, RenewalMonitor, RenewalNotice, RenewalWindow};
pub use sync::{ImportReport, SyncService, WatchHandle};
