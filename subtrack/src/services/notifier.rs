//! User-facing alerts
//!
//! Services raise alerts through a [`Notifier`]; front ends decide how to
//! show them. The default implementation writes them to the log.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// The remote store refused a write; usually its access rules
    PermissionDenied,
    /// A subscription is about to expire
    RenewalDue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub body: String,
}

impl Alert {
    pub fn permission_denied(detail: &str) -> Self {
        Self {
            kind: AlertKind::PermissionDenied,
            title: "Remote store permission error".to_string(),
            body: format!(
                "The remote store rejected the write ({}). The record was saved locally. \
                 Check the access rules of the 'subscriptions' collection.",
                detail
            ),
        }
    }

    pub fn renewal_due(message: String) -> Self {
        Self {
            kind: AlertKind::RenewalDue,
            title: "Subscription renewal".to_string(),
            body: message,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Logs alerts
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn alert(&self, alert: Alert) {
        match alert.kind {
            AlertKind::PermissionDenied => {
                tracing::error!("{}: {}", alert.title, alert.body)
            }
            AlertKind::RenewalDue => tracing::info!("{}: {}", alert.title, alert.body),
        }
    }
}

/// Forwards alerts to a channel, for front ends and tests
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn alert(&self, alert: Alert) {
        if self.tx.send(alert).is_err() {
            tracing::debug!("Alert receiver dropped");
        }
    }
}
