//! Notification sender implementations. The real rendering/delivery stack (email, SMS) lives in
//! a separate service; [`WebhookNotifier`] hands notifications to it over HTTP, and
//! [`LogNotifier`] is the stand-in when no endpoint is configured.

use std::sync::Arc;

use log::*;
use reqwest::Client;
use serde_json::json;

use crate::traits::{Notification, NotificationSender, NotifyError};

/// Posts each notification to the notification service's ingest endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Arc<Client>,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: String) -> Self {
        Self { client: Arc::new(Client::new()), endpoint }
    }
}

impl NotificationSender for WebhookNotifier {
    async fn notify(
        &self,
        member_id: i64,
        notification: &Notification,
        correlation_id: &str,
    ) -> Result<(), NotifyError> {
        let body = json!({
            "member_id": member_id,
            "kind": notification.kind(),
            "payload": notification,
            "correlation_id": correlation_id,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError(format!("notification endpoint returned {}", response.status())))
        }
    }
}

/// Logs notifications instead of sending them. Used when no endpoint is configured so that
/// pipelines behave identically in development.
#[derive(Clone, Default)]
pub struct LogNotifier;

impl NotificationSender for LogNotifier {
    async fn notify(
        &self,
        member_id: i64,
        notification: &Notification,
        correlation_id: &str,
    ) -> Result<(), NotifyError> {
        info!("📨️ [{correlation_id}] {} notification for member #{member_id}", notification.kind());
        Ok(())
    }
}
