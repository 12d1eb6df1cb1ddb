// ABOUTME: Conflict notifications for administrators
// ABOUTME: Notifier trait with a tracing-only sender and a webhook relay sender

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// One message to one administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictNotice {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl ConflictNotice {
    /// Message pointing an admin at the view link for a conflict.
    pub fn for_conflict(
        to: &str,
        conflict_id: i64,
        conflict_kind: &str,
        table_name: &str,
        link: &str,
        valid_hours: i64,
    ) -> Self {
        let body = format!(
            "A data conflict was detected during database synchronization.\n\n\
             Conflict ID: {}\n\
             Conflict type: {}\n\
             Table: {}\n\n\
             Review and resolve it here:\n{}\n\n\
             This link is valid for {} hours.\n",
            conflict_id, conflict_kind, table_name, link, valid_hours
        );
        Self {
            to: to.to_string(),
            subject: format!("Database sync conflict #{} on {}", conflict_id, table_name),
            body,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_conflict(&self, notice: &ConflictNotice) -> Result<()>;
}

/// Writes notices to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_conflict(&self, notice: &ConflictNotice) -> Result<()> {
        tracing::info!(
            "Conflict notice for {}: {}\n{}",
            notice.to,
            notice.subject,
            notice.body
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Posts each notice as JSON to an email relay endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    from: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, from: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_conflict(&self, notice: &ConflictNotice) -> Result<()> {
        let message = RelayMessage {
            from: &self.from,
            to: &notice.to,
            subject: &notice.subject,
            body: &notice.body,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .with_context(|| format!("Failed to reach notification relay for {}", notice.to))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Notification relay returned {}: {}", status, body);
        }
        tracing::debug!("Delivered conflict notice to {}", notice.to);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every notice; optionally fails delivery.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<ConflictNotice>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_conflict(&self, notice: &ConflictNotice) -> Result<()> {
            self.sent.lock().unwrap().push(notice.clone());
            if self.fail {
                anyhow::bail!("relay down");
            }
            Ok(())
        }
    }
}
