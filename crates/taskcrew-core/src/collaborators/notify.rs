//! Best-effort notification delivery.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Longest message a webhook accepts in one `content` field.
const WEBHOOK_CONTENT_LIMIT: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PlanComplete,
    ImplementationComplete,
    TestingPassed,
    TestingFailed,
    IntegrationOpened,
    IntegrationMerged,
    TechnicalHurdle,
    ApprovalRequired,
    RoleFired,
    RoleReplaced,
}

impl NotificationKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::PlanComplete => "Plan complete",
            Self::ImplementationComplete => "Implementation complete",
            Self::TestingPassed => "\u{2705} Tests passed",
            Self::TestingFailed => "\u{274c} Tests failed",
            Self::IntegrationOpened => "Integration request opened",
            Self::IntegrationMerged => "\u{2705} Integration request merged",
            Self::TechnicalHurdle => "\u{26a0}\u{fe0f} Technical hurdle",
            Self::ApprovalRequired => "Approval required",
            Self::RoleFired => "Role fired",
            Self::RoleReplaced => "Role replaced",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PlanComplete => "plan_complete",
            Self::ImplementationComplete => "implementation_complete",
            Self::TestingPassed => "testing_passed",
            Self::TestingFailed => "testing_failed",
            Self::IntegrationOpened => "integration_opened",
            Self::IntegrationMerged => "integration_merged",
            Self::TechnicalHurdle => "technical_hurdle",
            Self::ApprovalRequired => "approval_required",
            Self::RoleFired => "role_fired",
            Self::RoleReplaced => "role_replaced",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub message: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Human-readable text, title first.
    pub fn render(&self) -> String {
        if self.message.is_empty() {
            self.kind.title().to_string()
        } else {
            format!("**{}**\n{}", self.kind.title(), self.message)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(String),

    #[error("notification endpoint answered {status}")]
    Rejected { status: u16 },
}

pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Callers log and drop failures; a notifier never aborts a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> NotifyResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &NotificationEvent) -> NotifyResult<()> {
        Ok(())
    }
}

/// Writes each notification as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &NotificationEvent) -> NotifyResult<()> {
        info!(event = "notification", kind = %event.kind, message = %event.message);
        Ok(())
    }
}

/// POSTs `{"content": ...}` to a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &NotificationEvent) -> NotifyResult<()> {
        let content: String = event.render().chars().take(WEBHOOK_CONTENT_LIMIT).collect();
        let resp = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Rejected {
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Delivers to every inner notifier; the first error is reported after
/// all have been tried.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.targets.push(notifier);
        self
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn send(&self, event: &NotificationEvent) -> NotifyResult<()> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = target.send(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn send(&self, _event: &NotificationEvent) -> NotifyResult<()> {
            Err(NotifyError::Rejected { status: 500 })
        }
    }

    #[test]
    fn test_render_includes_title() {
        let e = NotificationEvent::new(NotificationKind::TestingFailed, "2 failures");
        assert!(e.render().contains("Tests failed"));
        assert!(e.render().ends_with("2 failures"));
    }

    #[tokio::test]
    async fn test_fanout_tries_every_target() {
        let fan = FanoutNotifier::new()
            .with(Arc::new(Failing))
            .with(Arc::new(LogNotifier));
        let e = NotificationEvent::new(NotificationKind::PlanComplete, "");
        assert!(matches!(
            fan.send(&e).await,
            Err(NotifyError::Rejected { status: 500 })
        ));
    }

    #[test]
    fn test_kind_display_is_snake_case() {
        assert_eq!(NotificationKind::RoleReplaced.to_string(), "role_replaced");
    }
}
