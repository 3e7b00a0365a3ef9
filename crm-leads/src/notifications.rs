//! Operational mail sent when leads are created.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use crm_core::{CrmApp, EventListener, HookContext, HookResult, ServiceEventKind};
use serde_json::Value;

use crate::services::CrmParams;

pub const LEAD_CREATED_SUBJECT: &str = "A lead has been created";
pub const LEAD_CREATED_BODY: &str = "Go to the site to see the new lead";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        tracing::info!(
            from = %message.from,
            to = ?message.to,
            subject = %message.subject,
            "mail sent"
        );
        Ok(())
    }
}

/// Keeps every message in memory. Can be told to fail every send.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages recorded so far. A poisoned outbox still reports them.
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        if self.fail {
            anyhow::bail!("mail transport unavailable");
        }
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("mail outbox poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

/// Mails the operational mailbox once per created lead. Delivery is best
/// effort: failures are logged and never reach the caller.
pub struct NotifyLeadCreated {
    mailer: Arc<dyn Mailer>,
}

impl NotifyLeadCreated {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl EventListener<Value, CrmParams> for NotifyLeadCreated {
    async fn handle(
        &self,
        service: &str,
        event: &ServiceEventKind,
        result: &HookResult<Value>,
        ctx: &HookContext<Value, CrmParams>,
    ) -> Result<()> {
        let lead_id = match result {
            HookResult::One(lead) => lead.get("id").and_then(|v| v.as_str()).unwrap_or_default(),
            HookResult::Many(_) => "",
        };

        let message = MailMessage {
            subject: LEAD_CREATED_SUBJECT.to_string(),
            body: LEAD_CREATED_BODY.to_string(),
            from: ctx
                .config
                .get_string("mail.from")
                .unwrap_or_else(|| "test@test.com".to_string()),
            to: ctx.config.get_list("mail.to"),
        };

        if message.to.is_empty() {
            tracing::warn!(lead = lead_id, "no mail.to recipients configured, notification skipped");
            return Ok(());
        }

        match self.mailer.send(&message).await {
            Ok(()) => tracing::debug!(service, event = event.as_str(), lead = lead_id, "notification sent"),
            Err(err) => tracing::warn!(lead = lead_id, error = %err, "notification failed"),
        }
        Ok(())
    }
}

pub fn configure(app: &CrmApp<Value, CrmParams>, mailer: Arc<dyn Mailer>) {
    app.on(
        "leads",
        ServiceEventKind::Created,
        Arc::new(NotifyLeadCreated::new(mailer)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MailMessage {
        MailMessage {
            subject: LEAD_CREATED_SUBJECT.to_string(),
            body: LEAD_CREATED_BODY.to_string(),
            from: "crm@example.com".to_string(),
            to: vec!["ops@example.com".to_string()],
        }
    }

    #[tokio::test]
    async fn memory_mailer_records_or_fails() {
        let mailer = MemoryMailer::new();
        mailer.send(&message()).await.unwrap();
        assert_eq!(mailer.sent(), vec![message()]);

        let failing = MemoryMailer::failing();
        assert!(failing.send(&message()).await.is_err());
        assert!(failing.sent().is_empty());
    }

    #[tokio::test]
    async fn poisoned_outbox_fails_sends_but_keeps_history() {
        let mailer = Arc::new(MemoryMailer::new());
        mailer.send(&message()).await.unwrap();

        let poisoner = mailer.clone();
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.sent.lock().unwrap();
            panic!("poison the outbox");
        })
        .join();
        assert!(joined.is_err());

        let err = mailer.send(&message()).await.unwrap_err();
        assert_eq!(err.to_string(), "mail outbox poisoned");
        assert_eq!(mailer.sent().len(), 1);
    }
}
