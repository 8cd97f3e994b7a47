pub mod twilio;

use async_trait::async_trait;

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Writes outgoing messages to the log instead of delivering them. Used when
/// no WhatsApp account is configured.
pub struct LogMessaging;

#[async_trait]
impl MessagingProvider for LogMessaging {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to, body, "outgoing message (not delivered)");
        Ok(())
    }
}
