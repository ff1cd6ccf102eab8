use async_trait::async_trait;
use tracing::info;

/// Outbound notification seam. Fire-and-forget from the engines' point of
/// view: a failed notification is logged and never rolls back a settled
/// operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), String>;
}

/// Default sink that writes notifications to the log. Deployments inject a
/// real mail sender behind the same trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), String> {
        info!("Notification to {}: {} - {}", recipient, subject, body);
        Ok(())
    }
}
