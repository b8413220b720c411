use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    Failed { recipient: String, reason: String },
}

/// Delivers password-reset links to users.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset(&self, email: &str, reset_url: &str) -> Result<(), NotifyError>;
}

/// Writes the reset link to the log. Used until a mail transport is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset(&self, email: &str, reset_url: &str) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %email,
            "Forgot your password? Submit a PATCH request with your new password and passwordConfirm to: {}",
            reset_url
        );
        Ok(())
    }
}
