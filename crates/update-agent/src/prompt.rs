use async_trait::async_trait;
use dialoguer::Confirm;
use services::services::prompt::UpdatePrompt;
use tracing::warn;

/// Asks on the controlling terminal
pub struct TerminalPrompt;

#[async_trait]
impl UpdatePrompt for TerminalPrompt {
    async fn confirm(&self, message: &str) -> bool {
        let message = message.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(message)
                .default(true)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => {
                warn!(error = %e, "Update prompt unavailable, declining");
                false
            }
            Err(e) => {
                warn!(error = %e, "Update prompt failed, declining");
                false
            }
        }
    }
}
