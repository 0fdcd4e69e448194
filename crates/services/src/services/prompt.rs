use async_trait::async_trait;

/// Blocking confirmation shown before a non-silent update
#[async_trait]
pub trait UpdatePrompt: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct StaticPrompt(pub bool);

#[async_trait]
impl UpdatePrompt for StaticPrompt {
    async fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}
