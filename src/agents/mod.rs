pub mod router;

use crate::types::Result;
use async_trait::async_trait;

// Re-export commonly used types
pub use router::{classify, Intent, RouterOutcome, ToolRouter};

/// Base trait for agents
#[async_trait]
pub trait Agent: Send + Sync {
    /// Execute the agent with the given input
    async fn execute(&self, input: &str) -> Result<String>;

    /// Get the agent's system prompt
    fn system_prompt(&self) -> String;

    fn name(&self) -> &str;
}
