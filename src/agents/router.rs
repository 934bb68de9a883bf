use crate::{
    agents::Agent,
    llm::LLMClient,
    tools::{python_repl::strip_code_fences, ToolRegistry},
    types::{AppError, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Tool that runs generated code.
pub const CODE_TOOL: &str = "python_repl";

const CODE_SYSTEM_PROMPT: &str = r#"You write Python 3 code that computes the answer to the user's request.

Rules:
- Respond with ONLY the code, no explanation.
- Use only the standard library.
- print() the final answer.

Example:
- "Calculate the compound interest on 1000 at 5% for 3 years" →
principal = 1000
rate = 0.05
print(round(principal * (1 + rate) ** 3 - principal, 2))"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Generate code and run it
    Compute,
    /// Plain model answer
    Answer,
}

/// `Compute` iff the lower-cased input contains one of `keywords`. Empty keywords never match.
pub fn classify(input: &str, keywords: &[String]) -> Intent {
    let lowered = input.to_lowercase();
    let triggered = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .any(|k| lowered.contains(&k));
    if triggered {
        Intent::Compute
    } else {
        Intent::Answer
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterOutcome {
    pub intent: Intent,
    /// Final text for the user: model answer, or trimmed stdout (stderr on failure)
    pub response: String,
    /// Code that was executed, after fence stripping
    pub code: Option<String>,
    /// Raw tool result `{success, exit_code, stdout, stderr}`
    pub tool_output: Option<Value>,
}

/// Sends keyword-triggered inputs through generated Python, everything else to the model.
pub struct ToolRouter {
    llm: Arc<dyn LLMClient>,
    registry: Arc<ToolRegistry>,
    keywords: Vec<String>,
}

impl ToolRouter {
    pub fn new(llm: Arc<dyn LLMClient>, registry: Arc<ToolRegistry>, keywords: Vec<String>) -> Self {
        Self {
            llm,
            registry,
            keywords,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub async fn route(&self, input: &str) -> Result<RouterOutcome> {
        match classify(input, &self.keywords) {
            Intent::Answer => Ok(RouterOutcome {
                intent: Intent::Answer,
                response: self.llm.generate(input).await?,
                code: None,
                tool_output: None,
            }),
            Intent::Compute => self.compute(input).await,
        }
    }

    async fn compute(&self, input: &str) -> Result<RouterOutcome> {
        if !self.registry.has_tool(CODE_TOOL) {
            return Err(AppError::Configuration(format!(
                "Tool '{}' is not registered",
                CODE_TOOL
            )));
        }

        let generated = self
            .llm
            .generate_with_system(CODE_SYSTEM_PROMPT, input)
            .await?;
        let code = strip_code_fences(&generated);
        tracing::debug!(lines = code.lines().count(), "executing generated code");

        let output = self
            .registry
            .execute(CODE_TOOL, json!({ "code": code }))
            .await?;
        let success = output["success"].as_bool().unwrap_or(false);
        let stream = if success { "stdout" } else { "stderr" };
        let response = output[stream].as_str().unwrap_or_default().trim().to_string();

        if !success {
            tracing::warn!("generated code failed: {}", response);
        }

        Ok(RouterOutcome {
            intent: Intent::Compute,
            response,
            code: Some(code),
            tool_output: Some(output),
        })
    }
}

#[async_trait]
impl Agent for ToolRouter {
    async fn execute(&self, input: &str) -> Result<String> {
        Ok(self.route(input).await?.response)
    }

    fn system_prompt(&self) -> String {
        CODE_SYSTEM_PROMPT.to_string()
    }

    fn name(&self) -> &str {
        "tool_router"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_keywords() -> Vec<String> {
        vec!["calculate".to_string()]
    }

    #[test]
    fn test_classify_keyword_substring() {
        let keywords = default_keywords();
        assert_eq!(classify("Calculate 2 + 2", &keywords), Intent::Compute);
        assert_eq!(classify("please CALCULATE this", &keywords), Intent::Compute);
        assert_eq!(classify("recalculated totals", &keywords), Intent::Compute);
        assert_eq!(classify("What is an autoencoder?", &keywords), Intent::Answer);
    }

    #[test]
    fn test_classify_ignores_empty_keywords() {
        let keywords = vec!["".to_string(), "  ".to_string()];
        assert_eq!(classify("anything", &keywords), Intent::Answer);
        assert_eq!(classify("anything", &[]), Intent::Answer);
    }

    #[test]
    fn test_classify_multiple_keywords() {
        let keywords = vec!["compute".to_string(), "Sum".to_string()];
        assert_eq!(classify("sum these numbers", &keywords), Intent::Compute);
        assert_eq!(classify("calculate", &keywords), Intent::Answer);
    }
}
