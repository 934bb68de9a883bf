use crate::chains::{require_keys, Chain, ChainValues};
use crate::llm::LLMClient;
use crate::prompts::PromptTemplate;
use crate::types::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Default key under which an `LLMChain` stores the model output.
pub const DEFAULT_OUTPUT_KEY: &str = "text";

/// A prompt template bound to a model.
pub struct LLMChain {
    llm: Arc<dyn LLMClient>,
    prompt: PromptTemplate,
    output_key: String,
}

impl LLMChain {
    pub fn new(llm: Arc<dyn LLMClient>, prompt: PromptTemplate) -> Self {
        Self {
            llm,
            prompt,
            output_key: DEFAULT_OUTPUT_KEY.to_string(),
        }
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }
}

#[async_trait]
impl Chain for LLMChain {
    fn input_keys(&self) -> Vec<String> {
        self.prompt.input_variables()
    }

    fn output_keys(&self) -> Vec<String> {
        vec![self.output_key.clone()]
    }

    /// Returns the inputs plus the trimmed model response under the output key.
    async fn call(&self, inputs: &ChainValues) -> Result<ChainValues> {
        require_keys(inputs, &self.input_keys())?;
        let prompt = self.prompt.format(inputs)?;
        debug!(model = self.llm.model_name(), prompt_len = prompt.len(), "running LLM chain");

        let response = self.llm.generate(&prompt).await?;
        let mut outputs = inputs.clone();
        outputs.insert(self.output_key.clone(), response.trim().to_string());
        Ok(outputs)
    }
}
