//! Chains
//!
//! A chain takes named string inputs and produces named string outputs.
//! [`LLMChain`] binds a prompt template to a model call;
//! [`SimpleSequentialChain`] and [`SequentialChain`] compose chains so the
//! outputs of one step feed the next.
//!
//! ```ignore
//! let first = LLMChain::new(llm.clone(), PromptTemplate::new("Explain {concept}")?);
//! let second = LLMChain::new(llm, PromptTemplate::new("Explain like I'm five: {ml_concept}")?);
//! let overall = SimpleSequentialChain::new(vec![Arc::new(first), Arc::new(second)])?;
//! let answer = overall.run("autoencoder").await?;
//! ```

pub mod llm_chain;
pub mod sequential;

use crate::types::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;

pub use llm_chain::LLMChain;
pub use sequential::{ChainStep, SequentialChain, SequentialRun, SimpleSequentialChain};

/// Named values flowing in and out of a chain.
pub type ChainValues = HashMap<String, String>;

#[async_trait]
pub trait Chain: Send + Sync {
    /// Keys `call` reads from its input.
    fn input_keys(&self) -> Vec<String>;

    /// Keys `call` adds to its output.
    fn output_keys(&self) -> Vec<String>;

    async fn call(&self, inputs: &ChainValues) -> Result<ChainValues>;

    /// Run a chain with exactly one input and one output.
    async fn run(&self, input: &str) -> Result<String> {
        let (input_key, output_key) = single_io(self.input_keys(), self.output_keys())?;
        let inputs = ChainValues::from([(input_key, input.to_string())]);
        let mut outputs = self.call(&inputs).await?;
        outputs.remove(&output_key).ok_or_else(|| {
            AppError::Internal(format!("Chain did not produce output '{}'", output_key))
        })
    }
}

pub(crate) fn single_io(inputs: Vec<String>, outputs: Vec<String>) -> Result<(String, String)> {
    match (inputs.as_slice(), outputs.as_slice()) {
        ([input], [output]) => Ok((input.clone(), output.clone())),
        _ => Err(AppError::InvalidInput(format!(
            "run() needs exactly one input and one output, chain has inputs {:?} and outputs {:?}",
            inputs, outputs
        ))),
    }
}

/// Fail with the first key of `required` missing from `values`.
pub(crate) fn require_keys(values: &ChainValues, required: &[String]) -> Result<()> {
    match required.iter().find(|key| !values.contains_key(*key)) {
        Some(key) => Err(AppError::InvalidInput(format!(
            "Missing chain input: {}",
            key
        ))),
        None => Ok(()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_io() {
        let (i, o) = single_io(vec!["a".into()], vec!["b".into()]).unwrap();
        assert_eq!((i.as_str(), o.as_str()), ("a", "b"));
        assert!(single_io(vec!["a".into(), "c".into()], vec!["b".into()]).is_err());
        assert!(single_io(vec![], vec!["b".into()]).is_err());
    }

    #[test]
    fn test_require_keys() {
        let values = ChainValues::from([("a".to_string(), "1".to_string())]);
        assert!(require_keys(&values, &["a".to_string()]).is_ok());
        let err = require_keys(&values, &["a".to_string(), "b".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Missing chain input: b"));
    }
}
