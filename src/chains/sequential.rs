use crate::chains::{require_keys, single_io, Chain, ChainValues};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Input key of a [`SimpleSequentialChain`] when used through [`Chain::call`].
pub const SIMPLE_INPUT_KEY: &str = "input";
/// Output key of a [`SimpleSequentialChain`] when used through [`Chain::call`].
pub const SIMPLE_OUTPUT_KEY: &str = "output";

/// A single step in a sequential run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    /// Position of the step, starting at 0
    pub index: usize,
    pub input: String,
    pub output: String,
    pub duration_ms: u64,
}

/// Result of [`SimpleSequentialChain::run_with_trace`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialRun {
    pub output: String,
    pub steps: Vec<ChainStep>,
}

/// Single-input chains run in order, each output becoming the next input.
pub struct SimpleSequentialChain {
    chains: Vec<Arc<dyn Chain>>,
}

impl SimpleSequentialChain {
    pub fn new(chains: Vec<Arc<dyn Chain>>) -> Result<Self> {
        if chains.is_empty() {
            return Err(AppError::InvalidInput(
                "A sequential chain needs at least one step".to_string(),
            ));
        }
        for (index, chain) in chains.iter().enumerate() {
            let inputs = chain.input_keys();
            let outputs = chain.output_keys();
            if inputs.len() != 1 || outputs.len() != 1 {
                return Err(AppError::InvalidInput(format!(
                    "Step {} must have exactly one input and one output, has inputs {:?} and outputs {:?}",
                    index, inputs, outputs
                )));
            }
        }
        Ok(Self { chains })
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Run every step and record its input, output and timing.
    pub async fn run_with_trace(&self, input: &str) -> Result<SequentialRun> {
        let mut steps = Vec::with_capacity(self.chains.len());
        let mut current = input.to_string();

        for (index, chain) in self.chains.iter().enumerate() {
            let step_start = Instant::now();
            let (input_key, output_key) = single_io(chain.input_keys(), chain.output_keys())?;
            let inputs = ChainValues::from([(input_key, current.clone())]);

            let mut outputs = chain.call(&inputs).await?;
            let output = outputs.remove(&output_key).ok_or_else(|| {
                AppError::Internal(format!("Step {} did not produce '{}'", index, output_key))
            })?;
            let duration_ms = step_start.elapsed().as_millis() as u64;
            debug!(step = index, duration_ms, "sequential step finished");

            steps.push(ChainStep {
                index,
                input: std::mem::replace(&mut current, output.clone()),
                output,
                duration_ms,
            });
        }

        info!(steps = steps.len(), "sequential chain finished");
        Ok(SequentialRun {
            output: current,
            steps,
        })
    }
}

#[async_trait]
impl Chain for SimpleSequentialChain {
    fn input_keys(&self) -> Vec<String> {
        vec![SIMPLE_INPUT_KEY.to_string()]
    }

    fn output_keys(&self) -> Vec<String> {
        vec![SIMPLE_OUTPUT_KEY.to_string()]
    }

    async fn call(&self, inputs: &ChainValues) -> Result<ChainValues> {
        require_keys(inputs, &self.input_keys())?;
        let run = self.run_with_trace(&inputs[SIMPLE_INPUT_KEY]).await?;
        Ok(ChainValues::from([(SIMPLE_OUTPUT_KEY.to_string(), run.output)]))
    }
}

/// Multi-variable composition: each step reads any key produced so far.
pub struct SequentialChain {
    chains: Vec<Arc<dyn Chain>>,
    input_keys: Vec<String>,
    output_keys: Vec<String>,
}

impl SequentialChain {
    /// Validate that every step's inputs are available when it runs and that
    /// every requested output is produced by some step or given as input.
    pub fn new(
        chains: Vec<Arc<dyn Chain>>,
        input_keys: Vec<String>,
        output_keys: Vec<String>,
    ) -> Result<Self> {
        if chains.is_empty() {
            return Err(AppError::InvalidInput(
                "A sequential chain needs at least one step".to_string(),
            ));
        }

        let mut known: HashSet<String> = input_keys.iter().cloned().collect();
        for (index, chain) in chains.iter().enumerate() {
            if let Some(missing) = chain.input_keys().into_iter().find(|k| !known.contains(k)) {
                return Err(AppError::InvalidInput(format!(
                    "Step {} requires '{}', which is neither an input nor produced by an earlier step",
                    index, missing
                )));
            }
            known.extend(chain.output_keys());
        }
        if let Some(missing) = output_keys.iter().find(|k| !known.contains(*k)) {
            return Err(AppError::InvalidInput(format!(
                "Output '{}' is not produced by any step",
                missing
            )));
        }

        Ok(Self {
            chains,
            input_keys,
            output_keys,
        })
    }
}

#[async_trait]
impl Chain for SequentialChain {
    fn input_keys(&self) -> Vec<String> {
        self.input_keys.clone()
    }

    fn output_keys(&self) -> Vec<String> {
        self.output_keys.clone()
    }

    /// Only the requested output keys are returned.
    async fn call(&self, inputs: &ChainValues) -> Result<ChainValues> {
        require_keys(inputs, &self.input_keys)?;
        let mut values: ChainValues = self
            .input_keys
            .iter()
            .map(|k| (k.clone(), inputs[k].clone()))
            .collect();

        for (index, chain) in self.chains.iter().enumerate() {
            let step_inputs: ChainValues = chain
                .input_keys()
                .into_iter()
                .filter_map(|k| values.get(&k).map(|v| (k, v.clone())))
                .collect();
            let outputs = chain.call(&step_inputs).await?;
            for key in chain.output_keys() {
                let value = outputs.get(&key).cloned().ok_or_else(|| {
                    AppError::Internal(format!("Step {} did not produce '{}'", index, key))
                })?;
                values.insert(key, value);
            }
        }

        Ok(self
            .output_keys
            .iter()
            .filter_map(|k| values.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }
}
