//! Prompt templates
//!
//! ```ignore
//! use ragchain::prompts::PromptTemplate;
//!
//! let template = PromptTemplate::new("Explain the concept of {concept} in a couple of lines")?;
//! let prompt = template.format_single("autoencoder")?;
//! ```

pub mod template;

pub use template::{ChatPromptTemplate, PromptTemplate};
