//! CLI module for ragchain
//!
//! Provides command-line interface parsing and handling for the ragchain binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

/// ragchain - prompts, chains, retrieval and tool routing
///
/// Walks an OpenAI-compatible model and a Pinecone index through templates,
/// chains, chunking, similarity search and generated-code execution.
#[derive(Parser, Debug)]
#[command(
    name = "ragchain",
    version,
    about = "Prompt templates, chains, retrieval and tool routing from the command line",
    long_about = "Prompt templates, chains, retrieval and tool routing from the command line.\n\n\
                  Credentials are read from the environment or .env:\n  \
                  OPENAI_API_KEY, PINECONE_API_KEY, PINECONE_ENV",
    after_help = "EXAMPLES:\n    \
                  ragchain ask \"What is an autoencoder?\"\n    \
                  ragchain template \"Explain {concept}\" --var concept=autoencoder\n    \
                  ragchain sequential autoencoder\n    \
                  ragchain ingest notes.txt --create\n    \
                  ragchain search \"What is an autoencoder?\" --answer\n    \
                  ragchain agent \"Calculate the 10th Fibonacci number\""
)]
pub struct Cli {
    /// Path to the configuration file (defaults to ./ragchain.toml when present)
    #[arg(short, long, global = true, env = "RAGCHAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single prompt to the model
    Ask {
        /// Prompt text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// System message sent before the prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Print tokens as they arrive
        #[arg(long, conflicts_with = "system")]
        stream: bool,
    },

    /// Interactive chat that keeps the conversation history
    ///
    /// Type `exit` or `quit` to leave.
    Chat {
        /// System message for the whole conversation
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Render a prompt template without calling the model
    Template {
        /// Template text with `{variable}` placeholders
        template: String,

        /// Variable assignment, repeatable
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },

    /// Render a template and send it to the model
    Chain {
        /// Template text with `{variable}` placeholders
        template: String,

        /// Variable assignment, repeatable
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },

    /// Feed the input through single-variable templates, one after another
    Sequential {
        /// Input to the first step
        input: String,

        /// Step template with exactly one variable, repeatable
        #[arg(long = "step", value_name = "TEMPLATE")]
        steps: Vec<String>,
    },

    /// Split a text file into chunks
    Split {
        /// File to split
        file: PathBuf,

        /// Maximum chunk length in characters
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks
        #[arg(long)]
        overlap: Option<usize>,

        /// Prefer sentence and paragraph boundaries
        #[arg(long)]
        semantic: bool,
    },

    /// Split, embed and upsert a text file into the Pinecone index
    Ingest {
        /// File to ingest
        file: PathBuf,

        /// Index name (defaults to pinecone.index_name)
        #[arg(long)]
        index: Option<String>,

        /// Create the index if it does not exist
        #[arg(long)]
        create: bool,

        /// Vector size for a new index (defaults to embeddings.dimensions)
        #[arg(long, requires = "create")]
        dimensions: Option<usize>,
    },

    /// Similarity search over the Pinecone index
    Search {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Index name (defaults to pinecone.index_name)
        #[arg(long)]
        index: Option<String>,

        /// Number of passages to return
        #[arg(short = 'k', long, default_value_t = 4)]
        top_k: usize,

        /// Minimum similarity score
        #[arg(long, default_value_t = 0.0)]
        threshold: f32,

        /// Answer the query from the retrieved passages
        #[arg(long)]
        answer: bool,
    },

    /// Route the input to generated Python or a plain model answer
    Agent {
        /// Request text
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
    },

    /// Show the effective configuration with credentials masked
    Config,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parse `key=value`; the value may itself contain `=`.
pub fn parse_var(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Collect `--var` pairs; later assignments win.
pub fn vars_to_map(vars: Vec<(String, String)>) -> HashMap<String, String> {
    vars.into_iter().collect()
}
