//! Command handlers
//!
//! Each handler builds only the clients its command needs, so `template`,
//! `split` and `config` run without any credentials.

use crate::agents::{Intent, ToolRouter};
use crate::chains::{Chain, LLMChain, SimpleSequentialChain};
use crate::cli::output::Output;
use crate::cli::{vars_to_map, Commands};
use crate::db::{VectorStore, VectorStoreProvider};
use crate::llm::{LLMClient, LLMClientFactory, LLMClientFactoryTrait};
use crate::memory::ConversationMemory;
use crate::prompts::PromptTemplate;
use crate::rag::cache::cache_for_capacity;
use crate::rag::{
    CachedEmbedder, ChunkingStrategy, Embedder, OpenAIEmbedder, RetrievalPipeline, TextSplitter,
};
use crate::tools::ToolRegistry;
use crate::types::{AppError, Result};
use crate::utils::config::Config;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Steps used by `sequential` when none are given.
pub const DEFAULT_SEQUENTIAL_STEPS: [&str; 2] = [
    "Explain the concept of {concept} in a couple of sentences.",
    "Explain this to me like I'm five years old, in about 500 words:\n\n{ml_concept}",
];

const PREVIEW_CHARS: usize = 48;

pub async fn run(command: Commands, mut config: Config, out: &Output) -> Result<()> {
    match command {
        Commands::Ask {
            prompt,
            system,
            stream,
        } => ask(&config, &prompt.join(" "), system.as_deref(), stream, out).await,
        Commands::Chat { system } => chat(&config, system, out).await,
        Commands::Template { template, vars } => {
            let rendered = PromptTemplate::new(template)?.format(&vars_to_map(vars))?;
            out.result(&rendered);
            Ok(())
        }
        Commands::Chain { template, vars } => {
            let chain = LLMChain::new(llm_client(&config)?, PromptTemplate::new(template)?);
            let mut outputs = chain.call(&vars_to_map(vars)).await?;
            let text = outputs
                .remove(crate::chains::llm_chain::DEFAULT_OUTPUT_KEY)
                .unwrap_or_default();
            out.result(&text);
            Ok(())
        }
        Commands::Sequential { input, steps } => sequential(&config, &input, steps, out).await,
        Commands::Split {
            file,
            chunk_size,
            overlap,
            semantic,
        } => {
            if let Some(size) = chunk_size {
                config.splitter.chunk_size = size;
            }
            if let Some(overlap) = overlap {
                config.splitter.chunk_overlap = overlap;
            }
            config.splitter.semantic |= semantic;
            split(&config, &file, out)
        }
        Commands::Ingest {
            file,
            index,
            create,
            dimensions,
        } => {
            if let Some(dimensions) = dimensions {
                config.embeddings.dimensions = dimensions;
            }
            ingest(&config, &file, index, create, out).await
        }
        Commands::Search {
            query,
            index,
            top_k,
            threshold,
            answer,
        } => {
            search(
                &config,
                &query.join(" "),
                index,
                top_k,
                threshold,
                answer,
                out,
            )
            .await
        }
        Commands::Agent { input } => agent(&config, &input.join(" "), out).await,
        Commands::Config => {
            out.result(&config.redacted()?);
            Ok(())
        }
    }
}

fn llm_client(config: &Config) -> Result<Arc<dyn LLMClient>> {
    let client = LLMClientFactory::from_config(config)?.create_default()?;
    Ok(Arc::from(client))
}

fn embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let inner = OpenAIEmbedder::from_config(config)?;
    let cache = cache_for_capacity(config.embeddings.cache_capacity)?;
    Ok(Arc::new(CachedEmbedder::new(inner, cache)))
}

async fn vector_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store = VectorStoreProvider::pinecone(config)?.create_store().await?;
    Ok(Arc::from(store))
}

async fn pipeline(config: &Config, index: Option<String>) -> Result<RetrievalPipeline> {
    let collection = index.unwrap_or_else(|| config.pinecone.index_name.clone());
    Ok(RetrievalPipeline::new(
        TextSplitter::from_config(&config.splitter)?,
        embedder(config)?,
        vector_store(config).await?,
        collection,
    ))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        AppError::InvalidInput(format!("Cannot read {}: {}", path.display(), e))
    })
}

fn preview(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let head: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}

async fn ask(
    config: &Config,
    prompt: &str,
    system: Option<&str>,
    stream: bool,
    out: &Output,
) -> Result<()> {
    let llm = llm_client(config)?;
    if stream {
        let mut tokens = llm.stream(prompt).await?;
        while let Some(token) = tokens.next().await {
            out.fragment(&token?);
        }
        out.newline();
        return Ok(());
    }

    let reply = match system {
        Some(system) => llm.generate_with_system(system, prompt).await?,
        None => llm.generate(prompt).await?,
    };
    out.result(reply.trim());
    Ok(())
}

async fn chat(config: &Config, system: Option<String>, out: &Output) -> Result<()> {
    let llm = llm_client(config)?;
    let mut memory = match system {
        Some(system) => ConversationMemory::with_system(system),
        None => ConversationMemory::new(),
    };
    out.info(&format!(
        "Chatting with {}. Type 'exit' or 'quit' to leave.",
        llm.model_name()
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        out.prompt("you");
        let Some(line) = lines.next_line().await? else {
            out.newline();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        match memory.respond(llm.as_ref(), input).await {
            Ok(reply) => out.turn("AI", reply.trim()),
            Err(e) => out.error(&e.to_string()),
        }
    }

    tracing::debug!(turns = memory.len(), "chat finished");
    Ok(())
}

async fn sequential(
    config: &Config,
    input: &str,
    steps: Vec<String>,
    out: &Output,
) -> Result<()> {
    let templates: Vec<String> = if steps.is_empty() {
        DEFAULT_SEQUENTIAL_STEPS.iter().map(|s| s.to_string()).collect()
    } else {
        steps
    };

    let llm = llm_client(config)?;
    let chains = templates
        .into_iter()
        .map(|template| -> Result<Arc<dyn Chain>> {
            Ok(Arc::new(LLMChain::new(
                llm.clone(),
                PromptTemplate::new(template)?,
            )))
        })
        .collect::<Result<Vec<_>>>()?;
    let overall = SimpleSequentialChain::new(chains)?;

    let run = overall.run_with_trace(input).await?;
    let total = run.steps.len();
    for step in &run.steps {
        out.step(
            step.index + 1,
            total,
            &format!("{} ({} ms)", preview(&step.input), step.duration_ms),
        );
        out.result(&step.output);
    }
    Ok(())
}

fn split(config: &Config, file: &Path, out: &Output) -> Result<()> {
    let strategy = if config.splitter.semantic {
        ChunkingStrategy::Semantic
    } else {
        ChunkingStrategy::Fixed
    };
    let splitter = TextSplitter::from_config(&config.splitter)?.with_strategy(strategy);
    let text = read_text(file)?;
    let chunks = splitter.split(&text)?;

    out.header(&format!("{} chunks from {}", chunks.len(), file.display()));
    out.table_header(&["#", "Chars", "Preview"]);
    for (i, chunk) in chunks.iter().enumerate() {
        let index = i.to_string();
        let chars = chunk.chars().count().to_string();
        out.table_row(&[index.as_str(), chars.as_str(), preview(chunk).as_str()]);
    }
    Ok(())
}

async fn ingest(
    config: &Config,
    file: &Path,
    index: Option<String>,
    create: bool,
    out: &Output,
) -> Result<()> {
    let text = read_text(file)?;
    let pipeline = pipeline(config, index).await?;

    if create {
        if pipeline.ensure_collection().await? {
            out.success(&format!("Created index '{}'", pipeline.collection()));
        } else {
            out.info(&format!("Index '{}' already exists", pipeline.collection()));
        }
    } else if !pipeline.store().collection_exists(pipeline.collection()).await? {
        return Err(AppError::NotFound(format!(
            "Index '{}' does not exist (pass --create to create it)",
            pipeline.collection()
        )));
    }

    let source = file.display().to_string();
    let report = pipeline.ingest(&text, &source).await?;
    out.kv("chunks", &report.chunks.to_string());
    out.kv("upserted", &report.upserted.to_string());
    out.complete(&format!(
        "Ingested {} into '{}'",
        source,
        pipeline.collection()
    ));
    Ok(())
}

async fn search(
    config: &Config,
    query: &str,
    index: Option<String>,
    top_k: usize,
    threshold: f32,
    answer: bool,
    out: &Output,
) -> Result<()> {
    let pipeline = pipeline(config, index).await?.with_min_score(threshold);

    let hits = if answer {
        let llm = llm_client(config)?;
        let answer = pipeline.answer(llm.as_ref(), query, top_k).await?;
        out.result(&answer.answer);
        answer.sources
    } else {
        pipeline.similarity_search(query, top_k, threshold).await?
    };

    if hits.is_empty() {
        out.warning("No passages matched the query");
    }
    for (rank, hit) in hits.iter().enumerate() {
        out.search_hit(rank + 1, hit);
    }
    Ok(())
}

async fn agent(config: &Config, input: &str, out: &Output) -> Result<()> {
    let registry = Arc::new(ToolRegistry::with_default_tools(&config.tools));
    let router = ToolRouter::new(
        llm_client(config)?,
        registry,
        config.tools.trigger_keywords.clone(),
    );

    let outcome = router.route(input).await?;
    if outcome.intent == Intent::Compute {
        if let Some(code) = &outcome.code {
            out.subheader("Generated code");
            for line in code.lines() {
                out.list_item(line);
            }
            out.newline();
        }
        let succeeded = outcome
            .tool_output
            .as_ref()
            .and_then(|v| v["success"].as_bool())
            .unwrap_or(false);
        if !succeeded {
            out.warning("Generated code exited with an error");
        }
    }
    out.result(&outcome.response);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n b\tc"), "a b c");
        let long = "x".repeat(100);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_default_steps_have_one_variable_each() {
        for step in DEFAULT_SEQUENTIAL_STEPS {
            let template = PromptTemplate::new(step).unwrap();
            assert_eq!(template.input_variables().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_template_and_split_need_no_credentials() {
        let out = Output::no_color();
        let config = Config::default();

        run(
            Commands::Template {
                template: "Explain {concept}".into(),
                vars: vec![("concept".into(), "autoencoder".into())],
            },
            config.clone(),
            &out,
        )
        .await
        .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", "word ".repeat(60)).unwrap();
        run(
            Commands::Split {
                file: file.path().to_path_buf(),
                chunk_size: Some(50),
                overlap: Some(5),
                semantic: false,
            },
            config,
            &out,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_template_missing_variable_fails() {
        let err = run(
            Commands::Template {
                template: "Explain {concept}".into(),
                vars: vec![],
            },
            Config::default(),
            &Output::no_color(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("concept"));
    }

    #[tokio::test]
    async fn test_model_commands_require_api_key() {
        let err = run(
            Commands::Ask {
                prompt: vec!["hi".into()],
                system: None,
                stream: false,
            },
            Config::default(),
            &Output::no_color(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_split_missing_file() {
        let err = run(
            Commands::Split {
                file: "/definitely/not/here.txt".into(),
                chunk_size: None,
                overlap: None,
                semantic: false,
            },
            Config::default(),
            &Output::no_color(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
