use anyhow::Context;
use ragchain::cli::{commands, output::Output, Cli};
use ragchain::utils::{
    config::{Config, DEFAULT_CONFIG_FILE},
    logging,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    let out = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    if let Err(e) = run(cli, &out).await {
        out.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, out: &Output) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load(DEFAULT_CONFIG_FILE).context("Failed to load configuration")?,
    };

    logging::init(&config.logging, cli.verbose)?;
    tracing::debug!(model = %config.llm.model, index = %config.pinecone.index_name, "configuration loaded");

    commands::run(cli.command, config, out).await?;
    Ok(())
}
