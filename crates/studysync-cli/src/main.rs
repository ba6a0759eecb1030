use clap::Parser;
use studysync_core::inspector::{self, InspectorConfig};
use tracing_subscriber::EnvFilter;

/// Checks that the StudySync materials collection exists in Chroma and
/// previews one of its documents.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Logs go to stderr so stdout only carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let _cli = Cli::parse();
    let config = InspectorConfig::default();
    tracing::info!("Inspecting '{}' at {}", config.collection, config.base_url());

    inspector::run(&config, &mut std::io::stdout()).await;
}
