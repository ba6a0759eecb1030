//! One-shot health check of the StudySync materials collection.
//!
//! Every failure along the way ends up as a single `Error: ...` line on the
//! output sink; [`run`] itself never fails.

use crate::chroma_client::{ChromaClient, ChromaError, DEFAULT_DATABASE, DEFAULT_TENANT};
use std::error::Error as _;
use std::io::{self, Write};
use thiserror::Error;

pub const DEFAULT_CHROMA_HOST: &str = "localhost";
pub const DEFAULT_CHROMA_PORT: u16 = 8001;
pub const COLLECTION_NAME: &str = "studysync_materials";
pub const PREVIEW_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum InspectionError {
    #[error(transparent)]
    Chroma(#[from] ChromaError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub host: String,
    pub port: u16,
    pub tenant: String,
    pub database: String,
    pub collection: String,
    pub preview_chars: usize,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CHROMA_HOST.to_string(),
            port: DEFAULT_CHROMA_PORT,
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: COLLECTION_NAME.to_string(),
            preview_chars: PREVIEW_CHARS,
        }
    }
}

impl InspectorConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Runs the check and writes the report to `out`.
pub async fn run<W: Write>(config: &InspectorConfig, out: &mut W) {
    match inspect(config, out).await {
        Ok(()) => tracing::info!("Inspection of '{}' finished", config.collection),
        Err(e) => {
            tracing::warn!("Inspection of '{}' failed: {:?}", config.collection, e);
            if let Err(write_err) = writeln!(out, "Error: {}", describe(&e)) {
                tracing::error!("Could not report inspection failure: {}", write_err);
            }
        }
    }
}

async fn inspect<W: Write>(config: &InspectorConfig, out: &mut W) -> Result<(), InspectionError> {
    let client = ChromaClient::with_scope(config.base_url(), &config.tenant, &config.database);
    let heartbeat = client.heartbeat().await?;
    tracing::debug!("Connected to Chroma at {} (heartbeat {})", config.base_url(), heartbeat);

    let collection = client.get_collection(&config.collection).await?;
    writeln!(out, "Collection exists.")?;

    let count = client.count(&collection).await?;
    writeln!(out, "Number of documents: {}", count)?;

    if count > 0 {
        let results = client.peek(&collection, 1).await?;
        let document = results.first_document()?;
        writeln!(out, "Sample document: {}...", preview(document, config.preview_chars))?;
    }
    Ok(())
}

/// The error and its causes on one line, e.g. a refused connection under a
/// reqwest send error. Causes already spelled out by their parent are skipped.
fn describe(error: &InspectionError) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !description.contains(&text) {
            description.push_str(": ");
            description.push_str(&text);
        }
        source = cause.source();
    }
    description.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
