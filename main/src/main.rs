use std::{path::Path, sync::Arc};

use bytes::Bytes;
use common::{
    storage::{archive::PointerArchive, db::SurrealDbClient, store::ContentStore},
    utils::config::get_config,
};
use processing_pipeline::{
    DocumentReport, FunctionRegistries, PipelineVariant, ProcessingRequest, Processor,
    VariantOutcome,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let store = ContentStore::new(&config).await?;
    let archive = PointerArchive::new(&config.archive_dir);
    let registries = FunctionRegistries::builtin(openai_client)?;

    let variants = config
        .variants
        .iter()
        .map(|spec| PipelineVariant::parse(spec))
        .collect::<Result<Vec<_>, _>>()?;

    let processor = Processor::new(db, store, archive, registries, &config.author_key).await?;

    info!(watch_dir = %config.watch_dir, "processing documents");
    let reports = process_directory(
        &processor,
        Path::new(&config.watch_dir),
        &config.user_id,
        &variants,
    )
    .await?;

    for report in &reports {
        info!(
            document_id = %report.document_id,
            document_cid = %report.document_cid,
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "document processed"
        );
        for (variant, outcome) in &report.outcomes {
            if let VariantOutcome::Failed { stage, message } = outcome {
                warn!(variant = %variant, stage = %stage, %message, "variant failed");
            }
        }
    }

    Ok(())
}

/// Process every regular file in the directory, in path order.
///
/// A document that fails entirely is logged and skipped; it never stops the
/// rest of the directory from being processed.
async fn process_directory(
    processor: &Processor,
    dir: &Path,
    user_id: &str,
    variants: &[PipelineVariant],
) -> anyhow::Result<Vec<DocumentReport>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let document_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let payload = Bytes::from(tokio::fs::read(&path).await?);

        let request = ProcessingRequest {
            document_id,
            user_id: user_id.to_owned(),
            payload,
            variants: variants.to_vec(),
        };
        match processor.process_document(request).await {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to process document");
            }
        }
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use uuid::Uuid;

    #[tokio::test]
    async fn smoke_directory_run_with_in_memory_backends() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized().await.expect("init");

        let store = ContentStore::with_backend(Arc::new(InMemory::new()));
        let archive_dir = tempfile::tempdir().expect("tempdir");
        let archive = PointerArchive::new(archive_dir.path());
        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new(),
        ));
        let registries = FunctionRegistries::builtin(openai_client).expect("registries");

        let processor = Processor::new(db, store, archive, registries, "0xabc")
            .await
            .expect("processor");

        let watch_dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(
            watch_dir.path().join("paper-1.md"),
            "# Title\n\nA short body.",
        )
        .await
        .expect("write sample");

        let variants = vec![PipelineVariant::parse("plain:fixed_length:hashed").expect("variant")];
        let reports = process_directory(&processor, watch_dir.path(), "local", &variants)
            .await
            .expect("directory run");

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].document_id, "paper-1");
        assert_eq!(reports[0].completed(), 1);
    }
}
