use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        archive::PointerArchive,
        graph::{ProvenanceGraph, RelationKind},
        store::ContentStore,
    },
};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use crate::functions::{DocumentInput, FunctionRegistries};

use super::{
    context::{ConvertedArtifact, RunContext},
    state::{Chunked, Converted, Persisted, Ready, VariantMachine},
    variant::PipelineVariant,
};

/// Everything one variant run needs, borrowed from the processor plus the
/// run-scoped caches and the artifacts resolved so far.
pub(crate) struct VariantContext<'a> {
    pub store: &'a ContentStore,
    pub graph: &'a ProvenanceGraph,
    pub archive: &'a PointerArchive,
    pub registries: &'a FunctionRegistries,
    pub cache: &'a mut RunContext,
    pub input: &'a DocumentInput,
    pub document_cid: &'a str,
    pub author_cid: &'a str,
    pub variant: &'a PipelineVariant,
    pub converted: Option<ConvertedArtifact>,
    pub chunks: Vec<String>,
    pub reused_conversion: bool,
    pub chunk_count: usize,
}

impl VariantContext<'_> {
    fn converted(&self) -> Result<&ConvertedArtifact, AppError> {
        self.converted.as_ref().ok_or_else(|| {
            AppError::InternalError("converted text expected to be available".into())
        })
    }
}

/// Resolve the converted-text artifact for the variant's converter.
///
/// Resolution order: per-run cache, then an existing conversion in the
/// provenance graph (content fetched back from the store), then a fresh
/// conversion. Only a fresh conversion uploads and links a new artifact.
#[instrument(
    level = "trace",
    skip_all,
    fields(document_cid = %ctx.document_cid, variant = %ctx.variant)
)]
pub(crate) async fn convert(
    machine: VariantMachine<(), Ready>,
    ctx: &mut VariantContext<'_>,
) -> Result<VariantMachine<(), Converted>, AppError> {
    let converter_name = ctx.variant.converter.clone();
    let converter = ctx.registries.converters.get(&converter_name)?;

    if let Some(cached) = ctx.cache.cached_conversion(&converter_name) {
        debug!(converter = %converter_name, "using run-cached conversion");
        ctx.converted = Some(cached.clone());
        ctx.reused_conversion = true;
        return machine
            .convert()
            .map_err(|(_, guard)| map_guard_error("convert", &guard));
    }

    let relation = RelationKind::ConvertedBy(converter_name.clone());
    let mut resolved: Option<ConvertedArtifact> = None;

    if let Some(existing_cid) = ctx.graph.find_edge_target(ctx.document_cid, &relation).await? {
        match ctx.store.fetch(&existing_cid).await? {
            Some(bytes) => {
                info!(cid = %existing_cid, converter = %converter_name, "reusing existing conversion");
                resolved = Some(ConvertedArtifact {
                    cid: existing_cid,
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            None => {
                warn!(
                    cid = %existing_cid,
                    "existing conversion content not retrievable, performing new conversion"
                );
            }
        }
    }

    let (artifact, reused) = match resolved {
        Some(artifact) => (artifact, true),
        None => {
            let text = converter.convert(ctx.input).await?;
            let cid = ctx.store.put(Bytes::from(text.clone().into_bytes())).await?;
            record_pointer(ctx.archive, &cid).await;
            ctx.graph.add_node(&cid).await?;
            ctx.graph.add_edge(ctx.document_cid, &cid, &relation).await?;
            ctx.graph
                .add_edge(&cid, ctx.author_cid, &RelationKind::AuthoredBy)
                .await?;
            (ConvertedArtifact { cid, text }, false)
        }
    };

    ctx.reused_conversion = reused;
    ctx.cache.cache_conversion(&converter_name, artifact.clone());
    ctx.converted = Some(artifact);

    machine
        .convert()
        .map_err(|(_, guard)| map_guard_error("convert", &guard))
}

/// Split the converted text into ordered chunks, consulting the per-run
/// chunk cache keyed by (converter, chunker).
#[instrument(
    level = "trace",
    skip_all,
    fields(document_cid = %ctx.document_cid, variant = %ctx.variant)
)]
pub(crate) async fn chunk(
    machine: VariantMachine<(), Converted>,
    ctx: &mut VariantContext<'_>,
) -> Result<VariantMachine<(), Chunked>, AppError> {
    let converter_name = ctx.variant.converter.clone();
    let chunker_name = ctx.variant.chunker.clone();

    let chunks = match ctx.cache.cached_chunks(&converter_name, &chunker_name) {
        Some(chunks) => {
            debug!(chunker = %chunker_name, "using run-cached chunks");
            chunks.clone()
        }
        None => {
            let chunker = ctx.registries.chunkers.get(&chunker_name)?;
            let chunks = chunker.chunk(&ctx.converted()?.text);
            ctx.cache
                .cache_chunks(&converter_name, &chunker_name, chunks.clone());
            chunks
        }
    };

    debug!(chunk_count = chunks.len(), "chunking completed");
    ctx.chunks = chunks;

    machine
        .chunk()
        .map_err(|(_, guard)| map_guard_error("chunk", &guard))
}

/// Upload and link every chunk in order, then embed the batch and upload and
/// link every serialized embedding, preserving chunk order.
#[instrument(
    level = "trace",
    skip_all,
    fields(document_cid = %ctx.document_cid, variant = %ctx.variant)
)]
pub(crate) async fn persist_chunks(
    machine: VariantMachine<(), Chunked>,
    ctx: &mut VariantContext<'_>,
) -> Result<VariantMachine<(), Persisted>, AppError> {
    let converted_cid = ctx.converted()?.cid.clone();
    let chunked_by = RelationKind::ChunkedBy(ctx.variant.chunker.clone());
    let embedded_by = RelationKind::EmbeddedBy(ctx.variant.embedder.clone());
    let embedder = ctx.registries.embedders.get(&ctx.variant.embedder)?;

    let mut chunk_cids = Vec::with_capacity(ctx.chunks.len());
    for chunk_text in &ctx.chunks {
        let cid = ctx
            .store
            .put(Bytes::from(chunk_text.clone().into_bytes()))
            .await?;
        record_pointer(ctx.archive, &cid).await;
        ctx.graph.add_node(&cid).await?;
        ctx.graph.add_edge(&converted_cid, &cid, &chunked_by).await?;
        ctx.graph
            .add_edge(&cid, ctx.author_cid, &RelationKind::AuthoredBy)
            .await?;
        chunk_cids.push(cid);
    }

    let embeddings = embedder.embed_batch(ctx.chunks.clone()).await?;
    if embeddings.len() != chunk_cids.len() {
        return Err(AppError::Processing(format!(
            "embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunk_cids.len()
        )));
    }

    for (chunk_cid, embedding) in chunk_cids.iter().zip(embeddings) {
        if embedding.len() != embedder.dimension() {
            return Err(AppError::Processing(format!(
                "embedder produced a {}-dimensional vector, expected {}",
                embedding.len(),
                embedder.dimension()
            )));
        }
        let payload = serde_json::to_vec(&embedding)?;
        let embedding_cid = ctx.store.put(Bytes::from(payload)).await?;
        record_pointer(ctx.archive, &embedding_cid).await;
        ctx.graph.add_node(&embedding_cid).await?;
        ctx.graph
            .add_edge(chunk_cid, &embedding_cid, &embedded_by)
            .await?;
        ctx.graph
            .add_edge(&embedding_cid, ctx.author_cid, &RelationKind::AuthoredBy)
            .await?;
    }

    ctx.chunk_count = chunk_cids.len();

    machine
        .persist()
        .map_err(|(_, guard)| map_guard_error("persist", &guard))
}

/// Write the CID pointer file; archival is best-effort and never fails the
/// pipeline.
pub(crate) async fn record_pointer(archive: &PointerArchive, cid: &str) {
    if let Err(err) = archive.record(cid).await {
        warn!(%cid, error = %err, "failed to archive CID pointer");
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid variant pipeline transition during {event}: {guard:?}"
    ))
}
