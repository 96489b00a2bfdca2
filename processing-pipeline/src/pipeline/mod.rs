mod context;
mod stages;
mod state;
mod variant;


pub use variant::{DocumentReport, PipelineVariant, VariantOutcome};

use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        archive::PointerArchive,
        db::SurrealDbClient,
        graph::{ProvenanceGraph, RelationKind},
        mapping::{CompletionScope, MappingIndex},
        store::ContentStore,
        types::document_metadata::DocumentMetadata,
    },
};
use tracing::{info, instrument, warn};

use crate::functions::{DocumentInput, FunctionRegistries};

use self::{
    context::RunContext,
    stages::{record_pointer, VariantContext},
};

/// One document submitted for processing under a set of pipeline variants.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub document_id: String,
    pub user_id: String,
    pub payload: Bytes,
    pub variants: Vec<PipelineVariant>,
}

/// Drives documents through convert, chunk and embed variants, persisting
/// every artifact content-addressed and recording provenance and completion.
pub struct Processor {
    db: Arc<SurrealDbClient>,
    store: ContentStore,
    graph: ProvenanceGraph,
    mappings: MappingIndex,
    archive: PointerArchive,
    registries: FunctionRegistries,
    author_cid: String,
}

impl Processor {
    /// Uploads the author key and registers its graph node so every later
    /// artifact can link back to it.
    pub async fn new(
        db: Arc<SurrealDbClient>,
        store: ContentStore,
        archive: PointerArchive,
        registries: FunctionRegistries,
        author_key: &str,
    ) -> Result<Self, AppError> {
        let graph = ProvenanceGraph::new(Arc::clone(&db));
        let mappings = MappingIndex::new(Arc::clone(&db));

        let author_cid = store
            .put(Bytes::copy_from_slice(author_key.as_bytes()))
            .await?;
        record_pointer(&archive, &author_cid).await;
        graph.add_node(&author_cid).await?;
        info!(%author_cid, "author identity registered");

        Ok(Self {
            db,
            store,
            graph,
            mappings,
            archive,
            registries,
            author_cid,
        })
    }

    pub fn author_cid(&self) -> &str {
        &self.author_cid
    }

    pub fn graph(&self) -> &ProvenanceGraph {
        &self.graph
    }

    pub fn mappings(&self) -> &MappingIndex {
        &self.mappings
    }

    /// Process one document through every requested variant.
    ///
    /// The document upload itself must succeed or the whole call fails with
    /// no side effects beyond metadata lookup. After that point each variant
    /// runs independently; a failing variant is reported in the outcome list
    /// and never prevents later variants from running.
    #[instrument(skip_all, fields(document_id = %request.document_id, user_id = %request.user_id))]
    pub async fn process_document(
        &self,
        request: ProcessingRequest,
    ) -> Result<DocumentReport, AppError> {
        let metadata = match DocumentMetadata::find_for_document(&self.db, &request.document_id)
            .await?
        {
            Some(metadata) => metadata,
            None => {
                warn!("no metadata found, using fallback values");
                DocumentMetadata::fallback(&request.document_id)
            }
        };
        info!(title = %metadata.title, "processing document");

        let document_cid = self.store.put(request.payload.clone()).await?;
        record_pointer(&self.archive, &document_cid).await;
        self.graph.add_node(&document_cid).await?;
        self.graph
            .add_edge(&document_cid, &self.author_cid, &RelationKind::AuthoredBy)
            .await?;
        metadata
            .with_document_cid(document_cid.clone())
            .upsert(&self.db)
            .await?;

        let input = DocumentInput::new(request.document_id.clone(), request.payload.clone());
        let mut cache = RunContext::new();
        let mut outcomes = Vec::with_capacity(request.variants.len());

        for variant in &request.variants {
            let outcome = self
                .run_variant(&mut cache, &input, &document_cid, variant, &request.user_id)
                .await;
            outcomes.push((variant.clone(), outcome));
        }

        let report = DocumentReport {
            document_id: request.document_id,
            document_cid,
            outcomes,
        };
        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "document processing finished"
        );
        Ok(report)
    }

    async fn run_variant(
        &self,
        cache: &mut RunContext,
        input: &DocumentInput,
        document_cid: &str,
        variant: &PipelineVariant,
        user_id: &str,
    ) -> VariantOutcome {
        let canonical = variant.canonical();

        match self
            .mappings
            .is_complete(&CompletionScope::Global, document_cid, &canonical)
            .await
        {
            Ok(true) => {
                // Already computed somewhere: only record completion for
                // this requester, touch no artifacts.
                if let Err(err) = self
                    .mappings
                    .mark_complete(document_cid, &canonical, user_id)
                    .await
                {
                    warn!(variant = %canonical, error = %err, "failed to record skipped completion");
                    return failed("dedup", &err);
                }
                info!(variant = %canonical, "variant already processed globally, skipping");
                return VariantOutcome::SkippedComplete;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(variant = %canonical, error = %err, "completion lookup failed");
                return failed("dedup", &err);
            }
        }

        let mut ctx = VariantContext {
            store: &self.store,
            graph: &self.graph,
            archive: &self.archive,
            registries: &self.registries,
            cache,
            input,
            document_cid,
            author_cid: &self.author_cid,
            variant,
            converted: None,
            chunks: Vec::new(),
            reused_conversion: false,
            chunk_count: 0,
        };

        let machine = state::ready();
        let machine = match stages::convert(machine, &mut ctx).await {
            Ok(machine) => machine,
            Err(err) => {
                warn!(variant = %canonical, error = %err, "conversion stage failed");
                return failed("convert", &err);
            }
        };
        let machine = match stages::chunk(machine, &mut ctx).await {
            Ok(machine) => machine,
            Err(err) => {
                warn!(variant = %canonical, error = %err, "chunking stage failed");
                return failed("chunk", &err);
            }
        };
        if let Err(err) = stages::persist_chunks(machine, &mut ctx).await {
            warn!(variant = %canonical, error = %err, "persistence stage failed");
            return failed("persist", &err);
        }

        let chunk_count = ctx.chunk_count;
        let reused_conversion = ctx.reused_conversion;
        drop(ctx);

        if let Err(err) = self
            .mappings
            .mark_complete(document_cid, &canonical, user_id)
            .await
        {
            warn!(variant = %canonical, error = %err, "failed to record completion");
            return failed("mark_complete", &err);
        }

        info!(
            variant = %canonical,
            chunk_count,
            reused_conversion,
            "variant completed"
        );
        VariantOutcome::Completed {
            chunk_count,
            reused_conversion,
        }
    }
}

fn failed(stage: &str, err: &AppError) -> VariantOutcome {
    VariantOutcome::Failed {
        stage: stage.to_owned(),
        message: err.to_string(),
    }
}
