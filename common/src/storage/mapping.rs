use std::sync::Arc;

use crate::{error::AppError, storage::db::SurrealDbClient};

/// Scope of a completion lookup.
///
/// The global scope records that anyone has fully processed a
/// (document, variant) pair; the per-user scope records completion for one
/// requesting identity, which may have been satisfied by another user's
/// earlier request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionScope {
    Global,
    User(String),
}

impl CompletionScope {
    fn record_key(&self, document_cid: &str) -> String {
        match self {
            Self::Global => format!("global__{document_cid}"),
            Self::User(user_id) => format!("user__{user_id}__{document_cid}"),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Global => "global".to_owned(),
            Self::User(user_id) => format!("user:{user_id}"),
        }
    }
}

/// Two-tier completion ledger over SurrealDB.
///
/// Each (scope, document CID) pair maps to a monotonic set of pipeline
/// variant canonical strings. Updates are a single `UPSERT` with
/// `array::union` per scope record, so concurrent markers for the same
/// document cannot lose each other's writes. The global and per-user writes
/// are two separate statements, in that order, and are not transactional.
#[derive(Clone)]
pub struct MappingIndex {
    db: Arc<SurrealDbClient>,
}

impl MappingIndex {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    /// Whether the (document, variant) pair is already fully processed in
    /// the given scope. An absent record reads as an empty set.
    pub async fn is_complete(
        &self,
        scope: &CompletionScope,
        document_cid: &str,
        variant: &str,
    ) -> Result<bool, AppError> {
        let variants = self.variants(scope, document_cid).await?;
        Ok(variants.iter().any(|v| v == variant))
    }

    /// Record completion in the global scope and then the requester's scope.
    pub async fn mark_complete(
        &self,
        document_cid: &str,
        variant: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        self.mark_scope(&CompletionScope::Global, document_cid, variant)
            .await?;
        self.mark_scope(
            &CompletionScope::User(user_id.to_owned()),
            document_cid,
            variant,
        )
        .await?;
        Ok(())
    }

    /// The variant set recorded for a document in one scope.
    pub async fn variants(
        &self,
        scope: &CompletionScope,
        document_cid: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut response = self
            .db
            .query("SELECT VALUE variants FROM type::thing('variant_completion', $key)")
            .bind(("key", scope.record_key(document_cid)))
            .await?;
        let sets: Vec<Vec<String>> = response.take(0)?;
        Ok(sets.into_iter().next().unwrap_or_default())
    }

    async fn mark_scope(
        &self,
        scope: &CompletionScope,
        document_cid: &str,
        variant: &str,
    ) -> Result<(), AppError> {
        self.db
            .query(
                "UPSERT type::thing('variant_completion', $key)
                 SET document_cid = $cid,
                     scope = $scope,
                     variants = array::union(variants ?? [], [$variant])",
            )
            .bind(("key", scope.record_key(document_cid)))
            .bind(("cid", document_cid.to_owned()))
            .bind(("scope", scope.name()))
            .bind(("variant", variant.to_owned()))
            .await?;
        Ok(())
    }
}
