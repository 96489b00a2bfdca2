use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{error::AppError, storage::db::SurrealDbClient};

/// Typed derivation relations linking content-addressed artifacts.
///
/// The union of edges for a document forms a DAG layered document →
/// converted text → chunk → embedding, with every non-document node also
/// pointing back to the author node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    AuthoredBy,
    ConvertedBy(String),
    ChunkedBy(String),
    EmbeddedBy(String),
}

impl RelationKind {
    pub fn label(&self) -> String {
        match self {
            Self::AuthoredBy => "AUTHORED_BY".to_owned(),
            Self::ConvertedBy(converter) => format!("CONVERTED_BY_{converter}"),
            Self::ChunkedBy(chunker) => format!("CHUNKED_BY_{chunker}"),
            Self::EmbeddedBy(embedder) => format!("EMBEDDED_BY_{embedder}"),
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: i64,
}

/// Append-only provenance graph keyed by content identifier.
///
/// Nodes and edges are never mutated or deleted. Writes are idempotent:
/// nodes are upserts keyed by CID, and edges carry a deterministic record id
/// derived from `(source, target, label)` so duplicate writes from concurrent
/// orchestrator runs collapse into a single record.
#[derive(Clone)]
pub struct ProvenanceGraph {
    db: Arc<SurrealDbClient>,
}

impl ProvenanceGraph {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    fn edge_id(from: &str, to: &str, label: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(from.as_bytes());
        hasher.update(b"->");
        hasher.update(to.as_bytes());
        hasher.update(b":");
        hasher.update(label.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Register a content identifier as a graph node. Idempotent.
    pub async fn add_node(&self, cid: &str) -> Result<(), AppError> {
        self.db
            .query("UPSERT type::thing('artifact', $cid) SET cid = $cid")
            .bind(("cid", cid.to_owned()))
            .await?;
        Ok(())
    }

    /// Link two artifacts with a typed derivation edge. Idempotent.
    ///
    /// Self-edges are refused: content addressing collapses byte-identical
    /// artifacts into one node (a passthrough conversion of a short document
    /// can hash to the document's own CID), and a derivation edge from a node
    /// to itself would put a cycle in the DAG.
    pub async fn add_edge(
        &self,
        from: &str,
        to: &str,
        relation: &RelationKind,
    ) -> Result<(), AppError> {
        if from == to {
            return Ok(());
        }
        let label = relation.label();
        let id = Self::edge_id(from, to, &label);
        self.db
            .query(
                "UPSERT type::thing('derivation', $id)
                 SET source = $from, target = $to, label = $label",
            )
            .bind(("id", id))
            .bind(("from", from.to_owned()))
            .bind(("to", to.to_owned()))
            .bind(("label", label))
            .await?;
        Ok(())
    }

    /// Look up the target of an existing edge with the exact relation label.
    ///
    /// Used to find a prior conversion for a (document, converter) pair. A
    /// miss returns `Ok(None)` and signals recomputation, not an error.
    pub async fn find_edge_target(
        &self,
        from: &str,
        relation: &RelationKind,
    ) -> Result<Option<String>, AppError> {
        let mut response = self
            .db
            .query("SELECT VALUE target FROM derivation WHERE source = $from AND label = $label LIMIT 1")
            .bind(("from", from.to_owned()))
            .bind(("label", relation.label()))
            .await?;
        let targets: Vec<String> = response.take(0)?;
        Ok(targets.into_iter().next())
    }

    /// All outgoing `(target, label)` pairs for an artifact.
    pub async fn edges_from(&self, from: &str) -> Result<Vec<(String, String)>, AppError> {
        #[derive(Deserialize)]
        struct EdgeRow {
            target: String,
            label: String,
        }

        let mut response = self
            .db
            .query("SELECT target, label FROM derivation WHERE source = $from")
            .bind(("from", from.to_owned()))
            .await?;
        let rows: Vec<EdgeRow> = response.take(0)?;
        Ok(rows.into_iter().map(|r| (r.target, r.label)).collect())
    }

    pub async fn node_count(&self) -> Result<i64, AppError> {
        let mut response = self
            .db
            .query("SELECT count() AS total FROM artifact GROUP ALL")
            .await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.total))
    }

    pub async fn edge_count(&self) -> Result<i64, AppError> {
        let mut response = self
            .db
            .query("SELECT count() AS total FROM derivation GROUP ALL")
            .await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_graph() -> ProvenanceGraph {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.expect("init");
        ProvenanceGraph::new(Arc::new(db))
    }

    #[test]
    fn relation_labels_carry_function_names() {
        assert_eq!(RelationKind::AuthoredBy.label(), "AUTHORED_BY");
        assert_eq!(
            RelationKind::ConvertedBy("marker".into()).label(),
            "CONVERTED_BY_marker"
        );
        assert_eq!(
            RelationKind::ChunkedBy("fixed_length".into()).label(),
            "CHUNKED_BY_fixed_length"
        );
        assert_eq!(
            RelationKind::EmbeddedBy("hashed".into()).label(),
            "EMBEDDED_BY_hashed"
        );
    }

    #[tokio::test]
    async fn add_node_is_idempotent() {
        let graph = test_graph().await;

        graph.add_node("cid-a").await.expect("first add");
        graph.add_node("cid-a").await.expect("second add");

        assert_eq!(graph.node_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn add_edge_twice_leaves_cardinality_unchanged() {
        let graph = test_graph().await;
        let relation = RelationKind::ConvertedBy("plain".into());

        graph.add_node("doc").await.expect("node");
        graph.add_node("converted").await.expect("node");
        graph
            .add_edge("doc", "converted", &relation)
            .await
            .expect("first edge");
        graph
            .add_edge("doc", "converted", &relation)
            .await
            .expect("second edge");

        assert_eq!(graph.edge_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn find_edge_target_returns_exact_label_match() {
        let graph = test_graph().await;

        graph.add_node("doc").await.expect("node");
        graph.add_node("converted").await.expect("node");
        graph
            .add_edge("doc", "converted", &RelationKind::ConvertedBy("plain".into()))
            .await
            .expect("edge");

        let hit = graph
            .find_edge_target("doc", &RelationKind::ConvertedBy("plain".into()))
            .await
            .expect("query");
        assert_eq!(hit.as_deref(), Some("converted"));

        let miss = graph
            .find_edge_target("doc", &RelationKind::ConvertedBy("marker".into()))
            .await
            .expect("query");
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn self_edges_are_refused() {
        let graph = test_graph().await;

        graph.add_node("cid-a").await.expect("node");
        graph
            .add_edge("cid-a", "cid-a", &RelationKind::ConvertedBy("plain".into()))
            .await
            .expect("self edge is a no-op, not an error");

        assert_eq!(graph.edge_count().await.expect("count"), 0);
        assert!(graph.edges_from("cid-a").await.expect("edges").is_empty());
    }

    #[tokio::test]
    async fn distinct_relations_between_same_nodes_are_distinct_edges() {
        let graph = test_graph().await;

        graph.add_node("a").await.expect("node");
        graph.add_node("b").await.expect("node");
        graph
            .add_edge("a", "b", &RelationKind::ChunkedBy("fixed_length".into()))
            .await
            .expect("edge");
        graph
            .add_edge("a", "b", &RelationKind::AuthoredBy)
            .await
            .expect("edge");

        assert_eq!(graph.edge_count().await.expect("count"), 2);
        let edges = graph.edges_from("a").await.expect("edges");
        assert_eq!(edges.len(), 2);
    }
}
