use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(DocumentMetadata, "document_metadata", {
    title: String,
    authors: String,
    categories: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    doi: String,
    document_cid: Option<String>
});

impl DocumentMetadata {
    pub fn new(
        document_id: String,
        title: String,
        authors: String,
        categories: String,
        abstract_text: String,
        doi: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: document_id,
            created_at: now,
            updated_at: now,
            title,
            authors,
            categories,
            abstract_text,
            doi,
            document_cid: None,
        }
    }

    /// Substituted when no metadata record exists for a document.
    pub fn fallback(document_id: &str) -> Self {
        Self::new(
            document_id.to_owned(),
            "Unknown Title".to_owned(),
            "Unknown Authors".to_owned(),
            "Unknown Categories".to_owned(),
            "No abstract available.".to_owned(),
            "No DOI available".to_owned(),
        )
    }

    pub async fn find_for_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Option<Self>, AppError> {
        Ok(db.get_item::<Self>(document_id).await?)
    }

    pub fn with_document_cid(mut self, cid: String) -> Self {
        self.document_cid = Some(cid);
        self
    }

    /// Write the record back, replacing any existing version.
    pub async fn upsert(self, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let id = self.id.clone();
        Ok(db.client.upsert((Self::table_name(), id)).content(self).await?)
    }
}
