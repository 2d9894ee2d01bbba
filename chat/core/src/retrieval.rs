//! Context Retrieval
//!
//! Finds portfolio passages relevant to the user's input before the upstream
//! call. The retriever is a boundary: the chat pipeline only needs
//! `retrieve(query) -> ordered passages`.
//!
//! The provided implementation searches a provider vector store and returns
//! the text parts of the best-scoring file, in order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::ApiClient;
use crate::error::{UpstreamFailure, UpstreamStage};

/// Default number of search results requested
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// Source of supporting context for a query
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Passages for `query`, best first; may be empty
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, UpstreamFailure>;
}

/// Retriever used when no vector store is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetrieval;

#[async_trait]
impl ContextRetriever for NoRetrieval {
    async fn retrieve(&self, _query: &str) -> Result<Vec<String>, UpstreamFailure> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    max_num_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    content: Vec<SearchContent>,
}

#[derive(Debug, Deserialize)]
struct SearchContent {
    #[serde(default)]
    text: String,
}

/// Vector store search over the provider API
#[derive(Clone, Debug)]
pub struct VectorStoreRetriever {
    client: ApiClient,
    vector_store_id: String,
    max_results: u32,
}

impl VectorStoreRetriever {
    /// Create a retriever for one vector store
    pub fn new(client: ApiClient, vector_store_id: impl Into<String>, max_results: u32) -> Self {
        Self {
            client,
            vector_store_id: vector_store_id.into(),
            max_results,
        }
    }
}

#[async_trait]
impl ContextRetriever for VectorStoreRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, UpstreamFailure> {
        let page: SearchPage = self
            .client
            .post_json(
                &format!("vector_stores/{}/search", self.vector_store_id),
                &SearchBody {
                    query,
                    max_num_results: self.max_results,
                },
                UpstreamStage::ContextRetrieval,
            )
            .await?;

        let passages: Vec<String> = page
            .data
            .into_iter()
            .next()
            .map(|hit| hit.content.into_iter().map(|c| c.text).collect())
            .unwrap_or_default();

        tracing::debug!(
            vector_store = %self.vector_store_id,
            passages = passages.len(),
            "Retrieved context"
        );
        Ok(passages)
    }
}

/// One uploaded file as listed by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Provider file id
    pub id: String,
    /// Original filename
    #[serde(default)]
    pub filename: String,
    /// Size in bytes
    #[serde(default)]
    pub bytes: u64,
}

/// One vector store as listed by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStoreSummary {
    /// Provider vector store id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

/// Uploaded knowledge resources
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceListing {
    /// Uploaded files
    pub files: Vec<FileSummary>,
    /// Vector stores
    pub vector_stores: Vec<VectorStoreSummary>,
}

#[derive(Debug, Deserialize)]
struct ListPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Lists uploaded files and vector stores (diagnostics only)
#[derive(Clone, Debug)]
pub struct ResourceCatalog {
    client: ApiClient,
}

impl ResourceCatalog {
    /// Create a catalog over the provider API
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetch both listings
    ///
    /// # Errors
    ///
    /// Returns an `UpstreamFailure` at the `ResourceListing` stage.
    pub async fn list(&self) -> Result<ResourceListing, UpstreamFailure> {
        let (files, stores) = tokio::try_join!(
            self.client
                .get_json::<ListPage<FileSummary>>("files", UpstreamStage::ResourceListing),
            self.client
                .get_json::<ListPage<VectorStoreSummary>>("vector_stores", UpstreamStage::ResourceListing),
        )?;
        Ok(ResourceListing {
            files: files.data,
            vector_stores: stores.data,
        })
    }
}
