mod memory;
mod milvus;

pub use memory::MemoryStore;
pub use milvus::MilvusClient;

use crate::error::Result;
use crate::filter::Filter;
use crate::schema::{CollectionSchema, Row};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Index algorithm requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "AUTOINDEX")]
    AutoIndex,
    #[serde(rename = "FLAT")]
    Flat,
    #[serde(rename = "IVF_FLAT")]
    IvfFlat,
    #[serde(rename = "HNSW")]
    Hnsw,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::AutoIndex => "AUTOINDEX",
            IndexType::Flat => "FLAT",
            IndexType::IvfFlat => "IVF_FLAT",
            IndexType::Hnsw => "HNSW",
        }
    }
}

/// Distance metric. L2 ranks ascending, IP and COSINE rank descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    L2,
    Ip,
    Cosine,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::Ip => "IP",
            MetricType::Cosine => "COSINE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Some(MetricType::L2),
            "IP" => Some(MetricType::Ip),
            "COSINE" => Some(MetricType::Cosine),
            _ => None,
        }
    }

    /// True when a smaller score is a closer match.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, MetricType::L2)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub index_type: IndexType,
    pub metric: MetricType,
    pub params: serde_json::Value,
}

impl IndexParams {
    /// `AUTOINDEX` over L2 with no tuning parameters.
    pub fn auto_l2() -> Self {
        Self {
            index_type: IndexType::AutoIndex,
            metric: MetricType::L2,
            params: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub metric: MetricType,
    pub params: serde_json::Value,
}

impl SearchParams {
    pub fn new(metric: MetricType) -> Self {
        Self {
            metric,
            params: serde_json::json!({}),
        }
    }

    /// Set the AUTOINDEX accuracy level (1 fastest, 5 most accurate).
    pub fn with_level(mut self, level: u8) -> Self {
        self.params = serde_json::json!({ "level": level });
        self
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub anns_field: String,
    pub params: SearchParams,
    pub limit: usize,
    pub output_fields: Vec<String>,
}

/// One search candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: i64,
    pub distance: f32,
    pub fields: Row,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertResult {
    pub insert_count: usize,
    pub ids: Vec<i64>,
}

/// Operations the demo needs from a vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend label for logs.
    fn name(&self) -> &str;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    /// Fails with `CollectionExists` if `name` is already taken.
    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()>;

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// All-or-nothing bulk insert. Rows are validated before submission.
    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<InsertResult>;

    async fn flush(&self, collection: &str) -> Result<()>;

    /// Blocks until the index is built.
    async fn create_index(&self, collection: &str, field: &str, params: &IndexParams)
        -> Result<()>;

    /// Blocks until the collection is serving queries.
    async fn load(&self, collection: &str) -> Result<()>;

    /// Hits ordered best first.
    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<Hit>>;

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[String],
    ) -> Result<Vec<Row>>;
}
