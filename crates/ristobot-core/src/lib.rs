pub mod config;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod schema;
pub mod store;

pub use config::{ConnectionConfig, DEFAULT_SECTION};
pub use embedding::{EmbeddingService, FastEmbedService};
pub use error::{RistobotError, Result};
pub use filter::{Condition, Filter};
pub use pipeline::{
    BookDemo, BookDemoConfig, DemoReport, EmbedReport, SentenceEmbedConfig, SentenceEmbedDemo,
    StepTiming,
};
pub use schema::{CollectionSchema, Columns, DataType, FieldSchema, Row, Value};
pub use store::{
    Hit, IndexParams, IndexType, InsertResult, MemoryStore, MetricType, MilvusClient,
    SearchParams, SearchRequest, VectorStore,
};
