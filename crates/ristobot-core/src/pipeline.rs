//! The demo pipelines: each step is one awaited call, timed and logged.

use crate::embedding::EmbeddingService;
use crate::error::{Result, RistobotError};
use crate::filter::Filter;
use crate::schema::{CollectionSchema, Columns, FieldSchema, Row, Value};
use crate::store::{
    Hit, IndexParams, InsertResult, MetricType, SearchParams, SearchRequest, VectorStore,
};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

pub const BOOK_COLLECTION: &str = "book";
pub const EMBED_COLLECTION: &str = "ristobot";
pub const EMBEDDING_DIM: usize = 384;

pub const BOOK_ID_FIELD: &str = "book_id";
pub const WORD_COUNT_FIELD: &str = "word_count";
pub const BOOK_INTRO_FIELD: &str = "book_intro";
pub const SENTENCE_FIELD: &str = "sentence";
pub const RISTODATA_FIELD: &str = "ristodata";

/// `book_id` primary key, random `word_count`, `book_intro` embedding, source `sentence`.
pub fn book_schema(dim: usize) -> CollectionSchema {
    CollectionSchema::new(vec![
        FieldSchema::primary_int64(BOOK_ID_FIELD).with_description("customized primary id"),
        FieldSchema::int64(WORD_COUNT_FIELD).with_description("word count"),
        FieldSchema::float_vector(BOOK_INTRO_FIELD, dim),
        FieldSchema::varchar(SENTENCE_FIELD, 1000)
            .with_description("book sentence")
            .with_default(""),
    ])
    .with_description("my first book collection")
}

/// Auto-id primary key plus one embedding field.
pub fn ristobot_schema(dim: usize) -> CollectionSchema {
    CollectionSchema::new(vec![
        FieldSchema::primary_int64("id"),
        FieldSchema::float_vector(RISTODATA_FIELD, dim),
    ])
    .with_auto_id(true)
    .with_description("demo for inserting BERT vectors")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTiming {
    pub step: &'static str,
    pub elapsed: Duration,
}

async fn timed<T, F>(timings: &mut Vec<StepTiming>, step: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let out = fut.await?;
    record(timings, step, start);
    Ok(out)
}

fn record(timings: &mut Vec<StepTiming>, step: &'static str, start: Instant) {
    let elapsed = start.elapsed();
    info!("{}: succeed in {:.4} seconds", step, elapsed.as_secs_f64());
    timings.push(StepTiming { step, elapsed });
}

#[derive(Debug, Clone)]
pub struct BookDemoConfig {
    pub collection: String,
    pub sentences: Vec<String>,
    pub search_text: String,
    pub dim: usize,
    pub top_k: usize,
    /// AUTOINDEX search accuracy level.
    pub search_level: u8,
    /// Drop a collection with the same name before creating it.
    pub drop_existing: bool,
    /// Seed for the random word counts; `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for BookDemoConfig {
    fn default() -> Self {
        Self {
            collection: BOOK_COLLECTION.to_string(),
            sentences: vec!["mela".into(), "pera".into(), "banana".into()],
            search_text: "pera".to_string(),
            dim: EMBEDDING_DIM,
            top_k: 1,
            search_level: 2,
            drop_existing: false,
            seed: None,
        }
    }
}

/// What a `BookDemo` run produced.
#[derive(Debug, Clone)]
pub struct DemoReport {
    pub collection: String,
    pub insert: InsertResult,
    pub hits: Vec<Hit>,
    /// Sentence behind the best hit, looked up from the inserted ids.
    pub matched_sentence: Option<String>,
    /// Rows returned by the primary-key query on the best hit.
    pub rows: Vec<Row>,
    pub timings: Vec<StepTiming>,
}

impl DemoReport {
    pub fn timing(&self, step: &str) -> Option<Duration> {
        self.timings.iter().find(|t| t.step == step).map(|t| t.elapsed)
    }

    pub fn top_hit(&self) -> Option<&Hit> {
        self.hits.first()
    }
}

/// Create, fill, index, load, search and query the `book` collection.
pub struct BookDemo<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingService,
    config: BookDemoConfig,
}

impl<'a> BookDemo<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn EmbeddingService,
        config: BookDemoConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &BookDemoConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<DemoReport> {
        let cfg = &self.config;
        let store = self.store;
        let mut timings = Vec::new();

        if cfg.sentences.is_empty() {
            return Err(RistobotError::Embedding("no sentences to embed".into()));
        }

        info!("Using {} store, model {}", store.name(), self.embedder.model_name());

        if cfg.drop_existing && store.has_collection(&cfg.collection).await? {
            info!("Dropping existing collection {}", cfg.collection);
            timed(&mut timings, "drop", store.drop_collection(&cfg.collection)).await?;
        }

        let schema = book_schema(cfg.dim);
        info!("Creating collection {}", cfg.collection);
        timed(
            &mut timings,
            "create_collection",
            store.create_collection(&cfg.collection, &schema),
        )
        .await?;

        info!("Embedding {} sentences", cfg.sentences.len());
        let start = Instant::now();
        let vectors = self.embedder.embed_batch(&cfg.sentences)?;
        record(&mut timings, "embed", start);

        let ids: Vec<i64> = (0..cfg.sentences.len() as i64).collect();
        let id_sentence: HashMap<i64, &str> = ids
            .iter()
            .copied()
            .zip(cfg.sentences.iter().map(String::as_str))
            .collect();

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let word_counts: Vec<i64> = ids.iter().map(|_| rng.gen_range(1..=100)).collect();

        let rows = Columns::new()
            .with_column(BOOK_ID_FIELD, ids.clone())
            .with_column(WORD_COUNT_FIELD, word_counts)
            .with_column(BOOK_INTRO_FIELD, vectors)
            .with_column(SENTENCE_FIELD, cfg.sentences.clone())
            .into_rows()?;

        info!("Inserting {} entities", rows.len());
        let insert = timed(&mut timings, "insert", store.insert(&cfg.collection, rows)).await?;

        info!("Flushing");
        timed(&mut timings, "flush", store.flush(&cfg.collection)).await?;

        info!("Building AutoIndex");
        timed(
            &mut timings,
            "create_index",
            store.create_index(&cfg.collection, BOOK_INTRO_FIELD, &IndexParams::auto_l2()),
        )
        .await?;

        info!("Loading collection");
        timed(&mut timings, "load", store.load(&cfg.collection)).await?;

        info!("Searching for '{}'", cfg.search_text);
        let request = SearchRequest {
            vector: self.embedder.embed(&cfg.search_text)?,
            anns_field: BOOK_INTRO_FIELD.to_string(),
            params: SearchParams::new(MetricType::L2).with_level(cfg.search_level),
            limit: cfg.top_k,
            output_fields: Vec::new(),
        };
        let hits = timed(&mut timings, "search", store.search(&cfg.collection, &request)).await?;

        for hit in &hits {
            info!("hit id: {}, distance: {}", hit.id, hit.distance);
        }
        let matched_sentence = hits
            .first()
            .and_then(|hit| id_sentence.get(&hit.id))
            .map(|s| s.to_string());
        if let Some(sentence) = &matched_sentence {
            info!("Matched sentence: {}", sentence);
        }

        let rows = match hits.first() {
            Some(top) => {
                let output_fields: Vec<String> = [BOOK_ID_FIELD, WORD_COUNT_FIELD, SENTENCE_FIELD]
                    .iter()
                    .map(|f| f.to_string())
                    .collect();
                timed(
                    &mut timings,
                    "query",
                    store.query(
                        &cfg.collection,
                        &Filter::eq_int(BOOK_ID_FIELD, top.id),
                        &output_fields,
                    ),
                )
                .await?
            }
            None => {
                warn!("Search returned no hits; skipping query");
                Vec::new()
            }
        };

        for row in &rows {
            info!(
                "book_id: {}, word_count: {}, sentence: {}",
                field(row, BOOK_ID_FIELD),
                field(row, WORD_COUNT_FIELD),
                field(row, SENTENCE_FIELD)
            );
        }

        Ok(DemoReport {
            collection: cfg.collection.clone(),
            insert,
            hits,
            matched_sentence,
            rows,
            timings,
        })
    }
}

fn field(row: &Row, name: &str) -> String {
    row.get(name).map(Value::to_string).unwrap_or_else(|| "-".into())
}

#[derive(Debug, Clone)]
pub struct SentenceEmbedConfig {
    pub collection: String,
    pub sentences: Vec<String>,
    pub dim: usize,
}

impl Default for SentenceEmbedConfig {
    fn default() -> Self {
        Self {
            collection: EMBED_COLLECTION.to_string(),
            sentences: vec![
                "This is an example sentence".into(),
                "Each string here gets embedded".into(),
                "The embeddings can then be indexed using Milvus".into(),
            ],
            dim: EMBEDDING_DIM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbedReport {
    pub collection: String,
    pub insert: InsertResult,
    pub timings: Vec<StepTiming>,
}

/// Recreate the auto-id `ristobot` collection and insert one entity per sentence.
pub struct SentenceEmbedDemo<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingService,
    config: SentenceEmbedConfig,
}

impl<'a> SentenceEmbedDemo<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn EmbeddingService,
        config: SentenceEmbedConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub async fn run(&self) -> Result<EmbedReport> {
        let cfg = &self.config;
        let store = self.store;
        let mut timings = Vec::new();

        let schema = ristobot_schema(cfg.dim);

        if store.has_collection(&cfg.collection).await? {
            info!("Dropping existing collection {}", cfg.collection);
            timed(&mut timings, "drop", store.drop_collection(&cfg.collection)).await?;
        }

        info!("Creating collection {}", cfg.collection);
        timed(
            &mut timings,
            "create_collection",
            store.create_collection(&cfg.collection, &schema),
        )
        .await?;

        let start = Instant::now();
        let vectors = self.embedder.embed_batch(&cfg.sentences)?;
        record(&mut timings, "embed", start);

        let entities: Vec<Row> = vectors
            .into_iter()
            .map(|v| Row::from([(RISTODATA_FIELD.to_string(), Value::FloatVector(v))]))
            .collect();

        let insert = timed(&mut timings, "insert", store.insert(&cfg.collection, entities)).await?;
        info!("Inserted {} entities, ids {:?}", insert.insert_count, insert.ids);

        timed(&mut timings, "flush", store.flush(&cfg.collection)).await?;

        Ok(EmbedReport {
            collection: cfg.collection.clone(),
            insert,
            timings,
        })
    }
}
