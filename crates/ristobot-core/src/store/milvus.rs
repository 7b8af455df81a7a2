//! Client for the Milvus v2 HTTP API (`/v2/vectordb/...`).
//!
//! Every call is a `POST` with a JSON body and answers with the envelope
//! `{"code": 0, "data": ...}`; a non-zero code becomes [`RistobotError::Service`].
//! Zilliz Cloud and self-hosted Milvus both accept `Authorization: Bearer <token>`,
//! where the token is either an API key or `user:password`.

use super::{Hit, IndexParams, InsertResult, SearchRequest, VectorStore};
use crate::config::ConnectionConfig;
use crate::error::{Result, RistobotError};
use crate::filter::Filter;
use crate::schema::{CollectionSchema, DataType, ElementTypeParams, FieldSchema, Row, Value};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

const API_PREFIX: &str = "v2/vectordb";

/// Service code for a missing collection.
const CODE_COLLECTION_NOT_FOUND: i64 = 100;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HasData {
    has: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertData {
    insert_count: usize,
    #[serde(default)]
    insert_ids: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStateData {
    load_state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStateData {
    #[serde(default)]
    index_state: Option<String>,
    #[serde(default)]
    fail_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeData {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    auto_id: bool,
    #[serde(default)]
    enable_dynamic_field: bool,
    fields: Vec<DescribeField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeField {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    primary_key: bool,
    #[serde(default)]
    auto_id: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    params: Vec<KeyValue>,
    #[serde(default)]
    default_value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    value: serde_json::Value,
}

fn as_usize(value: &serde_json::Value) -> Option<usize> {
    value
        .as_u64()
        .map(|v| v as usize)
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn as_i64(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

impl DescribeData {
    fn into_schema(self) -> Result<CollectionSchema> {
        let mut auto_id = self.auto_id;
        let mut fields = Vec::with_capacity(self.fields.len());

        for f in self.fields {
            let data_type = DataType::parse(&f.data_type).ok_or_else(|| {
                RistobotError::Schema(format!(
                    "field `{}` has unsupported type {}",
                    f.name, f.data_type
                ))
            })?;
            let param = |key: &str| {
                f.params
                    .iter()
                    .find(|p| p.key == key)
                    .and_then(|p| as_usize(&p.value))
            };

            let default_value = match f.default_value {
                Some(serde_json::Value::Null) | None => None,
                Some(raw) => Some(serde_json::from_value::<Value>(raw)?),
            };

            auto_id |= f.primary_key && f.auto_id;
            fields.push(FieldSchema {
                element_type_params: ElementTypeParams {
                    dim: param("dim"),
                    max_length: param("max_length"),
                },
                name: f.name,
                data_type,
                is_primary: f.primary_key,
                description: f.description.filter(|d| !d.is_empty()),
                default_value,
            });
        }

        Ok(CollectionSchema {
            fields,
            auto_id,
            enable_dynamic_field: self.enable_dynamic_field,
            description: self.description.filter(|d| !d.is_empty()),
        })
    }
}

/// An open connection to a Milvus cluster.
///
/// Holds the authenticated HTTP client and a cache of collection schemas so
/// rows can be validated and primary keys resolved without extra round trips.
pub struct MilvusClient {
    alias: String,
    base_url: String,
    http: reqwest::Client,
    poll_interval: Duration,
    wait_timeout: Duration,
    schemas: RwLock<HashMap<String, CollectionSchema>>,
}

impl MilvusClient {
    /// Open a connection and check it with one `collections/list` call.
    pub async fn connect(alias: &str, uri: &str, token: &str) -> Result<Self> {
        Self::connect_with(alias, &ConnectionConfig::new(uri, token), None).await
    }

    /// Connect using settings read from `config.ini`.
    pub async fn connect_with(
        alias: &str,
        config: &ConnectionConfig,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = Self::new(alias, &config.uri, &config.token, timeout)?;
        client.list_collections().await?;
        log::info!("Connected to {} as `{}`", client.base_url, client.alias);
        Ok(client)
    }

    /// Build the client without touching the network.
    pub fn new(alias: &str, uri: &str, token: &str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = uri.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RistobotError::Config(format!(
                "uri must start with http:// or https://, got `{}`",
                uri
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !token.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RistobotError::Config("token contains invalid characters".into()))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            alias: alias.to_string(),
            base_url,
            http: builder.build()?,
            poll_interval: Duration::from_millis(500),
            wait_timeout: Duration::from_secs(120),
            schemas: RwLock::new(HashMap::new()),
        })
    }

    /// How often and how long `create_index` and `load` poll for completion.
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.wait_timeout = timeout;
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Close the connection. Pending requests are not affected; the client is dropped.
    pub fn disconnect(self) {
        log::info!("Disconnected `{}` from {}", self.alias, self.base_url);
    }

    async fn call(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}/{}", self.base_url, API_PREFIX, path);
        log::debug!("POST {}", url);

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(RistobotError::service(
                    i64::from(status.as_u16()),
                    format!("{} {}", status, text.trim()),
                ))
            }
        };

        if envelope.code != 0 {
            return Err(RistobotError::Service {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope.data)
    }

    async fn call_as<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let data = self.call(path, body).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn schema(&self, collection: &str) -> Result<CollectionSchema> {
        let cached = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .cloned();
        match cached {
            Some(schema) => Ok(schema),
            None => self.describe_collection(collection).await,
        }
    }

    fn cache_schema(&self, collection: &str, schema: &CollectionSchema) {
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string(), schema.clone());
    }

    fn forget_schema(&self, collection: &str) {
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(collection);
    }

    async fn wait_until<F, Fut>(&self, what: &str, mut ready: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let start = Instant::now();
        loop {
            if ready().await? {
                return Ok(());
            }
            if start.elapsed() >= self.wait_timeout {
                return Err(RistobotError::service(
                    -1,
                    format!("timed out after {:?} waiting for {}", self.wait_timeout, what),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn parse_hit(&self, pk: &str, output_fields: &[String], raw: serde_json::Value) -> Result<Hit> {
        let mut raw = match raw {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(RistobotError::service(
                    -1,
                    format!("unexpected search row: {}", other),
                ))
            }
        };

        let distance = raw
            .remove("distance")
            .and_then(|d| d.as_f64())
            .ok_or_else(|| RistobotError::service(-1, "search row without distance"))?
            as f32;

        let keep_pk = output_fields.iter().any(|f| f == pk);
        let id_value = if keep_pk {
            raw.get(pk).cloned()
        } else {
            raw.remove(pk)
        };
        let id = id_value
            .as_ref()
            .and_then(as_i64)
            .ok_or_else(|| RistobotError::service(-1, format!("search row without `{}`", pk)))?;

        let fields: Row = serde_json::from_value(serde_json::Value::Object(raw))?;
        Ok(Hit { id, distance, fields })
    }
}

#[async_trait]
impl VectorStore for MilvusClient {
    fn name(&self) -> &str {
        "milvus"
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.call_as("collections/list", json!({})).await
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let data: HasData = self
            .call_as("collections/has", json!({ "collectionName": name }))
            .await?;
        Ok(data.has)
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        schema.validate()?;
        if self.has_collection(name).await? {
            return Err(RistobotError::CollectionExists(name.to_string()));
        }

        self.call(
            "collections/create",
            json!({ "collectionName": name, "schema": schema }),
        )
        .await?;
        self.cache_schema(name, schema);
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema> {
        let data: DescribeData = match self
            .call_as("collections/describe", json!({ "collectionName": name }))
            .await
        {
            Ok(data) => data,
            Err(RistobotError::Service { code, .. }) if code == CODE_COLLECTION_NOT_FOUND => {
                return Err(RistobotError::CollectionNotFound(name.to_string()))
            }
            Err(e) => return Err(e),
        };
        let schema = data.into_schema()?;
        self.cache_schema(name, &schema);
        Ok(schema)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.call("collections/drop", json!({ "collectionName": name }))
            .await?;
        self.forget_schema(name);
        Ok(())
    }

    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<InsertResult> {
        let schema = self.schema(collection).await?;
        for row in &rows {
            schema.validate_row(row)?;
        }

        let data: InsertData = self
            .call_as(
                "entities/insert",
                json!({ "collectionName": collection, "data": rows }),
            )
            .await?;

        Ok(InsertResult {
            insert_count: data.insert_count,
            ids: data.insert_ids.iter().filter_map(as_i64).collect(),
        })
    }

    async fn flush(&self, collection: &str) -> Result<()> {
        match self
            .call("collections/flush", json!({ "collectionName": collection }))
            .await
        {
            Ok(_) => Ok(()),
            // Older servers do not route flush over HTTP; they seal segments on their own.
            Err(RistobotError::Service { code, .. })
                if code == i64::from(StatusCode::NOT_FOUND.as_u16()) =>
            {
                log::warn!("flush is not exposed by {}; relying on auto-flush", self.base_url);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        params: &IndexParams,
    ) -> Result<()> {
        self.call(
            "indexes/create",
            json!({
                "collectionName": collection,
                "indexParams": [{
                    "fieldName": field,
                    "indexName": field,
                    "metricType": params.metric.as_str(),
                    "indexType": params.index_type.as_str(),
                    "params": params.params,
                }],
            }),
        )
        .await?;

        let body = json!({ "collectionName": collection, "indexName": field });
        let body = &body;
        self.wait_until(&format!("index on {}.{}", collection, field), || async move {
            let states: Vec<IndexStateData> =
                self.call_as("indexes/describe", body.clone()).await?;
            match states.first() {
                Some(IndexStateData {
                    index_state: Some(state),
                    fail_reason,
                }) => match state.as_str() {
                    "Finished" => Ok(true),
                    "Failed" => Err(RistobotError::service(
                        -1,
                        format!(
                            "index build failed: {}",
                            fail_reason.as_deref().unwrap_or("unknown reason")
                        ),
                    )),
                    _ => Ok(false),
                },
                // No state reported: the service built the index synchronously.
                _ => Ok(true),
            }
        })
        .await
    }

    async fn load(&self, collection: &str) -> Result<()> {
        let body = json!({ "collectionName": collection });
        self.call("collections/load", body.clone()).await?;

        let body = &body;
        self.wait_until(&format!("{} to load", collection), || async move {
            let state: LoadStateData = self
                .call_as("collections/get_load_state", body.clone())
                .await?;
            Ok(state.load_state == "LoadStateLoaded")
        })
        .await
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<Hit>> {
        let schema = self.schema(collection).await?;
        let pk = schema
            .primary_field()
            .map(|f| f.name.clone())
            .ok_or_else(|| RistobotError::Schema("schema has no primary field".into()))?;

        let rows: Vec<serde_json::Value> = self
            .call_as(
                "entities/search",
                json!({
                    "collectionName": collection,
                    "data": [request.vector],
                    "annsField": request.anns_field,
                    "limit": request.limit,
                    "outputFields": request.output_fields,
                    "searchParams": {
                        "metricType": request.params.metric.as_str(),
                        "params": request.params.params,
                    },
                }),
            )
            .await?;

        rows.into_iter()
            .map(|raw| self.parse_hit(&pk, &request.output_fields, raw))
            .collect()
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[String],
    ) -> Result<Vec<Row>> {
        let rows: Vec<Row> = self
            .call_as(
                "entities/query",
                json!({
                    "collectionName": collection,
                    "filter": filter.as_str(),
                    "outputFields": output_fields,
                }),
            )
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_uri() {
        let err = MilvusClient::new("default", "grpc://localhost:19530", "t", None)
            .err()
            .unwrap();
        assert!(matches!(err, RistobotError::Config(_)));
    }

    #[test]
    fn test_trims_trailing_slash() {
        let client =
            MilvusClient::new("default", "http://localhost:19530/", "root:Milvus", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:19530");
        assert_eq!(client.alias(), "default");
    }

    #[test]
    fn test_describe_into_schema() {
        let data: DescribeData = serde_json::from_value(json!({
            "collectionName": "book",
            "description": "my first book collection",
            "autoId": false,
            "enableDynamicField": false,
            "fields": [
                {"name": "book_id", "type": "Int64", "primaryKey": true, "autoId": false},
                {"name": "word_count", "type": "Int64", "primaryKey": false},
                {"name": "book_intro", "type": "FloatVector",
                 "params": [{"key": "dim", "value": "384"}]},
                {"name": "sentence", "type": "VarChar",
                 "params": [{"key": "max_length", "value": 1000}]}
            ],
            "load": "LoadStateNotLoad"
        }))
        .unwrap();

        let schema = data.into_schema().unwrap();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.primary_field().unwrap().name, "book_id");
        assert_eq!(schema.field("book_intro").unwrap().dim(), Some(384));
        assert_eq!(schema.field("sentence").unwrap().max_length(), Some(1000));
        assert_eq!(schema.description.as_deref(), Some("my first book collection"));
    }

    #[test]
    fn test_describe_keeps_default_values() {
        let data: DescribeData = serde_json::from_value(json!({
            "fields": [
                {"name": "book_id", "type": "Int64", "primaryKey": true},
                {"name": "book_intro", "type": "FloatVector",
                 "params": [{"key": "dim", "value": "2"}]},
                {"name": "sentence", "type": "VarChar", "defaultValue": "",
                 "params": [{"key": "max_length", "value": "1000"}]}
            ]
        }))
        .unwrap();

        let schema = data.into_schema().unwrap();
        assert_eq!(schema.field("sentence").unwrap().default_value, Some(Value::from("")));
        assert_eq!(schema.field("book_id").unwrap().default_value, None);

        let mut row = Row::new();
        row.insert("book_id".into(), Value::Int(0));
        row.insert("book_intro".into(), Value::FloatVector(vec![0.1, 0.2]));
        assert!(schema.validate_row(&row).is_ok());
    }

    #[test]
    fn test_describe_field_level_auto_id() {
        let data: DescribeData = serde_json::from_value(json!({
            "fields": [
                {"name": "id", "type": "Int64", "primaryKey": true, "autoId": true},
                {"name": "ristodata", "type": "FloatVector",
                 "params": [{"key": "dim", "value": "384"}]}
            ]
        }))
        .unwrap();
        assert!(data.into_schema().unwrap().auto_id);
    }

    #[test]
    fn test_parse_hit_keeps_requested_pk() {
        let client = MilvusClient::new("default", "http://localhost:19530", "", None).unwrap();
        let raw = json!({"book_id": 1, "distance": 0.25, "sentence": "pera"});

        let hit = client.parse_hit("book_id", &[], raw.clone()).unwrap();
        assert_eq!(hit.id, 1);
        assert_eq!(hit.distance, 0.25);
        assert!(!hit.fields.contains_key("book_id"));
        assert_eq!(hit.fields["sentence"], Value::from("pera"));

        let hit = client
            .parse_hit("book_id", &["book_id".to_string()], raw)
            .unwrap();
        assert_eq!(hit.fields["book_id"], Value::Int(1));
    }

    #[test]
    fn test_string_ids() {
        assert_eq!(as_i64(&json!("449102302223")), Some(449102302223));
        assert_eq!(as_i64(&json!(7)), Some(7));
        assert_eq!(as_usize(&json!("384")), Some(384));
    }
}
