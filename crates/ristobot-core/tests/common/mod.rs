#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use ristobot_core::*;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

// --- Deterministic embedder that never downloads a model ---

/// Hashes character bigrams into buckets and L2-normalizes.
/// Equal strings map to equal vectors; different words land apart.
pub struct HashEmbedder {
    pub dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let chars: Vec<char> = format!("^{}$", text.to_lowercase()).chars().collect();
        for pair in chars.windows(2) {
            let mut h: u64 = 0xcbf29ce484222325;
            for c in pair {
                h ^= *c as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dim as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl EmbeddingService for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        "hash-bigram"
    }
}

// --- Fake Milvus v2 HTTP API backed by MemoryStore ---

#[derive(Clone)]
struct FakeState {
    store: Arc<MemoryStore>,
    token: String,
    flush_route: bool,
}

pub struct FakeMilvus {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    handle: JoinHandle<()>,
}

impl FakeMilvus {
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for FakeMilvus {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serve the fake on an ephemeral port. `flush_route = false` answers
/// `collections/flush` with a bare 404, like servers that do not expose it.
pub async fn spawn_fake_milvus(token: &str, flush_route: bool) -> FakeMilvus {
    let store = Arc::new(MemoryStore::new());
    let state = FakeState {
        store: store.clone(),
        token: token.to_string(),
        flush_route,
    };

    let app = Router::new()
        .route("/v2/vectordb/:group/:action", post(dispatch))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeMilvus {
        addr,
        store,
        handle,
    }
}

async fn dispatch(
    State(state): State<FakeState>,
    Path((group, action)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let expected = format!("Bearer {}", state.token);
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);
    if !authorized {
        return Json(json!({"code": 1800, "message": "user hasn't authenticated"})).into_response();
    }

    let route = format!("{}/{}", group, action);
    if route == "collections/flush" && !state.flush_route {
        return (StatusCode::NOT_FOUND, "404 page not found").into_response();
    }

    match handle(&state.store, &route, &body).await {
        Ok(data) => Json(json!({"code": 0, "data": data})).into_response(),
        Err(e) => {
            let code = match &e {
                RistobotError::CollectionNotFound(_) => 100,
                RistobotError::Service { code, .. } => *code,
                _ => 1100,
            };
            Json(json!({"code": code, "message": e.to_string()})).into_response()
        }
    }
}

fn str_field<'a>(body: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    body[key]
        .as_str()
        .ok_or_else(|| RistobotError::service(1100, format!("missing `{}`", key)))
}

fn decode<T: serde::de::DeserializeOwned>(value: &serde_json::Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| RistobotError::service(1100, e.to_string()))
}

async fn handle(
    store: &MemoryStore,
    route: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    match route {
        "collections/list" => Ok(json!(store.list_collections().await?)),
        "collections/has" => {
            let has = store.has_collection(str_field(body, "collectionName")?).await?;
            Ok(json!({ "has": has }))
        }
        "collections/create" => {
            let schema: CollectionSchema = decode(&body["schema"])?;
            store
                .create_collection(str_field(body, "collectionName")?, &schema)
                .await?;
            Ok(json!({}))
        }
        "collections/describe" => {
            let name = str_field(body, "collectionName")?;
            let schema = store.describe_collection(name).await?;
            Ok(describe_body(name, &schema))
        }
        "collections/drop" => {
            store.drop_collection(str_field(body, "collectionName")?).await?;
            Ok(json!({}))
        }
        "collections/flush" => {
            store.flush(str_field(body, "collectionName")?).await?;
            Ok(json!({}))
        }
        "collections/load" => {
            store.load(str_field(body, "collectionName")?).await?;
            Ok(json!({}))
        }
        "collections/get_load_state" => {
            let loaded = store.is_loaded(str_field(body, "collectionName")?)?;
            let state = if loaded { "LoadStateLoaded" } else { "LoadStateNotLoad" };
            Ok(json!({ "loadState": state }))
        }
        "indexes/create" => {
            let entry = &body["indexParams"][0];
            let params = IndexParams {
                index_type: decode(&entry["indexType"])?,
                metric: decode(&entry["metricType"])?,
                params: entry["params"].clone(),
            };
            store
                .create_index(
                    str_field(body, "collectionName")?,
                    str_field(entry, "fieldName")?,
                    &params,
                )
                .await?;
            Ok(json!({}))
        }
        "indexes/describe" => Ok(json!([{
            "indexName": str_field(body, "indexName")?,
            "indexState": "Finished",
        }])),
        "entities/insert" => {
            let rows: Vec<Row> = decode(&body["data"])?;
            let result = store
                .insert(str_field(body, "collectionName")?, rows)
                .await?;
            Ok(json!({ "insertCount": result.insert_count, "insertIds": result.ids }))
        }
        "entities/search" => {
            let collection = str_field(body, "collectionName")?;
            let request = SearchRequest {
                vector: decode(&body["data"][0])?,
                anns_field: str_field(body, "annsField")?.to_string(),
                params: SearchParams {
                    metric: decode(&body["searchParams"]["metricType"])?,
                    params: body["searchParams"]["params"].clone(),
                },
                limit: body["limit"].as_u64().unwrap_or(10) as usize,
                output_fields: decode(&body["outputFields"])?,
            };
            let pk = store
                .describe_collection(collection)
                .await?
                .primary_field()
                .map(|f| f.name.clone())
                .unwrap_or_default();
            let hits = store.search(collection, &request).await?;
            let rows: Vec<serde_json::Value> = hits
                .into_iter()
                .map(|hit| {
                    let mut row = serde_json::to_value(&hit.fields).unwrap();
                    row[pk.as_str()] = json!(hit.id);
                    row["distance"] = json!(hit.distance);
                    row
                })
                .collect();
            Ok(json!(rows))
        }
        "entities/query" => {
            let rows = store
                .query(
                    str_field(body, "collectionName")?,
                    &Filter::new(str_field(body, "filter")?),
                    &decode::<Vec<String>>(&body["outputFields"])?,
                )
                .await?;
            Ok(json!(rows))
        }
        other => Err(RistobotError::service(1100, format!("unknown route {}", other))),
    }
}

fn describe_body(name: &str, schema: &CollectionSchema) -> serde_json::Value {
    let fields: Vec<serde_json::Value> = schema
        .fields
        .iter()
        .map(|f| {
            let mut params = Vec::new();
            if let Some(dim) = f.dim() {
                params.push(json!({"key": "dim", "value": dim.to_string()}));
            }
            if let Some(max) = f.max_length() {
                params.push(json!({"key": "max_length", "value": max.to_string()}));
            }
            json!({
                "name": f.name,
                "type": format!("{:?}", f.data_type),
                "primaryKey": f.is_primary,
                "autoId": f.is_primary && schema.auto_id,
                "description": f.description.clone().unwrap_or_default(),
                "params": params,
                "defaultValue": f.default_value,
            })
        })
        .collect();

    json!({
        "collectionName": name,
        "description": schema.description.clone().unwrap_or_default(),
        "autoId": schema.auto_id,
        "enableDynamicField": schema.enable_dynamic_field,
        "fields": fields,
    })
}
