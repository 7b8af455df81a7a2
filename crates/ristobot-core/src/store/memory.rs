use super::{Hit, IndexParams, InsertResult, MetricType, SearchRequest, VectorStore};
use crate::error::{Result, RistobotError};
use crate::filter::{Condition, Filter};
use crate::schema::{CollectionSchema, Row, Value};
use async_trait::async_trait;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct CollectionState {
    schema: CollectionSchema,
    rows: Vec<Row>,
    index: Option<(String, IndexParams)>,
    loaded: bool,
    next_auto_id: i64,
}

/// Vector store kept in process memory.
///
/// Exact brute-force scoring over every row, with the same lifecycle rules as
/// the service: search needs an index on the field and a loaded collection,
/// query needs a loaded collection. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, CollectionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held by `collection`.
    pub fn row_count(&self, collection: &str) -> Result<usize> {
        let collections = self.read();
        let state = get(&collections, collection)?;
        Ok(state.rows.len())
    }

    pub fn is_loaded(&self, collection: &str) -> Result<bool> {
        let collections = self.read();
        Ok(get(&collections, collection)?.loaded)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CollectionState>> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CollectionState>> {
        self.collections.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn get<'a>(
    collections: &'a HashMap<String, CollectionState>,
    name: &str,
) -> Result<&'a CollectionState> {
    collections
        .get(name)
        .ok_or_else(|| RistobotError::CollectionNotFound(name.to_string()))
}

fn get_mut<'a>(
    collections: &'a mut HashMap<String, CollectionState>,
    name: &str,
) -> Result<&'a mut CollectionState> {
    collections
        .get_mut(name)
        .ok_or_else(|| RistobotError::CollectionNotFound(name.to_string()))
}

fn primary_key(schema: &CollectionSchema) -> Result<&str> {
    schema
        .primary_field()
        .map(|f| f.name.as_str())
        .ok_or_else(|| RistobotError::Schema("schema has no primary field".into()))
}

fn row_id(row: &Row, pk: &str) -> Result<i64> {
    row.get(pk)
        .and_then(Value::as_i64)
        .ok_or_else(|| RistobotError::Schema(format!("row has no Int64 `{}`", pk)))
}

fn not_loaded(name: &str) -> RistobotError {
    RistobotError::service(101, format!("collection `{}` is not loaded", name))
}

/// Score `b` against query `a` under `metric`. L2 is squared, as the service reports it.
fn score(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        MetricType::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
        MetricType::Ip => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        MetricType::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
    }
}

fn project(row: &Row, pk: &str, output_fields: &[String]) -> Row {
    let mut out = Row::new();
    if let Some(v) = row.get(pk) {
        out.insert(pk.to_string(), v.clone());
    }
    for field in output_fields {
        if let Some(v) = row.get(field) {
            out.insert(field.clone(), v.clone());
        }
    }
    out
}

fn check_output_fields(schema: &CollectionSchema, output_fields: &[String]) -> Result<()> {
    match output_fields.iter().find(|f| schema.field(f).is_none()) {
        Some(unknown) => Err(RistobotError::service(
            1100,
            format!("output field `{}` does not exist", unknown),
        )),
        None => Ok(()),
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.read().contains_key(name))
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<()> {
        schema.validate()?;
        let mut collections = self.write();
        if collections.contains_key(name) {
            return Err(RistobotError::CollectionExists(name.to_string()));
        }
        collections.insert(
            name.to_string(),
            CollectionState {
                schema: schema.clone(),
                rows: Vec::new(),
                index: None,
                loaded: false,
                next_auto_id: 1,
            },
        );
        log::debug!("memory: created collection {}", name);
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema> {
        let collections = self.read();
        Ok(get(&collections, name)?.schema.clone())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RistobotError::CollectionNotFound(name.to_string()))
    }

    async fn insert(&self, collection: &str, rows: Vec<Row>) -> Result<InsertResult> {
        let mut collections = self.write();
        let state = get_mut(&mut collections, collection)?;

        // Validate everything first so a bad row rejects the whole batch.
        for row in &rows {
            state.schema.validate_row(row)?;
        }

        let pk = primary_key(&state.schema)?.to_string();

        let ids: Vec<i64> = if state.schema.auto_id {
            let first = state.next_auto_id;
            state.next_auto_id += rows.len() as i64;
            (first..state.next_auto_id).collect()
        } else {
            let mut taken: HashSet<i64> = state
                .rows
                .iter()
                .filter_map(|row| row.get(&pk).and_then(Value::as_i64))
                .collect();
            let mut ids = Vec::with_capacity(rows.len());
            for row in &rows {
                let id = row_id(row, &pk)?;
                if !taken.insert(id) {
                    return Err(RistobotError::DuplicateKey {
                        field: pk.clone(),
                        key: id,
                    });
                }
                ids.push(id);
            }
            ids
        };

        for (mut row, id) in rows.into_iter().zip(&ids) {
            row.insert(pk.clone(), Value::Int(*id));
            for field in &state.schema.fields {
                if let Some(default) = &field.default_value {
                    row.entry(field.name.clone()).or_insert_with(|| default.clone());
                }
            }
            state.rows.push(row);
        }

        Ok(InsertResult {
            insert_count: ids.len(),
            ids,
        })
    }

    async fn flush(&self, collection: &str) -> Result<()> {
        let collections = self.read();
        get(&collections, collection).map(|_| ())
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        params: &IndexParams,
    ) -> Result<()> {
        let mut collections = self.write();
        let state = get_mut(&mut collections, collection)?;

        match state.schema.field(field) {
            Some(f) if f.data_type.is_vector() => {}
            Some(_) => {
                return Err(RistobotError::service(
                    1100,
                    format!("field `{}` is not a vector field", field),
                ))
            }
            None => {
                return Err(RistobotError::service(
                    1100,
                    format!("field `{}` does not exist", field),
                ))
            }
        }

        state.index = Some((field.to_string(), params.clone()));
        Ok(())
    }

    async fn load(&self, collection: &str) -> Result<()> {
        let mut collections = self.write();
        let state = get_mut(&mut collections, collection)?;
        if state.index.is_none() {
            return Err(RistobotError::service(
                700,
                format!("index not found for collection `{}`", collection),
            ));
        }
        state.loaded = true;
        Ok(())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<Hit>> {
        let collections = self.read();
        let state = get(&collections, collection)?;

        if !state.loaded {
            return Err(not_loaded(collection));
        }

        let index_metric = match &state.index {
            Some((field, params)) if *field == request.anns_field => params.metric,
            _ => {
                return Err(RistobotError::service(
                    700,
                    format!("no index on field `{}`", request.anns_field),
                ))
            }
        };
        if index_metric != request.params.metric {
            return Err(RistobotError::service(
                1100,
                format!(
                    "metric type mismatch: index uses {}, search asked for {}",
                    index_metric.as_str(),
                    request.params.metric.as_str()
                ),
            ));
        }

        let dim = state
            .schema
            .field(&request.anns_field)
            .and_then(|f| f.dim())
            .unwrap_or(0);
        if request.vector.len() != dim {
            return Err(RistobotError::DimensionMismatch {
                field: request.anns_field.clone(),
                expected: dim,
                actual: request.vector.len(),
            });
        }
        check_output_fields(&state.schema, &request.output_fields)?;

        let pk = primary_key(&state.schema)?;
        let metric = request.params.metric;

        let mut scored: Vec<(usize, f32)> = state
            .rows
            .par_iter()
            .enumerate()
            .filter_map(|(i, row)| {
                row.get(&request.anns_field)
                    .and_then(Value::as_vector)
                    .map(|v| (i, score(metric, &request.vector, v)))
            })
            .collect();

        if metric.lower_is_better() {
            scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        } else {
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        }
        scored.truncate(request.limit);

        scored
            .into_iter()
            .map(|(i, distance)| {
                let row = &state.rows[i];
                let id = row_id(row, pk)?;
                let mut fields = project(row, pk, &request.output_fields);
                if !request.output_fields.iter().any(|f| f == pk) {
                    fields.remove(pk);
                }
                Ok(Hit { id, distance, fields })
            })
            .collect()
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        output_fields: &[String],
    ) -> Result<Vec<Row>> {
        let collections = self.read();
        let state = get(&collections, collection)?;

        if !state.loaded {
            return Err(not_loaded(collection));
        }

        let conditions = filter.conditions()?;
        for condition in &conditions {
            let field = match condition {
                Condition::Eq { field, .. } | Condition::In { field, .. } => field,
            };
            if state.schema.field(field).is_none() {
                return Err(RistobotError::Filter(format!(
                    "field `{}` does not exist in `{}`",
                    field, collection
                )));
            }
        }
        check_output_fields(&state.schema, output_fields)?;

        let pk = primary_key(&state.schema)?;

        Ok(state
            .rows
            .iter()
            .filter(|row| conditions.iter().all(|c| c.matches(row)))
            .map(|row| project(row, pk, output_fields))
            .collect())
    }
}
