use crate::error::{Result, RistobotError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Field types supported by the collection schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int64,
    Float,
    Double,
    VarChar,
    FloatVector,
}

impl DataType {
    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::FloatVector)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Bool" => Some(DataType::Bool),
            "Int64" => Some(DataType::Int64),
            "Float" => Some(DataType::Float),
            "Double" => Some(DataType::Double),
            "VarChar" => Some(DataType::VarChar),
            "FloatVector" => Some(DataType::FloatVector),
            _ => None,
        }
    }
}

/// One scalar or vector field value. Serializes to plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    FloatVector(Vec<f32>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Value::FloatVector(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::FloatVector(v) => write!(f, "<vector dim={}>", v.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::FloatVector(v)
    }
}

/// A single entity keyed by field name.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementTypeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ElementTypeParams {
    fn is_empty(&self) -> bool {
        self.dim.is_none() && self.max_length.is_none()
    }
}

/// Field definition. Serde names follow the Milvus v2 HTTP `collections/create` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    #[serde(rename = "fieldName")]
    pub name: String,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "ElementTypeParams::is_empty")]
    pub element_type_params: ElementTypeParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl FieldSchema {
    fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_primary: false,
            description: None,
            element_type_params: ElementTypeParams::default(),
            default_value: None,
        }
    }

    pub fn int64(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Int64)
    }

    pub fn primary_int64(name: impl Into<String>) -> Self {
        let mut field = Self::new(name, DataType::Int64);
        field.is_primary = true;
        field
    }

    pub fn float_vector(name: impl Into<String>, dim: usize) -> Self {
        let mut field = Self::new(name, DataType::FloatVector);
        field.element_type_params.dim = Some(dim);
        field
    }

    pub fn varchar(name: impl Into<String>, max_length: usize) -> Self {
        let mut field = Self::new(name, DataType::VarChar);
        field.element_type_params.max_length = Some(max_length);
        field
    }

    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn dim(&self) -> Option<usize> {
        self.element_type_params.dim
    }

    pub fn max_length(&self) -> Option<usize> {
        self.element_type_params.max_length
    }
}

/// Ordered field list plus collection-level flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub auto_id: bool,
    #[serde(default)]
    pub enable_dynamic_field: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CollectionSchema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            fields,
            auto_id: false,
            enable_dynamic_field: false,
            description: None,
        }
    }

    pub fn with_auto_id(mut self, auto_id: bool) -> Self {
        self.auto_id = auto_id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.is_primary)
    }

    pub fn vector_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.data_type.is_vector())
    }

    /// Structural checks that must hold before the schema is submitted.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(RistobotError::Schema("schema has no fields".into()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(RistobotError::Schema("field name must not be empty".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(RistobotError::Schema(format!(
                    "duplicate field `{}`",
                    field.name
                )));
            }
            match field.data_type {
                DataType::FloatVector if field.dim().unwrap_or(0) == 0 => {
                    return Err(RistobotError::Schema(format!(
                        "vector field `{}` needs dim > 0",
                        field.name
                    )));
                }
                DataType::VarChar if field.max_length().unwrap_or(0) == 0 => {
                    return Err(RistobotError::Schema(format!(
                        "varchar field `{}` needs max_length > 0",
                        field.name
                    )));
                }
                _ => {}
            }
        }

        let primaries: Vec<&FieldSchema> = self.fields.iter().filter(|f| f.is_primary).collect();
        match primaries.as_slice() {
            [pk] => {
                // Hits and insert results carry i64 ids.
                if pk.data_type != DataType::Int64 {
                    return Err(RistobotError::Schema(format!(
                        "primary field `{}` must be Int64",
                        pk.name
                    )));
                }
            }
            [] => return Err(RistobotError::Schema("schema has no primary field".into())),
            _ => {
                return Err(RistobotError::Schema(format!(
                    "schema has {} primary fields, expected exactly one",
                    primaries.len()
                )))
            }
        }

        if self.vector_fields().next().is_none() {
            return Err(RistobotError::Schema("schema has no vector field".into()));
        }

        Ok(())
    }

    /// Check one entity against the schema before it leaves the process.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        for field in &self.fields {
            let value = match row.get(&field.name) {
                Some(v) => v,
                None => {
                    if field.is_primary && self.auto_id {
                        continue;
                    }
                    if field.default_value.is_some() {
                        continue;
                    }
                    return Err(RistobotError::Schema(format!(
                        "missing value for field `{}`",
                        field.name
                    )));
                }
            };

            if field.is_primary && self.auto_id {
                return Err(RistobotError::Schema(format!(
                    "primary field `{}` is auto-generated and must not be supplied",
                    field.name
                )));
            }

            check_value(field, value)?;
        }

        if !self.enable_dynamic_field {
            if let Some(unknown) = row.keys().find(|k| self.field(k).is_none()) {
                return Err(RistobotError::Schema(format!("unknown field `{}`", unknown)));
            }
        }

        Ok(())
    }
}

fn check_value(field: &FieldSchema, value: &Value) -> Result<()> {
    let ok = match (field.data_type, value) {
        (DataType::Bool, Value::Bool(_)) => true,
        (DataType::Int64, Value::Int(_)) => true,
        (DataType::Float | DataType::Double, Value::Float(_) | Value::Int(_)) => true,
        (DataType::VarChar, Value::Str(s)) => {
            let max = field.max_length().unwrap_or(usize::MAX);
            if s.len() > max {
                return Err(RistobotError::Schema(format!(
                    "value for `{}` is {} bytes, max_length is {}",
                    field.name,
                    s.len(),
                    max
                )));
            }
            true
        }
        (DataType::FloatVector, Value::FloatVector(v)) => {
            let dim = field.dim().unwrap_or(0);
            if v.len() != dim {
                return Err(RistobotError::DimensionMismatch {
                    field: field.name.clone(),
                    expected: dim,
                    actual: v.len(),
                });
            }
            true
        }
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(RistobotError::Schema(format!(
            "field `{}` expects {:?}, got {}",
            field.name, field.data_type, value
        )))
    }
}

/// Column-oriented batch: one array per field, all of equal length.
#[derive(Debug, Clone, Default)]
pub struct Columns {
    columns: Vec<(String, Vec<Value>)>,
}

impl Columns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column<V, I>(mut self, name: impl Into<String>, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.columns
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Row count, taken from the first column.
    pub fn len(&self) -> usize {
        self.columns.first().map(|(_, v)| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transpose into rows. Fails if any column length differs from the first.
    pub fn into_rows(self) -> Result<Vec<Row>> {
        let expected = self.len();
        for (name, values) in &self.columns {
            if values.len() != expected {
                return Err(RistobotError::LengthMismatch {
                    field: name.clone(),
                    expected,
                    actual: values.len(),
                });
            }
        }

        let mut rows = vec![Row::new(); expected];
        for (name, values) in self.columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.insert(name.clone(), value);
            }
        }
        Ok(rows)
    }
}
