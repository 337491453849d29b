//! Firestore REST API types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    pub name: Option<String>,
    pub fields: Option<HashMap<String, Value>>,
    pub create_time: Option<String>,
    /// Server write time, used as the optimistic-concurrency token
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Last path segment of the resource name.
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref()?.rsplit('/').next()
    }
}

// ============================================================================
// Batch writes
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,

    /// Full document name to delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

impl Write {
    pub fn delete(name: impl Into<String>) -> Self {
        Self {
            delete: Some(name.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteRequest {
    pub writes: Vec<Write>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub update_time: Option<String>,
}

/// gRPC-style status of a single write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// 0 = OK
    pub code: Option<i32>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteResponse {
    pub write_results: Option<Vec<WriteResult>>,
    pub status: Option<Vec<Status>>,
}

impl BatchWriteResponse {
    pub fn empty() -> Self {
        Self {
            write_results: Some(vec![]),
            status: Some(vec![]),
        }
    }

    /// Batch writes are not atomic: surface the first failed write.
    pub fn check_for_errors(&self) -> crate::error::FirestoreResult<()> {
        let failed = self
            .status
            .iter()
            .flatten()
            .enumerate()
            .find(|(_, s)| s.code.is_some_and(|c| c != 0));

        if let Some((i, status)) = failed {
            return Err(crate::error::FirestoreError::request_failed(format!(
                "Batch write failed at index {}: {} (code {})",
                i,
                status.message.as_deref().unwrap_or("Unknown error"),
                status.code.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Structured queries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

impl FieldReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            field_path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    pub field: FieldReference,
    /// `EQUAL`, `LESS_THAN`, ...
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFilter {
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_filter: Option<FieldFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_filter: Option<CompositeFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub field: FieldReference,
    /// `ASCENDING` or `DESCENDING`
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub fields: Vec<FieldReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub values: Vec<Value>,
    pub before: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub order_by: Vec<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Projection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

impl StructuredQuery {
    /// Query over a single collection.
    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            from: vec![CollectionSelector {
                collection_id: collection_id.into(),
            }],
            filter: None,
            order_by: Vec::new(),
            select: None,
            start_at: None,
            limit: None,
        }
    }

    /// Add a field filter; multiple calls are AND-ed.
    pub fn where_field(mut self, path: &str, op: &str, value: Value) -> Self {
        let filter = Filter {
            field_filter: Some(FieldFilter {
                field: FieldReference::new(path),
                op: op.to_string(),
                value,
            }),
            composite_filter: None,
        };
        self.filter = Some(match self.filter.take() {
            None => filter,
            Some(Filter {
                composite_filter: Some(mut composite),
                ..
            }) => {
                composite.filters.push(filter);
                Filter {
                    field_filter: None,
                    composite_filter: Some(composite),
                }
            }
            Some(existing) => Filter {
                field_filter: None,
                composite_filter: Some(CompositeFilter {
                    op: "AND".to_string(),
                    filters: vec![existing, filter],
                }),
            },
        });
        self
    }

    pub fn order_by(mut self, path: &str, descending: bool) -> Self {
        self.order_by.push(Order {
            field: FieldReference::new(path),
            direction: if descending { "DESCENDING" } else { "ASCENDING" }.to_string(),
        });
        self
    }

    /// Only return the given fields (empty = document names only).
    pub fn select(mut self, paths: &[&str]) -> Self {
        self.select = Some(Projection {
            fields: paths.iter().map(|p| FieldReference::new(*p)).collect(),
        });
        self
    }

    /// Resume strictly after the given order-by values.
    pub fn start_after(mut self, values: Vec<Value>) -> Self {
        self.start_at = Some(Cursor {
            values,
            before: false,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit.min(i32::MAX as u32) as i32);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

/// One element of the `runQuery` response array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    pub document: Option<Document>,
    pub read_time: Option<String>,
}

// ============================================================================
// Aggregation queries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub alias: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sum: Option<SumAggregation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumAggregation {
    pub field: FieldReference,
}

impl Aggregation {
    pub fn count(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            count: Some(serde_json::json!({})),
            sum: None,
        }
    }

    pub fn sum(alias: impl Into<String>, field: &str) -> Self {
        Self {
            alias: alias.into(),
            count: None,
            sum: Some(SumAggregation {
                field: FieldReference::new(field),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAggregationQuery {
    pub structured_query: StructuredQuery,
    pub aggregations: Vec<Aggregation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAggregationQueryRequest {
    pub structured_aggregation_query: StructuredAggregationQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub aggregate_fields: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAggregationQueryResponse {
    pub result: Option<AggregationResult>,
}

// ============================================================================
// Value conversion
// ============================================================================

/// Convert a Rust value to Firestore Value.
pub trait ToFirestoreValue {
    fn to_firestore_value(&self) -> Value;
}

impl ToFirestoreValue for String {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.clone())
    }
}

impl ToFirestoreValue for &str {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.to_string())
    }
}

impl ToFirestoreValue for DateTime<Utc> {
    fn to_firestore_value(&self) -> Value {
        Value::TimestampValue(self.to_rfc3339())
    }
}

impl ToFirestoreValue for serde_json::Value {
    fn to_firestore_value(&self) -> Value {
        use serde_json::Value as Json;
        match self {
            Json::Null => Value::NullValue(()),
            Json::Bool(b) => Value::BooleanValue(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::IntegerValue(i.to_string()),
                None => Value::DoubleValue(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Value::StringValue(s.clone()),
            Json::Array(items) => Value::ArrayValue(ArrayValue {
                values: Some(items.iter().map(|v| v.to_firestore_value()).collect()),
            }),
            Json::Object(map) => Value::MapValue(MapValue {
                fields: Some(
                    map.iter()
                        .map(|(k, v)| (k.clone(), v.to_firestore_value()))
                        .collect(),
                ),
            }),
        }
    }
}

/// Convert Firestore Value to Rust type.
pub trait FromFirestoreValue: Sized {
    fn from_firestore_value(value: &Value) -> Option<Self>;
}

impl FromFirestoreValue for i64 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::IntegerValue(s) => s.parse().ok(),
            Value::DoubleValue(f) => Some(*f as i64),
            _ => None,
        }
    }
}

impl FromFirestoreValue for f64 {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::DoubleValue(f) => Some(*f),
            Value::IntegerValue(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromFirestoreValue for DateTime<Utc> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampValue(s) => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

impl FromFirestoreValue for serde_json::Value {
    /// Timestamps come back as RFC 3339 strings, which chrono deserializes.
    fn from_firestore_value(value: &Value) -> Option<Self> {
        use serde_json::Value as Json;
        Some(match value {
            Value::NullValue(()) => Json::Null,
            Value::BooleanValue(b) => Json::Bool(*b),
            Value::IntegerValue(s) => Json::from(s.parse::<i64>().ok()?),
            Value::DoubleValue(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::TimestampValue(s)
            | Value::StringValue(s)
            | Value::BytesValue(s)
            | Value::ReferenceValue(s) => Json::String(s.clone()),
            Value::ArrayValue(arr) => Json::Array(
                arr.values
                    .iter()
                    .flatten()
                    .map(Self::from_firestore_value)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::MapValue(map) => match map.fields.as_ref() {
                Some(fields) => Json::Object(fields_to_json(fields)?),
                None => Json::Object(serde_json::Map::new()),
            },
        })
    }
}

/// Encode a serializable model as top-level document fields.
pub fn to_fields<T: Serialize>(model: &T) -> crate::error::FirestoreResult<HashMap<String, Value>> {
    match serde_json::to_value(model)? {
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), v.to_firestore_value()))
            .collect()),
        _ => Err(crate::error::FirestoreError::serialization(
            "model must serialize to a JSON object",
        )),
    }
}

fn fields_to_json(
    fields: &HashMap<String, Value>,
) -> Option<serde_json::Map<String, serde_json::Value>> {
    fields
        .iter()
        .map(|(k, v)| Some((k.clone(), serde_json::Value::from_firestore_value(v)?)))
        .collect()
}

/// Decode document fields back into a model.
pub fn from_document<T: for<'de> Deserialize<'de>>(doc: &Document) -> crate::error::FirestoreResult<T> {
    let fields = doc
        .fields
        .as_ref()
        .ok_or_else(|| crate::error::FirestoreError::InvalidResponse("document has no fields".into()))?;
    let json = fields_to_json(fields).ok_or_else(|| {
        crate::error::FirestoreError::InvalidResponse("unrepresentable field value".into())
    })?;
    Ok(serde_json::from_value(serde_json::Value::Object(json))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_maps_to_typed_values() {
        let value = json!({"n": 3, "f": 1.5, "s": "x", "list": [true, null]}).to_firestore_value();
        let Value::MapValue(map) = value else {
            panic!("expected map");
        };
        let fields = map.fields.unwrap();
        assert_eq!(fields["n"], Value::IntegerValue("3".into()));
        assert_eq!(fields["f"], Value::DoubleValue(1.5));
        assert_eq!(fields["s"], Value::StringValue("x".into()));
    }

    #[test]
    fn test_document_decodes_timestamps_as_strings() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Row {
            created_at: DateTime<Utc>,
            count: u32,
        }

        let mut fields = HashMap::new();
        fields.insert(
            "createdAt".to_string(),
            Value::TimestampValue("2025-01-02T03:04:05.123456Z".into()),
        );
        fields.insert("count".to_string(), Value::IntegerValue("4".into()));
        let row: Row = from_document(&Document::new(fields)).unwrap();
        assert_eq!(row.count, 4);
        assert_eq!(row.created_at.timestamp(), 1735787045);
    }

    #[test]
    fn test_query_builder_ands_filters() {
        let query = StructuredQuery::collection("videoJobs")
            .where_field("status", "EQUAL", "completed".to_firestore_value())
            .where_field("sessionId", "EQUAL", "s1".to_firestore_value())
            .order_by("updatedAt", true)
            .limit(20);
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["where"]["compositeFilter"]["op"], "AND");
        assert_eq!(
            json["where"]["compositeFilter"]["filters"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
        assert_eq!(json["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(json["limit"], 20);
    }
}
