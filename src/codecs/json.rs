//! JSON value envelope using `serde_json`
//!
//! Every tier stores text. Scalars map to JSON scalars, arrays are walked
//! recursively, and entities are wrapped in a tagged record:
//!
//! ```text
//! {"__cacheable": true, "type": "Foo", "payload": "<Foo::encode() output>"}
//! ```
//!
//! A list keyed `0..n` is written as a JSON array; any other array becomes a JSON
//! object whose integer keys are written as decimal strings.

use std::sync::Arc;

use serde_json::{Map, Number, Value};

use super::registry::EntityRegistry;
use crate::error::{CacheError, Result};
use crate::value::{ArrayKey, CacheArray, CacheValue};

const ENTITY_MARKER: &str = "__cacheable";
const ENTITY_TYPE: &str = "type";
const ENTITY_PAYLOAD: &str = "payload";

/// Shared serialization envelope used by every tier
#[derive(Debug, Clone, Default)]
pub struct ValueCodec {
    registry: Arc<EntityRegistry>,
}

impl ValueCodec {
    #[must_use]
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Encode a value into the text a tier stores
    ///
    /// # Errors
    ///
    /// Non-finite floats, or an entity whose own `encode` fails.
    pub fn encode(&self, value: &CacheValue) -> Result<String> {
        Ok(serde_json::to_string(&Self::to_json(value)?)?)
    }

    /// Invert [`ValueCodec::encode`]
    ///
    /// # Errors
    ///
    /// Malformed text, an unregistered entity type, or an entity whose own `decode` fails.
    pub fn decode(&self, text: &str) -> Result<CacheValue> {
        let json: Value = serde_json::from_str(text)
            .map_err(|e| CacheError::Codec(format!("stored value is not valid JSON: {e}")))?;
        self.read_json(json)
    }

    fn to_json(value: &CacheValue) -> Result<Value> {
        Ok(match value {
            CacheValue::Null => Value::Null,
            CacheValue::Bool(b) => Value::Bool(*b),
            CacheValue::Int(i) => Value::Number(Number::from(*i)),
            CacheValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| CacheError::Codec(format!("cannot store non-finite float {f}")))?,
            CacheValue::Str(s) => Value::String(s.clone()),
            CacheValue::Array(array) if array.is_list() => Value::Array(
                array
                    .values()
                    .map(Self::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            CacheValue::Array(array) => {
                let mut object = Map::with_capacity(array.len());
                for (key, item) in array.iter() {
                    object.insert(key.to_string(), Self::to_json(item)?);
                }
                Value::Object(object)
            }
            CacheValue::Entity(entity) => {
                let payload = entity.encode_entity().map_err(|e| {
                    CacheError::Codec(format!("failed to encode {}: {e}", entity.type_name()))
                })?;
                let mut object = Map::with_capacity(3);
                object.insert(ENTITY_MARKER.to_string(), Value::Bool(true));
                object.insert(
                    ENTITY_TYPE.to_string(),
                    Value::String(entity.type_name().to_string()),
                );
                object.insert(ENTITY_PAYLOAD.to_string(), Value::String(payload));
                Value::Object(object)
            }
        })
    }

    fn read_json(&self, json: Value) -> Result<CacheValue> {
        Ok(match json {
            Value::Null => CacheValue::Null,
            Value::Bool(b) => CacheValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CacheValue::Int(i),
                None => CacheValue::Float(n.as_f64().ok_or_else(|| {
                    CacheError::Codec(format!("number {n} does not fit a cache value"))
                })?),
            },
            Value::String(s) => CacheValue::Str(s),
            Value::Array(items) => CacheValue::Array(
                items
                    .into_iter()
                    .map(|item| self.read_json(item))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .collect(),
            ),
            Value::Object(object) => {
                if let Some((type_name, payload)) = entity_parts(&object) {
                    return Ok(CacheValue::Entity(
                        self.registry.reconstruct(type_name, payload)?,
                    ));
                }
                let mut array = CacheArray::new();
                for (key, item) in object {
                    array.insert(ArrayKey::from(key), self.read_json(item)?);
                }
                CacheValue::Array(array)
            }
        })
    }
}

fn entity_parts(object: &Map<String, Value>) -> Option<(&str, &str)> {
    if object.len() != 3 || object.get(ENTITY_MARKER) != Some(&Value::Bool(true)) {
        return None;
    }
    match (object.get(ENTITY_TYPE), object.get(ENTITY_PAYLOAD)) {
        (Some(Value::String(type_name)), Some(Value::String(payload))) => {
            Some((type_name.as_str(), payload.as_str()))
        }
        _ => None,
    }
}
