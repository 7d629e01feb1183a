//! PlutusData, the structured on-chain representation of datums and
//! redeemers, and its detailed JSON schema form.
//!
//! ```text
//! {"constructor": 0, "fields": [ ... ]}
//! {"int": 42}
//! {"bytes": "deadbeef"}
//! {"list": [ ... ]}
//! {"map": [{"k": ..., "v": ...}]}
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use super::error::{MalformedDatum, Shape};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlutusData {
    Constr { constructor: u64, fields: Vec<PlutusData> },
    Int(i128),
    Bytes(Vec<u8>),
    List(Vec<PlutusData>),
    Map(Vec<(PlutusData, PlutusData)>),
}

impl PlutusData {
    pub fn constr(constructor: u64, fields: Vec<PlutusData>) -> Self {
        Self::Constr {
            constructor,
            fields,
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::Constr { .. } => Shape::Constr,
            Self::Int(_) => Shape::Int,
            Self::Bytes(_) => Shape::Bytes,
            Self::List(_) => Shape::List,
            Self::Map(_) => Shape::Map,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Constr {
                constructor,
                fields,
            } => json!({
                "constructor": constructor,
                "fields": fields.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            // Values beyond the i64/u64 range have no exact JSON number form.
            Self::Int(n) => match (i64::try_from(*n), u64::try_from(*n)) {
                (Ok(v), _) => json!({ "int": v }),
                (_, Ok(v)) => json!({ "int": v }),
                _ => json!({ "int": n.to_string() }),
            },
            Self::Bytes(b) => json!({ "bytes": hex::encode(b) }),
            Self::List(items) => json!({
                "list": items.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            Self::Map(entries) => json!({
                "map": entries
                    .iter()
                    .map(|(k, v)| json!({ "k": k.to_json(), "v": v.to_json() }))
                    .collect::<Vec<_>>(),
            }),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, MalformedDatum> {
        let obj = value
            .as_object()
            .ok_or_else(|| MalformedDatum::Json(format!("expected object, got {value}")))?;

        if let Some(constructor) = obj.get("constructor") {
            let constructor = constructor
                .as_u64()
                .ok_or_else(|| MalformedDatum::Json("constructor must be a u64".into()))?;
            let fields = json_array(obj, "fields")?
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::constr(constructor, fields));
        }
        if let Some(n) = obj.get("int") {
            return parse_int(n).map(Self::Int);
        }
        if let Some(b) = obj.get("bytes") {
            let s = b
                .as_str()
                .ok_or_else(|| MalformedDatum::Json("bytes must be a hex string".into()))?;
            let bytes = hex::decode(s).map_err(|e| MalformedDatum::Json(format!("bytes: {e}")))?;
            return Ok(Self::Bytes(bytes));
        }
        if obj.contains_key("list") {
            let items = json_array(obj, "list")?
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::List(items));
        }
        if obj.contains_key("map") {
            let entries = json_array(obj, "map")?
                .iter()
                .map(|entry| {
                    let k = entry
                        .get("k")
                        .ok_or_else(|| MalformedDatum::Json("map entry missing `k`".into()))?;
                    let v = entry
                        .get("v")
                        .ok_or_else(|| MalformedDatum::Json("map entry missing `v`".into()))?;
                    Ok((Self::from_json(k)?, Self::from_json(v)?))
                })
                .collect::<Result<Vec<_>, MalformedDatum>>()?;
            return Ok(Self::Map(entries));
        }
        Err(MalformedDatum::Json(format!(
            "unrecognised PlutusData node: {value}"
        )))
    }
}

fn json_array<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>, MalformedDatum> {
    obj.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| MalformedDatum::Json(format!("`{key}` must be an array")))
}

fn parse_int(n: &Value) -> Result<i128, MalformedDatum> {
    if let Some(v) = n.as_i64() {
        return Ok(i128::from(v));
    }
    if let Some(v) = n.as_u64() {
        return Ok(i128::from(v));
    }
    n.as_str()
        .and_then(|s| s.parse::<i128>().ok())
        .ok_or_else(|| MalformedDatum::Json(format!("int out of range: {n}")))
}

impl Serialize for PlutusData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PlutusData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}
