//! Uniform request / response envelope shared by every domain facade.
//!
//! Requests carry `{ cmd, detail?, params? }`; responses carry
//! `{ ok, cmd, data?, count?, error? }`.  Handlers never build a
//! [`ResponseEnvelope`] themselves: they return an [`Outcome`] or an
//! [`Error`](crate::error::Error) and the dispatcher owns the shape.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How much of each result the caller wants back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    Minimal,
    #[default]
    Standard,
    Full,
}

impl Detail {
    /// Lenient parse: anything unrecognised falls back to `standard`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minimal" => Detail::Minimal,
            "full" => Detail::Full,
            _ => Detail::Standard,
        }
    }
}

impl<'de> Deserialize<'de> for Detail {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(Value::String(s)) => Detail::parse(&s),
            _ => Detail::Standard,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    pub cmd: String,
    #[serde(default)]
    pub detail: Detail,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

impl RequestEnvelope {
    pub fn new(cmd: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => Some(map),
            _ => None,
        };
        Self {
            cmd: cmd.into(),
            detail: Detail::Standard,
            params,
        }
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = detail;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Successful result of a domain command, before it is wrapped.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub data: Value,
    /// Set only for list-shaped results.
    pub count: Option<usize>,
}

impl Outcome {
    pub fn item(data: impl Serialize) -> crate::error::Result<Self> {
        Ok(Self {
            data: serde_json::to_value(data)?,
            count: None,
        })
    }

    pub fn list<T: Serialize>(items: Vec<T>) -> crate::error::Result<Self> {
        let count = items.len();
        Ok(Self {
            data: serde_json::to_value(items)?,
            count: Some(count),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `ok = false` ⇔ `error` is set and `data` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(cmd: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            ok: true,
            cmd: cmd.into(),
            data: Some(outcome.data),
            count: outcome.count,
            error: None,
        }
    }

    pub fn failure(cmd: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            cmd: cmd.into(),
            data: None,
            count: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_detail_defaults_to_standard() {
        let env: RequestEnvelope =
            serde_json::from_str(r#"{"cmd":"list","detail":"verbose"}"#).unwrap();
        assert_eq!(env.detail, Detail::Standard);

        let env: RequestEnvelope = serde_json::from_str(r#"{"cmd":"list","detail":7}"#).unwrap();
        assert_eq!(env.detail, Detail::Standard);

        let env: RequestEnvelope =
            serde_json::from_str(r#"{"cmd":"list","detail":"FULL"}"#).unwrap();
        assert_eq!(env.detail, Detail::Full);
    }

    #[test]
    fn missing_detail_and_params_are_optional() {
        let env: RequestEnvelope = serde_json::from_str(r#"{"cmd":"languages"}"#).unwrap();
        assert_eq!(env.detail, Detail::Standard);
        assert!(env.params.is_none());
    }

    #[test]
    fn failure_never_serializes_data() {
        let resp = ResponseEnvelope::failure("run", "timeout: too slow");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], false);
        assert!(json.get("data").is_none());
        assert!(json.get("count").is_none());
        assert_eq!(json["error"], "timeout: too slow");
    }

    #[test]
    fn list_outcome_carries_count() {
        let outcome = Outcome::list(vec!["a", "b", "c"]).unwrap();
        let resp = ResponseEnvelope::success("list", outcome);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["count"], 3);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn item_outcome_omits_count() {
        let resp = ResponseEnvelope::success("get", Outcome::item(serde_json::json!({"id": 1})).unwrap());
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("count").is_none());
        assert_eq!(json["data"]["id"], 1);
    }
}
