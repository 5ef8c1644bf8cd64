//! The condition bag handed over by the API layer.
//!
//! Query-string and body parameters arrive merged into one JSON object,
//! together with the authenticated user id. Values from query strings are
//! strings, values from bodies keep their JSON type, so every accessor accepts
//! both forms.
//!
//! Two presence rules apply:
//! - [`Conditions::require`]: the field must be present and truthy, otherwise
//!   `WrongMustCondition:<name>`.
//! - [`Conditions::optional`]: the field may be absent, but a field explicitly
//!   set to `false` is rejected with `WrongCondition:<name>`.

use serde_json::{Map, Value};

use crate::errors::ConditionError;
use crate::ids::{Parent, is_valid_id, normalize_timestamp};

/// Key holding the authenticated user id.
pub const MAIN_USER: &str = "main_user_id";

/// Largest page size a listing accepts.
pub const MAX_LIMIT: i64 = 100;

type Result<T> = std::result::Result<T, ConditionError>;

/// Normalized request parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conditions {
    values: Map<String, Value>,
}

impl From<Map<String, Value>> for Conditions {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl Conditions {
    /// Empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bag for an authenticated user.
    pub fn for_user(user_id: i64) -> Self {
        Self::new().with(MAIN_USER, user_id)
    }

    /// Build from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(ConditionError::malformed("conditions", "expected an object")),
        }
    }

    /// Add or replace a field.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        let _ = self.values.insert(name.to_string(), value.into());
        self
    }

    /// Whether the field is present at all.
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Raw value, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Names of all present fields.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// A present, truthy value.
    pub fn require(&self, name: &str) -> Result<&Value> {
        match self.values.get(name) {
            Some(value) if truthy(value) => Ok(value),
            _ => Err(ConditionError::Missing(name.to_string())),
        }
    }

    /// A value that may be absent but must not be `false`.
    ///
    /// `null` counts as absent.
    pub fn optional(&self, name: &str) -> Result<Option<&Value>> {
        match self.values.get(name) {
            Some(Value::Bool(false)) => Err(ConditionError::Wrong(name.to_string())),
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(value)),
        }
    }

    /// The authenticated user id.
    pub fn main_user(&self) -> Result<i64> {
        let id = as_i64(MAIN_USER, self.require(MAIN_USER)?)?;
        if id <= 0 {
            return Err(ConditionError::malformed(MAIN_USER, "must be positive"));
        }
        Ok(id)
    }

    /// Required string.
    pub fn require_str(&self, name: &str) -> Result<String> {
        as_string(name, self.require(name)?)
    }

    /// Optional string.
    pub fn optional_str(&self, name: &str) -> Result<Option<String>> {
        self.optional(name)?.map(|v| as_string(name, v)).transpose()
    }

    /// Required integer.
    pub fn require_i64(&self, name: &str) -> Result<i64> {
        as_i64(name, self.require(name)?)
    }

    /// Optional integer. A present `0` is returned as `Some(0)`.
    pub fn optional_i64(&self, name: &str) -> Result<Option<i64>> {
        self.optional(name)?.map(|v| as_i64(name, v)).transpose()
    }

    /// Optional boolean: `true`, `"true"`, `1` are true; `"false"` and `0`
    /// are false. A literal `false` is rejected by the optional rule.
    pub fn optional_bool(&self, name: &str) -> Result<Option<bool>> {
        self.optional(name)?.map(|v| as_bool(name, v)).transpose()
    }

    /// Boolean flag where a literal `false` is a valid value.
    pub fn flag(&self, name: &str) -> Result<Option<bool>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => as_bool(name, value).map(Some),
        }
    }

    /// Required element key.
    pub fn require_id(&self, name: &str) -> Result<String> {
        let id = self.require_str(name)?;
        check_id(name, id)
    }

    /// Optional element key.
    pub fn optional_id(&self, name: &str) -> Result<Option<String>> {
        self.optional_str(name)?.map(|id| check_id(name, id)).transpose()
    }

    /// Required parent reference (`"0"` for root).
    pub fn require_parent(&self, name: &str) -> Result<Parent> {
        let raw = self.require_str(name)?;
        parse_parent(name, &raw)
    }

    /// Optional parent reference.
    pub fn optional_parent(&self, name: &str) -> Result<Option<Parent>> {
        self.optional_str(name)?
            .map(|raw| parse_parent(name, &raw))
            .transpose()
    }

    /// One key or a list of keys (array or comma-separated string).
    pub fn optional_id_list(&self, name: &str) -> Result<Option<Vec<String>>> {
        let Some(value) = self.optional(name)? else {
            return Ok(None);
        };
        let raw: Vec<String> = match value {
            Value::Array(items) => items
                .iter()
                .map(|v| as_string(name, v))
                .collect::<Result<_>>()?,
            other => as_string(name, other)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        let ids = raw
            .into_iter()
            .map(|id| check_id(name, id))
            .collect::<Result<Vec<_>>>()?;
        Ok((!ids.is_empty()).then_some(ids))
    }

    /// Required RFC 3339 timestamp, normalized to the stored format.
    pub fn require_timestamp(&self, name: &str) -> Result<String> {
        let raw = self.require_str(name)?;
        parse_timestamp(name, &raw)
    }

    /// Optional RFC 3339 timestamp.
    pub fn optional_timestamp(&self, name: &str) -> Result<Option<String>> {
        self.optional_str(name)?
            .map(|raw| parse_timestamp(name, &raw))
            .transpose()
    }

    /// Page size: `1..=100`, `default` when absent.
    pub fn limit(&self, default: Option<i64>) -> Result<Option<i64>> {
        match self.optional_i64("limit")? {
            Some(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(Some(limit)),
            Some(_) => Err(ConditionError::malformed(
                "limit",
                format!("must be between 1 and {MAX_LIMIT}"),
            )),
            None => Ok(default),
        }
    }

    /// Page offset: `>= 0`, zero when absent.
    pub fn offset(&self) -> Result<i64> {
        match self.optional_i64("offset")? {
            Some(offset) if offset >= 0 => Ok(offset),
            Some(_) => Err(ConditionError::malformed("offset", "must not be negative")),
            None => Ok(0),
        }
    }
}

/// JavaScript-style truthiness of a JSON value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_string(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ConditionError::malformed(name, "expected a string")),
    }
}

fn as_i64(name: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ConditionError::malformed(name, "expected an integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| ConditionError::malformed(name, "expected an integer")),
        _ => Err(ConditionError::malformed(name, "expected an integer")),
    }
}

fn as_bool(name: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" || s == "1" => Ok(true),
        Value::String(s) if s == "false" || s == "0" => Ok(false),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        _ => Err(ConditionError::malformed(name, "expected a boolean")),
    }
}

fn check_id(name: &str, id: String) -> Result<String> {
    if is_valid_id(&id) {
        Ok(id)
    } else {
        Err(ConditionError::malformed(name, "expected an 8-char key"))
    }
}

fn parse_parent(name: &str, raw: &str) -> Result<Parent> {
    Parent::parse(raw)
        .ok_or_else(|| ConditionError::malformed(name, "expected \"0\" or an 8-char key"))
}

fn parse_timestamp(name: &str, raw: &str) -> Result<String> {
    normalize_timestamp(raw)
        .ok_or_else(|| ConditionError::malformed(name, "expected an RFC 3339 timestamp"))
}
