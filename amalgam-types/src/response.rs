use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Detail used when the core reports a failure without listing any errors.
pub const UNKNOWN_CORE_ERROR: &str = "An unknown error occurred.";

/// An error or warning reported inside a core response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreMessage {
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CoreMessage {
    pub fn new(detail: impl Into<String>, code: Option<String>) -> Self {
        Self {
            detail: detail.into(),
            code,
        }
    }

    /// Leniently decodes one element of a core `errors`/`warnings` array.
    ///
    /// A missing or non-string `detail` becomes an empty string and a
    /// numeric `code` is stringified; the core is not trusted to be strict.
    pub fn from_value(value: &Value) -> Self {
        let detail = match value.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let code = match value.get("code") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self { detail, code }
    }

    /// Decodes every element of an optional JSON array, ignoring non-arrays.
    pub fn from_array(value: Option<&Value>) -> Vec<Self> {
        match value {
            Some(Value::Array(items)) => items.iter().map(Self::from_value).collect(),
            _ => Vec::new(),
        }
    }
}

/// The decoded result of a JSON-carrying core call.
///
/// Errors and content are not mutually exclusive: a core call may return
/// partial content alongside errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreResponse<T = Value> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
    #[serde(default)]
    pub errors: Vec<CoreMessage>,
    #[serde(default)]
    pub warnings: Vec<CoreMessage>,
}

impl<T> CoreResponse<T> {
    /// Wraps content with no errors or warnings.
    pub fn content(content: T) -> Self {
        Self {
            content: Some(content),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Returns true when the core reported no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts the content with `f`, keeping errors and warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CoreResponse<U> {
        CoreResponse {
            content: self.content.map(f),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

impl<T> Default for CoreResponse<T> {
    fn default() -> Self {
        Self {
            content: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
