use serde::Deserialize;
use serde::Serialize;

/// A staging or lifecycle operation the agent can dispatch, plus `PING`
/// and `SHUTDOWN`. Wire names are `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    Ping,
    StageEntry,
    GetEntry,
    UnstageEntry,
    StageTag,
    GetTag,
    UnstageTag,
    ListEntries,
    ListTags,
    UnstageAll,
    Drain,
    WriteState,
    Shutdown,
}

/// An advisory tag driving the daemon's idle-shutdown policy: tells the
/// event loop whether this request is the kind that can empty the agent's
/// state, so it knows when to consider shutting down early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    Reset,
    Apply,
    Stash,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    #[serde(default = "serde_json::Value::default")]
    pub params: serde_json::Value,
    #[serde(default)]
    pub hint: Hint,
}

impl Request {
    pub fn new(method: Method, params: serde_json::Value) -> Self {
        Self {
            method,
            params,
            hint: Hint::None,
        }
    }

    pub fn with_hint(mut self, hint: Hint) -> Self {
        self.hint = hint;
        self
    }
}

/// Error kinds carried in the IPC envelope, plus `method_unknown` for a
/// request naming a method this crate doesn't know how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotStaged,
    AlreadyStaged,
    InvalidRequest,
    Conflict,
    RemoteFailure,
    Internal,
    MethodUnknown,
    RequestTooLarge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                kind,
                message: message.into(),
            }),
        }
    }
}
