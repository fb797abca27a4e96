//! Wire envelopes for backend calls.
//!
//! A single call goes out as
//!
//! ```text
//! {"jsonrpc":"2.0","method":"Call","params":[{module,method,authkey,params}],"id":"..."}
//! ```
//!
//! and a batch as `"method":"CallMany"` with `"params":[[payload, ...]]`.
//! Replies echo the `id` and carry either `result` or `error`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use switchboard_core::hash::stable_hash;
use switchboard_core::{Error, Result};

pub const PROTOCOL_VERSION: &str = "2.0";
pub const METHOD_CALL: &str = "Call";
pub const METHOD_CALL_MANY: &str = "CallMany";

/// One logical backend call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Backend module the method lives in
    pub namespace: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Call {
    pub fn new(namespace: impl Into<String>, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            namespace: namespace.into(),
            method: method.into(),
            params,
        }
    }

    /// Stable identity of this call
    ///
    /// Two calls with the same namespace, method and parameters share an
    /// identity, whatever call site issued them.
    pub fn identity(&self) -> String {
        // Serializing a tuple of plain JSON values cannot fail
        let serialized = serde_json::to_vec(&(&self.namespace, &self.method, &self.params))
            .unwrap_or_default();
        stable_hash(serialized)
    }

    /// `namespace.method`, for logs and error messages
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.method)
    }

    pub(crate) fn payload<'a>(&'a self, authkey: &'a str) -> CallPayload<'a> {
        CallPayload {
            module: &self.namespace,
            method: &self.method,
            authkey,
            params: &self.params,
        }
    }
}

/// A call as the backend expects it inside `params`
#[derive(Debug, Serialize)]
pub(crate) struct CallPayload<'a> {
    pub module: &'a str,
    pub method: &'a str,
    pub authkey: &'a str,
    pub params: &'a [Value],
}

/// Outgoing request envelope
#[derive(Debug, Serialize)]
pub struct Request<P> {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: [P; 1],
    pub id: String,
}

impl<P: Serialize> Request<P> {
    pub fn new(method: impl Into<String>, params: P) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION,
            method: method.into(),
            params: [params],
            id: fresh_id(),
        }
    }
}

/// A correlation token unique per envelope
pub fn fresh_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Incoming response envelope
#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    /// `Some(Value::Null)` when the backend sent an explicit `"result": null`
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Response {
    /// Check correlation and extract the result
    ///
    /// `target` names the call for error reporting.
    pub fn into_result(self, expected_id: &str, target: &str) -> Result<Value> {
        match &self.id {
            Some(Value::String(id)) if id == expected_id => {}
            other => {
                return Err(Error::protocol(format!(
                    "Response id {} does not match request id '{expected_id}'",
                    other.as_ref().map(Value::to_string).unwrap_or_else(|| "<missing>".into())
                )))
            }
        }

        if let Some(error) = self.error {
            return Err(Error::Remote {
                method: target.to_string(),
                message: remote_message(&error),
            });
        }

        self.result
            .ok_or_else(|| Error::protocol("Response carries neither result nor error"))
    }
}

/// Human-readable text of a backend error object
fn remote_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}
