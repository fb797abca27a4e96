use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use switchboard_core::{ClientConfig, Error, Result};
use switchboard_fabric::codec::JsonCodec;
use switchboard_fabric::Channel;

use crate::envelope::{Call, CallPayload, Request, Response, METHOD_CALL, METHOD_CALL_MANY};

/// Anything that can carry backend calls
///
/// Implemented by [`RpcClient`] for the real wire; the call cache only talks
/// to this trait.
#[async_trait::async_trait]
pub trait RpcBackend: Send {
    /// Issue one call and return its result
    async fn send(&mut self, call: &Call) -> Result<Value>;

    /// Issue all calls in one round-trip; results come back in call order
    async fn send_batch(&mut self, calls: &[Call]) -> Result<Vec<Value>>;
}

/// JSON-RPC client over the persistent backend connection
pub struct RpcClient {
    channel: Channel<JsonCodec>,
    authkey: String,
    service: Option<String>,
}

impl RpcClient {
    pub fn new(channel: Channel<JsonCodec>) -> Self {
        Self {
            channel,
            authkey: String::new(),
            service: None,
        }
    }

    /// Connect to the backend described by `config`
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let endpoint = config.server.endpoint()?;
        let channel = Channel::open(endpoint.clone(), JsonCodec)
            .await
            .map_err(|e| {
                error!(endpoint = %endpoint, error = %e, "Opening socket to backend failed");
                e.into_core(&endpoint.to_string())
            })?;

        let mut client = Self::new(channel).with_authkey(config.client.authkey.clone());
        if let Some(service) = &config.client.service {
            client = client.with_service(service.clone());
        }
        Ok(client)
    }

    /// Key attached to every call payload
    pub fn with_authkey(mut self, authkey: impl Into<String>) -> Self {
        self.authkey = authkey.into();
        self
    }

    /// Prefix envelope methods, e.g. `Sleepy` sends `Sleepy.Call`
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    fn envelope_method(&self, base: &str) -> String {
        match &self.service {
            Some(service) => format!("{service}.{base}"),
            None => base.to_string(),
        }
    }

    async fn roundtrip<P: Serialize + Send + Sync>(
        &mut self,
        request: Request<P>,
        target: &str,
    ) -> Result<Value> {
        let endpoint = self.channel.describe();
        let response: Response = self.channel.request(&request).await.map_err(|e| {
            let err = e.into_core(&endpoint);
            error!(endpoint = %endpoint, call = target, error = %err, "Backend request failed");
            err
        })?;

        response.into_result(&request.id, target).map_err(|err| {
            error!(endpoint = %endpoint, call = target, error = %err, "Backend rejected request");
            err
        })
    }

    /// Close the backend connection
    pub async fn close(&mut self) -> Result<()> {
        let endpoint = self.channel.describe();
        self.channel.close().await.map_err(|e| e.into_core(&endpoint))
    }
}

#[async_trait::async_trait]
impl RpcBackend for RpcClient {
    async fn send(&mut self, call: &Call) -> Result<Value> {
        let target = call.qualified_name();
        debug!(call = %target, "Sending call");

        let authkey = self.authkey.clone();
        let request = Request::new(self.envelope_method(METHOD_CALL), call.payload(&authkey));
        self.roundtrip(request, &target).await
    }

    async fn send_batch(&mut self, calls: &[Call]) -> Result<Vec<Value>> {
        debug!(calls = calls.len(), "Sending batch");

        let authkey = self.authkey.clone();
        let payloads: Vec<CallPayload<'_>> =
            calls.iter().map(|call| call.payload(&authkey)).collect();
        let request = Request::new(self.envelope_method(METHOD_CALL_MANY), payloads);

        match self.roundtrip(request, METHOD_CALL_MANY).await? {
            Value::Array(results) if results.len() == calls.len() => Ok(results),
            Value::Array(results) => Err(Error::protocol(format!(
                "Batch of {} calls returned {} results",
                calls.len(),
                results.len()
            ))),
            other => Err(Error::protocol(format!(
                "Batch result is not a list: {other}"
            ))),
        }
    }
}
