use serde_json::{json, Value};
use switchboard_core::{ClientConfig, Error};
use switchboard_fabric::transport::{TcpTransportListener, Transport};
use switchboard_rpc::{Call, RpcBackend, RpcClient};

/// Start a one-connection backend that answers every envelope with `reply`
async fn spawn_backend<F>(reply: F) -> u16
where
    F: Fn(&Value) -> Value + Send + 'static,
{
    let listener = TcpTransportListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut transport, _addr) = listener.accept().await.unwrap();
        while let Ok(bytes) = transport.receive().await {
            let request: Value = serde_json::from_slice(&bytes).unwrap();
            let response = reply(&request);
            transport
                .send(&serde_json::to_vec(&response).unwrap())
                .await
                .unwrap();
        }
    });

    port
}

fn config(port: u16) -> ClientConfig {
    ClientConfig::from_toml_str(&format!(
        r#"
        [server]
        address = "127.0.0.1"
        port = {port}

        [client]
        authkey = "secret"
        "#
    ))
    .unwrap()
}

/// Echo each payload's params back as its result
fn echo(request: &Value) -> Value {
    let params = &request["params"][0];
    let result = if request["method"] == "CallMany" {
        Value::Array(
            params
                .as_array()
                .unwrap()
                .iter()
                .map(|payload| payload["params"].clone())
                .collect(),
        )
    } else {
        params["params"].clone()
    };
    json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
}

#[tokio::test]
async fn send_returns_result() {
    let port = spawn_backend(echo).await;
    let mut client = RpcClient::connect(&config(port)).await.unwrap();

    let result = client
        .send(&Call::new("user", "get", vec![json!(6)]))
        .await
        .unwrap();

    assert_eq!(result, json!([6]));
}

#[tokio::test]
async fn payload_carries_authkey_and_service_prefix() {
    let port = spawn_backend(|request| {
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "Sleepy.Call");
        let payload = &request["params"][0];
        json!({
            "id": request["id"],
            "result": [payload["module"], payload["method"], payload["authkey"]],
        })
    })
    .await;

    let mut client = RpcClient::connect(&config(port))
        .await
        .unwrap()
        .with_service("Sleepy");

    let result = client.send(&Call::new("user", "get", vec![])).await.unwrap();
    assert_eq!(result, json!(["user", "get", "secret"]));
}

#[tokio::test]
async fn send_batch_preserves_order() {
    let port = spawn_backend(echo).await;
    let mut client = RpcClient::connect(&config(port)).await.unwrap();

    let calls = vec![
        Call::new("a", "x", vec![json!("first")]),
        Call::new("b", "y", vec![json!("second")]),
    ];
    let results = client.send_batch(&calls).await.unwrap();

    assert_eq!(results, vec![json!(["first"]), json!(["second"])]);
}

#[tokio::test]
async fn remote_error_is_surfaced() {
    let port = spawn_backend(|request| {
        json!({"id": request["id"], "error": {"code": -1, "message": "Method not found"}})
    })
    .await;
    let mut client = RpcClient::connect(&config(port)).await.unwrap();

    match client.send(&Call::new("user", "nope", vec![])).await {
        Err(Error::Remote { method, message }) => {
            assert_eq!(method, "user.nope");
            assert_eq!(message, "Method not found");
        }
        other => panic!("Expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn mismatched_id_is_protocol_error() {
    let port = spawn_backend(|_| json!({"id": "someone-else", "result": 1})).await;
    let mut client = RpcClient::connect(&config(port)).await.unwrap();

    let result = client.send(&Call::new("user", "get", vec![])).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn short_batch_is_protocol_error() {
    let port = spawn_backend(|request| json!({"id": request["id"], "result": [1]})).await;
    let mut client = RpcClient::connect(&config(port)).await.unwrap();

    let calls = vec![Call::new("a", "x", vec![]), Call::new("b", "y", vec![])];
    let result = client.send_batch(&calls).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn non_object_reply_is_protocol_error() {
    let port = spawn_backend(|_| json!("hello")).await;
    let mut client = RpcClient::connect(&config(port)).await.unwrap();

    let result = client.send(&Call::new("user", "get", vec![])).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn unreachable_backend_is_connection_error() {
    let result = RpcClient::connect(&config(1)).await;
    assert!(matches!(result, Err(Error::Connection { .. })));
}
