//! End-to-end tests of the client against a live demo server.

use axum::{http::HeaderMap, routing::any, Router};
use objrpc::{dict, CallArgs, Value};
use objrpc_client::{ClientError, Connection, Reply};
use objrpc_server::demo::demo_root;
use objrpc_server::start_server;
use std::sync::{Arc, Mutex};

async fn connect() -> Connection {
    let addr = start_server(demo_root(), "127.0.0.1", 0).await.unwrap();
    Connection::new("127.0.0.1", Some(addr.port())).unwrap()
}

fn value(reply: Reply) -> Value {
    match reply {
        Reply::Value(value) => value,
        Reply::Proxy(proxy) => panic!("Expected Value, got: {:?}", proxy),
    }
}

#[tokio::test]
async fn test_get_constant() {
    let conn = connect().await;
    let root = conn.root();
    assert_eq!(value(root.get("constant_value").await.unwrap()), Value::Int(5));
    assert_eq!(conn.get("/constant_value").await.unwrap(), Value::Int(5));
}

#[tokio::test]
async fn test_missing_attribute() {
    let conn = connect().await;
    match conn.root().get("missing").await {
        Err(ClientError::NotFound { body }) => assert!(body.contains("Endpoint 'missing' not found.")),
        other => panic!("Expected NotFound, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_calls() {
    let conn = connect().await;
    let root = conn.root();

    let sum = root
        .call_method("add", CallArgs::new().arg(1).arg(2))
        .await
        .unwrap();
    assert_eq!(value(sum), Value::Int(3));

    let dict = root
        .call_method("dict_function", CallArgs::new())
        .await
        .unwrap();
    assert_eq!(value(dict), dict! { "a" => 5, "b" => 10 });

    let echoed = root
        .call_method("echo", CallArgs::new().arg(Value::Bytes(b"\0raw".to_vec())))
        .await
        .unwrap();
    assert_eq!(value(echoed), Value::Bytes(b"\0raw".to_vec()));

    let echoed = root
        .call_method("echo", CallArgs::new().kwarg("value", f64::NEG_INFINITY))
        .await
        .unwrap();
    assert_eq!(value(echoed), Value::Float(f64::NEG_INFINITY));
}

#[tokio::test]
async fn test_method_reached_by_reference() {
    let conn = connect().await;
    let fun = conn.root().get("fun").await.unwrap().into_proxy().unwrap();
    assert_eq!(fun.class(), "method");
    assert!(fun.endpoint().starts_with("/id/"));

    assert_eq!(value(fun.call(CallArgs::new()).await.unwrap()), Value::Int(10));
    assert_eq!(fun.doc().await.unwrap().as_deref(), Some("Doc string 1"));
}

#[tokio::test]
async fn test_doc_and_signature() {
    let conn = connect().await;
    let root = conn.root();
    assert_eq!(
        root.doc().await.unwrap().as_deref(),
        Some("Demo object exposed by objrpc-server")
    );

    let add = root.get("add").await.unwrap().into_proxy().unwrap();
    let sig = add.signature().await.unwrap();
    assert_eq!(sig.get("name"), Some(&Value::from("add")));
    assert_eq!(sig.get("text"), Some(&Value::from("(a, b)")));

    let constant = objrpc_client::RemoteProxy::new(conn.clone(), "/constant_value");
    assert_eq!(constant.doc().await.unwrap(), None);
    assert!(constant.signature().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_call_errors() {
    let conn = connect().await;
    let root = conn.root();

    match root.call_method("constant_value", CallArgs::new()).await {
        Err(ClientError::CallFailed { body }) => assert!(body.contains("is not callable")),
        other => panic!("Expected CallFailed, got: {:?}", other),
    }
    match root.call_method("fail", CallArgs::new()).await {
        Err(ClientError::CallFailed { body }) => {
            assert!(body.contains("could not read stage position"))
        }
        other => panic!("Expected CallFailed, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_reference_chain() {
    let conn = connect().await;
    let root = conn.root();

    let child = root
        .call_method("get_child", CallArgs::new())
        .await
        .unwrap()
        .into_proxy()
        .unwrap();
    assert_eq!(child.class(), "Counter");

    child
        .call_method("increment", CallArgs::new().kwarg("step", 3))
        .await
        .unwrap();
    assert_eq!(value(child.get("value").await.unwrap()), Value::Int(3));

    // the same object reached by attribute path
    let same = root.get("child").await.unwrap().into_proxy().unwrap();
    assert_eq!(same.endpoint(), child.endpoint());

    // a proxy passed back as an argument is the same object on the server
    let echoed = root
        .call_method("echo", CallArgs::new().arg(Value::from(&child)))
        .await
        .unwrap()
        .into_proxy()
        .unwrap();
    assert_eq!(echoed.endpoint(), child.endpoint());

    // references nested in containers stay values until asked for
    let nested = root
        .call_method("echo", CallArgs::new().arg(vec![Value::from(&child)]))
        .await
        .unwrap()
        .into_value()
        .unwrap();
    let remote = nested.as_sequence().unwrap()[0].as_remote_ref().unwrap().clone();
    let proxy = conn.proxy_for(&remote);
    assert_eq!(value(proxy.get("value").await.unwrap()), Value::Int(3));
}

#[tokio::test]
async fn test_expired_reference() {
    let conn = connect().await;
    let fresh = conn
        .root()
        .call_method("make_counter", CallArgs::new())
        .await
        .unwrap()
        .into_proxy()
        .unwrap();
    assert!(fresh.get("value").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_ndarray_result() {
    let conn = connect().await;
    let arr = value(conn.root().call_method("array", CallArgs::new()).await.unwrap());
    let arr = arr.as_array().unwrap();
    assert_eq!(arr.shape(), [3, 3, 2]);
    assert_eq!(arr.to_vec::<u8>().unwrap(), (0..18).collect::<Vec<u8>>());
}

#[tokio::test]
async fn test_set_is_not_supported_by_server() {
    let conn = connect().await;
    match conn.root().set("constant_value", 6).await {
        Err(ClientError::Status { status, .. }) => assert_eq!(status, 405),
        other => panic!("Expected Status, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let conn = Connection::new("127.0.0.1", Some(port)).unwrap();
    assert!(matches!(
        conn.get("/").await,
        Err(ClientError::Transport { .. })
    ));
}

#[tokio::test]
async fn test_request_headers() {
    let seen: Arc<Mutex<Vec<(String, Option<String>, Option<String>)>>> = Arc::default();
    let record = seen.clone();
    let app = Router::new().route(
        "/*path",
        any(move |method: axum::http::Method, headers: HeaderMap| {
            let record = record.clone();
            async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                record.lock().unwrap().push((
                    method.to_string(),
                    header("user-agent"),
                    header("content-type"),
                ));
                r#"{"v": "0.1", "data": 5}"#
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let conn = Connection::new(&format!("http://127.0.0.1:{}/api/", port), None).unwrap();
    assert_eq!(value(conn.root().get("x").await.unwrap()), Value::Int(5));
    assert_eq!(
        value(conn.root().call_method("x", CallArgs::new()).await.unwrap()),
        Value::Int(5)
    );

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen[0],
        ("GET".to_string(), Some("objrpc/0.1".to_string()), None)
    );
    assert_eq!(
        seen[1],
        (
            "POST".to_string(),
            Some("objrpc/0.1".to_string()),
            Some("application/json".to_string())
        )
    );
}
