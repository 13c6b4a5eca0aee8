//! §8 end-to-end scenario 2: HTTP round-trip, concurrent calls, ping, 404.
#![cfg(feature = "http_transport")]

use std::sync::Arc;
use std::time::Duration;

use boson::codec::JsonCodec;
use boson::error::Result;
use boson::executor::{SharedExecutor, TokioExecutor};
use boson::registry::Registry;
use boson::service;
use boson::transports::http::{HttpDispatchTransport, HttpReceiveTransport};

#[service]
pub trait HelloService {
    async fn say(&self, greeting: String) -> Result<String>;
}

struct HelloImpl;

#[boson::async_trait::async_trait]
impl HelloService for HelloImpl {
    async fn say(&self, greeting: String) -> Result<String> {
        Ok(greeting.replace("hello", "goodbye"))
    }
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn http_round_trip_four_concurrent_calls_ping_and_404() {
    let port = free_port().await;
    let uri = format!("http://127.0.0.1:{port}");
    let contract = "HelloService";
    let executor: SharedExecutor = Arc::new(TokioExecutor::current());
    let registry = Registry::new(executor.clone());

    let server_config = boson::config::Config::builder(&uri).build();
    let server_transport = Arc::new(HttpReceiveTransport::new(server_config, Arc::new(JsonCodec::new())).unwrap());
    registry
        .implement(contract, Arc::new(HelloServiceAdapter::new(HelloImpl)), server_transport)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let client_config = boson::config::Config::builder(&uri).executor(executor).build();
    let client_transport = Arc::new(HttpDispatchTransport::new(&client_config, Arc::new(JsonCodec::new())).unwrap());
    let proxy = registry.consume(contract, client_transport, None).await.unwrap();
    let client = Arc::new(HelloServiceClient::new(proxy));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.say("hello world".to_string()).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "goodbye world");
    }

    let ping_uri = format!("{uri}/ping");
    let (status, body) = tokio::task::spawn_blocking(move || {
        let resp = reqwest::blocking::get(ping_uri).unwrap();
        (resp.status().as_u16(), resp.bytes().unwrap())
    })
    .await
    .unwrap();
    assert_eq!(status, 200);
    assert!(body.is_empty());

    let missing_uri = format!("{uri}/foo");
    let missing_status = tokio::task::spawn_blocking(move || {
        reqwest::blocking::get(missing_uri).unwrap().status().as_u16()
    })
    .await
    .unwrap();
    assert_eq!(missing_status, 404);

    registry.disconnect_all().await.unwrap();
}
