//! §8 end-to-end scenario 1: in-process echo.

use std::sync::Arc;

use boson::error::Result;
use boson::executor::{SharedExecutor, TokioExecutor};
use boson::registry::Registry;
use boson::service;
use boson::transports::in_process::{InProcessDispatchTransport, InProcessReceiveTransport};

#[service]
pub trait HelloService {
    async fn say(&self, greeting: String) -> Result<String>;
}

struct HelloImpl;

#[boson::async_trait::async_trait]
impl HelloService for HelloImpl {
    async fn say(&self, greeting: String) -> Result<String> {
        Ok(greeting.replace("Hello", "Goodbye"))
    }
}

#[tokio::test]
async fn in_process_echo_resolves_through_the_registry() {
    let contract = "HelloService";
    let executor: SharedExecutor = Arc::new(TokioExecutor::current());
    let registry = Registry::new(executor);

    registry
        .implement(
            contract,
            Arc::new(HelloServiceAdapter::new(HelloImpl)),
            Arc::new(InProcessReceiveTransport::new(contract)),
        )
        .await
        .unwrap();

    let proxy = registry
        .consume(contract, Arc::new(InProcessDispatchTransport::new(contract)), None)
        .await
        .unwrap();

    let client = HelloServiceClient::new(proxy);
    let reply = client.say("Hello World".to_string()).await.unwrap();
    assert_eq!(reply, "Goodbye World");

    registry.disconnect_all().await.unwrap();
}

#[tokio::test]
async fn duplicate_implement_is_rejected_and_first_registration_keeps_serving() {
    let contract = "HelloServiceDup";
    let executor: SharedExecutor = Arc::new(TokioExecutor::current());
    let registry = Registry::new(executor);

    registry
        .implement(
            contract,
            Arc::new(HelloServiceAdapter::new(HelloImpl)),
            Arc::new(InProcessReceiveTransport::new(contract)),
        )
        .await
        .unwrap();

    let err = registry
        .implement(
            contract,
            Arc::new(HelloServiceAdapter::new(HelloImpl)),
            Arc::new(InProcessReceiveTransport::new(contract)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, boson::error::ErrorKind::AlreadyRegistered);

    let proxy = registry
        .consume(contract, Arc::new(InProcessDispatchTransport::new(contract)), None)
        .await
        .unwrap();
    let client = HelloServiceClient::new(proxy);
    let reply = client.say("Hello Still Works".to_string()).await.unwrap();
    assert_eq!(reply, "Goodbye Still Works");

    registry.disconnect_all().await.unwrap();
}
