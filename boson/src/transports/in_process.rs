//! Direct hand-off through a process-wide lookup (§4.5). The codec is not
//! used -- values never leave process memory.
//!
//! §9 "Global lookup for in-process transport" flags the source's
//! implicit global; we keep the map process-scoped but behind an explicit
//! `OnceLock`, reachable only through this module rather than arbitrary
//! code poking at a public global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::envelope::{Request, Response};
use crate::error::{BosonError, Result};
use crate::receiver::ReceiverCore;
use crate::service::ServiceAdapter;
use crate::transports::{DispatchTransport, ReceiveTransport};

type GlobalReceivers = DashMap<String, Arc<ReceiverCore>>;

fn global_receivers() -> &'static GlobalReceivers {
    static RECEIVERS: OnceLock<GlobalReceivers> = OnceLock::new();
    RECEIVERS.get_or_init(DashMap::new)
}

/// Receiver-side half: installs `(contract -> receiver)` into the
/// process-wide map on `connect`, removes it on `disconnect`.
pub struct InProcessReceiveTransport {
    contract: String,
}

impl InProcessReceiveTransport {
    pub fn new(contract: impl Into<String>) -> Self {
        InProcessReceiveTransport {
            contract: contract.into(),
        }
    }
}

#[async_trait]
impl ReceiveTransport for InProcessReceiveTransport {
    async fn connect(&self, adapter: Arc<dyn ServiceAdapter>) -> Result<()> {
        global_receivers().insert(self.contract.clone(), Arc::new(ReceiverCore::new(adapter)));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        global_receivers().remove(&self.contract);
        Ok(())
    }
}

/// Dispatcher-side half: `connect` is a no-op marking `connected = true`;
/// dispatch looks up the receiver for `request.service_type` and invokes
/// it directly.
pub struct InProcessDispatchTransport {
    contract: String,
    connected: AtomicBool,
}

impl InProcessDispatchTransport {
    pub fn new(contract: impl Into<String>) -> Self {
        InProcessDispatchTransport {
            contract: contract.into(),
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DispatchTransport for InProcessDispatchTransport {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BosonError::not_connected(format!(
                "in-process dispatcher for '{}' is not connected",
                self.contract
            )));
        }
        let receiver = global_receivers().get(&request.service_type).ok_or_else(|| {
            BosonError::not_connected(format!(
                "no receiver registered for '{}'",
                request.service_type
            ))
        })?;
        Ok(receiver.apply(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct GreeterAdapter;

    #[async_trait]
    impl ServiceAdapter for GreeterAdapter {
        fn contract_name(&self) -> &'static str {
            "HelloService"
        }
        async fn dispatch(
            &self,
            _method_name: &str,
            _argument_types: &[String],
            arguments: Vec<crate::envelope::Value>,
        ) -> Result<crate::envelope::Value> {
            let input = arguments[0].as_str().unwrap();
            Ok(serde_json::json!(input.replace("Hello", "Goodbye")))
        }
    }

    #[tokio::test]
    async fn in_process_echo_round_trip() {
        let contract = format!("HelloService-{}", uuid::Uuid::new_v4());
        let receiver = InProcessReceiveTransport::new(&contract);
        receiver.connect(Arc::new(GreeterAdapter)).await.unwrap();

        let dispatcher = InProcessDispatchTransport::new(&contract);
        dispatcher.connect().await.unwrap();

        let req = Request::new(
            contract.clone(),
            "say",
            vec!["string".into()],
            vec![serde_json::json!("Hello World")],
            HashMap::new(),
            None,
        );
        let resp = dispatcher.dispatch(req).await.unwrap();
        assert_eq!(resp.result, Some(serde_json::json!("Goodbye World")));

        receiver.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn dispatch_without_connect_is_not_connected_error() {
        let contract = format!("HelloService-{}", uuid::Uuid::new_v4());
        let dispatcher = InProcessDispatchTransport::new(&contract);
        let req = Request::new(contract, "say", vec![], vec![], HashMap::new(), None);
        let err = dispatcher.dispatch(req).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn dispatch_with_no_receiver_is_not_connected_error() {
        let contract = format!("HelloService-{}", uuid::Uuid::new_v4());
        let dispatcher = InProcessDispatchTransport::new(&contract);
        dispatcher.connect().await.unwrap();
        let req = Request::new(contract, "say", vec![], vec![], HashMap::new(), None);
        let err = dispatcher.dispatch(req).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotConnected);
    }
}
