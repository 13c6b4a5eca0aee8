//! Holds every connected client proxy and receiver in this process,
//! disallows duplicate registrations, and orchestrates teardown (§4.8).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{BosonError, Result};
use crate::executor::SharedExecutor;
use crate::proxy::ClientProxy;
use crate::service::ServiceAdapter;
use crate::transports::{DispatchTransport, ReceiveTransport};

/// A connected receiver: the transport that keeps it reachable, held only
/// long enough to be disconnected later.
struct RegisteredReceiver {
    transport: Arc<dyn ReceiveTransport>,
}

/// Two maps keyed by service contract identifier, plus the shared
/// executor every transport factory is handed. Owns every `ClientProxy`
/// and `Receiver` it creates; never owns the executor (§3 "Ownership").
pub struct Registry {
    executor: SharedExecutor,
    receivers: DashMap<String, RegisteredReceiver>,
    proxies: DashMap<String, Arc<ClientProxy>>,
}

impl Registry {
    pub fn new(executor: SharedExecutor) -> Self {
        Registry {
            executor,
            receivers: DashMap::new(),
            proxies: DashMap::new(),
        }
    }

    pub fn executor(&self) -> SharedExecutor {
        self.executor.clone()
    }

    /// Registers `adapter` as the implementation for `contract`, built and
    /// connected via `transport_factory`. Rejects a duplicate contract
    /// with `AlreadyRegisteredError`, leaving the first registration
    /// functional (§8 "Duplicate-registration rejection").
    pub async fn implement(
        &self,
        contract: &str,
        adapter: Arc<dyn ServiceAdapter>,
        transport: Arc<dyn ReceiveTransport>,
    ) -> Result<()> {
        if self.receivers.contains_key(contract) {
            return Err(BosonError::already_registered(contract));
        }

        transport.connect(adapter).await?;

        match self.receivers.entry(contract.to_string()) {
            Entry::Occupied(_) => {
                let _ = transport.disconnect().await;
                Err(BosonError::already_registered(contract))
            }
            Entry::Vacant(slot) => {
                tracing::info!(contract, "receiver connected");
                slot.insert(RegisteredReceiver { transport });
                Ok(())
            }
        }
    }

    /// Creates and connects a dispatcher for `contract` via
    /// `transport_factory`, wraps it in a [`ClientProxy`], and inserts it.
    /// Rejects a duplicate contract with `AlreadyRegisteredError`.
    pub async fn consume(
        &self,
        contract: &str,
        transport: Arc<dyn DispatchTransport>,
        request_ttl: Option<std::time::Duration>,
    ) -> Result<Arc<ClientProxy>> {
        if self.proxies.contains_key(contract) {
            return Err(BosonError::already_registered(contract));
        }

        transport.connect().await?;
        let proxy = Arc::new(ClientProxy::new(contract, transport.clone(), request_ttl));

        match self.proxies.entry(contract.to_string()) {
            Entry::Occupied(_) => {
                let _ = transport.disconnect().await;
                Err(BosonError::already_registered(contract))
            }
            Entry::Vacant(slot) => {
                tracing::info!(contract, "client proxy connected");
                slot.insert(proxy.clone());
                Ok(proxy)
            }
        }
    }

    /// Disconnects every receiver and every dispatcher in parallel;
    /// completes only after all have torn down (§4.8). The executor
    /// itself is never shut down here -- it is a shared, non-owning
    /// reference the caller supplied (see `DESIGN.md`).
    pub async fn disconnect_all(&self) -> Result<()> {
        let receiver_transports: Vec<Arc<dyn ReceiveTransport>> = self
            .receivers
            .iter()
            .map(|entry| entry.value().transport.clone())
            .collect();
        let proxy_transports: Vec<Arc<ClientProxy>> =
            self.proxies.iter().map(|entry| entry.value().clone()).collect();

        let receiver_futures = receiver_transports
            .into_iter()
            .map(|t| async move { t.disconnect().await });
        let proxy_futures = proxy_transports
            .into_iter()
            .map(|p| async move { p.disconnect().await });

        let (receiver_results, proxy_results) = futures::future::join(
            futures::future::join_all(receiver_futures),
            futures::future::join_all(proxy_futures),
        )
        .await;

        self.receivers.clear();
        self.proxies.clear();

        for result in receiver_results.into_iter().chain(proxy_results) {
            result?;
        }
        Ok(())
    }

    pub fn is_implemented(&self, contract: &str) -> bool {
        self.receivers.contains_key(contract)
    }

    pub fn proxy(&self, contract: &str) -> Option<Arc<ClientProxy>> {
        self.proxies.get(contract).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use crate::transports::in_process::{InProcessDispatchTransport, InProcessReceiveTransport};
    use async_trait::async_trait;

    struct NoopAdapter;

    #[async_trait]
    impl ServiceAdapter for NoopAdapter {
        fn contract_name(&self) -> &'static str {
            "NoopService"
        }
        async fn dispatch(
            &self,
            _method_name: &str,
            _argument_types: &[String],
            _arguments: Vec<crate::envelope::Value>,
        ) -> Result<crate::envelope::Value> {
            Ok(serde_json::json!(null))
        }
    }

    fn registry() -> Registry {
        Registry::new(Arc::new(TokioExecutor::current()))
    }

    #[tokio::test]
    async fn duplicate_implement_is_rejected_and_first_stays_functional() {
        let contract = format!("NoopService-{}", uuid::Uuid::new_v4());
        let registry = registry();

        registry
            .implement(
                &contract,
                Arc::new(NoopAdapter),
                Arc::new(InProcessReceiveTransport::new(&contract)),
            )
            .await
            .unwrap();

        let err = registry
            .implement(
                &contract,
                Arc::new(NoopAdapter),
                Arc::new(InProcessReceiveTransport::new(&contract)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::AlreadyRegistered);
        assert!(registry.is_implemented(&contract));
    }

    #[tokio::test]
    async fn duplicate_consume_is_rejected() {
        let contract = format!("NoopService-{}", uuid::Uuid::new_v4());
        let registry = registry();

        registry
            .consume(
                &contract,
                Arc::new(InProcessDispatchTransport::new(&contract)),
                None,
            )
            .await
            .unwrap();

        let err = registry
            .consume(
                &contract,
                Arc::new(InProcessDispatchTransport::new(&contract)),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::AlreadyRegistered);
    }

    #[tokio::test]
    async fn disconnect_all_clears_both_maps() {
        let contract = format!("NoopService-{}", uuid::Uuid::new_v4());
        let registry = registry();
        registry
            .implement(
                &contract,
                Arc::new(NoopAdapter),
                Arc::new(InProcessReceiveTransport::new(&contract)),
            )
            .await
            .unwrap();
        registry
            .consume(
                &contract,
                Arc::new(InProcessDispatchTransport::new(&contract)),
                None,
            )
            .await
            .unwrap();

        registry.disconnect_all().await.unwrap();
        assert!(!registry.is_implemented(&contract));
        assert!(registry.proxy(&contract).is_none());
    }
}
