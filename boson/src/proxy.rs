//! Client-side invocation pipeline: turns a typed method call into a
//! [`Request`], hands it to a transport, and resolves the typed result
//! from the [`Response`] (§4.2).

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::context::{default_provider, SharedContextProvider};
use crate::envelope::{Request, Value};
use crate::error::{BosonError, ErrorKind, Result};
use crate::service::decode_argument;
use crate::transports::DispatchTransport;

/// Generic, contract-agnostic client proxy. `#[boson_macros::service]`
/// generates a thin typed wrapper per trait that calls
/// [`ClientProxy::call`] for every method (§9 "Proxy synthesis").
pub struct ClientProxy {
    service_type: String,
    transport: Arc<dyn DispatchTransport>,
    context_provider: SharedContextProvider,
    ttl: Option<Duration>,
}

impl ClientProxy {
    pub fn new(
        service_type: impl Into<String>,
        transport: Arc<dyn DispatchTransport>,
        ttl: Option<Duration>,
    ) -> Self {
        ClientProxy {
            service_type: service_type.into(),
            transport,
            context_provider: default_provider(),
            ttl,
        }
    }

    pub fn with_context_provider(mut self, context_provider: SharedContextProvider) -> Self {
        self.context_provider = context_provider;
        self
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Builds a `Request` for `method_name`, dispatches it, and decodes
    /// the typed result.
    ///
    /// Context handling (§4.2): the caller's ambient context is snapshotted
    /// at call-start and placed on the request; once the transport's
    /// dispatch resolves (possibly on a different executor thread -- "threads
    /// may have changed"), the snapshot is reinstated so the calling logical
    /// flow sees its own context again, regardless of which thread resumes it.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method_name: &str,
        argument_types: Vec<String>,
        arguments: Vec<Value>,
    ) -> Result<T> {
        let context = self.context_provider.get();
        let request = Request::new(
            self.service_type.clone(),
            method_name,
            argument_types,
            arguments,
            context.clone(),
            self.ttl,
        );

        let response = self.transport.dispatch(request).await?;

        self.context_provider.set(context);

        if let Some(error) = response.error {
            return Err(error.into());
        }
        let result = response.result.ok_or_else(|| {
            BosonError::new(
                ErrorKind::Contract,
                "response carried neither a result nor an error",
            )
        })?;
        decode_argument(result, std::any::type_name::<T>())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.transport.disconnect().await
    }
}
