//! Server-side invocation pipeline: resolves an inbound [`Request`] to a
//! callable on a held implementation, invokes it, and produces a
//! [`Response`] (§4.3). Response construction never fails -- failures are
//! captured into the response itself.

use std::sync::Arc;

use crate::context::{default_provider, SharedContextProvider};
use crate::envelope::{Request, Response};
use crate::service::ServiceAdapter;

/// Wraps a generated [`ServiceAdapter`] with the ambient-context
/// install/restore dance described in §4.3 and §6.
pub struct ReceiverCore {
    adapter: Arc<dyn ServiceAdapter>,
    context_provider: SharedContextProvider,
}

impl ReceiverCore {
    pub fn new(adapter: Arc<dyn ServiceAdapter>) -> Self {
        ReceiverCore {
            adapter,
            context_provider: default_provider(),
        }
    }

    pub fn with_context_provider(
        adapter: Arc<dyn ServiceAdapter>,
        context_provider: SharedContextProvider,
    ) -> Self {
        ReceiverCore {
            adapter,
            context_provider,
        }
    }

    /// The contract this receiver was generated for. Used by the
    /// in-process transport to key its process-wide lookup.
    pub fn contract_name(&self) -> &'static str {
        self.adapter.contract_name()
    }

    /// Resolves, installs context, invokes, and produces a `Response`.
    /// Never panics on an application-level failure -- those become
    /// `Response::fail`.
    pub async fn apply(&self, request: Request) -> Response {
        let previous = self.context_provider.get();
        self.context_provider.set(request.context.clone());

        let outcome = self
            .adapter
            .dispatch(&request.method_name, &request.argument_types, request.arguments.clone())
            .await;

        self.context_provider.set(previous);

        match outcome {
            Ok(value) => Response::ok(&request, value),
            Err(err) => Response::fail(&request, err.to_remote()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BosonError, ErrorKind, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EchoAdapter;

    #[async_trait]
    impl ServiceAdapter for EchoAdapter {
        fn contract_name(&self) -> &'static str {
            "EchoService"
        }

        async fn dispatch(
            &self,
            method_name: &str,
            _argument_types: &[String],
            arguments: Vec<crate::envelope::Value>,
        ) -> Result<crate::envelope::Value> {
            match method_name {
                "echo" => Ok(arguments.into_iter().next().unwrap()),
                "boom" => Err(BosonError::new(ErrorKind::Invocation, "kaboom")),
                _ => Err(BosonError::resolution(method_name, &[])),
            }
        }
    }

    #[tokio::test]
    async fn successful_dispatch_produces_an_ok_response() {
        let core = ReceiverCore::new(Arc::new(EchoAdapter));
        let req = Request::new(
            "EchoService",
            "echo",
            vec!["string".into()],
            vec![serde_json::json!("hi")],
            HashMap::new(),
            None,
        );
        let resp = core.apply(req.clone()).await;
        assert_eq!(resp.id, req.id);
        assert!(resp.is_success());
        assert_eq!(resp.result, Some(serde_json::json!("hi")));
    }

    #[tokio::test]
    async fn implementation_failure_is_captured_not_propagated() {
        let core = ReceiverCore::new(Arc::new(EchoAdapter));
        let req = Request::new("EchoService", "boom", vec![], vec![], HashMap::new(), None);
        let resp = core.apply(req).await;
        assert!(!resp.is_success());
        assert_eq!(resp.error.unwrap().kind, ErrorKind::Invocation);
    }

    #[tokio::test]
    async fn unresolvable_method_yields_a_resolution_error_response() {
        let core = ReceiverCore::new(Arc::new(EchoAdapter));
        let req = Request::new("EchoService", "missing", vec![], vec![], HashMap::new(), None);
        let resp = core.apply(req).await;
        assert_eq!(resp.error.unwrap().kind, ErrorKind::Resolution);
    }

    #[tokio::test]
    async fn context_is_installed_during_dispatch_and_restored_after() {
        struct ContextCheckingAdapter {
            seen: std::sync::Mutex<Option<HashMap<String, String>>>,
        }

        #[async_trait]
        impl ServiceAdapter for ContextCheckingAdapter {
            fn contract_name(&self) -> &'static str {
                "CtxService"
            }
            async fn dispatch(
                &self,
                _method_name: &str,
                _argument_types: &[String],
                _arguments: Vec<crate::envelope::Value>,
            ) -> Result<crate::envelope::Value> {
                *self.seen.lock().unwrap() = Some(crate::context::default_provider().get());
                Ok(serde_json::json!(null))
            }
        }

        let provider = crate::context::default_provider();
        let mut outer = HashMap::new();
        outer.insert("outer".to_string(), "1".to_string());
        provider.set(outer.clone());

        let adapter = Arc::new(ContextCheckingAdapter {
            seen: std::sync::Mutex::new(None),
        });
        let core = ReceiverCore::new(adapter.clone());

        let mut req_ctx = HashMap::new();
        req_ctx.insert("tenant".to_string(), "acme".to_string());
        let req = Request::new("CtxService", "whatever", vec![], vec![], req_ctx.clone(), None);
        core.apply(req).await;

        assert_eq!(*adapter.seen.lock().unwrap(), Some(req_ctx));
        assert_eq!(provider.get(), outer);
    }
}
