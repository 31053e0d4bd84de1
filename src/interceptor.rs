//! Interceptor Chain (C6): outbound/inbound/event middleware around the client's traffic.
//!
//! Built as an object-safe async trait stored behind `Arc<dyn Trait>`, so a chain can be built
//! once at construction time and shared across tasks without cloning its state.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::err::GatewayError;
use crate::event::GatewayEvent;
use crate::frame::RequestFrame;

/// A single stage of middleware. Every method has a passthrough default so an interceptor only
/// needs to implement the stage(s) it cares about.
///
/// Short-circuit semantics: returning `Err` aborts the remainder of the chain for
/// that stage and propagates to the caller (outbound: the `send`/RPC call fails before anything
/// reaches the wire; inbound: the frame is dropped instead of reaching the router; event: the
/// event is dropped instead of reaching subscribers).
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Runs before a request frame is serialized and written to the socket. May mutate `frame` in
    /// place (e.g. to inject tracing headers into `params`).
    async fn on_outbound(&self, _frame: &mut RequestFrame) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Runs after a frame is classified as a response but before it resolves the pending waiter.
    /// May mutate `value` in place.
    async fn on_inbound(&self, _value: &mut Value) -> Result<(), GatewayError> {
        Ok(())
    }

    /// Runs after a frame is classified as an event but before it reaches subscribers. May mutate
    /// `event` in place.
    async fn on_event(&self, _event: &mut GatewayEvent) -> Result<(), GatewayError> {
        Ok(())
    }

    /// A short label for logging which interceptor short-circuited a chain.
    fn name(&self) -> &str {
        "interceptor"
    }
}

/// An ordered, immutable chain of interceptors.
///
/// Outbound and event stages run in registration order; the inbound stage runs in reverse
/// registration order, the usual "unwind" shape for request/response middleware (the last
/// interceptor to touch an outbound frame is the first to see its response).
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

impl InterceptorChain {
    #[must_use]
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub async fn run_outbound(&self, frame: &mut RequestFrame) -> Result<(), GatewayError> {
        for interceptor in &self.interceptors {
            if let Err(error) = interceptor.on_outbound(frame).await {
                tracing::debug!(interceptor = interceptor.name(), %error, "interceptor: outbound short-circuit");
                return Err(error);
            }
        }
        Ok(())
    }

    pub async fn run_inbound(&self, value: &mut Value) -> Result<(), GatewayError> {
        for interceptor in self.interceptors.iter().rev() {
            if let Err(error) = interceptor.on_inbound(value).await {
                tracing::debug!(interceptor = interceptor.name(), %error, "interceptor: inbound short-circuit");
                return Err(error);
            }
        }
        Ok(())
    }

    pub async fn run_event(&self, event: &mut GatewayEvent) -> Result<(), GatewayError> {
        for interceptor in &self.interceptors {
            if let Err(error) = interceptor.on_event(event).await {
                tracing::debug!(interceptor = interceptor.name(), %error, "interceptor: event short-circuit");
                return Err(error);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingInterceptor {
        tag: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Interceptor for RecordingInterceptor {
        async fn on_outbound(&self, _frame: &mut RequestFrame) -> Result<(), GatewayError> {
            self.order.lock().unwrap().push(self.tag);
            Ok(())
        }

        async fn on_inbound(&self, _value: &mut Value) -> Result<(), GatewayError> {
            self.order.lock().unwrap().push(self.tag);
            Ok(())
        }

        fn name(&self) -> &str {
            self.tag
        }
    }

    struct RejectingInterceptor;

    #[async_trait]
    impl Interceptor for RejectingInterceptor {
        async fn on_outbound(&self, _frame: &mut RequestFrame) -> Result<(), GatewayError> {
            Err(GatewayError::protocol("blocked by policy"))
        }
    }

    fn frame() -> RequestFrame {
        RequestFrame::new(Uuid::nil(), "health", None)
    }

    #[tokio::test]
    async fn outbound_runs_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(RecordingInterceptor { tag: "a", order: order.clone() }),
            Arc::new(RecordingInterceptor { tag: "b", order: order.clone() }),
        ]);
        chain.run_outbound(&mut frame()).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn inbound_runs_in_reverse_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(RecordingInterceptor { tag: "a", order: order.clone() }),
            Arc::new(RecordingInterceptor { tag: "b", order: order.clone() }),
        ]);
        let mut value = Value::Null;
        chain.run_inbound(&mut value).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn outbound_short_circuits_on_error() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(RejectingInterceptor),
            Arc::new(RecordingInterceptor { tag: "never", order: order.clone() }),
        ]);
        let result = chain.run_outbound(&mut frame()).await;
        assert!(result.is_err());
        assert!(order.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_chain_is_a_passthrough() {
        let chain = InterceptorChain::empty();
        chain.run_outbound(&mut frame()).await.unwrap();
        let mut value = Value::Null;
        chain.run_inbound(&mut value).await.unwrap();
    }
}
