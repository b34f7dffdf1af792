//! Method Routing
//!
//! A lookup table from JSON-RPC method names to handlers, built once at
//! startup. Application code plugs in either per-method route closures or a
//! catch-all [`Handler`] implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::protocol::ResponseError;
use crate::session::Session;

/// One inbound request or notification, with the connection's session
/// attached.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub connection_id: u64,
    pub method: String,
    pub params: Option<Value>,
    pub session: Arc<Session>,
}

/// The collaborator interface supplied by the application routing layer.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, exchange: Exchange) -> Result<Value, ResponseError>;
}

type RouteFn =
    Box<dyn Fn(Exchange) -> BoxFuture<'static, Result<Value, ResponseError>> + Send + Sync>;

#[derive(Default)]
pub struct Router {
    routes: HashMap<String, RouteFn>,
    fallback: Option<Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler closure for one method name.
    pub fn route<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ResponseError>> + Send + 'static,
    {
        self.routes
            .insert(method.into(), Box::new(move |exchange| Box::pin(handler(exchange))));
        self
    }

    /// Register a catch-all handler for methods without a dedicated route.
    pub fn fallback(mut self, handler: Arc<dyn Handler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn has_route(&self, method: &str) -> bool {
        self.routes.contains_key(method)
    }

    pub async fn dispatch(&self, exchange: Exchange) -> Result<Value, ResponseError> {
        if let Some(route) = self.routes.get(&exchange.method) {
            return route(exchange).await;
        }
        if let Some(handler) = &self.fallback {
            return handler.handle(exchange).await;
        }
        Err(ResponseError::method_not_found(&exchange.method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::error_codes;
    use crate::session::SessionStore;

    fn exchange(method: &str, params: Option<Value>) -> Exchange {
        Exchange {
            connection_id: 1,
            method: method.to_string(),
            params,
            session: SessionStore::default().create(),
        }
    }

    #[tokio::test]
    async fn test_route_dispatch() {
        let router = Router::new().route("echo", |ex: Exchange| async move {
            Ok(ex.params.unwrap_or(Value::Null))
        });
        let result = router
            .dispatch(exchange("echo", Some(serde_json::json!({"x": 1}))))
            .await
            .unwrap();
        assert_eq!(result["x"], 1);
        assert!(router.has_route("echo"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let router = Router::new();
        let err = router.dispatch(exchange("nope", None)).await.unwrap_err();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fallback_handler() {
        struct EchoMethod;

        #[async_trait]
        impl Handler for EchoMethod {
            async fn handle(&self, exchange: Exchange) -> Result<Value, ResponseError> {
                Ok(Value::String(exchange.method))
            }
        }

        let router = Router::new()
            .route("direct", |_| async { Ok(Value::Bool(true)) })
            .fallback(Arc::new(EchoMethod));

        assert_eq!(
            router.dispatch(exchange("direct", None)).await.unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            router.dispatch(exchange("other", None)).await.unwrap(),
            Value::String("other".into())
        );
    }

    #[tokio::test]
    async fn test_routes_can_use_session_attributes() {
        let router = Router::new().route("remember", |ex: Exchange| async move {
            ex.session
                .set_attribute("seen", Value::Bool(true))
                .await;
            Ok(Value::Null)
        });
        let ex = exchange("remember", None);
        let session = Arc::clone(&ex.session);
        router.dispatch(ex).await.unwrap();
        assert_eq!(session.attribute("seen").await, Some(Value::Bool(true)));
    }
}
