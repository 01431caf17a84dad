//! Notification handlers.

use crate::Notification;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A unit of logic subscribed to one or more notification kinds.
///
/// Each invocation runs as its own task; a handler never sees its siblings and
/// cannot delay the publisher.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Short name used in logs and configuration.
    fn name(&self) -> &str;

    /// Process one notification.
    async fn handle(&self, notification: Arc<Notification>) -> Result<(), HandlerError>;
}

/// Failure reported by a handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// An ordinary failure. Logged and contained.
    #[error("{0}")]
    Failed(String),
    /// The environment can no longer be trusted (memory, descriptors, ...).
    /// Never contained: the process is failed fast.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this failure must escape containment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_))
    }
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Handler>
where
    F: Fn(Arc<Notification>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Arc<Notification>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, notification: Arc<Notification>) -> Result<(), HandlerError> {
        (self.f)(notification).await
    }
}
