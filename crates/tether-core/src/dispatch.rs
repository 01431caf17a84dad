//! Fire-and-forget fan-out of notifications.

use crate::{FailFast, Handler, HandlerRegistry, Notification, Terminator};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Delivers each published notification to all of its subscribers.
///
/// Every handler runs as its own task. A failing or panicking handler is
/// logged and forgotten; its siblings and the publisher never notice. The one
/// exception is [`HandlerError::ResourceExhausted`](crate::HandlerError), which
/// is handed to the [`Terminator`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    terminator: Arc<dyn Terminator>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, terminator: Arc<dyn Terminator>) -> Self {
        Self {
            registry,
            terminator,
        }
    }

    /// Schedule `notification` on every subscriber and return immediately.
    ///
    /// Handlers are spawned in registration order; completion order is
    /// unspecified. Never fails and never waits.
    pub fn publish(&self, notification: Notification) {
        let handlers = self.registry.handlers(notification.kind());
        if handlers.is_empty() {
            tracing::trace!(kind = %notification.kind(), "no subscribers");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    ?notification,
                    "An unexpected error occurred while dispatching a notification"
                );
                return;
            }
        };

        let notification = Arc::new(notification);
        for handler in handlers {
            let task = run_handler(
                Arc::clone(handler),
                Arc::clone(&notification),
                Arc::clone(&self.terminator),
            );
            drop(runtime.spawn(task));
        }
    }
}

async fn run_handler(
    handler: Arc<dyn Handler>,
    notification: Arc<Notification>,
    terminator: Arc<dyn Terminator>,
) {
    let result = AssertUnwindSafe(handler.handle(Arc::clone(&notification)))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_fatal() => {
            terminator.terminate(FailFast::HandlerFatal {
                handler: handler.name().to_string(),
                error: e.to_string(),
            });
        }
        Ok(Err(e)) => {
            tracing::error!(
                handler = handler.name(),
                error = %e,
                ?notification,
                "An unexpected error occurred within a handler for a dispatched message"
            );
        }
        Err(panic) => {
            tracing::error!(
                handler = handler.name(),
                panic = panic_message(panic.as_ref()),
                ?notification,
                "A handler panicked while processing a dispatched message"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandlerError, NotificationKind, handler_fn};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    #[derive(Default)]
    struct RecordingTerminator {
        reasons: Mutex<Vec<FailFast>>,
    }

    impl Terminator for RecordingTerminator {
        fn terminate(&self, reason: FailFast) {
            self.reasons.lock().unwrap().push(reason);
        }
    }

    /// Counts ERROR-level events.
    #[derive(Clone, Default)]
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn capture_errors() -> (ErrorCounter, tracing::subscriber::DefaultGuard) {
        let counter = ErrorCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (counter, guard)
    }

    fn reporting(
        name: &'static str,
        tx: mpsc::UnboundedSender<&'static str>,
    ) -> Arc<dyn Handler> {
        handler_fn(name, move |_| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(name);
                Ok(())
            }
        })
    }

    fn dispatcher(registry: HandlerRegistry) -> (Dispatcher, Arc<RecordingTerminator>) {
        let terminator = Arc::new(RecordingTerminator::default());
        let dispatcher = Dispatcher::new(Arc::new(registry), terminator.clone());
        (dispatcher, terminator)
    }

    async fn collect(
        rx: &mut mpsc::UnboundedReceiver<&'static str>,
        n: usize,
    ) -> Vec<&'static str> {
        let mut seen = Vec::new();
        for _ in 0..n {
            let name = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("handler did not run")
                .unwrap();
            seen.push(name);
        }
        seen.sort_unstable();
        seen
    }

    #[tokio::test]
    async fn failing_handler_is_isolated() {
        let (errors, _guard) = capture_errors();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let failing_tx = tx.clone();
        let registry = HandlerRegistry::builder()
            .register(NotificationKind::Ready, reporting("one", tx.clone()))
            .register(
                NotificationKind::Ready,
                handler_fn("two", move |_| {
                    let tx = failing_tx.clone();
                    async move {
                        let _ = tx.send("two");
                        Err(HandlerError::failed("handler two broke"))
                    }
                }),
            )
            .register(NotificationKind::Ready, reporting("three", tx))
            .build();
        let (dispatcher, terminator) = dispatcher(registry);

        dispatcher.publish(Notification::Ready);

        assert_eq!(collect(&mut rx, 3).await, ["one", "three", "two"]);
        tokio::task::yield_now().await;
        assert_eq!(errors.0.load(Ordering::SeqCst), 1);
        assert!(terminator.reasons.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let (errors, _guard) = capture_errors();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::builder()
            .register(
                NotificationKind::Connected,
                handler_fn("panics", |_| async {
                    None::<()>.expect("handler bug");
                    Ok(())
                }),
            )
            .register(NotificationKind::Connected, reporting("survivor", tx))
            .build();
        let (dispatcher, terminator) = dispatcher(registry);

        dispatcher.publish(Notification::Connected);

        assert_eq!(collect(&mut rx, 1).await, ["survivor"]);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(errors.0.load(Ordering::SeqCst), 1);
        assert!(terminator.reasons.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_failing_handler_leaves_publisher_alone() {
        let (errors, _guard) = capture_errors();
        let mut builder = HandlerRegistry::builder();
        for _ in 0..5 {
            builder = builder.register(
                NotificationKind::Ready,
                handler_fn("broken", |_| async { Err(HandlerError::failed("nope")) }),
            );
        }
        let (dispatcher, _terminator) = dispatcher(builder.build());

        dispatcher.publish(Notification::Ready);
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(errors.0.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn resource_exhaustion_escapes_to_terminator() {
        let registry = HandlerRegistry::builder()
            .register(
                NotificationKind::Ready,
                handler_fn("hungry", |_| async {
                    Err(HandlerError::ResourceExhausted("out of memory".into()))
                }),
            )
            .build();
        let (dispatcher, terminator) = dispatcher(registry);

        dispatcher.publish(Notification::Ready);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        let reasons = terminator.reasons.lock().unwrap();
        assert_eq!(
            *reasons,
            [FailFast::HandlerFatal {
                handler: "hungry".into(),
                error: "resource exhausted: out of memory".into(),
            }]
        );
    }

    #[tokio::test]
    async fn same_notification_twice_fans_out_twice() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::builder()
            .register(NotificationKind::Ready, reporting("a", tx.clone()))
            .register(NotificationKind::Ready, reporting("b", tx))
            .build();
        let (dispatcher, _terminator) = dispatcher(registry);

        dispatcher.publish(Notification::Ready);
        dispatcher.publish(Notification::Ready);

        assert_eq!(collect(&mut rx, 4).await, ["a", "a", "b", "b"]);
    }

    #[tokio::test]
    async fn only_matching_kind_is_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = HandlerRegistry::builder()
            .register(NotificationKind::Ready, reporting("ready", tx.clone()))
            .register(NotificationKind::Connected, reporting("connected", tx))
            .build();
        let (dispatcher, _terminator) = dispatcher(registry);

        dispatcher.publish(Notification::Connected);

        assert_eq!(collect(&mut rx, 1).await, ["connected"]);
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_without_runtime_is_logged_not_raised() {
        let (errors, _guard) = capture_errors();
        let registry = HandlerRegistry::builder()
            .register(
                NotificationKind::Ready,
                handler_fn("never", |_| async { Ok(()) }),
            )
            .build();
        let (dispatcher, _terminator) = dispatcher(registry);

        dispatcher.publish(Notification::Ready);

        assert_eq!(errors.0.load(Ordering::SeqCst), 1);
    }
}
