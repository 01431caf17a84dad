//! Handler registry, composed once at startup.

use crate::{Handler, NotificationKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each notification kind to its subscribers, in registration order.
///
/// There is no way to mutate a built registry. Share it behind an `Arc`; reads
/// need no locking.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NotificationKind, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Subscribers for `kind`, in the order they were registered.
    pub fn handlers(&self, kind: NotificationKind) -> &[Arc<dyn Handler>] {
        self.handlers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of (kind, handler) entries.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for kind in NotificationKind::ALL {
            let names: Vec<&str> = self.handlers(kind).iter().map(|h| h.name()).collect();
            if !names.is_empty() {
                map.entry(&kind, &names);
            }
        }
        map.finish()
    }
}

/// Builder for [`HandlerRegistry`].
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<NotificationKind, Vec<Arc<dyn Handler>>>,
}

impl HandlerRegistryBuilder {
    /// Subscribe `handler` to `kind`. The same handler may be registered for
    /// several kinds.
    pub fn register(mut self, kind: NotificationKind, handler: Arc<dyn Handler>) -> Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}
