//! Synchronous observer list for service events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use image::RgbaImage;
use parking_lot::RwLock;

use crate::error::GradingError;
use crate::models::{ColorGradingSettings, PerformanceMetrics};

#[derive(Debug, Clone)]
pub enum GradingEvent {
    SettingsChanged(ColorGradingSettings),
    PreviewUpdated(Arc<RgbaImage>),
    ProcessingStarted,
    ProcessingCompleted {
        image: Arc<RgbaImage>,
        metrics: PerformanceMetrics,
    },
    Error {
        message: String,
    },
}

impl GradingEvent {
    pub fn error(err: &GradingError) -> Self {
        GradingEvent::Error {
            message: err.to_string(),
        }
    }
}

pub type Listener = Arc<dyn Fn(&GradingEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Deliver to every listener on the calling thread. The list is copied
    /// first so a listener may subscribe or unsubscribe while being called.
    pub fn emit(&self, event: &GradingEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn delivers_until_unsubscribed() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = bus.subscribe(Arc::new(move |e| {
            if matches!(e, GradingEvent::ProcessingStarted) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));
        bus.emit(&GradingEvent::ProcessingStarted);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&GradingEvent::ProcessingStarted);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
