//! Host environment signals
//!
//! The tracker never registers implicit global listeners. It subscribes
//! through a [`HostEnvironment`] and holds the returned [`Subscription`]
//! handles; dropping a handle detaches the listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::ClientMetadata;

/// Viewport scroll position at one scroll tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    /// Distance scrolled from the top, in pixels
    pub scroll_top: f64,
    /// Total scrollable content height, in pixels
    pub scroll_height: f64,
    /// Visible viewport height, in pixels
    pub viewport_height: f64,
}

/// Page visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// A signal raised by the host environment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostSignal {
    Scroll(ScrollPosition),
    Visibility(Visibility),
    /// The host is about to unload the page
    Unload,
}

/// Signal categories a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Scroll,
    Visibility,
    Unload,
}

impl HostSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            HostSignal::Scroll(_) => SignalKind::Scroll,
            HostSignal::Visibility(_) => SignalKind::Visibility,
            HostSignal::Unload => SignalKind::Unload,
        }
    }
}

/// Listener callback
pub type SignalHandler = Arc<dyn Fn(&HostSignal) + Send + Sync>;

/// The application environment the tracker observes.
///
/// The tracker calls [`subscribe`](Self::subscribe) and drops
/// [`Subscription`]s while holding its session lock. Implementations must
/// not deliver signals from inside `subscribe` or from a detach closure, and
/// must not hold a lock that detaching needs while running handlers.
pub trait HostEnvironment: Send + Sync {
    /// Static environment facts, captured once per session
    fn client_metadata(&self) -> ClientMetadata;

    /// Screen the host is currently showing, if known
    fn current_path(&self) -> Option<String>;

    /// Register `handler` for signals of `kind`
    fn subscribe(&self, kind: SignalKind, handler: SignalHandler) -> Subscription;
}

/// Handle for a registered listener; the listener is removed on drop.
#[must_use = "dropping a Subscription detaches the listener immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach the listener now
    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

struct Listener {
    id: u64,
    kind: SignalKind,
    handler: SignalHandler,
}

struct BusInner {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
    client_metadata: Mutex<ClientMetadata>,
    current_path: Mutex<Option<String>>,
}

/// In-process [`HostEnvironment`] driven by the host application.
///
/// The host forwards its native scroll, visibility and unload callbacks
/// through [`HostBus::emit`]. Clones share the same listener registry.
#[derive(Clone)]
pub struct HostBus {
    inner: Arc<BusInner>,
}

impl Default for HostBus {
    fn default() -> Self {
        Self::new(ClientMetadata::default())
    }
}

impl HostBus {
    pub fn new(client_metadata: ClientMetadata) -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                client_metadata: Mutex::new(client_metadata),
                current_path: Mutex::new(None),
            }),
        }
    }

    /// Set the screen reported by [`HostEnvironment::current_path`]
    pub fn set_current_path(&self, path: Option<String>) {
        *self.inner.current_path.lock() = path;
    }

    pub fn set_client_metadata(&self, metadata: ClientMetadata) {
        *self.inner.client_metadata.lock() = metadata;
    }

    /// Deliver `signal` to every listener of its kind.
    ///
    /// Handlers run after the registry lock is released, so a handler may
    /// subscribe or unsubscribe. Returns the number of handlers invoked.
    pub fn emit(&self, signal: HostSignal) -> usize {
        let kind = signal.kind();
        let handlers: Vec<SignalHandler> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| Arc::clone(&l.handler))
            .collect();

        for handler in &handlers {
            handler(&signal);
        }
        handlers.len()
    }

    /// Number of listeners currently attached for `kind`
    pub fn listener_count(&self, kind: SignalKind) -> usize {
        self.inner
            .listeners
            .lock()
            .iter()
            .filter(|l| l.kind == kind)
            .count()
    }
}

impl HostEnvironment for HostBus {
    fn client_metadata(&self) -> ClientMetadata {
        self.inner.client_metadata.lock().clone()
    }

    fn current_path(&self) -> Option<String> {
        self.inner.current_path.lock().clone()
    }

    fn subscribe(&self, kind: SignalKind, handler: SignalHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push(Listener { id, kind, handler });

        let registry: Weak<BusInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = registry.upgrade() {
                inner.listeners.lock().retain(|l| l.id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, SignalHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handler: SignalHandler = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn test_emit_reaches_matching_kind_only() {
        let bus = HostBus::default();
        let (unloads, handler) = counter();
        let _sub = bus.subscribe(SignalKind::Unload, handler);

        assert_eq!(bus.emit(HostSignal::Visibility(Visibility::Hidden)), 0);
        assert_eq!(bus.emit(HostSignal::Unload), 1);
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_detaches_listener() {
        let bus = HostBus::default();
        let (count, handler) = counter();
        let sub = bus.subscribe(SignalKind::Scroll, handler);
        assert_eq!(bus.listener_count(SignalKind::Scroll), 1);

        drop(sub);
        assert_eq!(bus.listener_count(SignalKind::Scroll), 0);

        bus.emit(HostSignal::Scroll(ScrollPosition {
            scroll_top: 10.0,
            scroll_height: 100.0,
            viewport_height: 50.0,
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_is_explicit_and_single_shot() {
        let bus = HostBus::default();
        let (_, first) = counter();
        let (_, second) = counter();
        let a = bus.subscribe(SignalKind::Visibility, first);
        let _b = bus.subscribe(SignalKind::Visibility, second);

        a.unsubscribe();
        assert_eq!(bus.listener_count(SignalKind::Visibility), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_emit() {
        let bus = HostBus::default();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner_slot = Arc::clone(&slot);
        let handler: SignalHandler = Arc::new(move |_| {
            inner_slot.lock().take();
        });
        *slot.lock() = Some(bus.subscribe(SignalKind::Unload, handler));

        assert_eq!(bus.emit(HostSignal::Unload), 1);
        assert_eq!(bus.listener_count(SignalKind::Unload), 0);
    }

    #[test]
    fn test_subscription_outliving_bus_is_harmless() {
        let (_, handler) = counter();
        let sub = {
            let bus = HostBus::default();
            bus.subscribe(SignalKind::Unload, handler)
        };
        drop(sub);
    }

    #[test]
    fn test_current_path_and_metadata() {
        let bus = HostBus::default();
        assert_eq!(bus.current_path(), None);
        bus.set_current_path(Some("/home".to_string()));
        assert_eq!(bus.current_path().as_deref(), Some("/home"));
        assert_eq!(bus.client_metadata().platform, "unknown");
    }
}
