//! Routing of provider callbacks to collectors.
//!
//! Every collector owns one [`RequestKind`]. At startup each registers its
//! handler in the [`RequestRegistry`]; the frozen registry is then moved into
//! the [`EventDispatcher`], whose sink is installed into the provider.

use crate::defs::SCREEN_ROTATION;
use crate::errors::RegistryError;
use crate::provider::{DataEvent, EventSink, ProviderEvent};
use crate::session::Handshake;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handler invoked on the provider's callback thread with one page of data.
///
/// Handlers must be fast and must not block: they only copy rows into the
/// pending request and wake the waiting collector.
pub type Handler = Arc<dyn Fn(DataEvent) + Send + Sync + 'static>;

/// Fixed identity of a query type on the provider side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Correlation key echoed back by the provider.
    pub request_name: &'static str,
    /// Provider query identifier.
    pub query_id: &'static str,
    /// First screen number of this kind's rotation.
    pub screen_base: u32,
}

impl RequestDescriptor {
    /// Screen number for the `call`-th request of this kind.
    ///
    /// Consecutive calls land on different screens, `100` apart, wrapping
    /// after [`SCREEN_ROTATION`] calls.
    pub fn screen_for(&self, call: u32) -> String {
        format!("{:04}", self.screen_base + (call % SCREEN_ROTATION) * 100)
    }
}

/// The query types the gateway knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Daily closing price series.
    DailyPrice,
    /// Daily short-sale statistics.
    ShortSale,
    /// Constituents of a theme.
    ThemeConstituents,
    /// Theme group ranking.
    ThemeGroups,
    /// Net buying per investor class.
    InvestorFlow,
}

impl RequestKind {
    /// Every request kind, in registration order.
    pub const ALL: [RequestKind; 5] = [
        RequestKind::DailyPrice,
        RequestKind::ShortSale,
        RequestKind::ThemeConstituents,
        RequestKind::ThemeGroups,
        RequestKind::InvestorFlow,
    ];

    /// Provider-side identity of this kind.
    pub const fn descriptor(&self) -> RequestDescriptor {
        match self {
            RequestKind::DailyPrice => RequestDescriptor {
                request_name: "opt10081_req",
                query_id: "opt10081",
                screen_base: 101,
            },
            RequestKind::ShortSale => RequestDescriptor {
                request_name: "opt10014_req",
                query_id: "opt10014",
                screen_base: 102,
            },
            RequestKind::ThemeConstituents => RequestDescriptor {
                request_name: "opt90002_req",
                query_id: "opt90002",
                screen_base: 103,
            },
            RequestKind::ThemeGroups => RequestDescriptor {
                request_name: "opt90001_req",
                query_id: "opt90001",
                screen_base: 104,
            },
            RequestKind::InvestorFlow => RequestDescriptor {
                request_name: "rq_opt10059",
                query_id: "opt10059",
                screen_base: 107,
            },
        }
    }

    /// Request name the provider uses to correlate callbacks.
    pub const fn request_name(&self) -> &'static str {
        self.descriptor().request_name
    }

    /// Resolves a callback's request name back to its kind.
    pub fn from_request_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.request_name() == name)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.request_name())
    }
}

/// Request kind to handler table, built once at startup.
#[derive(Default)]
pub struct RequestRegistry {
    handlers: HashMap<RequestKind, Handler>,
}

impl RequestRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `kind`.
    ///
    /// # Errors
    /// [`RegistryError::DuplicateRequestName`] if `kind` already has a handler.
    pub fn register(&mut self, kind: RequestKind, handler: Handler) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&kind) {
            log::error!("Duplicate handler registration for {}", kind);
            return Err(RegistryError::DuplicateRequestName(
                kind.request_name().to_string(),
            ));
        }
        log::debug!("Registered handler for {}", kind);
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn get(&self, kind: RequestKind) -> Option<&Handler> {
        self.handlers.get(&kind)
    }
}

impl fmt::Debug for RequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Single entry point for all provider callbacks.
#[derive(Debug)]
pub struct EventDispatcher {
    registry: RequestRegistry,
    handshake: Arc<Handshake>,
}

impl EventDispatcher {
    /// Freezes `registry` and binds the session handshake.
    pub fn new(registry: RequestRegistry, handshake: Arc<Handshake>) -> Self {
        Self {
            registry,
            handshake,
        }
    }

    /// Routes one provider event.
    ///
    /// Data for unknown request names, or for kinds without a handler, is
    /// logged and dropped.
    pub fn on_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::Connected { code } => self.handshake.complete(code),
            ProviderEvent::Data(data) => {
                let handler = RequestKind::from_request_name(&data.request_name)
                    .and_then(|kind| self.registry.get(kind));
                match handler {
                    Some(handler) => handler(data),
                    None => log::warn!(
                        "No handler registered for {}, dropping {} rows",
                        data.request_name,
                        data.rows.len()
                    ),
                }
            }
        }
    }

    /// Converts the dispatcher into the sink installed into the provider.
    pub fn into_sink(self) -> EventSink {
        let dispatcher = Arc::new(self);
        Arc::new(move |event| dispatcher.on_event(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, RawRow};
    use crate::session::{Session, SessionState};
    use crate::test_support::ScriptedProvider;
    use std::sync::Mutex;

    fn recording_handler() -> (Handler, Arc<Mutex<Vec<DataEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let handler: Handler = Arc::new(move |event| seen_clone.lock().unwrap().push(event));
        (handler, seen)
    }

    fn data(name: &str) -> ProviderEvent {
        ProviderEvent::Data(DataEvent {
            request_name: name.to_string(),
            screen_id: "0101".to_string(),
            rows: vec![RawRow::new().with("일자", "20240102")],
            continuation: None,
        })
    }

    #[test]
    fn test_request_name_round_trip() {
        for kind in RequestKind::ALL {
            assert_eq!(RequestKind::from_request_name(kind.request_name()), Some(kind));
        }
        assert_eq!(RequestKind::from_request_name("opt99999_req"), None);
    }

    #[test]
    fn test_screen_rotation() {
        let theme = RequestKind::ThemeConstituents.descriptor();
        assert_eq!(theme.screen_for(0), "0103");
        assert_eq!(theme.screen_for(1), "0203");
        assert_eq!(theme.screen_for(SCREEN_ROTATION - 1), "5003");
        assert_eq!(theme.screen_for(SCREEN_ROTATION), "0103");

        let flow = RequestKind::InvestorFlow.descriptor();
        assert_eq!(flow.screen_for(7), "0807");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = RequestRegistry::new();
        let (handler, _) = recording_handler();
        registry.register(RequestKind::ShortSale, handler.clone()).unwrap();

        let err = registry.register(RequestKind::ShortSale, handler).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateRequestName("opt10014_req".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_routes_by_request_name() {
        let session = Session::new(Arc::new(ScriptedProvider::new()));
        let mut registry = RequestRegistry::new();
        let (price, price_seen) = recording_handler();
        let (short, short_seen) = recording_handler();
        registry.register(RequestKind::DailyPrice, price).unwrap();
        registry.register(RequestKind::ShortSale, short).unwrap();

        let dispatcher = EventDispatcher::new(registry, session.handshake());
        dispatcher.on_event(data("opt10014_req"));

        assert!(price_seen.lock().unwrap().is_empty());
        assert_eq!(short_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_and_unregistered_names_dropped() {
        let session = Session::new(Arc::new(ScriptedProvider::new()));
        let mut registry = RequestRegistry::new();
        let (price, price_seen) = recording_handler();
        registry.register(RequestKind::DailyPrice, price).unwrap();

        let dispatcher = EventDispatcher::new(registry, session.handshake());
        dispatcher.on_event(data("stale_req"));
        dispatcher.on_event(data("rq_opt10059"));

        assert!(price_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_connect_event_reaches_handshake() {
        let provider = Arc::new(ScriptedProvider::new());
        let session = Session::new(provider.clone());
        let dispatcher = EventDispatcher::new(RequestRegistry::new(), session.handshake());
        provider.install_sink(dispatcher.into_sink());

        session.connect(std::time::Duration::from_secs(1)).unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
    }
}
