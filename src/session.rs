//! The single logical session with the provider.
//!
//! A [`Session`] performs the login handshake once and then hands out
//! [`SessionLease`]s. A lease is the only way to send a data request, and
//! only one lease exists at a time, so at most one request is in flight.

use crate::errors::SessionError;
use crate::provider::{OutboundRequest, Provider};

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of the provider session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, login not requested yet.
    Disconnected,
    /// Login requested, waiting for the provider callback.
    Connecting,
    /// Login succeeded; requests may be issued.
    Authenticated,
    /// Login failed with the given provider code.
    Failed(i32),
}

impl SessionState {
    /// Lower-case label used in status payloads.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticated => "authenticated",
            SessionState::Failed(_) => "failed",
        }
    }
}

/// Login state shared between the session and the event dispatcher.
///
/// The dispatcher reports the provider's connect callback here; the session
/// waits on it.
#[derive(Debug)]
pub struct Handshake {
    state: Mutex<SessionState>,
    changed: Condvar,
}

impl Handshake {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Disconnected),
            changed: Condvar::new(),
        }
    }

    /// Records the provider's login result and wakes the waiting session.
    ///
    /// Callbacks that arrive outside of a pending login are logged and ignored.
    pub fn complete(&self, code: i32) {
        let mut state = self.state.lock();
        if *state != SessionState::Connecting {
            log::warn!(
                "Ignoring connect callback (code {}) in state {:?}",
                code,
                *state
            );
            return;
        }
        *state = if code == 0 {
            log::info!("Provider login succeeded");
            SessionState::Authenticated
        } else {
            log::error!("Provider login failed (code {})", code);
            SessionState::Failed(code)
        };
        self.changed.notify_all();
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }
}

/// The provider session. Exactly one exists per process; it is constructed
/// explicitly at startup and shared by reference.
#[derive(Debug)]
pub struct Session {
    provider: Arc<dyn Provider>,
    handshake: Arc<Handshake>,
    exchange: Mutex<()>,
}

impl Session {
    /// Wraps a provider. No call is made until [`connect`](Self::connect).
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            handshake: Arc::new(Handshake::new()),
            exchange: Mutex::new(()),
        }
    }

    /// Handshake handle to give to the event dispatcher.
    pub fn handshake(&self) -> Arc<Handshake> {
        self.handshake.clone()
    }

    /// The underlying provider, for read-only calls such as instrument listing.
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.handshake.state()
    }

    /// Issues the login handshake and blocks until the provider reports the
    /// result or `timeout` elapses.
    ///
    /// # Errors
    /// * [`SessionError::AlreadyStarted`] if the session was connected before.
    /// * [`SessionError::Authentication`] if the provider rejects the login.
    /// * [`SessionError::ConnectTimeout`] if no callback arrives in time.
    pub fn connect(&self, timeout: Duration) -> Result<(), SessionError> {
        {
            let mut state = self.handshake.state.lock();
            if *state != SessionState::Disconnected {
                return Err(SessionError::AlreadyStarted);
            }
            *state = SessionState::Connecting;
        }

        log::info!("Requesting provider login");
        // The lock is released here: a provider may report the result from
        // inside comm_connect.
        if let Err(e) = self.provider.comm_connect() {
            *self.handshake.state.lock() = SessionState::Failed(-1);
            return Err(e.into());
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.handshake.state.lock();
        while *state == SessionState::Connecting {
            if self
                .handshake
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }

        match *state {
            SessionState::Authenticated => Ok(()),
            SessionState::Failed(code) => Err(SessionError::Authentication { code }),
            _ => {
                *state = SessionState::Failed(-1);
                log::error!("Provider login timed out after {:?}", timeout);
                Err(SessionError::ConnectTimeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Blocks until the caller holds the exclusive request lease.
    pub fn lease(&self) -> SessionLease<'_> {
        let guard = self.exchange.lock();
        SessionLease {
            session: self,
            _guard: guard,
        }
    }
}

/// Exclusive right to talk to the provider. Dropping it lets the next
/// request proceed.
pub struct SessionLease<'a> {
    session: &'a Session,
    _guard: MutexGuard<'a, ()>,
}

impl SessionLease<'_> {
    /// Returns `true` if the lease was taken from the session owning `handshake`.
    pub(crate) fn belongs_to(&self, handshake: &Arc<Handshake>) -> bool {
        Arc::ptr_eq(&self.session.handshake, handshake)
    }

    /// Sends a request to the provider and returns immediately.
    ///
    /// # Errors
    /// [`SessionError::NotAuthenticated`] before login succeeded, or the
    /// provider's own error.
    pub fn send(&self, request: OutboundRequest) -> Result<(), SessionError> {
        if self.session.state() != SessionState::Authenticated {
            return Err(SessionError::NotAuthenticated);
        }
        log::debug!(
            "Sending {} ({}) continuation={:?}",
            request.request_name,
            request.query_id,
            request.continuation
        );
        self.session.provider.request(request)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderEvent;
    use crate::test_support::ScriptedProvider;

    fn connected_session(provider: &Arc<ScriptedProvider>) -> Session {
        let session = Session::new(provider.clone());
        let handshake = session.handshake();
        provider.install_sink(Arc::new(move |event| {
            if let ProviderEvent::Connected { code } = event {
                handshake.complete(code);
            }
        }));
        session
    }

    #[test]
    fn test_connect_success() {
        let provider = Arc::new(ScriptedProvider::new());
        let session = connected_session(&provider);
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect(Duration::from_secs(1)).unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_connect_failure_code() {
        let provider = Arc::new(ScriptedProvider::new().with_login_code(101));
        let session = connected_session(&provider);

        let err = session.connect(Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, SessionError::Authentication { code: 101 });
        assert_eq!(session.state(), SessionState::Failed(101));
    }

    #[test]
    fn test_connect_only_once() {
        let provider = Arc::new(ScriptedProvider::new());
        let session = connected_session(&provider);
        session.connect(Duration::from_secs(1)).unwrap();

        let err = session.connect(Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, SessionError::AlreadyStarted);
    }

    #[test]
    fn test_connect_timeout() {
        let provider = Arc::new(ScriptedProvider::new().with_silent_login());
        let session = connected_session(&provider);

        let err = session.connect(Duration::from_millis(50)).unwrap_err();
        assert_eq!(err, SessionError::ConnectTimeout(50));
    }

    #[test]
    fn test_send_requires_authentication() {
        let provider = Arc::new(ScriptedProvider::new());
        let session = Session::new(provider.clone());
        let lease = session.lease();

        let err = lease
            .send(OutboundRequest {
                request_name: "opt10081_req".into(),
                query_id: "opt10081".into(),
                screen_id: "0101".into(),
                continuation: None,
                inputs: vec![],
            })
            .unwrap_err();
        assert_eq!(err, SessionError::NotAuthenticated);
    }

    #[test]
    fn test_lease_knows_its_session() {
        let provider = Arc::new(ScriptedProvider::new());
        let session = Session::new(provider.clone());
        let other = Session::new(provider);

        assert!(session.lease().belongs_to(&session.handshake()));
        assert!(!other.lease().belongs_to(&session.handshake()));
    }

    #[test]
    fn test_stray_connect_callback_ignored() {
        let provider = Arc::new(ScriptedProvider::new());
        let session = connected_session(&provider);
        session.handshake().complete(0);
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
