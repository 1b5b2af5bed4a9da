//! Collectors turn one asynchronous provider query into a blocking call.
//!
//! The shared machinery lives in [`Collector`]:
//!
//! 1. a fresh [`PendingRequest`] is installed and the request is sent through
//!    the caller's [`SessionLease`], on a screen of its own;
//! 2. the caller waits on a condition variable until the collector's handler,
//!    running on the provider's callback thread, marks the page complete, or
//!    until the page timeout expires;
//! 3. while the provider reports a continuation and the caller still wants
//!    older data, the same request is re-issued with the continuation token;
//! 4. the pending request is discarded and the raw rows are returned.
//!
//! The provider echoes the screen of a request with every page, so a late page
//! of an abandoned call never lands in a newer call of the same kind.
//!
//! The typed collectors in the submodules build the provider inputs, parse the
//! raw rows and apply ordering and date-window rules.

pub mod investor_flow;
pub mod price;
pub mod short_sale;
pub mod theme;
pub mod theme_group;

use crate::command::DateRange;
use crate::defs::{MAX_PAGES, REQUEST_TIMEOUT_MS};
use crate::dispatcher::{Handler, RequestKind};
use crate::errors::CollectorError;
use crate::provider::{DataEvent, OutboundRequest, RawRow};
use crate::session::{Handshake, Session, SessionLease};

use chrono::NaiveDate;
use parking_lot::{Condvar, Mutex};
use serde::Serializer;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Timing and pagination limits shared by all collectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Maximum wait for each page.
    pub page_timeout: Duration,
    /// Maximum number of pages fetched by one request.
    pub max_pages: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            max_pages: MAX_PAGES,
        }
    }
}

/// State of the request currently in flight for one collector.
///
/// Exists only for the duration of [`Collector::fetch`].
#[derive(Debug)]
pub struct PendingRequest {
    request_name: &'static str,
    screen_id: String,
    rows: Vec<RawRow>,
    completed: bool,
    continuation: Option<String>,
}

impl PendingRequest {
    fn new(request_name: &'static str, screen_id: String) -> Self {
        Self {
            request_name,
            screen_id,
            rows: Vec::new(),
            completed: false,
            continuation: None,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    pending: Mutex<Option<PendingRequest>>,
    delivered: Condvar,
}

/// Blocking bridge for one [`RequestKind`].
#[derive(Debug)]
pub struct Collector {
    kind: RequestKind,
    settings: CollectorSettings,
    slot: Arc<Slot>,
    calls: AtomicU32,
    session: OnceLock<Arc<Handshake>>,
}

impl Collector {
    /// Creates the bridge for `kind`. It must be [bound](Self::bind) to the
    /// session and its handler registered with the dispatcher before the first
    /// request.
    pub fn new(kind: RequestKind, settings: CollectorSettings) -> Self {
        Self {
            kind,
            settings,
            slot: Arc::new(Slot::default()),
            calls: AtomicU32::new(0),
            session: OnceLock::new(),
        }
    }

    /// The request kind this collector serves.
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Binds the collector to `session` and returns the callback to register
    /// with that session's dispatcher.
    ///
    /// # Errors
    /// [`CollectorError::UnboundSession`] if the collector is already bound to
    /// another session.
    pub fn bind(&self, session: &Session) -> Result<Handler, CollectorError> {
        let handshake = session.handshake();
        let bound = self.session.get_or_init(|| handshake.clone());
        if !Arc::ptr_eq(bound, &handshake) {
            log::error!("{} is already bound to another session", self.kind);
            return Err(CollectorError::UnboundSession {
                request_name: self.kind.request_name().to_string(),
            });
        }
        Ok(self.handler())
    }

    /// Callback that feeds provider pages into this collector.
    ///
    /// Events for another request name, for another screen than the call in
    /// flight, or arriving when no request is in flight (e.g. after a
    /// timeout), are dropped.
    fn handler(&self) -> Handler {
        let slot = self.slot.clone();
        let request_name = self.kind.request_name();
        Arc::new(move |event: DataEvent| {
            if event.request_name != request_name {
                log::warn!(
                    "Handler for {} ignoring event for {}",
                    request_name,
                    event.request_name
                );
                return;
            }
            let mut pending = slot.pending.lock();
            match pending.as_mut() {
                Some(p) if p.screen_id != event.screen_id => log::warn!(
                    "{}: dropping stale page for screen {} while awaiting screen {} ({} rows)",
                    request_name,
                    event.screen_id,
                    p.screen_id,
                    event.rows.len()
                ),
                Some(p) if !p.completed => {
                    log::debug!(
                        "{}: received {} rows, continuation={:?}",
                        p.request_name,
                        event.rows.len(),
                        event.continuation
                    );
                    p.rows.extend(event.rows);
                    p.continuation = event.continuation;
                    p.completed = true;
                    slot.delivered.notify_all();
                }
                Some(_) => log::warn!(
                    "{}: page already delivered, dropping {} extra rows",
                    request_name,
                    event.rows.len()
                ),
                None => log::warn!(
                    "{}: no request in flight, dropping stale event with {} rows",
                    request_name,
                    event.rows.len()
                ),
            }
        })
    }

    /// Sends the request and blocks until every wanted page has arrived.
    ///
    /// After each page, `wants_more` receives that page's rows and decides
    /// whether an available continuation should be followed.
    ///
    /// # Errors
    /// * [`CollectorError::UnboundSession`] if `lease` belongs to another
    ///   session than the one this collector is bound to.
    /// * [`CollectorError::RequestTimeout`] if a page does not arrive in time.
    /// * [`CollectorError::Session`] if the provider refuses the request.
    pub fn fetch<F>(
        &self,
        lease: &SessionLease<'_>,
        inputs: Vec<(String, String)>,
        wants_more: F,
    ) -> Result<Vec<RawRow>, CollectorError>
    where
        F: Fn(&[RawRow]) -> bool,
    {
        let request_name = self.kind.request_name();
        if !self.session.get().is_some_and(|h| lease.belongs_to(h)) {
            return Err(CollectorError::UnboundSession {
                request_name: request_name.to_string(),
            });
        }

        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let screen_id = self.kind.descriptor().screen_for(call);
        *self.slot.pending.lock() = Some(PendingRequest::new(request_name, screen_id.clone()));

        let result = self.fetch_pages(lease, &screen_id, inputs, wants_more);

        // Whatever the outcome, the request is over: later callbacks are stale.
        let pending = self.slot.pending.lock().take();
        result?;
        Ok(pending.map(|p| p.rows).unwrap_or_default())
    }

    fn fetch_pages<F>(
        &self,
        lease: &SessionLease<'_>,
        screen_id: &str,
        inputs: Vec<(String, String)>,
        wants_more: F,
    ) -> Result<(), CollectorError>
    where
        F: Fn(&[RawRow]) -> bool,
    {
        let descriptor = self.kind.descriptor();
        let mut continuation: Option<String> = None;
        let mut pages = 0;

        loop {
            let page_start = self
                .slot
                .pending
                .lock()
                .as_ref()
                .map_or(0, |p| p.rows.len());

            // Sent without holding the slot lock: the provider may call back
            // on this thread.
            lease.send(OutboundRequest {
                request_name: descriptor.request_name.to_string(),
                query_id: descriptor.query_id.to_string(),
                screen_id: screen_id.to_string(),
                continuation: continuation.clone(),
                inputs: inputs.clone(),
            })?;
            pages += 1;

            let mut pending = self.slot.pending.lock();
            let deadline = Instant::now() + self.settings.page_timeout;
            loop {
                match pending.as_ref() {
                    Some(p) if p.completed => break,
                    Some(_) => {}
                    None => {
                        return Err(CollectorError::UpstreamData {
                            request_name: descriptor.request_name.to_string(),
                            message: "pending request vanished".to_string(),
                        });
                    }
                }
                let timed_out = self
                    .slot
                    .delivered
                    .wait_until(&mut pending, deadline)
                    .timed_out();
                if timed_out && !pending.as_ref().is_some_and(|p| p.completed) {
                    log::error!(
                        "{}: page {} not delivered within {:?}",
                        descriptor.request_name,
                        pages,
                        self.settings.page_timeout
                    );
                    return Err(CollectorError::RequestTimeout {
                        request_name: descriptor.request_name.to_string(),
                    });
                }
            }

            let Some(p) = pending.as_mut() else {
                return Ok(());
            };
            p.completed = false;
            continuation = p.continuation.take();

            if continuation.is_none() || !wants_more(&p.rows[page_start..]) {
                return Ok(());
            }
            if pages >= self.settings.max_pages {
                log::warn!(
                    "{}: stopping after {} pages, more data remains",
                    descriptor.request_name,
                    pages
                );
                return Ok(());
            }
        }
    }
}

/// Typed access to the fields of a [`RawRow`], reporting problems as
/// [`CollectorError::UpstreamData`].
pub(crate) struct Fields<'a> {
    row: &'a RawRow,
    request_name: &'static str,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(row: &'a RawRow, kind: RequestKind) -> Self {
        Self {
            row,
            request_name: kind.request_name(),
        }
    }

    fn error(&self, message: String) -> CollectorError {
        CollectorError::UpstreamData {
            request_name: self.request_name.to_string(),
            message,
        }
    }

    pub(crate) fn text(&self, field: &str) -> Result<String, CollectorError> {
        self.row
            .get(field)
            .map(str::to_string)
            .ok_or_else(|| self.error(format!("missing field {}", field)))
    }

    /// Signed integer; empty reads as 0.
    pub(crate) fn int(&self, field: &str) -> Result<i64, CollectorError> {
        let raw = self.text(field)?;
        let cleaned = clean_number(&raw);
        if cleaned.is_empty() {
            return Ok(0);
        }
        cleaned
            .parse()
            .map_err(|_| self.error(format!("field {} is not an integer: '{}'", field, raw)))
    }

    /// Decimal number; empty reads as 0.
    pub(crate) fn float(&self, field: &str) -> Result<f64, CollectorError> {
        let raw = self.text(field)?;
        let cleaned = clean_number(&raw);
        if cleaned.is_empty() {
            return Ok(0.0);
        }
        cleaned
            .parse()
            .map_err(|_| self.error(format!("field {} is not a number: '{}'", field, raw)))
    }

    pub(crate) fn date(&self, field: &str) -> Result<NaiveDate, CollectorError> {
        let raw = self.text(field)?;
        NaiveDate::parse_from_str(&raw, "%Y%m%d")
            .map_err(|_| self.error(format!("field {} is not a YYYYMMDD date: '{}'", field, raw)))
    }
}

fn clean_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    unsigned.chars().filter(|c| *c != ',').collect()
}

/// Rows that belong to a single trading day.
pub(crate) trait Dated {
    fn date(&self) -> NaiveDate;
}

/// Returns `true` while a newest-first page has not yet reached back past
/// `from`, i.e. older pages may still hold rows inside the window.
pub(crate) fn page_reaches_back(page: &[RawRow], date_field: &str, from: NaiveDate) -> bool {
    let oldest = page
        .iter()
        .filter_map(|row| row.get(date_field))
        .filter_map(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
        .min();
    matches!(oldest, Some(oldest) if oldest >= from)
}

/// Orders a date series for the caller: one row per date (first delivered
/// wins), ascending, restricted to `window`. Discarded rows are logged.
pub(crate) fn into_window<R: Dated>(rows: Vec<R>, window: DateRange, kind: RequestKind) -> Vec<R> {
    let raw = rows.len();
    let mut by_date = BTreeMap::new();
    for row in rows {
        by_date.entry(row.date()).or_insert(row);
    }
    let unique = by_date.len();
    let filtered: Vec<R> = by_date
        .into_iter()
        .filter(|(date, _)| window.contains(*date))
        .map(|(_, row)| row)
        .collect();

    if unique < raw {
        log::debug!("{}: dropped {} duplicate rows", kind, raw - unique);
    }
    if filtered.len() < unique {
        log::info!(
            "{}: discarded {} rows outside {} ~ {} ({} of {} kept)",
            kind,
            unique - filtered.len(),
            window.from.format("%Y%m%d"),
            window.to.format("%Y%m%d"),
            filtered.len(),
            raw
        );
    }
    filtered
}

/// Serializes a date as `YYYYMMDD`, the format the provider and clients use.
pub(crate) fn serialize_yyyymmdd<S: Serializer>(
    date: &NaiveDate,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.format("%Y%m%d").to_string())
}
