//! Scripted provider and fixtures shared by the unit tests.

use crate::collectors::Collector;
use crate::dispatcher::{EventDispatcher, RequestRegistry};
use crate::errors::ProviderError;
use crate::provider::{
    DataEvent, EventSink, Market, OutboundRequest, Provider, ProviderEvent, RawRow,
};
use crate::session::Session;

use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// One scripted response page.
#[derive(Clone, Debug)]
pub(crate) struct Page {
    pub(crate) rows: Vec<RawRow>,
    more: bool,
}

impl Page {
    /// A page followed by another one.
    pub(crate) fn more(rows: Vec<RawRow>) -> Self {
        Self { rows, more: true }
    }

    /// The final page.
    pub(crate) fn last(rows: Vec<RawRow>) -> Self {
        Self { rows, more: false }
    }
}

/// Provider double that answers from scripted pages on background threads,
/// the way the real control calls back from its own event loop.
///
/// Page `n` of a query is served for continuation token `"n"`, so repeating a
/// query replays the same pages. Queries scripted with
/// [`with_calls`](Self::with_calls) instead answer each call in turn.
pub(crate) struct ScriptedProvider {
    sink: Mutex<Option<EventSink>>,
    login_code: Option<i32>,
    instruments: Vec<(Market, String, String)>,
    pages: HashMap<String, Vec<Page>>,
    calls: Mutex<HashMap<String, VecDeque<(Duration, Page)>>>,
    silent: HashSet<String>,
    latency: Duration,
    sent: Mutex<Vec<OutboundRequest>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            login_code: Some(0),
            instruments: Vec::new(),
            pages: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            silent: HashSet::new(),
            latency: Duration::from_millis(1),
            sent: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn with_login_code(mut self, code: i32) -> Self {
        self.login_code = Some(code);
        self
    }

    pub(crate) fn with_silent_login(mut self) -> Self {
        self.login_code = None;
        self
    }

    pub(crate) fn with_instrument(mut self, market: Market, code: &str, name: &str) -> Self {
        self.instruments
            .push((market, code.to_string(), name.to_string()));
        self
    }

    pub(crate) fn with_pages(mut self, query_id: &str, pages: Vec<Page>) -> Self {
        self.pages.insert(query_id.to_string(), pages);
        self
    }

    /// The `n`-th request for `query_id` is answered with the `n`-th page after
    /// the `n`-th delay, whatever its continuation token.
    pub(crate) fn with_calls(self, query_id: &str, calls: Vec<(Duration, Page)>) -> Self {
        self.calls
            .lock()
            .insert(query_id.to_string(), calls.into_iter().collect());
        self
    }

    /// Requests for `query_id` are accepted but never answered.
    pub(crate) fn with_silent(mut self, query_id: &str) -> Self {
        self.silent.insert(query_id.to_string());
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every request received so far.
    pub(crate) fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().clone()
    }

    /// Highest number of requests that were awaiting delivery at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Delivers an event immediately, on the calling thread.
    pub(crate) fn emit(&self, event: ProviderEvent) {
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }

    fn deliver_later(&self, event: ProviderEvent, latency: Duration) {
        let sink = self.sink.lock().clone();
        let in_flight = self.in_flight.clone();
        thread::spawn(move || {
            thread::sleep(latency);
            in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some(sink) = sink {
                sink(event);
            }
        });
    }

    fn page_for(&self, request: &OutboundRequest) -> (DataEvent, Duration) {
        let scripted = self
            .calls
            .lock()
            .get_mut(&request.query_id)
            .and_then(VecDeque::pop_front);
        if let Some((delay, page)) = scripted {
            let event = DataEvent {
                request_name: request.request_name.clone(),
                screen_id: request.screen_id.clone(),
                rows: page.rows,
                continuation: page.more.then(|| "next".to_string()),
            };
            return (event, delay);
        }

        let index = request
            .continuation
            .as_deref()
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let page = self
            .pages
            .get(&request.query_id)
            .and_then(|pages| pages.get(index))
            .cloned()
            .unwrap_or_else(|| Page::last(Vec::new()));
        let event = DataEvent {
            request_name: request.request_name.clone(),
            screen_id: request.screen_id.clone(),
            rows: page.rows,
            continuation: page.more.then(|| (index + 1).to_string()),
        };
        (event, self.latency)
    }
}

impl Provider for ScriptedProvider {
    fn install_sink(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn comm_connect(&self) -> Result<(), ProviderError> {
        if let Some(code) = self.login_code {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            self.deliver_later(ProviderEvent::Connected { code }, self.latency);
        }
        Ok(())
    }

    fn request(&self, request: OutboundRequest) -> Result<(), ProviderError> {
        self.sent.lock().push(request.clone());
        if self.silent.contains(&request.query_id) {
            return Ok(());
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let (event, latency) = self.page_for(&request);
        self.deliver_later(ProviderEvent::Data(event), latency);
        Ok(())
    }

    fn code_list_by_market(&self, market: Market) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .instruments
            .iter()
            .filter(|(m, _, _)| *m == market)
            .map(|(_, code, _)| code.clone())
            .collect())
    }

    fn master_code_name(&self, code: &str) -> Option<String> {
        self.instruments
            .iter()
            .find(|(_, c, _)| c == code)
            .map(|(_, _, name)| name.clone())
    }
}

/// Binds `collectors` to a new session over `provider`, wires them through a
/// dispatcher and logs in.
pub(crate) fn connected<'a>(
    provider: &Arc<ScriptedProvider>,
    collectors: impl IntoIterator<Item = &'a Collector>,
) -> Session {
    let session = Session::new(provider.clone());
    let mut registry = RequestRegistry::new();
    for collector in collectors {
        registry
            .register(collector.kind(), collector.bind(&session).unwrap())
            .unwrap();
    }
    provider.install_sink(EventDispatcher::new(registry, session.handshake()).into_sink());
    session.connect(Duration::from_secs(2)).unwrap();
    session
}

fn yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub(crate) fn price_row(date: NaiveDate, close: i64) -> RawRow {
    RawRow::new()
        .with("일자", yyyymmdd(date))
        .with("현재가", close.to_string())
}

pub(crate) fn short_sale_row(date: NaiveDate) -> RawRow {
    RawRow::new()
        .with("일자", yyyymmdd(date))
        .with("종가", "+71000")
        .with("공매도량", "12,345")
        .with("매매비중", "1.25")
        .with("공매도거래대금", "876,543,210")
        .with("공매도평균가", "71050")
}

pub(crate) fn investor_flow_row(date: NaiveDate) -> RawRow {
    RawRow::new()
        .with("일자", yyyymmdd(date))
        .with("개인", "+2500")
        .with("외국인", "-3000")
        .with("기관계", "+500")
        .with("금융투자", "100")
        .with("보험", "50")
        .with("투신", "150")
        .with("기타금융", "0")
        .with("은행", "200")
        .with("기타법인", "")
}

pub(crate) fn theme_constituent_row(code: &str, name: &str) -> RawRow {
    RawRow::new()
        .with("종목코드", code)
        .with("종목명", name)
        .with("현재가", "+45000")
        .with("등락기호", "5")
        .with("전일대비", "-500")
        .with("등락율", "-1.10")
        .with("누적거래량", "1,234,567")
        .with("매도호가", "45050")
        .with("매도잔량", "320")
        .with("매수호가", "45000")
        .with("매수잔량", "410")
        .with("기간수익률n", "+3.20")
}

pub(crate) fn theme_group_row(code: &str, name: &str) -> RawRow {
    RawRow::new()
        .with("종목코드", code)
        .with("테마명", name)
        .with("종목수", "24")
        .with("등락기호", "2")
        .with("등락율", "+1.50")
        .with("상승종목수", "18")
        .with("하락종목수", "6")
        .with("기간수익률", "+7.80")
        .with("주요종목", "에코프로비엠,포스코퓨처엠")
}
