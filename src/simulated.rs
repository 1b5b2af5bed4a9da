//! In-process provider that synthesises market data.
//!
//! Used by the gateway binary in place of the vendor control. It behaves like
//! the real thing from the gateway's point of view: calls return at once and
//! results arrive later on a dedicated callback thread, paginated with
//! continuation tokens.
//!
//! Every series is derived from a seed computed from the instrument code, so
//! repeating a request returns the same rows.

use crate::defs::{SIMULATED_HISTORY_DAYS, SIMULATED_PAGE_SIZE, SIMULATED_VOLATILITY};
use crate::errors::ProviderError;
use crate::provider::{
    DataEvent, EventSink, Market, OutboundRequest, Provider, ProviderEvent, RawRow,
};

use chrono::{Datelike, Local, NaiveDate, Weekday};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

/// Themes served by the theme queries: provider theme code and name.
const THEMES: [(&str, &str); 6] = [
    ("100", "2차전지"),
    ("110", "반도체"),
    ("120", "인공지능"),
    ("130", "바이오"),
    ("140", "자동차"),
    ("150", "게임"),
];

/// Instruments per theme.
const THEME_SIZE: usize = 8;

/// One listed instrument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instrument {
    /// Provider code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Market the instrument is listed on.
    pub market: Market,
}

#[derive(Clone, Copy, Debug)]
struct DailyBar {
    date: NaiveDate,
    close: i64,
    volume: i64,
}

/// Synthetic provider backed by per-instrument random walks.
pub struct SimulatedProvider {
    instruments: Vec<Instrument>,
    /// Daily bars per code, newest first.
    histories: HashMap<String, Vec<DailyBar>>,
    sink: Arc<Mutex<Option<EventSink>>>,
    events: Mutex<Sender<ProviderEvent>>,
}

impl fmt::Debug for SimulatedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedProvider")
            .field("instruments", &self.instruments.len())
            .finish()
    }
}

impl SimulatedProvider {
    /// Loads the instrument listing from a file with one `code|name|market`
    /// entry per line. Blank lines and lines starting with `#` are skipped.
    pub fn from_config<P: AsRef<Path>>(path: P, latency: Duration) -> Result<Self, ProviderError> {
        log::info!("Loading instrument listing from: {:?}", path.as_ref());
        let file = File::open(&path).map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
        let reader = BufReader::new(file);

        let mut instruments = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            instruments.push(parse_instrument(line).ok_or_else(|| {
                ProviderError::InvalidConfig(format!("line {}: '{}'", index + 1, line))
            })?);
        }
        log::info!("Loaded {} instruments", instruments.len());

        Self::new(instruments, latency)
    }

    /// Creates a provider over `instruments`, delivering callbacks after
    /// `latency`.
    pub fn new(instruments: Vec<Instrument>, latency: Duration) -> Result<Self, ProviderError> {
        let today = Local::now().date_naive();
        let log_normal = LogNormal::new(0.0, SIMULATED_VOLATILITY)
            .map_err(|e| ProviderError::InvalidConfig(e.to_string()))?;

        let histories = instruments
            .par_iter()
            .map(|i| (i.code.clone(), generate_history(&i.code, today, &log_normal)))
            .collect();

        let sink: Arc<Mutex<Option<EventSink>>> = Arc::new(Mutex::new(None));
        let (events, receiver) = mpsc::channel::<ProviderEvent>();
        let pump_sink = sink.clone();
        thread::Builder::new()
            .name("provider-events".into())
            .spawn(move || {
                log::debug!("Simulated provider event thread started");
                // Ends once the provider, and with it the sender, is dropped.
                for event in receiver {
                    thread::sleep(latency);
                    let sink = pump_sink.lock().clone();
                    match sink {
                        Some(sink) => sink(event),
                        None => log::warn!("No sink installed, dropping {:?}", event),
                    }
                }
                log::debug!("Simulated provider event thread stopped");
            })
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self {
            instruments,
            histories,
            sink,
            events: Mutex::new(events),
        })
    }

    fn post(&self, event: ProviderEvent) -> Result<(), ProviderError> {
        self.events
            .lock()
            .send(event)
            .map_err(|_| ProviderError::Unavailable("event thread stopped".into()))
    }

    fn history(&self, request: &OutboundRequest) -> Result<&[DailyBar], ProviderError> {
        let code = request.input("종목코드").unwrap_or_default();
        self.histories
            .get(code)
            .map(Vec::as_slice)
            .ok_or_else(|| ProviderError::Unavailable(format!("unknown instrument '{}'", code)))
    }

    fn rows_for(&self, request: &OutboundRequest) -> Result<Vec<RawRow>, ProviderError> {
        match request.query_id.as_str() {
            "opt10081" => {
                let until = date_input(request, "기준일자")?;
                Ok(until_date(self.history(request)?, until)
                    .map(daily_price_row)
                    .collect())
            }
            "opt10014" => {
                let until = date_input(request, "종료일자")?;
                let code = request.input("종목코드").unwrap_or_default();
                Ok(until_date(self.history(request)?, until)
                    .map(|bar| short_sale_row(code, bar))
                    .collect())
            }
            "opt10059" => {
                let until = date_input(request, "일자")?;
                let code = request.input("종목코드").unwrap_or_default();
                Ok(until_date(self.history(request)?, until)
                    .map(|bar| investor_flow_row(code, bar))
                    .collect())
            }
            "opt90002" => {
                let theme = request.input("종목코드").unwrap_or_default();
                let days = lookback_input(request);
                Ok(self
                    .theme_members(theme)
                    .into_iter()
                    .map(|i| self.constituent_row(i, days))
                    .collect())
            }
            "opt90001" => Ok(self.theme_group_rows(request)),
            other => Err(ProviderError::Unavailable(format!("unknown query '{}'", other))),
        }
    }

    fn theme_members(&self, theme_code: &str) -> Vec<&Instrument> {
        if self.instruments.is_empty() || !THEMES.iter().any(|(c, _)| *c == theme_code) {
            return Vec::new();
        }
        let start = (seed_of(theme_code) as usize) % self.instruments.len();
        self.instruments
            .iter()
            .cycle()
            .skip(start)
            .take(THEME_SIZE.min(self.instruments.len()))
            .collect()
    }

    fn performance(&self, code: &str, days: usize) -> Option<(i64, i64, f64, f64)> {
        let bars = self.histories.get(code)?;
        let last = bars.first()?;
        let previous = bars.get(1).unwrap_or(last);
        let base = bars.get(days.min(bars.len() - 1)).unwrap_or(last);
        let change = last.close - previous.close;
        let rate = change as f64 * 100.0 / previous.close as f64;
        let period = (last.close - base.close) as f64 * 100.0 / base.close as f64;
        Some((last.close, change, rate, period))
    }

    fn constituent_row(&self, instrument: &Instrument, days: usize) -> RawRow {
        let (price, change, rate, period) =
            self.performance(&instrument.code, days).unwrap_or_default();
        let volume = self
            .histories
            .get(&instrument.code)
            .and_then(|bars| bars.first())
            .map_or(0, |bar| bar.volume);
        let mut rng = StdRng::seed_from_u64(seed_of(&instrument.code) ^ days as u64);
        RawRow::new()
            .with("종목코드", instrument.code.as_str())
            .with("종목명", instrument.name.as_str())
            .with("현재가", format!("{:+}", price))
            .with("등락기호", sign_marker(change))
            .with("전일대비", format!("{:+}", change))
            .with("등락율", format!("{:+.2}", rate))
            .with("누적거래량", volume.to_string())
            .with("매도호가", (price + tick_size(price)).to_string())
            .with("매도잔량", rng.gen_range(10..5_000).to_string())
            .with("매수호가", price.to_string())
            .with("매수잔량", rng.gen_range(10..5_000).to_string())
            .with("기간수익률n", format!("{:+.2}", period))
    }

    fn theme_group_rows(&self, request: &OutboundRequest) -> Vec<RawRow> {
        let days = lookback_input(request);
        let search = request.input("검색구분").unwrap_or("0");
        let name_filter = request.input("테마명").unwrap_or_default();
        let code_filter = request.input("종목코드").unwrap_or_default();

        let mut groups: Vec<(f64, f64, RawRow)> = THEMES
            .iter()
            .filter_map(|(theme_code, theme_name)| {
                let members = self.theme_members(theme_code);
                let keep = match search {
                    "1" => theme_name.contains(name_filter),
                    "2" => members.iter().any(|m| m.code == code_filter),
                    _ => true,
                };
                if !keep || members.is_empty() {
                    return None;
                }
                let stats: Vec<_> = members
                    .iter()
                    .filter_map(|m| self.performance(&m.code, days))
                    .collect();
                let count = stats.len().max(1) as f64;
                let rate = stats.iter().map(|s| s.2).sum::<f64>() / count;
                let period = stats.iter().map(|s| s.3).sum::<f64>() / count;
                let rising = stats.iter().filter(|s| s.1 > 0).count();
                let falling = stats.iter().filter(|s| s.1 < 0).count();
                let leaders: Vec<&str> = members.iter().take(2).map(|m| m.name.as_str()).collect();
                let row = RawRow::new()
                    .with("종목코드", *theme_code)
                    .with("테마명", *theme_name)
                    .with("종목수", members.len().to_string())
                    .with("등락기호", sign_marker(rising as i64 - falling as i64))
                    .with("등락율", format!("{:+.2}", rate))
                    .with("상승종목수", rising.to_string())
                    .with("하락종목수", falling.to_string())
                    .with("기간수익률", format!("{:+.2}", period))
                    .with("주요종목", leaders.join(","));
                Some((rate, period, row))
            })
            .collect();

        match request.input("등락수익구분").unwrap_or("1") {
            "2" => groups.sort_by(|a, b| a.1.total_cmp(&b.1)),
            "3" => groups.sort_by(|a, b| b.0.total_cmp(&a.0)),
            "4" => groups.sort_by(|a, b| a.0.total_cmp(&b.0)),
            _ => groups.sort_by(|a, b| b.1.total_cmp(&a.1)),
        }
        groups.into_iter().map(|(_, _, row)| row).collect()
    }
}

impl Provider for SimulatedProvider {
    fn install_sink(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn comm_connect(&self) -> Result<(), ProviderError> {
        log::info!("Simulated login");
        self.post(ProviderEvent::Connected { code: 0 })
    }

    fn request(&self, request: OutboundRequest) -> Result<(), ProviderError> {
        let rows = self.rows_for(&request)?;
        let offset = match request.continuation.as_deref() {
            Some(token) => token.parse::<usize>().map_err(|_| {
                ProviderError::Unavailable(format!("bad continuation token '{}'", token))
            })?,
            None => 0,
        };
        let end = (offset + SIMULATED_PAGE_SIZE).min(rows.len());
        let page = rows.get(offset..end).map(<[RawRow]>::to_vec).unwrap_or_default();
        let continuation = (end < rows.len()).then(|| end.to_string());
        log::trace!(
            "{}: serving rows {}..{} of {}",
            request.request_name,
            offset,
            end,
            rows.len()
        );
        self.post(ProviderEvent::Data(DataEvent {
            request_name: request.request_name,
            screen_id: request.screen_id,
            rows: page,
            continuation,
        }))
    }

    fn code_list_by_market(&self, market: Market) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .instruments
            .iter()
            .filter(|i| i.market == market)
            .map(|i| i.code.clone())
            .collect())
    }

    fn master_code_name(&self, code: &str) -> Option<String> {
        self.instruments
            .iter()
            .find(|i| i.code == code)
            .map(|i| i.name.clone())
    }
}

fn parse_instrument(line: &str) -> Option<Instrument> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    match parts.as_slice() {
        [code, name, market] if !code.is_empty() && !name.is_empty() => Some(Instrument {
            code: code.to_string(),
            name: name.to_string(),
            market: Market::parse(market)?,
        }),
        _ => None,
    }
}

fn seed_of(text: &str) -> u64 {
    text.bytes()
        .fold(0xcbf2_9ce4_8422_2325, |h, b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3))
}

/// Random walk of daily closes ending at `today`, newest first, weekends
/// skipped.
fn generate_history(code: &str, today: NaiveDate, log_normal: &LogNormal<f64>) -> Vec<DailyBar> {
    let mut rng = StdRng::seed_from_u64(seed_of(code));
    let mut close = rng.gen_range(5_000.0..150_000.0);
    let mut bars = Vec::with_capacity(SIMULATED_HISTORY_DAYS);
    let mut date = today;
    while bars.len() < SIMULATED_HISTORY_DAYS {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            bars.push(DailyBar {
                date,
                close: (close as i64).max(100),
                volume: rng.gen_range(50_000..5_000_000),
            });
            close /= log_normal.sample(&mut rng);
        }
        match date.pred_opt() {
            Some(previous) => date = previous,
            None => break,
        }
    }
    bars
}

fn until_date(bars: &[DailyBar], until: NaiveDate) -> impl Iterator<Item = &DailyBar> {
    bars.iter().filter(move |bar| bar.date <= until)
}

fn date_input(request: &OutboundRequest, field: &str) -> Result<NaiveDate, ProviderError> {
    let raw = request.input(field).unwrap_or_default();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map_err(|_| ProviderError::Unavailable(format!("{}: bad {} '{}'", request.query_id, field, raw)))
}

fn lookback_input(request: &OutboundRequest) -> usize {
    request
        .input("날짜구분")
        .and_then(|d| d.parse().ok())
        .unwrap_or(1)
}

fn bar_rng(code: &str, bar: &DailyBar) -> StdRng {
    StdRng::seed_from_u64(seed_of(code) ^ bar.date.num_days_from_ce() as u64)
}

fn yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn sign_marker(change: i64) -> &'static str {
    match change {
        c if c > 0 => "2",
        0 => "3",
        _ => "5",
    }
}

fn tick_size(price: i64) -> i64 {
    match price {
        p if p < 2_000 => 1,
        p if p < 5_000 => 5,
        p if p < 20_000 => 10,
        p if p < 50_000 => 50,
        p if p < 200_000 => 100,
        _ => 500,
    }
}

fn daily_price_row(bar: &DailyBar) -> RawRow {
    RawRow::new()
        .with("일자", yyyymmdd(bar.date))
        .with("현재가", bar.close.to_string())
        .with("거래량", bar.volume.to_string())
}

fn short_sale_row(code: &str, bar: &DailyBar) -> RawRow {
    let mut rng = bar_rng(code, bar);
    let ratio: f64 = rng.gen_range(0.0..8.0);
    let short_volume = (bar.volume as f64 * ratio / 100.0) as i64;
    let avg_price = bar.close + rng.gen_range(-tick_size(bar.close) * 5..=tick_size(bar.close) * 5);
    RawRow::new()
        .with("일자", yyyymmdd(bar.date))
        .with("종가", format!("{:+}", bar.close))
        .with("공매도량", short_volume.to_string())
        .with("매매비중", format!("{:.2}", ratio))
        .with("공매도거래대금", (short_volume * avg_price).to_string())
        .with("공매도평균가", avg_price.to_string())
}

fn investor_flow_row(code: &str, bar: &DailyBar) -> RawRow {
    let mut rng = bar_rng(code, bar);
    let mut flow = || rng.gen_range(-bar.volume / 4..=bar.volume / 4);
    let individual = flow();
    let foreign = flow();
    let financial_investment = flow() / 2;
    let insurance = flow() / 8;
    let investment_trust = flow() / 4;
    let other_finance = flow() / 16;
    let bank = flow() / 16;
    let institution =
        financial_investment + insurance + investment_trust + other_finance + bank;
    let other_corporation = -(individual + foreign + institution);
    RawRow::new()
        .with("일자", yyyymmdd(bar.date))
        .with("개인", format!("{:+}", individual))
        .with("외국인", format!("{:+}", foreign))
        .with("기관계", format!("{:+}", institution))
        .with("금융투자", format!("{:+}", financial_investment))
        .with("보험", format!("{:+}", insurance))
        .with("투신", format!("{:+}", investment_trust))
        .with("기타금융", format!("{:+}", other_finance))
        .with("은행", format!("{:+}", bank))
        .with("기타법인", format!("{:+}", other_corporation))
}
