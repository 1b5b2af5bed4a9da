use crate::collectors::CollectorSettings;
use crate::collectors::investor_flow::InvestorFlowCollector;
use crate::collectors::price::PriceCollector;
use crate::collectors::short_sale::ShortSaleCollector;
use crate::collectors::theme::ThemeCollector;
use crate::collectors::theme_group::ThemeGroupCollector;
use crate::command::Command;
use crate::defs::{CONNECT_TIMEOUT_MS, MAX_PAGES, REQUEST_TIMEOUT_MS};
use crate::directory::NameCodeDirectory;
use crate::dispatcher::{EventDispatcher, RequestRegistry};
use crate::errors::GatewayError;
use crate::provider::Provider;
use crate::session::{Session, SessionState};

use chrono::Local;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Startup settings of the [`Gateway`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Maximum wait for each page of a provider response.
    pub request_timeout: Duration,
    /// Maximum wait for the login callback.
    pub connect_timeout: Duration,
    /// Upper bound on pages fetched by one request.
    pub max_pages: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
            max_pages: MAX_PAGES,
        }
    }
}

/// Gateway holds the provider session, the instrument directory and one
/// collector per request kind, and executes client commands against them.
#[derive(Debug)]
pub struct Gateway {
    session: Session,
    directory: NameCodeDirectory,
    price: PriceCollector,
    short_sale: ShortSaleCollector,
    theme: ThemeCollector,
    theme_group: ThemeGroupCollector,
    investor_flow: InvestorFlowCollector,
}

impl Gateway {
    /// Wires collectors to the provider, logs in and builds the directory.
    ///
    /// # Errors
    /// Any error here is fatal: duplicate handler registration, a rejected or
    /// silent login, or a failure to enumerate instruments.
    pub fn start(provider: Arc<dyn Provider>, config: &GatewayConfig) -> Result<Self, GatewayError> {
        log::info!("Starting gateway with {:?}", config);
        let settings = CollectorSettings {
            page_timeout: config.request_timeout,
            max_pages: config.max_pages,
        };
        let price = PriceCollector::new(settings);
        let short_sale = ShortSaleCollector::new(settings);
        let theme = ThemeCollector::new(settings);
        let theme_group = ThemeGroupCollector::new(settings);
        let investor_flow = InvestorFlowCollector::new(settings);

        let session = Session::new(provider.clone());
        let mut registry = RequestRegistry::new();
        for collector in [
            price.collector(),
            short_sale.collector(),
            theme.collector(),
            theme_group.collector(),
            investor_flow.collector(),
        ] {
            registry.register(collector.kind(), collector.bind(&session)?)?;
        }
        log::info!("Registered {} request handlers", registry.len());
        provider.install_sink(EventDispatcher::new(registry, session.handshake()).into_sink());

        session.connect(config.connect_timeout)?;
        let directory = NameCodeDirectory::build(session.provider())?;
        if directory.is_empty() {
            log::warn!("Provider listed no instruments; names will not resolve");
        }

        Ok(Self {
            session,
            directory,
            price,
            short_sale,
            theme,
            theme_group,
            investor_flow,
        })
    }

    /// Current provider session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// The instrument directory built at startup.
    pub fn directory(&self) -> &NameCodeDirectory {
        &self.directory
    }

    /// Executes one parsed command and returns its JSON result.
    ///
    /// Collector requests block until the session lease is free, so
    /// concurrent callers are served one at a time.
    pub fn execute(&self, command: Command) -> Result<Value, GatewayError> {
        match command {
            Command::Price { instrument, period } => {
                let code = self.resolve(&instrument);
                let today = Local::now().date_naive();
                let start = period.start_date(today);
                let rows = self
                    .price
                    .request(&self.session.lease(), &code, start, today)?;
                Ok(serde_json::to_value(rows)?)
            }
            Command::ShortSale { instrument, range } => {
                let code = self.resolve(&instrument);
                let rows = self
                    .short_sale
                    .request(&self.session.lease(), &code, range)?;
                Ok(serde_json::to_value(rows)?)
            }
            Command::Theme {
                theme_code,
                lookback_days,
            } => {
                let rows =
                    self.theme
                        .request(&self.session.lease(), &theme_code, &lookback_days)?;
                Ok(serde_json::to_value(rows)?)
            }
            Command::ThemeGroup(query) => {
                let rows = self.theme_group.request(&self.session.lease(), &query)?;
                Ok(serde_json::to_value(rows)?)
            }
            Command::InvestorFlow { instrument, range } => {
                let code = self.resolve(&instrument);
                let rows = self
                    .investor_flow
                    .request(&self.session.lease(), &code, range)?;
                Ok(serde_json::to_value(rows)?)
            }
            Command::CodeMap => Ok(serde_json::to_value(self.directory.names())?),
            Command::Ping => Ok(json!({
                "status": "ok",
                "session": self.session.state().label(),
                "instruments": self.directory.len(),
            })),
        }
    }

    fn resolve(&self, instrument: &str) -> String {
        let code = self.directory.resolve(instrument);
        match self.directory.name_of(&code) {
            Some(name) => log::info!("Resolved '{}' to {} ({})", instrument, code, name),
            None => log::info!("'{}' is not listed, requesting code {} as given", instrument, code),
        }
        code
    }

    /// Parses and executes a raw command payload, rendering the result or the
    /// error as a single JSON document.
    pub fn respond(&self, payload: &str) -> String {
        let result = Command::parse(payload)
            .map_err(GatewayError::from)
            .and_then(|command| {
                log::debug!("Executing {:?}", command);
                self.execute(command)
            });
        match result {
            Ok(value) => value.to_string(),
            Err(e) => {
                log::warn!("Command '{}' failed: {}", payload.trim(), e);
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SessionError;
    use crate::provider::{Market, RawRow};
    use crate::test_support::{Page, ScriptedProvider, price_row, short_sale_row};
    use chrono::NaiveDate;
    use std::thread;

    fn config(timeout_ms: u64) -> GatewayConfig {
        GatewayConfig {
            request_timeout: Duration::from_millis(timeout_ms),
            connect_timeout: Duration::from_secs(2),
            max_pages: MAX_PAGES,
        }
    }

    fn samsung() -> ScriptedProvider {
        ScriptedProvider::new()
            .with_instrument(Market::Kospi, "005930", "삼성전자")
            .with_instrument(Market::Kosdaq, "247540", "에코프로비엠")
    }

    /// 20 days inside the last month, then older rows outside it.
    fn recent_chart() -> Vec<Page> {
        let today = Local::now().date_naive();
        let rows: Vec<RawRow> = (0..20)
            .chain(40..60)
            .map(|i| price_row(today - chrono::Duration::days(i), 70_000 + i))
            .collect();
        vec![Page::last(rows)]
    }

    fn parse(response: &str) -> Value {
        serde_json::from_str(response).unwrap()
    }

    #[test]
    fn test_price_by_name_returns_ascending_month() {
        let provider = Arc::new(samsung().with_pages("opt10081", recent_chart()));
        let gateway = Gateway::start(provider.clone(), &config(1000)).unwrap();

        let value = parse(&gateway.respond("삼성전자|1개월"));
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 20);

        let dates: Vec<&str> = rows.iter().map(|r| r["date"].as_str().unwrap()).collect();
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(provider.sent()[0].input("종목코드"), Some("005930"));
    }

    #[test]
    fn test_price_by_code_passes_through() {
        let provider = Arc::new(samsung().with_pages("opt10081", recent_chart()));
        let gateway = Gateway::start(provider.clone(), &config(1000)).unwrap();

        let value = parse(&gateway.respond("005930|1개월"));
        assert_eq!(value.as_array().unwrap().len(), 20);
        assert_eq!(provider.sent()[0].input("종목코드"), Some("005930"));
    }

    #[test]
    fn test_short_window_filter() {
        let to = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        let rows = (0..40)
            .map(|i| short_sale_row(to - chrono::Duration::days(i)))
            .collect();
        let provider = Arc::new(samsung().with_pages("opt10014", vec![Page::last(rows)]));
        let gateway = Gateway::start(provider, &config(1000)).unwrap();

        let value = parse(&gateway.respond("SHORT|삼성전자|20240101|20240131"));
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 31);
        assert_eq!(rows[0]["date"], "20240101");
        assert_eq!(rows[30]["date"], "20240131");
    }

    #[test]
    fn test_codemap_stable_across_queries() {
        let provider = Arc::new(samsung().with_pages("opt10081", recent_chart()));
        let gateway = Gateway::start(provider, &config(1000)).unwrap();

        let before = parse(&gateway.respond("CODEMAP"));
        assert_eq!(before["삼성전자"], "005930");
        assert_eq!(before["에코프로비엠"], "247540");

        gateway.respond("삼성전자|3개월");
        let after = parse(&gateway.respond("codemap"));
        assert_eq!(before, after);
    }

    #[test]
    fn test_timeout_then_next_request_proceeds() {
        let provider = Arc::new(
            samsung()
                .with_silent("opt10014")
                .with_pages("opt10081", recent_chart()),
        );
        let gateway = Gateway::start(provider, &config(50)).unwrap();

        let failed = parse(&gateway.respond("SHORT|005930|20240101|20240131"));
        assert!(failed["error"].as_str().unwrap().contains("timed out"));

        let value = parse(&gateway.respond("005930|1개월"));
        assert_eq!(value.as_array().unwrap().len(), 20);
        assert_eq!(gateway.session_state(), SessionState::Authenticated);
    }

    #[test]
    fn test_concurrent_requests_are_serialised() {
        let provider = Arc::new(
            samsung()
                .with_latency(Duration::from_millis(20))
                .with_pages("opt10081", recent_chart()),
        );
        let gateway = Arc::new(Gateway::start(provider.clone(), &config(2000)).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gateway = gateway.clone();
                thread::spawn(move || gateway.respond("삼성전자|1개월"))
            })
            .collect();
        for handle in handles {
            let value = parse(&handle.join().unwrap());
            assert_eq!(value.as_array().unwrap().len(), 20);
        }

        assert_eq!(provider.sent().len(), 4);
        assert_eq!(provider.max_in_flight(), 1);
    }

    #[test]
    fn test_failed_login_is_fatal() {
        let provider = Arc::new(samsung().with_login_code(101));
        let err = Gateway::start(provider, &config(1000)).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Session(SessionError::Authentication { code: 101 })
        ));
    }

    #[test]
    fn test_errors_rendered_as_json() {
        let provider = Arc::new(samsung());
        let gateway = Gateway::start(provider.clone(), &config(1000)).unwrap();

        let unsupported = parse(&gateway.respond("FOO|BAR|BAZ"));
        assert!(unsupported["error"].as_str().unwrap().contains("Unsupported"));

        let inverted = parse(&gateway.respond("INST|005930|20240131|20240101"));
        assert!(inverted["error"].as_str().unwrap().contains("Invalid argument"));
        assert!(provider.sent().is_empty());
    }

    #[test]
    fn test_ping_reports_status() {
        let provider = Arc::new(samsung());
        let gateway = Gateway::start(provider, &config(1000)).unwrap();

        let value = parse(&gateway.respond("PING"));
        assert_eq!(value["status"], "ok");
        assert_eq!(value["session"], "authenticated");
        assert_eq!(value["instruments"], 2);
    }
}
