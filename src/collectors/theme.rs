//! Constituents of a theme.

use super::{Collector, CollectorSettings, Fields};
use crate::dispatcher::RequestKind;
use crate::errors::CollectorError;
use crate::session::SessionLease;

use serde::Serialize;

/// One instrument belonging to a theme.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThemeConstituentRow {
    /// Instrument code.
    pub code: String,
    /// Instrument name.
    pub name: String,
    /// Current price.
    pub price: i64,
    /// Provider change sign marker.
    pub sign: String,
    /// Change versus the previous close.
    pub change: i64,
    /// Change rate in percent.
    pub change_rate: f64,
    /// Accumulated volume.
    pub volume: i64,
    /// Best ask price.
    pub ask_price: i64,
    /// Best ask size.
    pub ask_size: i64,
    /// Best bid price.
    pub bid_price: i64,
    /// Best bid size.
    pub bid_size: i64,
    /// Return over the lookback window, in percent.
    pub period_return: f64,
}

/// Collector for the theme constituent query. Pages are concatenated in provider order.
#[derive(Debug)]
pub struct ThemeCollector {
    inner: Collector,
}

impl ThemeCollector {
    /// Creates the collector.
    pub fn new(settings: CollectorSettings) -> Self {
        Self {
            inner: Collector::new(RequestKind::ThemeConstituents, settings),
        }
    }

    /// The underlying bridge, for handler registration.
    pub fn collector(&self) -> &Collector {
        &self.inner
    }

    /// Fetches the instruments of `theme_code` with returns over `lookback_days`.
    pub fn request(
        &self,
        lease: &SessionLease<'_>,
        theme_code: &str,
        lookback_days: &str,
    ) -> Result<Vec<ThemeConstituentRow>, CollectorError> {
        log::info!("[theme] {} lookback {}", theme_code, lookback_days);
        let inputs = vec![
            ("날짜구분".to_string(), lookback_days.to_string()),
            ("종목코드".to_string(), theme_code.to_string()),
        ];
        let raw = self.inner.fetch(lease, inputs, |_| true)?;
        log::debug!("[theme] {} constituents", raw.len());

        raw.iter()
            .map(|row| -> Result<ThemeConstituentRow, CollectorError> {
                let f = Fields::new(row, RequestKind::ThemeConstituents);
                Ok(ThemeConstituentRow {
                    code: f.text("종목코드")?,
                    name: f.text("종목명")?,
                    price: f.int("현재가")?,
                    sign: f.text("등락기호")?,
                    change: f.int("전일대비")?,
                    change_rate: f.float("등락율")?,
                    volume: f.int("누적거래량")?,
                    ask_price: f.int("매도호가")?,
                    ask_size: f.int("매도잔량")?,
                    bid_price: f.int("매수호가")?,
                    bid_size: f.int("매수잔량")?,
                    period_return: f.float("기간수익률n")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Page, ScriptedProvider, connected, theme_constituent_row};
    use std::sync::Arc;

    #[test]
    fn test_keeps_provider_order() {
        let provider = Arc::new(ScriptedProvider::new().with_pages(
            "opt90002",
            vec![Page::last(vec![
                theme_constituent_row("035720", "카카오"),
                theme_constituent_row("005930", "삼성전자"),
            ])],
        ));
        let collector = ThemeCollector::new(CollectorSettings::default());
        let session = connected(&provider, [collector.collector()]);

        let rows = collector.request(&session.lease(), "100", "5").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "035720");
        assert_eq!(rows[1].name, "삼성전자");
        assert_eq!(rows[0].change, -500);
        assert_eq!(rows[0].period_return, 3.2);

        let sent = provider.sent();
        assert_eq!(sent[0].input("날짜구분"), Some("5"));
        assert_eq!(sent[0].input("종목코드"), Some("100"));
        assert_eq!(sent[0].screen_id, "0103");
    }

    #[test]
    fn test_follows_continuation_pages() {
        let provider = Arc::new(ScriptedProvider::new().with_pages(
            "opt90002",
            vec![
                Page::more(vec![theme_constituent_row("035720", "카카오")]),
                Page::last(vec![theme_constituent_row("005930", "삼성전자")]),
            ],
        ));
        let collector = ThemeCollector::new(CollectorSettings::default());
        let session = connected(&provider, [collector.collector()]);

        let rows = collector.request(&session.lease(), "100", "5").unwrap();
        let codes: Vec<&str> = rows.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["035720", "005930"]);

        let sent = provider.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].continuation.as_deref(), Some("1"));
        assert_eq!(sent[1].input("종목코드"), Some("100"));
    }
}
