//! Theme group ranking.

use super::{Collector, CollectorSettings, Fields};
use crate::command::ThemeGroupQuery;
use crate::dispatcher::RequestKind;
use crate::errors::CollectorError;
use crate::session::SessionLease;

use serde::Serialize;

/// One theme in the ranking.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThemeGroupRow {
    /// Provider theme code.
    pub theme_code: String,
    /// Theme name.
    pub theme_name: String,
    /// Number of instruments in the theme.
    pub stock_count: i64,
    /// Provider change sign marker.
    pub sign: String,
    /// Change rate in percent.
    pub change_rate: f64,
    /// Instruments up on the day.
    pub rising_count: i64,
    /// Instruments down on the day.
    pub falling_count: i64,
    /// Return over the lookback window, in percent.
    pub period_return: f64,
    /// Leading instruments, as reported by the provider.
    pub leaders: String,
}

/// Collector for the theme group query. Pages are concatenated in provider order.
#[derive(Debug)]
pub struct ThemeGroupCollector {
    inner: Collector,
}

impl ThemeGroupCollector {
    /// Creates the collector.
    pub fn new(settings: CollectorSettings) -> Self {
        Self {
            inner: Collector::new(RequestKind::ThemeGroups, settings),
        }
    }

    /// The underlying bridge, for handler registration.
    pub fn collector(&self) -> &Collector {
        &self.inner
    }

    /// Fetches the theme ranking matching `query`.
    pub fn request(
        &self,
        lease: &SessionLease<'_>,
        query: &ThemeGroupQuery,
    ) -> Result<Vec<ThemeGroupRow>, CollectorError> {
        log::info!(
            "[theme group] days={} search={} theme='{}' code='{}' rank={}",
            query.lookback_days,
            query.search_mode,
            query.theme_name,
            query.instrument_code,
            query.rank_mode
        );
        let inputs = vec![
            ("검색구분".to_string(), query.search_mode.clone()),
            ("종목코드".to_string(), query.instrument_code.clone()),
            ("날짜구분".to_string(), query.lookback_days.clone()),
            ("테마명".to_string(), query.theme_name.clone()),
            ("등락수익구분".to_string(), query.rank_mode.clone()),
        ];
        let raw = self.inner.fetch(lease, inputs, |_| true)?;
        log::debug!("[theme group] {} groups", raw.len());

        raw.iter()
            .map(|row| -> Result<ThemeGroupRow, CollectorError> {
                let f = Fields::new(row, RequestKind::ThemeGroups);
                Ok(ThemeGroupRow {
                    theme_code: f.text("종목코드")?,
                    theme_name: f.text("테마명")?,
                    stock_count: f.int("종목수")?,
                    sign: f.text("등락기호")?,
                    change_rate: f.float("등락율")?,
                    rising_count: f.int("상승종목수")?,
                    falling_count: f.int("하락종목수")?,
                    period_return: f.float("기간수익률")?,
                    leaders: f.text("주요종목")?,
                })
            })
            .collect()
    }
}
