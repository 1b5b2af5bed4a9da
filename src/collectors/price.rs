//! Daily closing price series.

use super::{Collector, CollectorSettings, Dated, Fields, into_window, page_reaches_back};
use crate::command::DateRange;
use crate::dispatcher::RequestKind;
use crate::errors::CollectorError;
use crate::session::SessionLease;

use chrono::NaiveDate;
use serde::Serialize;

const DATE: &str = "일자";
const CLOSE: &str = "현재가";

/// One trading day's close.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PriceRow {
    /// Trading day.
    #[serde(serialize_with = "super::serialize_yyyymmdd")]
    pub date: NaiveDate,
    /// Closing price.
    pub close: i64,
}

impl Dated for PriceRow {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Collector for the provider's daily chart query.
///
/// The provider serves the chart newest first, a page at a time, starting
/// from the reference date. Pages are fetched until one reaches back past the
/// start of the window.
#[derive(Debug)]
pub struct PriceCollector {
    inner: Collector,
}

impl PriceCollector {
    /// Creates the collector.
    pub fn new(settings: CollectorSettings) -> Self {
        Self {
            inner: Collector::new(RequestKind::DailyPrice, settings),
        }
    }

    /// The underlying bridge, for handler registration.
    pub fn collector(&self) -> &Collector {
        &self.inner
    }

    /// Fetches daily closes of `code` from `start` through `today`, ascending.
    pub fn request(
        &self,
        lease: &SessionLease<'_>,
        code: &str,
        start: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<PriceRow>, CollectorError> {
        log::info!("[price] {} from {}", code, start);
        let inputs = vec![
            ("종목코드".to_string(), code.to_string()),
            ("기준일자".to_string(), today.format("%Y%m%d").to_string()),
            ("수정주가구분".to_string(), "1".to_string()),
        ];
        let raw = self
            .inner
            .fetch(lease, inputs, |page| page_reaches_back(page, DATE, start))?;

        let mut rows = Vec::with_capacity(raw.len());
        for row in &raw {
            // Rows without a date or close are padding at the end of the chart.
            if row.get(DATE).is_none_or(str::is_empty) || row.get(CLOSE).is_none_or(str::is_empty)
            {
                continue;
            }
            let fields = Fields::new(row, RequestKind::DailyPrice);
            rows.push(PriceRow {
                date: fields.date(DATE)?,
                close: fields.int(CLOSE)?,
            });
        }

        let window = DateRange {
            from: start,
            to: today,
        };
        Ok(into_window(rows, window, RequestKind::DailyPrice))
    }
}
