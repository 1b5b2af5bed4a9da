//! Daily short-sale statistics.

use super::{Collector, CollectorSettings, Dated, Fields, into_window, page_reaches_back};
use crate::command::DateRange;
use crate::dispatcher::RequestKind;
use crate::errors::CollectorError;
use crate::session::SessionLease;

use chrono::NaiveDate;
use serde::Serialize;

const DATE: &str = "일자";

/// Short-sale figures of one trading day.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShortSaleRow {
    /// Trading day.
    #[serde(serialize_with = "super::serialize_yyyymmdd")]
    pub date: NaiveDate,
    /// Closing price.
    pub close: i64,
    /// Shares sold short.
    pub short_volume: i64,
    /// Short sales as a percentage of traded volume.
    pub ratio: f64,
    /// Traded value of short sales.
    pub short_value: i64,
    /// Average short-sale price.
    pub avg_price: i64,
}

impl Dated for ShortSaleRow {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Collector for the short-sale trend query.
///
/// The provider does not honour the requested window exactly, so rows are
/// filtered to `[from, to]` once every page has arrived.
#[derive(Debug)]
pub struct ShortSaleCollector {
    inner: Collector,
}

impl ShortSaleCollector {
    /// Creates the collector.
    pub fn new(settings: CollectorSettings) -> Self {
        Self {
            inner: Collector::new(RequestKind::ShortSale, settings),
        }
    }

    /// The underlying bridge, for handler registration.
    pub fn collector(&self) -> &Collector {
        &self.inner
    }

    /// Fetches short-sale rows of `code` within `range`, ascending by date.
    pub fn request(
        &self,
        lease: &SessionLease<'_>,
        code: &str,
        range: DateRange,
    ) -> Result<Vec<ShortSaleRow>, CollectorError> {
        log::info!(
            "[short] {} {} ~ {}",
            code,
            range.from.format("%Y%m%d"),
            range.to.format("%Y%m%d")
        );
        let inputs = vec![
            ("종목코드".to_string(), code.to_string()),
            ("시간구분".to_string(), "1".to_string()),
            ("시작일자".to_string(), range.from.format("%Y%m%d").to_string()),
            ("종료일자".to_string(), range.to.format("%Y%m%d").to_string()),
        ];
        let raw = self
            .inner
            .fetch(lease, inputs, |page| page_reaches_back(page, DATE, range.from))?;

        let rows = raw
            .iter()
            .map(|row| -> Result<ShortSaleRow, CollectorError> {
                let f = Fields::new(row, RequestKind::ShortSale);
                Ok(ShortSaleRow {
                    date: f.date(DATE)?,
                    close: f.int("종가")?,
                    short_volume: f.int("공매도량")?,
                    ratio: f.float("매매비중")?,
                    short_value: f.int("공매도거래대금")?,
                    avg_price: f.int("공매도평균가")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(into_window(rows, range, RequestKind::ShortSale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::parse_date;
    use crate::provider::RawRow;
    use crate::test_support::{Page, ScriptedProvider, connected, short_sale_row};
    use std::sync::Arc;

    #[test]
    fn test_rows_outside_window_dropped() {
        // Provider returns 20231228 .. 20240205, newest first.
        let rows: Vec<RawRow> = (0..40)
            .map(|i| parse_date("20240205").unwrap() - chrono::Duration::days(i))
            .filter(|d| *d >= parse_date("20231228").unwrap())
            .map(short_sale_row)
            .collect();
        let raw_len = rows.len();
        let provider =
            Arc::new(ScriptedProvider::new().with_pages("opt10014", vec![Page::last(rows)]));
        let collector = ShortSaleCollector::new(CollectorSettings::default());
        let session = connected(&provider, [collector.collector()]);

        let range = DateRange {
            from: parse_date("20240101").unwrap(),
            to: parse_date("20240131").unwrap(),
        };
        let result = collector.request(&session.lease(), "005930", range).unwrap();

        assert!(result.len() <= raw_len);
        assert_eq!(result.len(), 31);
        assert!(result.iter().all(|r| range.contains(r.date)));
        assert!(result.windows(2).all(|w| w[0].date < w[1].date));

        let sent = provider.sent();
        assert_eq!(sent[0].input("시작일자"), Some("20240101"));
        assert_eq!(sent[0].input("종료일자"), Some("20240131"));
        assert_eq!(sent[0].input("시간구분"), Some("1"));
    }

    #[test]
    fn test_row_fields() {
        let provider = Arc::new(ScriptedProvider::new().with_pages(
            "opt10014",
            vec![Page::last(vec![short_sale_row(parse_date("20240102").unwrap())])],
        ));
        let collector = ShortSaleCollector::new(CollectorSettings::default());
        let session = connected(&provider, [collector.collector()]);
        let range = DateRange {
            from: parse_date("20240102").unwrap(),
            to: parse_date("20240102").unwrap(),
        };

        let rows = collector.request(&session.lease(), "005930", range).unwrap();
        assert_eq!(
            rows,
            vec![ShortSaleRow {
                date: parse_date("20240102").unwrap(),
                close: 71000,
                short_volume: 12345,
                ratio: 1.25,
                short_value: 876543210,
                avg_price: 71050,
            }]
        );
    }
}
