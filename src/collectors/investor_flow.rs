//! Net buying per investor class.

use super::{Collector, CollectorSettings, Dated, Fields, into_window, page_reaches_back};
use crate::command::DateRange;
use crate::dispatcher::RequestKind;
use crate::errors::CollectorError;
use crate::session::SessionLease;

use chrono::NaiveDate;
use serde::Serialize;

const DATE: &str = "일자";

/// Net buy amounts of one trading day. Positive is net buying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvestorFlowRow {
    /// Trading day.
    #[serde(serialize_with = "super::serialize_yyyymmdd")]
    pub date: NaiveDate,
    /// Retail investors.
    pub individual: i64,
    /// Foreign investors.
    pub foreign: i64,
    /// All institutions combined.
    pub institution: i64,
    /// Financial investment houses.
    pub financial_investment: i64,
    /// Insurers.
    pub insurance: i64,
    /// Investment trusts.
    pub investment_trust: i64,
    /// Other financial institutions.
    pub other_finance: i64,
    /// Banks.
    pub bank: i64,
    /// Other corporations.
    pub other_corporation: i64,
}

impl Dated for InvestorFlowRow {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Collector for the per-instrument investor breakdown query.
///
/// Requested as net buy amounts in single shares, counting back from the end
/// of the window; rows are filtered to the window afterwards.
#[derive(Debug)]
pub struct InvestorFlowCollector {
    inner: Collector,
}

impl InvestorFlowCollector {
    /// Creates the collector.
    pub fn new(settings: CollectorSettings) -> Self {
        Self {
            inner: Collector::new(RequestKind::InvestorFlow, settings),
        }
    }

    /// The underlying bridge, for handler registration.
    pub fn collector(&self) -> &Collector {
        &self.inner
    }

    /// Fetches the breakdown of `code` within `range`, ascending by date.
    pub fn request(
        &self,
        lease: &SessionLease<'_>,
        code: &str,
        range: DateRange,
    ) -> Result<Vec<InvestorFlowRow>, CollectorError> {
        log::info!(
            "[investor] {} {} ~ {}",
            code,
            range.from.format("%Y%m%d"),
            range.to.format("%Y%m%d")
        );
        let inputs = vec![
            ("일자".to_string(), range.to.format("%Y%m%d").to_string()),
            ("종목코드".to_string(), code.to_string()),
            ("금액수량구분".to_string(), "1".to_string()),
            ("매매구분".to_string(), "0".to_string()),
            ("단위구분".to_string(), "1".to_string()),
        ];
        let raw = self
            .inner
            .fetch(lease, inputs, |page| page_reaches_back(page, DATE, range.from))?;

        let rows = raw
            .iter()
            .map(|row| -> Result<InvestorFlowRow, CollectorError> {
                let f = Fields::new(row, RequestKind::InvestorFlow);
                Ok(InvestorFlowRow {
                    date: f.date(DATE)?,
                    individual: f.int("개인")?,
                    foreign: f.int("외국인")?,
                    institution: f.int("기관계")?,
                    financial_investment: f.int("금융투자")?,
                    insurance: f.int("보험")?,
                    investment_trust: f.int("투신")?,
                    other_finance: f.int("기타금융")?,
                    bank: f.int("은행")?,
                    other_corporation: f.int("기타법인")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(into_window(rows, range, RequestKind::InvestorFlow))
    }
}
