//! Lookback period labels used by price-series commands.

use chrono::{Months, NaiveDate};

/// Lookback window of a price-series query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
    /// One month (`1개월`).
    OneMonth,
    /// Three months (`3개월`).
    ThreeMonths,
    /// Six months (`6개월`).
    SixMonths,
    /// One year (`1년`).
    OneYear,
    /// Three years (`3년`).
    ThreeYears,
}

impl Period {
    /// Parses a period label. Unknown labels fall back to one month.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "1개월" => Period::OneMonth,
            "3개월" => Period::ThreeMonths,
            "6개월" => Period::SixMonths,
            "1년" => Period::OneYear,
            "3년" => Period::ThreeYears,
            other => {
                log::debug!("Unknown period label '{}', using 1개월", other);
                Period::OneMonth
            }
        }
    }

    fn months(&self) -> u32 {
        match self {
            Period::OneMonth => 1,
            Period::ThreeMonths => 3,
            Period::SixMonths => 6,
            Period::OneYear => 12,
            Period::ThreeYears => 36,
        }
    }

    /// First day of the window ending at `today`.
    ///
    /// Month subtraction clamps to the last valid day (e.g. 31 March minus one
    /// month is 29 February in a leap year).
    pub fn start_date(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_months(Months::new(self.months()))
            .unwrap_or(NaiveDate::MIN)
    }
}
