//! Pipe-delimited client commands.
//!
//! | command                                           | meaning                 |
//! |---------------------------------------------------|-------------------------|
//! | `nameOrCode\|period`                              | daily closing prices    |
//! | `SHORT\|nameOrCode\|YYYYMMDD\|YYYYMMDD`           | short-sale statistics   |
//! | `THEME\|themeCode\|lookbackDays`                  | theme constituents      |
//! | `THEMEGROUP\|days\|search\|themeName\|code\|rank` | theme group ranking     |
//! | `INST\|nameOrCode\|YYYYMMDD\|YYYYMMDD`            | investor flow breakdown |
//! | `CODEMAP`                                         | name to code directory  |
//! | `PING`                                            | gateway status          |

use crate::errors::CommandError;
use crate::period::Period;

use chrono::NaiveDate;

const VERBS: [&str; 6] = ["SHORT", "THEME", "THEMEGROUP", "INST", "CODEMAP", "PING"];

/// Inclusive date range `[from, to]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    /// First day.
    pub from: NaiveDate,
    /// Last day.
    pub to: NaiveDate,
}

impl DateRange {
    /// Returns `true` if `date` lies within the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Theme group search parameters, passed through to the provider as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThemeGroupQuery {
    /// Lookback window in days.
    pub lookback_days: String,
    /// `0` all, `1` by theme name, `2` by instrument code.
    pub search_mode: String,
    /// Theme name filter (may be empty).
    pub theme_name: String,
    /// Instrument code filter (may be empty).
    pub instrument_code: String,
    /// `1` top return, `2` bottom return, `3` top change, `4` bottom change.
    pub rank_mode: String,
}

/// A parsed client command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Daily closing prices over a lookback period.
    Price {
        /// Instrument name or code, before directory resolution.
        instrument: String,
        /// Lookback period.
        period: Period,
    },
    /// Short-sale statistics within a date range.
    ShortSale {
        /// Instrument name or code, before directory resolution.
        instrument: String,
        /// Requested window.
        range: DateRange,
    },
    /// Constituents of a theme.
    Theme {
        /// Provider theme code.
        theme_code: String,
        /// Lookback window in days.
        lookback_days: String,
    },
    /// Theme group ranking.
    ThemeGroup(ThemeGroupQuery),
    /// Investor flow breakdown within a date range.
    InvestorFlow {
        /// Instrument name or code, before directory resolution.
        instrument: String,
        /// Requested window.
        range: DateRange,
    },
    /// The full instrument directory.
    CodeMap,
    /// Gateway status.
    Ping,
}

impl Command {
    /// Parses one command payload.
    ///
    /// # Errors
    /// * [`CommandError::UnsupportedCommand`] for unknown verbs or field counts.
    /// * [`CommandError::InvalidArgument`] for malformed dates or inverted ranges.
    pub fn parse(payload: &str) -> Result<Self, CommandError> {
        let parts: Vec<&str> = payload.trim().split('|').map(str::trim).collect();
        let verb = parts[0].to_uppercase();

        match (verb.as_str(), parts.len()) {
            ("CODEMAP", _) => Ok(Command::CodeMap),
            ("PING", 1) => Ok(Command::Ping),
            ("SHORT", 4) => Ok(Command::ShortSale {
                instrument: required(parts[1], "instrument")?,
                range: parse_range(parts[2], parts[3])?,
            }),
            ("THEME", 3) => Ok(Command::Theme {
                theme_code: required(parts[1], "theme code")?,
                lookback_days: required(parts[2], "lookback days")?,
            }),
            ("THEMEGROUP", 6) => Ok(Command::ThemeGroup(ThemeGroupQuery {
                lookback_days: required(parts[1], "lookback days")?,
                search_mode: required(parts[2], "search mode")?,
                theme_name: parts[3].to_string(),
                instrument_code: parts[4].to_string(),
                rank_mode: required(parts[5], "rank mode")?,
            })),
            ("INST", 4) => Ok(Command::InvestorFlow {
                instrument: required(parts[1], "instrument")?,
                range: parse_range(parts[2], parts[3])?,
            }),
            (v, 2) if !VERBS.contains(&v) => Ok(Command::Price {
                instrument: required(parts[0], "instrument")?,
                period: Period::from_label(parts[1]),
            }),
            _ => Err(CommandError::UnsupportedCommand(payload.trim().to_string())),
        }
    }
}

fn required(field: &str, what: &str) -> Result<String, CommandError> {
    if field.is_empty() {
        return Err(CommandError::InvalidArgument(format!("missing {}", what)));
    }
    Ok(field.to_string())
}

/// Parses a `YYYYMMDD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d")
        .map_err(|_| CommandError::InvalidArgument(format!("bad date '{}', expected YYYYMMDD", s)))
}

fn parse_range(from: &str, to: &str) -> Result<DateRange, CommandError> {
    let range = DateRange {
        from: parse_date(from)?,
        to: parse_date(to)?,
    };
    if range.from > range.to {
        return Err(CommandError::InvalidArgument(format!(
            "start {} is after end {}",
            from, to
        )));
    }
    Ok(range)
}
