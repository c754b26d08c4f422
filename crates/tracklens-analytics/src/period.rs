//! Period arithmetic: fixed ISO periods, relative keywords and date ranges.
//!
//! Month-based period types are handled uniformly through a month ordinal
//! (`year * 12 + month0`) and a `(length, start offset)` span, so "this",
//! "last" and "last N" are the same computation for every type.

use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};
use tracklens_storage::DateRange;

use crate::error::QueryError;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FinancialYearStart {
    #[default]
    April,
    July,
    October,
}

impl FinancialYearStart {
    fn period_type(self) -> PeriodType {
        match self {
            Self::April => PeriodType::FinancialApril,
            Self::July => PeriodType::FinancialJuly,
            Self::October => PeriodType::FinancialOct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodType {
    Daily,
    Monthly,
    BiMonthly,
    Quarterly,
    SixMonthly,
    Yearly,
    FinancialApril,
    FinancialJuly,
    FinancialOct,
}

impl PeriodType {
    /// `(length in months, first month offset)`; `None` for daily.
    fn month_span(self) -> Option<(i32, i32)> {
        match self {
            Self::Daily => None,
            Self::Monthly => Some((1, 0)),
            Self::BiMonthly => Some((2, 0)),
            Self::Quarterly => Some((3, 0)),
            Self::SixMonthly => Some((6, 0)),
            Self::Yearly => Some((12, 0)),
            Self::FinancialApril => Some((12, 3)),
            Self::FinancialJuly => Some((12, 6)),
            Self::FinancialOct => Some((12, 9)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Period {
    pub iso: String,
    pub period_type: PeriodType,
    pub start: Date,
    pub end: Date,
}

fn month_ordinal(date: Date) -> i32 {
    date.year() * 12 + i32::from(u8::from(date.month())) - 1
}

fn ordinal_parts(ordinal: i32) -> (i32, u8) {
    (ordinal.div_euclid(12), ordinal.rem_euclid(12) as u8 + 1)
}

fn first_of_month(ordinal: i32) -> Option<Date> {
    let (year, month) = ordinal_parts(ordinal);
    Date::from_calendar_date(year, Month::try_from(month).ok()?, 1).ok()
}

fn last_of_month(ordinal: i32) -> Option<Date> {
    let (year, month) = ordinal_parts(ordinal);
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, month.length(year)).ok()
}

impl Period {
    pub fn daily(date: Date) -> Self {
        Self {
            iso: format!(
                "{:04}{:02}{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
            period_type: PeriodType::Daily,
            start: date,
            end: date,
        }
    }

    /// Builds the month-based period starting at month `ordinal`.
    fn from_start_ordinal(period_type: PeriodType, ordinal: i32) -> Option<Self> {
        let (length, _) = period_type.month_span()?;
        let start = first_of_month(ordinal)?;
        let end = last_of_month(ordinal + length - 1)?;
        let (year, month) = ordinal_parts(ordinal);
        let iso = match period_type {
            PeriodType::Daily => return None,
            PeriodType::Monthly => format!("{year:04}{month:02}"),
            PeriodType::BiMonthly => format!("{year:04}{:02}B", (month - 1) / 2 + 1),
            PeriodType::Quarterly => format!("{year:04}Q{}", (month - 1) / 3 + 1),
            PeriodType::SixMonthly => format!("{year:04}S{}", (month - 1) / 6 + 1),
            PeriodType::Yearly => format!("{year:04}"),
            PeriodType::FinancialApril => format!("{year:04}April"),
            PeriodType::FinancialJuly => format!("{year:04}July"),
            PeriodType::FinancialOct => format!("{year:04}Oct"),
        };
        Some(Self {
            iso,
            period_type,
            start,
            end,
        })
    }

    /// The period of `period_type` that contains `date`.
    pub fn containing(period_type: PeriodType, date: Date) -> Option<Self> {
        let Some((length, offset)) = period_type.month_span() else {
            return Some(Self::daily(date));
        };
        let ordinal = month_ordinal(date);
        let start = (ordinal - offset).div_euclid(length) * length + offset;
        Self::from_start_ordinal(period_type, start)
    }

    /// The period `n` steps away (negative is earlier).
    pub fn shifted(&self, n: i32) -> Option<Self> {
        match self.period_type.month_span() {
            None => {
                let date = self.start.checked_add(Duration::days(i64::from(n)))?;
                Some(Self::daily(date))
            }
            Some((length, _)) => {
                Self::from_start_ordinal(self.period_type, month_ordinal(self.start) + n * length)
            }
        }
    }

    pub fn previous(&self) -> Option<Self> {
        self.shifted(-1)
    }

    /// `count` consecutive periods ending with `self`, oldest first.
    fn ending_with(&self, count: i32) -> Option<Vec<Self>> {
        (0..count).rev().map(|back| self.shifted(-back)).collect()
    }

    /// Every period of `period_type` starting in calendar year `year`.
    fn in_year(period_type: PeriodType, year: i32) -> Option<Vec<Self>> {
        let (length, _) = period_type.month_span()?;
        (0..12 / length)
            .map(|i| Self::from_start_ordinal(period_type, year * 12 + i * length))
            .collect()
    }

    pub fn parse_iso(s: &str) -> Option<Self> {
        let s = s.trim();
        let digits = |t: &str| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit());
        if !s.is_char_boundary(4.min(s.len())) || s.len() < 4 || !digits(&s[..4]) {
            return None;
        }
        let year: i32 = s[..4].parse().ok()?;
        let rest = &s[4..];
        let monthly = |month0: i32, period_type| {
            Self::from_start_ordinal(period_type, year * 12 + month0)
        };
        match rest {
            "" => monthly(0, PeriodType::Yearly),
            "April" => monthly(3, PeriodType::FinancialApril),
            "July" => monthly(6, PeriodType::FinancialJuly),
            "Oct" => monthly(9, PeriodType::FinancialOct),
            r if r.len() == 2 && digits(r) => {
                let month: i32 = r.parse().ok()?;
                (1..=12)
                    .contains(&month)
                    .then(|| monthly(month - 1, PeriodType::Monthly))?
            }
            r if r.len() == 3 && r.ends_with('B') && digits(&r[..2]) => {
                let index: i32 = r[..2].parse().ok()?;
                (1..=6)
                    .contains(&index)
                    .then(|| monthly((index - 1) * 2, PeriodType::BiMonthly))?
            }
            r if r.len() == 2 && r.starts_with('Q') => {
                let quarter: i32 = r[1..].parse().ok()?;
                (1..=4)
                    .contains(&quarter)
                    .then(|| monthly((quarter - 1) * 3, PeriodType::Quarterly))?
            }
            r if r.len() == 2 && r.starts_with('S') => {
                let half: i32 = r[1..].parse().ok()?;
                (1..=2)
                    .contains(&half)
                    .then(|| monthly((half - 1) * 6, PeriodType::SixMonthly))?
            }
            r if r.len() == 4 && digits(r) => {
                let month: u8 = r[..2].parse().ok()?;
                let day: u8 = r[2..].parse().ok()?;
                let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
                Some(Self::daily(date))
            }
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        let (start_year, start_month) = (self.start.year(), usize::from(u8::from(self.start.month())));
        let (end_year, end_month) = (self.end.year(), usize::from(u8::from(self.end.month())));
        match self.period_type {
            PeriodType::Daily => format!(
                "{:04}-{:02}-{:02}",
                start_year,
                start_month,
                self.start.day()
            ),
            PeriodType::Monthly => format!("{} {start_year}", MONTH_NAMES[start_month - 1]),
            PeriodType::BiMonthly | PeriodType::Quarterly | PeriodType::SixMonthly => format!(
                "{} - {} {end_year}",
                MONTH_NAMES[start_month - 1],
                MONTH_NAMES[end_month - 1]
            ),
            PeriodType::Yearly => format!("{start_year}"),
            PeriodType::FinancialApril | PeriodType::FinancialJuly | PeriodType::FinancialOct => {
                format!(
                    "{} {start_year} - {} {end_year}",
                    MONTH_NAMES[start_month - 1],
                    MONTH_NAMES[end_month - 1]
                )
            }
        }
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start, self.end)
    }
}

macro_rules! relative_periods {
    ($($variant:ident => $keyword:literal, $name:literal;)+) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RelativePeriod {
            $($variant,)+
        }

        impl RelativePeriod {
            pub const ALL: &'static [RelativePeriod] = &[$(RelativePeriod::$variant,)+];

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($keyword => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn keyword(&self) -> &'static str {
                match self {
                    $(Self::$variant => $keyword,)+
                }
            }

            pub fn display_name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

relative_periods! {
    Today => "TODAY", "Today";
    Yesterday => "YESTERDAY", "Yesterday";
    Last3Days => "LAST_3_DAYS", "Last 3 days";
    Last7Days => "LAST_7_DAYS", "Last 7 days";
    Last14Days => "LAST_14_DAYS", "Last 14 days";
    Last30Days => "LAST_30_DAYS", "Last 30 days";
    Last60Days => "LAST_60_DAYS", "Last 60 days";
    Last90Days => "LAST_90_DAYS", "Last 90 days";
    Last180Days => "LAST_180_DAYS", "Last 180 days";
    ThisMonth => "THIS_MONTH", "This month";
    LastMonth => "LAST_MONTH", "Last month";
    Last3Months => "LAST_3_MONTHS", "Last 3 months";
    Last6Months => "LAST_6_MONTHS", "Last 6 months";
    Last12Months => "LAST_12_MONTHS", "Last 12 months";
    MonthsThisYear => "MONTHS_THIS_YEAR", "Months this year";
    MonthsLastYear => "MONTHS_LAST_YEAR", "Months last year";
    ThisBimonth => "THIS_BIMONTH", "This bi-month";
    LastBimonth => "LAST_BIMONTH", "Last bi-month";
    Last6Bimonths => "LAST_6_BIMONTHS", "Last 6 bi-months";
    ThisQuarter => "THIS_QUARTER", "This quarter";
    LastQuarter => "LAST_QUARTER", "Last quarter";
    Last4Quarters => "LAST_4_QUARTERS", "Last 4 quarters";
    QuartersThisYear => "QUARTERS_THIS_YEAR", "Quarters this year";
    QuartersLastYear => "QUARTERS_LAST_YEAR", "Quarters last year";
    ThisSixMonth => "THIS_SIX_MONTH", "This six-month";
    LastSixMonth => "LAST_SIX_MONTH", "Last six-month";
    Last2SixMonths => "LAST_2_SIXMONTHS", "Last 2 six-months";
    ThisYear => "THIS_YEAR", "This year";
    LastYear => "LAST_YEAR", "Last year";
    Last5Years => "LAST_5_YEARS", "Last 5 years";
    Last10Years => "LAST_10_YEARS", "Last 10 years";
    ThisFinancialYear => "THIS_FINANCIAL_YEAR", "This financial year";
    LastFinancialYear => "LAST_FINANCIAL_YEAR", "Last financial year";
    Last5FinancialYears => "LAST_5_FINANCIAL_YEARS", "Last 5 financial years";
    Last10FinancialYears => "LAST_10_FINANCIAL_YEARS", "Last 10 financial years";
}

impl RelativePeriod {
    /// Concrete periods for this keyword relative to `anchor`, oldest first.
    pub fn resolve(&self, anchor: Date, financial: FinancialYearStart) -> Option<Vec<Period>> {
        use PeriodType::*;
        let this = |period_type| Period::containing(period_type, anchor);
        let last = |period_type| this(period_type)?.previous();
        let last_n = |period_type, n| last(period_type)?.ending_with(n);
        let year = anchor.year();
        let fy = financial.period_type();

        match self {
            Self::Today => Some(vec![Period::daily(anchor)]),
            Self::Yesterday => last_n(Daily, 1),
            Self::Last3Days => last_n(Daily, 3),
            Self::Last7Days => last_n(Daily, 7),
            Self::Last14Days => last_n(Daily, 14),
            Self::Last30Days => last_n(Daily, 30),
            Self::Last60Days => last_n(Daily, 60),
            Self::Last90Days => last_n(Daily, 90),
            Self::Last180Days => last_n(Daily, 180),
            Self::ThisMonth => this(Monthly).map(|p| vec![p]),
            Self::LastMonth => last_n(Monthly, 1),
            Self::Last3Months => last_n(Monthly, 3),
            Self::Last6Months => last_n(Monthly, 6),
            Self::Last12Months => last_n(Monthly, 12),
            Self::MonthsThisYear => Period::in_year(Monthly, year),
            Self::MonthsLastYear => Period::in_year(Monthly, year - 1),
            Self::ThisBimonth => this(BiMonthly).map(|p| vec![p]),
            Self::LastBimonth => last_n(BiMonthly, 1),
            Self::Last6Bimonths => last_n(BiMonthly, 6),
            Self::ThisQuarter => this(Quarterly).map(|p| vec![p]),
            Self::LastQuarter => last_n(Quarterly, 1),
            Self::Last4Quarters => last_n(Quarterly, 4),
            Self::QuartersThisYear => Period::in_year(Quarterly, year),
            Self::QuartersLastYear => Period::in_year(Quarterly, year - 1),
            Self::ThisSixMonth => this(SixMonthly).map(|p| vec![p]),
            Self::LastSixMonth => last_n(SixMonthly, 1),
            Self::Last2SixMonths => last_n(SixMonthly, 2),
            Self::ThisYear => this(Yearly).map(|p| vec![p]),
            Self::LastYear => last_n(Yearly, 1),
            Self::Last5Years => last_n(Yearly, 5),
            Self::Last10Years => last_n(Yearly, 10),
            Self::ThisFinancialYear => this(fy).map(|p| vec![p]),
            Self::LastFinancialYear => last_n(fy, 1),
            Self::Last5FinancialYears => last_n(fy, 5),
            Self::Last10FinancialYears => last_n(fy, 10),
        }
    }
}

/// A single resolved period token.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPeriod {
    Relative {
        keyword: RelativePeriod,
        periods: Vec<Period>,
    },
    Fixed(Period),
    Range(DateRange),
}

impl ResolvedPeriod {
    pub fn periods(&self) -> &[Period] {
        match self {
            Self::Relative { periods, .. } => periods,
            Self::Fixed(period) => std::slice::from_ref(period),
            Self::Range(_) => &[],
        }
    }

    pub fn date_ranges(&self) -> Vec<DateRange> {
        match self {
            Self::Range(range) => vec![*range],
            _ => self.periods().iter().map(Period::date_range).collect(),
        }
    }
}

/// Resolves period tokens against an optional anchor date.
#[derive(Debug, Clone, Copy)]
pub struct PeriodResolver {
    anchor: Option<Date>,
    financial_year_start: FinancialYearStart,
}

impl PeriodResolver {
    pub fn new(anchor: Option<Date>, financial_year_start: FinancialYearStart) -> Self {
        Self {
            anchor,
            financial_year_start,
        }
    }

    /// Accepts a relative keyword, a fixed ISO period or `yyyy-MM-dd_yyyy-MM-dd`.
    ///
    /// # Errors
    ///
    /// `MissingAnchorDate` for a relative keyword without an anchor,
    /// `InvalidDimension` for anything unrecognized.
    pub fn resolve(&self, token: &str) -> Result<ResolvedPeriod, QueryError> {
        let token = token.trim();
        if let Some(keyword) = RelativePeriod::parse(token) {
            let anchor = self
                .anchor
                .ok_or_else(|| QueryError::missing_anchor_date(token))?;
            let periods = keyword
                .resolve(anchor, self.financial_year_start)
                .ok_or_else(|| QueryError::invalid_dimension(token, "period out of range"))?;
            return Ok(ResolvedPeriod::Relative { keyword, periods });
        }
        if let Some((start, end)) = token.split_once('_') {
            let start = tracklens_core::time::parse_date(start)
                .map_err(|e| QueryError::invalid_dimension(token, e.to_string()))?;
            let end = tracklens_core::time::parse_date(end)
                .map_err(|e| QueryError::invalid_dimension(token, e.to_string()))?;
            if end < start {
                return Err(QueryError::invalid_dimension(token, "range ends before it starts"));
            }
            return Ok(ResolvedPeriod::Range(DateRange::new(start, end)));
        }
        // a single `yyyy-MM-dd` day
        if token.len() == 10
            && token.contains('-')
            && let Ok(date) = tracklens_core::time::parse_date(token)
        {
            return Ok(ResolvedPeriod::Range(DateRange::new(date, date)));
        }
        Period::parse_iso(token)
            .map(ResolvedPeriod::Fixed)
            .ok_or_else(|| QueryError::invalid_dimension(token, "unknown period"))
    }
}
