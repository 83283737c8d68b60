//! Rollup types: PeriodType, TrendDirection, HistoricalAggregate

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{EntityKey, EntityType};

/// Aggregation bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 4] = [
        PeriodType::Daily,
        PeriodType::Weekly,
        PeriodType::Monthly,
        PeriodType::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "DAILY",
            PeriodType::Weekly => "WEEKLY",
            PeriodType::Monthly => "MONTHLY",
            PeriodType::Yearly => "YEARLY",
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            PeriodType::Daily => b'd',
            PeriodType::Weekly => b'w',
            PeriodType::Monthly => b'm',
            PeriodType::Yearly => b'y',
        }
    }

    /// Finer period whose buckets nest exactly inside this one's.
    ///
    /// Weeks are not folded into months or years since they straddle both.
    pub fn fold_source(&self) -> Option<PeriodType> {
        match self {
            PeriodType::Daily => None,
            PeriodType::Weekly | PeriodType::Monthly => Some(PeriodType::Daily),
            PeriodType::Yearly => Some(PeriodType::Monthly),
        }
    }

    /// First day of the bucket containing `date`.
    ///
    /// Weeks start on Monday, months on day 1, years on January 1.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            PeriodType::Daily => date,
            PeriodType::Weekly => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            PeriodType::Monthly => date.with_day(1).unwrap_or(date),
            PeriodType::Yearly => date.with_ordinal(1).unwrap_or(date),
        }
    }

    /// Last day (inclusive) of the bucket that starts at `start`.
    pub fn bucket_end(&self, start: NaiveDate) -> NaiveDate {
        match self {
            PeriodType::Daily => start,
            PeriodType::Weekly => start + Duration::days(6),
            PeriodType::Monthly => {
                let (y, m) = if start.month() == 12 {
                    (start.year() + 1, 1)
                } else {
                    (start.year(), start.month() + 1)
                };
                NaiveDate::from_ymd_opt(y, m, 1)
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(start)
            }
            PeriodType::Yearly => {
                NaiveDate::from_ymd_opt(start.year(), 12, 31).unwrap_or(start)
            }
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Ok(PeriodType::Daily),
            "WEEKLY" => Ok(PeriodType::Weekly),
            "MONTHLY" => Ok(PeriodType::Monthly),
            "YEARLY" => Ok(PeriodType::Yearly),
            other => Err(format!("unknown period type '{other}'")),
        }
    }
}

/// Direction of a bucket's score movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Stable,
    Declining,
}

impl TrendDirection {
    /// Classify a growth rate against a symmetric stable band.
    pub fn from_growth(growth_rate: f64, band: f64) -> Self {
        if growth_rate > band {
            TrendDirection::Rising
        } else if growth_rate < -band {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }
}

/// Per-entity summary of trending scores over one period bucket.
///
/// Derived data: always recomputable from the snapshot rows it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalAggregate {
    pub entity_id: u64,
    pub entity_type: EntityType,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    /// Inclusive
    pub period_end: NaiveDate,
    pub avg_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub data_points: u32,
    pub growth_rate: f64,
    pub volatility: f64,
    pub trend_direction: TrendDirection,
}

impl HistoricalAggregate {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_week_starts_monday() {
        // 2024-03-14 is a Thursday
        let start = PeriodType::Weekly.bucket_start(d(2024, 3, 14));
        assert_eq!(start, d(2024, 3, 11));
        assert_eq!(PeriodType::Weekly.bucket_end(start), d(2024, 3, 17));
        // Monday maps to itself
        assert_eq!(PeriodType::Weekly.bucket_start(d(2024, 3, 11)), d(2024, 3, 11));
    }

    #[test]
    fn test_month_bucket_handles_leap_february() {
        let start = PeriodType::Monthly.bucket_start(d(2024, 2, 20));
        assert_eq!(start, d(2024, 2, 1));
        assert_eq!(PeriodType::Monthly.bucket_end(start), d(2024, 2, 29));
    }

    #[test]
    fn test_december_month_end() {
        let start = PeriodType::Monthly.bucket_start(d(2023, 12, 5));
        assert_eq!(PeriodType::Monthly.bucket_end(start), d(2023, 12, 31));
    }

    #[test]
    fn test_year_bucket() {
        let start = PeriodType::Yearly.bucket_start(d(2023, 7, 4));
        assert_eq!(start, d(2023, 1, 1));
        assert_eq!(PeriodType::Yearly.bucket_end(start), d(2023, 12, 31));
    }

    #[test]
    fn test_trend_direction_band() {
        assert_eq!(TrendDirection::from_growth(0.10, 0.05), TrendDirection::Rising);
        assert_eq!(TrendDirection::from_growth(0.05, 0.05), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_growth(-0.2, 0.05), TrendDirection::Declining);
    }

    #[test]
    fn test_period_from_str() {
        assert_eq!("weekly".parse::<PeriodType>().unwrap(), PeriodType::Weekly);
        assert!("hourly".parse::<PeriodType>().is_err());
    }

    #[test]
    fn test_fold_source_is_finer_period() {
        assert_eq!(PeriodType::Daily.fold_source(), None);
        assert_eq!(PeriodType::Weekly.fold_source(), Some(PeriodType::Daily));
        assert_eq!(PeriodType::Monthly.fold_source(), Some(PeriodType::Daily));
        assert_eq!(PeriodType::Yearly.fold_source(), Some(PeriodType::Monthly));
    }
}
