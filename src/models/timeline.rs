use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::check_in::StarterCheckIn;
use super::meal::StarterMeal;

/// Anything that shows up on a starter's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEntry {
    Meal(StarterMeal),
    CheckIn(StarterCheckIn),
}

impl TimelineEntry {
    /// Field every timeline record stores its date under; timeline queries
    /// sort on it.
    pub const DATE_FIELD: &'static str = "date";

    pub fn date(&self) -> DateTime<Utc> {
        match self {
            TimelineEntry::Meal(meal) => meal.date,
            TimelineEntry::CheckIn(check_in) => check_in.date,
        }
    }

    pub fn as_meal(&self) -> Option<&StarterMeal> {
        match self {
            TimelineEntry::Meal(meal) => Some(meal),
            TimelineEntry::CheckIn(_) => None,
        }
    }

    pub fn as_check_in(&self) -> Option<&StarterCheckIn> {
        match self {
            TimelineEntry::CheckIn(check_in) => Some(check_in),
            TimelineEntry::Meal(_) => None,
        }
    }
}

impl From<StarterMeal> for TimelineEntry {
    fn from(meal: StarterMeal) -> Self {
        TimelineEntry::Meal(meal)
    }
}

impl From<StarterCheckIn> for TimelineEntry {
    fn from(check_in: StarterCheckIn) -> Self {
        TimelineEntry::CheckIn(check_in)
    }
}

/// Merges two newest-first sequences into one newest-first sequence.
///
/// On equal dates entries from `first` come before entries from `second`,
/// and each side keeps its own relative order.
pub fn merge_by_date<A, B>(first: A, second: B) -> Vec<TimelineEntry>
where
    A: IntoIterator,
    A::Item: Into<TimelineEntry>,
    B: IntoIterator,
    B::Item: Into<TimelineEntry>,
{
    first
        .into_iter()
        .map(Into::<TimelineEntry>::into)
        .merge_by(second.into_iter().map(Into::<TimelineEntry>::into), |a, b| {
            a.date() >= b.date()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mass, WaterRation};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
    }

    fn meal(hour: u32) -> StarterMeal {
        StarterMeal::new(at(hour), vec![], WaterRation::new(Mass::grams(50.0), None))
    }

    fn check_in(hour: u32, remarks: &str) -> StarterCheckIn {
        StarterCheckIn::new(at(hour), remarks)
    }

    #[test]
    fn test_merge_interleaves_newest_first() {
        let meals = vec![meal(20), meal(12), meal(4)];
        let check_ins = vec![check_in(16, "peaked"), check_in(8, "flat")];

        let merged = merge_by_date(meals, check_ins);
        let hours: Vec<DateTime<Utc>> = merged.iter().map(TimelineEntry::date).collect();
        assert_eq!(hours, vec![at(20), at(16), at(12), at(8), at(4)]);
        assert!(merged[0].as_meal().is_some());
        assert_eq!(merged[1].as_check_in().unwrap().remarks, "peaked");
    }

    #[test]
    fn test_merge_ties_prefer_first_sequence() {
        let merged = merge_by_date(
            vec![meal(10)],
            vec![check_in(10, "a"), check_in(10, "b")],
        );
        assert!(merged[0].as_meal().is_some());
        assert_eq!(merged[1].as_check_in().unwrap().remarks, "a");
        assert_eq!(merged[2].as_check_in().unwrap().remarks, "b");
    }

    #[test]
    fn test_merge_with_empty_side() {
        let merged = merge_by_date(Vec::<StarterMeal>::new(), vec![check_in(1, "x")]);
        assert_eq!(merged.len(), 1);

        let merged = merge_by_date(Vec::<StarterMeal>::new(), Vec::<StarterCheckIn>::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_entry_json_is_tagged() {
        let entry = TimelineEntry::from(check_in(9, "bubbly"));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"kind\":\"check_in\""));
        let parsed: TimelineEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
