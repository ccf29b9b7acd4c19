//! Turning raw series points into display values: reducers, number formatting and
//! threshold colors.

use serde::{Deserialize, Serialize};

pub const NO_DATA: &str = "No data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reducer {
    Last,
    LastNotNull,
    First,
    FirstNotNull,
    Min,
    Max,
    Mean,
    Sum,
    Count,
    Range,
    Delta,
}

impl Reducer {
    pub const ALL: [Reducer; 11] = [
        Reducer::Last,
        Reducer::LastNotNull,
        Reducer::First,
        Reducer::FirstNotNull,
        Reducer::Min,
        Reducer::Max,
        Reducer::Mean,
        Reducer::Sum,
        Reducer::Count,
        Reducer::Range,
        Reducer::Delta,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Reducer::Last => "last",
            Reducer::LastNotNull => "lastNotNull",
            Reducer::First => "first",
            Reducer::FirstNotNull => "firstNotNull",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Mean => "mean",
            Reducer::Sum => "sum",
            Reducer::Count => "count",
            Reducer::Range => "range",
            Reducer::Delta => "delta",
        }
    }

    pub fn from_id(id: &str) -> Option<Reducer> {
        Reducer::ALL.into_iter().find(|r| r.id() == id)
    }

    pub fn reduce(self, points: &[Option<f64>]) -> Option<f64> {
        let mut present = points.iter().filter_map(|p| *p).filter(|v| !v.is_nan());
        match self {
            Reducer::Last => points.last().copied().flatten(),
            Reducer::First => points.first().copied().flatten(),
            Reducer::LastNotNull => present.next_back(),
            Reducer::FirstNotNull => present.next(),
            Reducer::Min => present.reduce(f64::min),
            Reducer::Max => present.reduce(f64::max),
            Reducer::Sum => present.reduce(|a, b| a + b),
            Reducer::Mean => {
                let (sum, count) = present.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                (count > 0).then(|| sum / count as f64)
            }
            Reducer::Count => Some(points.len() as f64),
            Reducer::Range => {
                let values: Vec<f64> = present.collect();
                let min = values.iter().copied().reduce(f64::min)?;
                let max = values.iter().copied().reduce(f64::max)?;
                Some(max - min)
            }
            Reducer::Delta => {
                let mut prev: Option<f64> = None;
                let mut total = 0.0;
                for value in present {
                    if let Some(p) = prev {
                        // A drop means the counter was reset; count from zero.
                        total += if value >= p { value - p } else { value };
                    }
                    prev = Some(value);
                }
                prev.map(|_| total)
            }
        }
    }
}

/// One step of an ascending threshold scale. The base step carries no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub value: Option<f64>,
    pub color: String,
}

pub fn threshold_color(thresholds: &[Threshold], value: Option<f64>) -> Option<String> {
    let value = value?;
    let mut color = None;
    for step in thresholds {
        match step.value {
            None => color = Some(step.color.clone()),
            Some(limit) if value >= limit => color = Some(step.color.clone()),
            Some(_) => {}
        }
    }
    color
}

pub fn format_number(value: Option<f64>, decimals: Option<usize>) -> String {
    let Some(value) = value else {
        return NO_DATA.to_string();
    };
    if value.is_nan() {
        return "NaN".to_string();
    }
    if let Some(decimals) = decimals {
        return format!("{value:.decimals$}");
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: [Option<f64>; 5] = [None, Some(4.0), Some(1.0), Some(6.0), None];

    #[test]
    fn reducers_skip_nulls_where_expected() {
        assert_eq!(Reducer::Last.reduce(&POINTS), None);
        assert_eq!(Reducer::LastNotNull.reduce(&POINTS), Some(6.0));
        assert_eq!(Reducer::FirstNotNull.reduce(&POINTS), Some(4.0));
        assert_eq!(Reducer::Min.reduce(&POINTS), Some(1.0));
        assert_eq!(Reducer::Max.reduce(&POINTS), Some(6.0));
        assert_eq!(Reducer::Sum.reduce(&POINTS), Some(11.0));
        assert_eq!(Reducer::Count.reduce(&POINTS), Some(5.0));
        assert_eq!(Reducer::Range.reduce(&POINTS), Some(5.0));
        assert_eq!(Reducer::Mean.reduce(&[]), None);
    }

    #[test]
    fn delta_survives_counter_reset() {
        let points = [Some(10.0), Some(15.0), Some(3.0), Some(5.0)];
        assert_eq!(Reducer::Delta.reduce(&points), Some(5.0 + 3.0 + 2.0));
    }

    #[test]
    fn reducer_ids_round_trip() {
        for reducer in Reducer::ALL {
            assert_eq!(Reducer::from_id(reducer.id()), Some(reducer));
        }
        assert_eq!(Reducer::from_id("median"), None);
    }

    #[test]
    fn threshold_picks_highest_step_reached() {
        let steps = vec![
            Threshold {
                value: None,
                color: "green".into(),
            },
            Threshold {
                value: Some(80.0),
                color: "red".into(),
            },
        ];
        assert_eq!(threshold_color(&steps, Some(10.0)).as_deref(), Some("green"));
        assert_eq!(threshold_color(&steps, Some(80.0)).as_deref(), Some("red"));
        assert_eq!(threshold_color(&steps, None), None);
    }

    #[test]
    fn numbers_format_compactly() {
        assert_eq!(format_number(Some(42.0), None), "42");
        assert_eq!(format_number(Some(0.126), None), "0.13");
        assert_eq!(format_number(Some(1.5), Some(3)), "1.500");
        assert_eq!(format_number(None, None), NO_DATA);
    }
}
