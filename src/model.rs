use crate::display::{Reducer, Threshold, format_number, threshold_color};
use crate::error::{PanelError, Result};
use crate::options::DiagramOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Link {
    pub title: String,
    pub href: String,
}

/// One candidate value a series can surface, already formatted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayValue {
    pub title: String,
    pub text: String,
    pub numeric: Option<f64>,
    pub color: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub links: Vec<Link>,
}

impl DisplayValue {
    pub fn formatted(&self) -> String {
        format!(
            "{}{}{}",
            self.prefix.as_deref().unwrap_or_default(),
            self.text,
            self.suffix.as_deref().unwrap_or_default()
        )
    }

    /// Numeric value for min/max comparisons; missing or NaN counts as 0. Infinities are kept.
    pub fn numeric_or_zero(&self) -> f64 {
        self.numeric.filter(|v| !v.is_nan()).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldConfig {
    /// Which display value (by title) this series surfaces on the diagram.
    pub value_name: Option<String>,
    pub decimals: Option<usize>,
    pub unit: Option<String>,
    pub thresholds: Option<Vec<Threshold>>,
}

/// One labeled data series. `label` is the key matched against diagram ids and text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Series {
    pub label: String,
    pub field_config: FieldConfig,
    pub values: Vec<Option<f64>>,
    pub display: Vec<DisplayValue>,
}

impl Series {
    /// Display candidates: the supplied ones, or one per reducer over the raw points.
    pub fn display_values(&self, options: &DiagramOptions) -> Vec<DisplayValue> {
        if !self.display.is_empty() {
            return self.display.clone();
        }
        let decimals = self.field_config.decimals.or(options.decimals);
        let unit = self
            .field_config
            .unit
            .clone()
            .or_else(|| options.unit.clone())
            .filter(|unit| !unit.is_empty());
        let thresholds = self
            .field_config
            .thresholds
            .as_deref()
            .unwrap_or(&options.thresholds);
        Reducer::ALL
            .into_iter()
            .map(|reducer| {
                let numeric = reducer.reduce(&self.values);
                DisplayValue {
                    title: reducer.id().to_string(),
                    text: format_number(numeric, decimals),
                    numeric,
                    color: threshold_color(thresholds, numeric),
                    prefix: None,
                    suffix: numeric.and(unit.clone()),
                    links: Vec::new(),
                }
            })
            .collect()
    }

    pub fn value_name<'a>(&'a self, options: &'a DiagramOptions) -> &'a str {
        self.field_config
            .value_name
            .as_deref()
            .unwrap_or(options.value_name.as_str())
    }
}

/// A display value bound to the diagram element it should be painted on.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricIndicator {
    pub metric_name: String,
    pub value_name: String,
    pub display: DisplayValue,
    pub is_composite: bool,
    /// Member the value came from, once relabeled to a composite name.
    pub original_name: Option<String>,
}

impl MetricIndicator {
    pub fn new(metric_name: impl Into<String>, value_name: impl Into<String>, display: DisplayValue) -> Self {
        Self {
            metric_name: metric_name.into(),
            value_name: value_name.into(),
            display,
            is_composite: false,
            original_name: None,
        }
    }

    pub fn formatted(&self) -> String {
        self.display.formatted()
    }

    pub fn color(&self) -> Option<&str> {
        self.display.color.as_deref()
    }
}

/// Several metrics collapsed into one diagram element by min or max.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositeMetric {
    pub name: String,
    pub members: Vec<String>,
    pub show_lowest_value: bool,
}

/// Builds one indicator per series with a non-empty label.
pub fn indicators(series: &[Series], options: &DiagramOptions) -> Vec<MetricIndicator> {
    series
        .iter()
        .filter(|s| !s.label.is_empty())
        .filter_map(|s| {
            let value_name = s.value_name(options);
            let candidates = s.display_values(options);
            let display = candidates
                .iter()
                .find(|candidate| candidate.title == value_name)
                .or_else(|| candidates.first())?
                .clone();
            Some(MetricIndicator::new(s.label.clone(), value_name, display))
        })
        .collect()
}

pub fn parse_series(text: &str) -> Result<Vec<Series>> {
    Ok(serde_json::from_str(text)?)
}

pub fn load_series(path: &Path) -> Result<Vec<Series>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| PanelError::io(path.display().to_string(), err))?;
    parse_series(&contents)
}
