//! Legend rows derived from the same series that feed the diagram.

use crate::model::{DisplayValue, Series};
use crate::options::{DiagramOptions, LegendOptions};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendItem {
    pub label: String,
    pub color: Option<String>,
    pub values: Vec<DisplayValue>,
}

impl LegendItem {
    pub fn display_values(&self) -> &[DisplayValue] {
        &self.values
    }

    pub fn display_value(&self, title: &str) -> Option<&DisplayValue> {
        self.values.iter().find(|value| value.title == title)
    }
}

/// Raw points a series is judged by: its values, or its display numerics if it has none.
fn value_points(series: &Series) -> Vec<Option<f64>> {
    if !series.values.is_empty() || series.display.is_empty() {
        return series.values.clone();
    }
    series.display.iter().map(|value| value.numeric).collect()
}

/// A series with no points at all counts as empty.
pub fn is_visible(series: &Series, legend: &LegendOptions) -> bool {
    let points = value_points(series);
    if legend.hide_empty && points.iter().all(Option::is_none) {
        return false;
    }
    if legend.hide_zero && points.iter().map(|p| p.unwrap_or(0.0)).sum::<f64>() == 0.0 {
        return false;
    }
    true
}

pub fn legend_items(series: &[Series], options: &DiagramOptions) -> Vec<LegendItem> {
    series
        .iter()
        .filter(|s| is_visible(s, &options.legend))
        .map(|s| {
            let candidates = s.display_values(options);
            let value_name = s.value_name(options);
            let color = candidates
                .iter()
                .find(|c| c.title == value_name)
                .or_else(|| candidates.first())
                .and_then(|c| c.color.clone());
            let values = options
                .legend
                .calcs
                .iter()
                .filter_map(|calc| candidates.iter().find(|c| c.title == *calc).cloned())
                .collect();
            LegendItem {
                label: s.label.clone(),
                color,
                values,
            }
        })
        .collect()
}

/// Orders rows by the numeric of the named display value. Rows without one go last.
pub fn sort_items(items: &mut [LegendItem], sort_by: &str, desc: bool) {
    items.sort_by(|a, b| {
        let av = a.display_value(sort_by).and_then(|v| v.numeric);
        let bv = b.display_value(sort_by).and_then(|v| v.numeric);
        match (av, bv) {
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                if desc { ord.reverse() } else { ord }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

pub type OptionsChange = Box<dyn FnMut(&LegendOptions)>;

pub struct Legend {
    options: LegendOptions,
    items: Vec<LegendItem>,
    on_change: Option<OptionsChange>,
}

impl Legend {
    pub fn new(series: &[Series], options: &DiagramOptions) -> Self {
        let mut legend = Self {
            options: options.legend.clone(),
            items: legend_items(series, options),
            on_change: None,
        };
        legend.apply_sort();
        legend
    }

    /// Registers the callback fired whenever the user changes the sort.
    pub fn on_options_change(mut self, callback: impl FnMut(&LegendOptions) + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    pub fn items(&self) -> &[LegendItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<LegendItem> {
        self.items
    }

    pub fn options(&self) -> &LegendOptions {
        &self.options
    }

    pub fn is_shown(&self) -> bool {
        self.options.show
    }

    /// Sorting by the current column flips direction; a new column starts ascending.
    pub fn set_sort(&mut self, column: &str) {
        if self.options.sort_by.as_deref() == Some(column) {
            self.options.sort_desc = !self.options.sort_desc;
        } else {
            self.options.sort_by = Some(column.to_string());
            self.options.sort_desc = false;
        }
        self.apply_sort();
        if let Some(callback) = self.on_change.as_mut() {
            callback(&self.options);
        }
    }

    fn apply_sort(&mut self) {
        if let Some(sort_by) = self.options.sort_by.clone() {
            sort_items(&mut self.items, &sort_by, self.options.sort_desc);
        }
    }
}

impl std::fmt::Debug for Legend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Legend")
            .field("options", &self.options)
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn series(label: &str, values: &[Option<f64>]) -> Series {
        Series {
            label: label.into(),
            values: values.to_vec(),
            ..Series::default()
        }
    }

    fn legend_opts(hide_empty: bool, hide_zero: bool) -> LegendOptions {
        LegendOptions {
            hide_empty,
            hide_zero,
            ..LegendOptions::default()
        }
    }

    #[test]
    fn hide_empty_drops_all_null_series() {
        let empty = series("a", &[None, None]);
        assert!(!is_visible(&empty, &legend_opts(true, false)));
        assert!(is_visible(&empty, &legend_opts(false, false)));
        // No points at all is vacuously empty.
        assert!(!is_visible(&series("b", &[]), &legend_opts(true, false)));
    }

    #[test]
    fn hide_zero_drops_series_summing_to_zero() {
        let zero = series("a", &[Some(0.0), None, Some(0.0)]);
        assert!(!is_visible(&zero, &legend_opts(false, true)));
        let cancels = series("b", &[Some(2.0), Some(-2.0)]);
        assert!(!is_visible(&cancels, &legend_opts(false, true)));
    }

    #[test]
    fn ordinary_series_always_shown() {
        let s = series("a", &[Some(1.0), None]);
        for (empty, zero) in [(false, false), (true, false), (false, true), (true, true)] {
            assert!(is_visible(&s, &legend_opts(empty, zero)));
        }
    }

    #[test]
    fn display_only_series_judged_by_numerics() {
        let s = Series {
            label: "x".into(),
            display: vec![DisplayValue {
                title: "last".into(),
                numeric: Some(3.0),
                ..DisplayValue::default()
            }],
            ..Series::default()
        };
        assert!(is_visible(&s, &legend_opts(true, true)));
    }

    #[test]
    fn items_carry_requested_calcs() {
        let mut options = DiagramOptions::default();
        options.legend.calcs = vec!["min".into(), "max".into(), "bogus".into()];
        let items = legend_items(&[series("cpu", &[Some(3.0), Some(9.0)])], &options);
        assert_eq!(items[0].label, "cpu");
        let titles: Vec<&str> = items[0].display_values().iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["min", "max"]);
        assert_eq!(items[0].display_value("max").and_then(|v| v.numeric), Some(9.0));
    }

    #[test]
    fn set_sort_toggles_and_notifies() {
        let mut options = DiagramOptions::default();
        options.legend.calcs = vec!["last".into()];
        let data = [
            series("b", &[Some(5.0)]),
            series("none", &[None]),
            series("a", &[Some(1.0)]),
        ];
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut legend = Legend::new(&data, &options)
            .on_options_change(move |opts| sink.borrow_mut().push(opts.sort_desc));

        legend.set_sort("last");
        let labels: Vec<&str> = legend.items().iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b", "none"]);

        legend.set_sort("last");
        let labels: Vec<&str> = legend.items().iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a", "none"]);

        assert_eq!(*seen.borrow(), vec![false, true]);
        assert_eq!(legend.options().sort_by.as_deref(), Some("last"));
    }
}
