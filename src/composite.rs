use crate::model::{CompositeMetric, MetricIndicator};
use tracing::debug;

/// Collapses a composite's members into one indicator carrying the composite's name.
///
/// Missing or non-numeric values count as 0. Comparison is strict, so ties keep the
/// earliest candidate. Returns `None` when no indicator belongs to the composite.
pub fn reduce_composite(
    composite: &CompositeMetric,
    indicators: &[MetricIndicator],
) -> Option<MetricIndicator> {
    let winner = indicators
        .iter()
        .filter(|indicator| !indicator.is_composite)
        .filter(|indicator| composite.members.iter().any(|m| *m == indicator.metric_name))
        .reduce(|best, candidate| {
            let (best_value, value) = (best.display.numeric_or_zero(), candidate.display.numeric_or_zero());
            let better = if composite.show_lowest_value {
                value < best_value
            } else {
                best_value < value
            };
            if better { candidate } else { best }
        })?;

    debug!(
        composite = %composite.name,
        member = %winner.metric_name,
        value = %winner.formatted(),
        "composite resolved"
    );
    let mut resolved = winner.clone();
    resolved.original_name = Some(std::mem::replace(
        &mut resolved.metric_name,
        composite.name.clone(),
    ));
    resolved.is_composite = true;
    Some(resolved)
}

pub fn reduce_composites(
    composites: &[CompositeMetric],
    indicators: &[MetricIndicator],
) -> Vec<MetricIndicator> {
    composites
        .iter()
        .filter_map(|composite| reduce_composite(composite, indicators))
        .collect()
}
