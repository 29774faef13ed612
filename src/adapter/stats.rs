use serde::Serialize;

use crate::model::{MetricKind, TurbineOperationalMetric};

/// Remaining/interval ratio below which a metric is flagged
pub const WARNING_RATIO: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Success,
    Warning,
    Danger,
}

impl Tone {
    /// `Danger` once nothing remains, `Warning` when inside the last
    /// `WARNING_RATIO` of the interval
    pub fn for_values(remaining: f64, interval: f64) -> Self {
        if remaining <= 0.0 {
            Tone::Danger
        } else if interval > 0.0 && remaining / interval < WARNING_RATIO {
            Tone::Warning
        } else {
            Tone::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Success => "success",
            Tone::Warning => "warning",
            Tone::Danger => "danger",
        }
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatRow {
    pub kind: MetricKind,
    pub label: &'static str,
    pub target: f64,
    pub interval: f64,
    pub actual: f64,
    pub remaining: f64,
    pub tone: Tone,
    pub note: Option<String>,
}

/// Metrics in the fixed order hours, trips, starts
///
/// Storage order does not matter. A kind with no metric row yields no stat
/// row. `remaining` is recomputed from target and actual rather than read
/// from the stored value.
pub fn metrics_to_stat_rows(metrics: &[TurbineOperationalMetric]) -> Vec<StatRow> {
    MetricKind::all()
        .iter()
        .filter_map(|kind| {
            let metric = metrics.iter().find(|m| m.metric_type_code == kind.as_code())?;
            let remaining = metric.target_value - metric.actual_value;
            Some(StatRow {
                kind: *kind,
                label: kind.label(),
                target: metric.target_value,
                interval: metric.interval_value,
                actual: metric.actual_value,
                remaining,
                tone: Tone::for_values(remaining, metric.interval_value),
                note: metric.status_note.clone(),
            })
        })
        .collect()
}
