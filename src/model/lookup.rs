//! Lookup tables: small `{code, name}` enumerations referenced by foreign key

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::impl_record;
use crate::storage::schema::tables;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentType {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseStatus {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionCode {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurbineMetricType {
    pub code: String,
    pub name: String,
}

impl_record!(ComponentType, tables::COMPONENT_TYPES, code);
impl_record!(UseStatus, tables::USE_STATUSES, code);
impl_record!(ConditionCode, tables::CONDITION_CODES, code);
impl_record!(TurbineMetricType, tables::TURBINE_METRIC_TYPES, code);

macro_rules! lookup_ctor {
    ($($ty:ty),*) => {
        $(impl $ty {
            pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
                Self { code: code.into(), name: name.into() }
            }
        })*
    };
}

lookup_ctor!(ComponentType, UseStatus, ConditionCode, TurbineMetricType);

/// The turbine counters tracked against service intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Hours,
    Trips,
    Starts,
}

impl MetricKind {
    /// Code stored in `metric_type_code`
    pub fn as_code(&self) -> &'static str {
        match self {
            MetricKind::Hours => "hours",
            MetricKind::Trips => "trips",
            MetricKind::Starts => "starts",
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Hours => "Hours",
            MetricKind::Trips => "Trips",
            MetricKind::Starts => "Starts",
        }
    }

    /// Display order
    pub fn all() -> &'static [MetricKind] {
        &[MetricKind::Hours, MetricKind::Trips, MetricKind::Starts]
    }

    /// Lookup row seeded for this kind
    pub fn lookup_row(&self) -> TurbineMetricType {
        TurbineMetricType::new(self.as_code(), self.label())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hours" | "hour" | "hrs" => Ok(MetricKind::Hours),
            "trips" | "trip" => Ok(MetricKind::Trips),
            "starts" | "start" => Ok(MetricKind::Starts),
            _ => Err(Error::InvalidRecord(format!("Unknown metric type: {}", s))),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_codes() {
        for kind in MetricKind::all() {
            let parsed: MetricKind = kind.as_code().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
        assert_eq!(MetricKind::from_str("HRS").unwrap(), MetricKind::Hours);
        assert!(MetricKind::from_str("rpm").is_err());
    }
}
