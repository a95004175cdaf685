//! Liveness reporting consumed by an external health aggregator.
//!
//! Each feed implements [`Reporter`]; an aggregator calls [`collect_reports`] over all
//! reporters and serves the result (HTTP serving is outside this crate).

use serde::{Deserialize, Serialize};

/// Health status of one reported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Failing,
    Lagging,
    Unknown,
}

/// One health data point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub name: String,
    pub status: Status,
    pub details: String,
}

impl Report {
    pub fn new(name: impl Into<String>, status: Status, details: impl Into<String>) -> Self {
        Self { name: name.into(), status, details: details.into() }
    }

    pub fn ok(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(name, Status::Ok, details)
    }
}

pub type Reports = Vec<Report>;

/// A component that can describe its own health.
pub trait Reporter {
    fn name(&self) -> &str;
    fn health(&self) -> Reports;
}

/// Gathers every reporter's reports under `service.<reporter>.<report>` names.
pub fn collect_reports<'a>(reporters: impl IntoIterator<Item = &'a dyn Reporter>) -> Reports {
    let mut all = Reports::new();
    for reporter in reporters {
        for mut report in reporter.health() {
            report.name = if report.name.is_empty() {
                format!("service.{}", reporter.name())
            } else {
                format!("service.{}.{}", reporter.name(), report.name)
            };
            all.push(report);
        }
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Reporter for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn health(&self) -> Reports {
            vec![Report::ok("last-block", "42"), Report::new("", Status::Unknown, "")]
        }
    }

    #[test]
    fn reports_are_namespaced_by_reporter() {
        let fixed = Fixed;
        let reports = collect_reports([&fixed as &dyn Reporter]);
        assert_eq!(reports[0].name, "service.fixed.last-block");
        assert_eq!(reports[1].name, "service.fixed");
    }

    #[test]
    fn report_serializes_with_lowercase_status() {
        let json = serde_json::to_string(&Report::ok("last-block", "7")).unwrap();
        assert_eq!(json, r#"{"name":"last-block","status":"ok","details":"7"}"#);
    }
}
