//! Conformance run reporting.
//!
//! Every case reports pass/fail/skip individually with its duration, so a
//! certification run shows exactly which part of the contract a provider
//! misses, not just which suite.

use std::time::Duration;

/// Outcome of one conformance case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The case passed.
    Passed,
    /// The case failed, with the reason.
    Failed(String),
    /// The case was skipped, with the reason (usually a documented
    /// capability gap).
    Skipped(String),
}

/// Result of one conformance case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    /// Case name.
    pub name: String,
    /// Pass/fail/skip outcome.
    pub outcome: Outcome,
    /// Wall-clock duration of the case body (zero when skipped).
    pub duration: Duration,
}

impl CaseReport {
    pub(crate) fn skipped(name: &str, reason: String) -> Self {
        Self {
            name: name.to_string(),
            outcome: Outcome::Skipped(reason),
            duration: Duration::ZERO,
        }
    }

    /// Returns whether the case passed.
    pub fn is_passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }

    /// Returns whether the case failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

/// Results for one suite.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    /// Suite name.
    pub name: String,
    /// Per-case results.
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    /// Creates an empty suite report.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cases: Vec::new(),
        }
    }

    /// Returns whether no case in the suite failed.
    pub fn passed(&self) -> bool {
        !self.cases.iter().any(|c| c.is_failed())
    }

    /// Number of passed cases.
    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.is_passed()).count()
    }

    /// Number of failed cases.
    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.is_failed()).count()
    }

    /// Number of skipped cases.
    pub fn skipped_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| matches!(c.outcome, Outcome::Skipped(_)))
            .count()
    }
}

/// Full result of a conformance run against one provider.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    /// The certified provider's name.
    pub provider: String,
    /// Per-suite results.
    pub suites: Vec<SuiteReport>,
}

impl ConformanceReport {
    /// Returns whether the provider passed: no failures anywhere.
    /// Skipped cases (documented capability gaps) do not fail a run.
    pub fn passed(&self) -> bool {
        self.suites.iter().all(|s| s.passed())
    }

    /// All failures as `(suite, case, reason)`.
    pub fn failures(&self) -> Vec<(&str, &str, &str)> {
        let mut failures = Vec::new();
        for suite in &self.suites {
            for case in &suite.cases {
                if let Outcome::Failed(reason) = &case.outcome {
                    failures.push((suite.name.as_str(), case.name.as_str(), reason.as_str()));
                }
            }
        }
        failures
    }

    /// Total number of cases across all suites.
    pub fn total_cases(&self) -> usize {
        self.suites.iter().map(|s| s.cases.len()).sum()
    }
}

impl std::fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "conformance report for '{}'", self.provider)?;
        for suite in &self.suites {
            writeln!(
                f,
                "  {}: {} passed, {} failed, {} skipped",
                suite.name,
                suite.passed_count(),
                suite.failed_count(),
                suite.skipped_count()
            )?;
            for case in &suite.cases {
                match &case.outcome {
                    Outcome::Passed => {
                        writeln!(f, "    ok   {} ({:?})", case.name, case.duration)?
                    }
                    Outcome::Failed(reason) => {
                        writeln!(f, "    FAIL {}: {}", case.name, reason)?
                    }
                    Outcome::Skipped(reason) => {
                        writeln!(f, "    skip {}: {}", case.name, reason)?
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut suite = SuiteReport::new("crud");
        suite.cases.push(CaseReport {
            name: "round-trip".to_string(),
            outcome: Outcome::Passed,
            duration: Duration::from_millis(3),
        });
        suite.cases.push(CaseReport::skipped("raw sql", "no capability".to_string()));
        suite.cases.push(CaseReport {
            name: "delete".to_string(),
            outcome: Outcome::Failed("row survived".to_string()),
            duration: Duration::from_millis(1),
        });

        assert_eq!(suite.passed_count(), 1);
        assert_eq!(suite.failed_count(), 1);
        assert_eq!(suite.skipped_count(), 1);
        assert!(!suite.passed());

        let report = ConformanceReport {
            provider: "memory".to_string(),
            suites: vec![suite],
        };
        assert!(!report.passed());
        assert_eq!(report.total_cases(), 3);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].1, "delete");
    }

    #[test]
    fn test_skips_do_not_fail_a_run() {
        let mut suite = SuiteReport::new("transactions");
        suite
            .cases
            .push(CaseReport::skipped("commit", "requires capability 'transactions'".to_string()));
        let report = ConformanceReport {
            provider: "supabase".to_string(),
            suites: vec![suite],
        };
        assert!(report.passed());
    }

    #[test]
    fn test_display_contains_outcomes() {
        let mut suite = SuiteReport::new("connection");
        suite.cases.push(CaseReport {
            name: "health".to_string(),
            outcome: Outcome::Passed,
            duration: Duration::from_millis(2),
        });
        let report = ConformanceReport {
            provider: "memory".to_string(),
            suites: vec![suite],
        };
        let rendered = report.to_string();
        assert!(rendered.contains("conformance report for 'memory'"));
        assert!(rendered.contains("ok   health"));
    }
}
