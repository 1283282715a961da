//! Output and Reporting
//!
//! Formats the outcome of a resolution run for humans, scripts (JSON) or a one-block summary.

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::cli::{OutputFormat, ResolveMode, VerbosityLevel};
use crate::policy::ResolutionPolicy;

/// What happened to one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved {
        system_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        public_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        encoding: Option<String>,
    },
    NotFound,
    Error {
        message: String,
    },
}

impl ResolutionStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionStatus::Resolved { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutcome {
    pub identifier: String,
    #[serde(flatten)]
    pub status: ResolutionStatus,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl ResolutionOutcome {
    pub fn new(identifier: impl Into<String>, status: ResolutionStatus, duration: Duration) -> Self {
        Self {
            identifier: identifier.into(),
            status,
            duration,
        }
    }
}

/// Outcomes of one run, in the order the identifiers were given
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub mode: ResolveMode,
    pub policy: ResolutionPolicy,
    pub catalogs: Vec<String>,
    pub outcomes: Vec<ResolutionOutcome>,
    #[serde(rename = "total_duration_ms", serialize_with = "serialize_millis")]
    pub total_duration: Duration,
}

impl ResolutionReport {
    pub fn new(
        mode: ResolveMode,
        policy: ResolutionPolicy,
        catalogs: Vec<String>,
        outcomes: Vec<ResolutionOutcome>,
        total_duration: Duration,
    ) -> Self {
        Self {
            mode,
            policy,
            catalogs,
            outcomes,
            total_duration,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn resolved_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_resolved()).count()
    }

    pub fn not_found_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == ResolutionStatus::NotFound)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ResolutionStatus::Error { .. }))
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// 0 when everything resolved, 1 when something was not found, 2 when something failed
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            2
        } else if self.not_found_count() > 0 {
            1
        } else {
            0
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Output formatter for resolution reports
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Formatter that never emits ANSI escapes
    pub fn plain(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn render(
        &self,
        report: &ResolutionReport,
        format: OutputFormat,
    ) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Human => Ok(self.format_report(report)),
            OutputFormat::Json => serde_json::to_string_pretty(report),
            OutputFormat::Summary => Ok(self.format_summary(report)),
        }
    }

    pub fn format_report(&self, report: &ResolutionReport) -> String {
        let mut output = String::new();

        match self.verbosity {
            VerbosityLevel::Quiet => {
                for outcome in report.outcomes.iter().filter(|o| !o.status.is_resolved()) {
                    output.push_str(&self.format_outcome(outcome));
                    output.push('\n');
                }
            }
            VerbosityLevel::Normal | VerbosityLevel::Verbose | VerbosityLevel::Debug => {
                for outcome in &report.outcomes {
                    output.push_str(&self.format_outcome(outcome));
                    output.push('\n');
                }
                output.push('\n');
                output.push_str(&self.format_summary(report));

                if self.verbosity == VerbosityLevel::Debug {
                    output.push_str(&self.format_debug_info(report));
                }
            }
        }

        output
    }

    pub fn format_outcome(&self, outcome: &ResolutionOutcome) -> String {
        let duration_str = format_duration(outcome.duration);

        match &outcome.status {
            ResolutionStatus::Resolved {
                system_id,
                public_id,
                encoding,
            } => {
                let mut output = format!(
                    "{}  {} -> {} ({})",
                    self.colorize("✓ RESOLVED", "32"),
                    outcome.identifier,
                    system_id,
                    duration_str
                );
                if self.verbosity >= VerbosityLevel::Verbose {
                    if let Some(public_id) = public_id {
                        output.push_str(&format!("\n    public ID: {}", public_id));
                    }
                    if let Some(encoding) = encoding {
                        output.push_str(&format!("\n    encoding: {}", encoding));
                    }
                }
                output
            }
            ResolutionStatus::NotFound => {
                format!(
                    "{}  {} ({})",
                    self.colorize("✗ NOT FOUND", "31"),
                    outcome.identifier,
                    duration_str
                )
            }
            ResolutionStatus::Error { message } => {
                format!(
                    "{}  {} ({}) - {}",
                    self.colorize("⚠ ERROR", "33"),
                    outcome.identifier,
                    duration_str,
                    message
                )
            }
        }
    }

    pub fn format_summary(&self, report: &ResolutionReport) -> String {
        let mut output = String::new();
        output.push_str("Resolution Summary:\n");
        output.push_str(&format!("  Mode: {}\n", report.mode.as_str()));
        output.push_str(&format!("  Total identifiers: {}\n", report.total()));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Resolved:", "32"),
            report.resolved_count()
        ));

        if report.not_found_count() > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Not found:", "31"),
                report.not_found_count()
            ));
        }
        if report.error_count() > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Errors:", "33"),
                report.error_count()
            ));
        }

        output.push_str(&format!(
            "  Duration: {}\n",
            format_duration(report.total_duration)
        ));

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!("  Policy: {}\n", report.policy));
        }

        output
    }

    fn format_debug_info(&self, report: &ResolutionReport) -> String {
        let mut output = String::new();
        output.push_str("\nDebug Information:\n");
        output.push_str(&format!("  Catalogs loaded: {}\n", report.catalogs.len()));
        for (i, catalog) in report.catalogs.iter().enumerate() {
            output.push_str(&format!("    {}: {}\n", i + 1, catalog));
        }
        output
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
