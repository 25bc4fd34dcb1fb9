use std::path::PathBuf;

use clap::Parser;
use supplynet::{Directory, UnitId, domain::SupplierGraph};
use tracing::instrument;

use super::{OutputFormat, terminal::Colorize};

#[derive(Debug, Parser)]
#[command(about = "Validate the supplier hierarchy and record references")]
pub struct Validate {
    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,
}

#[derive(Debug, Default)]
struct ValidationResult {
    units: usize,
    load_error: Option<String>,
    cycles: Vec<Vec<UnitId>>,
}

impl ValidationResult {
    fn issue_count(&self) -> usize {
        usize::from(self.load_error.is_some()) + self.cycles.len()
    }
}

impl Validate {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let result = match Directory::new(root) {
            Ok(directory) => ValidationResult {
                units: directory.network().unit_count(),
                load_error: None,
                cycles: directory.network().cycles(),
            },
            Err(error) => ValidationResult {
                load_error: Some(error.to_string()),
                ..ValidationResult::default()
            },
        };

        match self.output {
            OutputFormat::Pretty => self.output_pretty(&result),
            OutputFormat::Json => Self::output_json(&result)?,
        }

        if result.issue_count() > 0 {
            std::process::exit(2);
        }

        Ok(())
    }

    fn output_pretty(&self, result: &ValidationResult) {
        if self.quiet {
            return;
        }
        for line in pretty_report(result) {
            println!("{line}");
        }
    }

    fn output_json(result: &ValidationResult) -> anyhow::Result<()> {
        use serde_json::json;

        let cycles: Vec<Vec<u64>> = result
            .cycles
            .iter()
            .map(|cycle| cycle.iter().map(|id| id.get()).collect())
            .collect();

        let total = result.issue_count();
        let output = json!({
            "status": if total == 0 { "healthy" } else { "issues_found" },
            "units": result.units,
            "load_error": result.load_error,
            "hierarchy_checked": result.load_error.is_none(),
            "cycles": cycles,
            "summary": {
                "total_issues": total,
            }
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

fn pretty_report(result: &ValidationResult) -> Vec<String> {
    let mut lines = vec!["Validating network...\n".to_string()];

    if let Some(error) = &result.load_error {
        lines.push(format!("✗ Records:    {error}").warning());
        lines.push("- Hierarchy:  not checked".dim());
    } else {
        lines.push(format!(
            "✓ Records:    {} units, all references resolve",
            result.units
        ));
        if result.cycles.is_empty() {
            lines.push("✓ Hierarchy:  No cycles".to_string());
        } else {
            lines.push(format!("✗ Hierarchy:  {} cycles found", result.cycles.len()).warning());
            for cycle in &result.cycles {
                let ids: Vec<_> = cycle.iter().map(ToString::to_string).collect();
                lines.push(format!("  • {}", ids.join(" → ")));
            }
        }
    }

    let total = result.issue_count();
    if total == 0 {
        lines.push(format!("\n{}", "Network is healthy (0 issues)".success()));
    } else {
        lines.push(format!("\n{}", format!("Summary: {total} issues found").warning()));
        if !result.cycles.is_empty() {
            lines.push("Run 'supnet unit update <id> --root-unit' to break a cycle".dim());
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_load_leaves_hierarchy_unchecked() {
        let result = ValidationResult {
            load_error: Some("unit 2 references missing supplier 1".to_string()),
            ..ValidationResult::default()
        };

        let report = pretty_report(&result);

        assert!(report.iter().any(|line| line.contains("Hierarchy:  not checked")));
        assert!(!report.iter().any(|line| line.contains("No cycles")));
        assert_eq!(result.issue_count(), 1);
    }

    #[test]
    fn healthy_network_reports_no_cycles() {
        let result = ValidationResult {
            units: 3,
            ..ValidationResult::default()
        };

        let report = pretty_report(&result);

        assert!(report.iter().any(|line| line.contains("✓ Hierarchy:  No cycles")));
        assert!(report.iter().any(|line| line.contains("3 units")));
    }
}
