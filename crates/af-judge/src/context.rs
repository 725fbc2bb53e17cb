//! Evaluation context derived from the image report.
//!
//! Pure and side-effect-free: the same report always produces the same
//! context, and the context is the only image-derived input the prompts see.

use std::collections::BTreeMap;

use serde::Serialize;

use af_scanner::ImageReport;
use af_schemas::Severity;

/// Maximum pattern extracts retained per category.
const PATTERNS_PER_CATEGORY: usize = 3;

/// Maximum characters retained per extracted layer command.
const PATTERN_SNIPPET_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationContext {
    pub image_tag: String,
    pub size_bytes: u64,
    pub layer_count: usize,
    pub agent_framework_detected: bool,
    /// severity name -> count.
    pub vulnerability_summary: BTreeMap<String, usize>,
    pub patterns: AgentPatterns,
}

/// Layer-command extracts grouped by what they reveal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentPatterns {
    pub dependencies: Vec<String>,
    pub configurations: Vec<String>,
    pub commands: Vec<String>,
}

impl EvaluationContext {
    pub fn from_report(report: &ImageReport) -> Self {
        let mut vulnerability_summary = BTreeMap::new();
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ] {
            vulnerability_summary.insert(severity.as_str().to_string(), report.count(severity));
        }

        Self {
            image_tag: report.image.clone(),
            size_bytes: report.total_size_bytes,
            layer_count: report.layers.len(),
            agent_framework_detected: report.agent_framework_detected,
            vulnerability_summary,
            patterns: extract_patterns(report),
        }
    }

    /// Render the context block shared by every prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("- Image: {}\n", self.image_tag));
        out.push_str(&format!(
            "- Size: {:.1} MB\n",
            self.size_bytes as f64 / 1_048_576.0
        ));
        out.push_str(&format!("- Layers: {}\n", self.layer_count));
        out.push_str(&format!(
            "- Agent framework detected: {}\n",
            self.agent_framework_detected
        ));
        out.push_str("- Vulnerabilities: ");
        let summary: Vec<String> = self
            .vulnerability_summary
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        out.push_str(&summary.join(" "));
        out.push('\n');

        for (title, items) in [
            ("Dependency installs", &self.patterns.dependencies),
            ("Configuration operations", &self.patterns.configurations),
            ("Start commands", &self.patterns.commands),
        ] {
            if !items.is_empty() {
                out.push_str(&format!("- {title}:\n"));
                for item in items {
                    out.push_str(&format!("    - {item}\n"));
                }
            }
        }

        out
    }
}

fn extract_patterns(report: &ImageReport) -> AgentPatterns {
    let mut patterns = AgentPatterns::default();

    for layer in &report.layers {
        let lower = layer.command.to_ascii_lowercase();

        if ["npm install", "pip install", "yarn add", "cargo install"]
            .iter()
            .any(|m| lower.contains(m))
        {
            push_capped(&mut patterns.dependencies, &layer.command);
        }

        if ["config", "env", "secret"].iter().any(|m| lower.contains(m)) {
            push_capped(&mut patterns.configurations, &layer.command);
        }

        if ["cmd", "entrypoint", "run ", "start", "exec"]
            .iter()
            .any(|m| lower.contains(m))
        {
            push_capped(&mut patterns.commands, &layer.command);
        }
    }

    patterns
}

fn push_capped(bucket: &mut Vec<String>, command: &str) {
    if bucket.len() >= PATTERNS_PER_CATEGORY {
        return;
    }
    let mut snippet = command.to_string();
    snippet.truncate(PATTERN_SNIPPET_LEN);
    bucket.push(snippet);
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_scanner::LayerRecord;
    use chrono::Utc;

    fn report_with_layers(commands: &[&str]) -> ImageReport {
        ImageReport {
            image: "acme/agent:1".to_string(),
            total_size_bytes: 10_485_760,
            layers: commands
                .iter()
                .map(|c| LayerRecord {
                    command: c.to_string(),
                    size_bytes: 1,
                })
                .collect(),
            vulnerabilities: vec![],
            agent_framework_detected: true,
            base_image: None,
            timestamp: Utc::now(),
            warnings: vec![],
        }
    }

    #[test]
    fn context_is_deterministic() {
        let report = report_with_layers(&["RUN pip install ccxt", "CMD python main.py"]);
        let a = EvaluationContext::from_report(&report);
        let b = EvaluationContext::from_report(&report);
        assert_eq!(a, b);
    }

    #[test]
    fn patterns_are_capped_per_category() {
        let commands: Vec<String> = (0..10)
            .map(|i| format!("RUN pip install package-{i}"))
            .collect();
        let refs: Vec<&str> = commands.iter().map(String::as_str).collect();
        let ctx = EvaluationContext::from_report(&report_with_layers(&refs));
        assert_eq!(ctx.patterns.dependencies.len(), 3);
    }

    #[test]
    fn long_commands_are_truncated() {
        let long = format!("RUN pip install {}", "x".repeat(300));
        let ctx = EvaluationContext::from_report(&report_with_layers(&[&long]));
        assert_eq!(ctx.patterns.dependencies[0].len(), 100);
    }

    #[test]
    fn render_names_the_image() {
        let ctx = EvaluationContext::from_report(&report_with_layers(&[]));
        let rendered = ctx.render();
        assert!(rendered.contains("acme/agent:1"));
        assert!(rendered.contains("10.0 MB"));
    }
}
