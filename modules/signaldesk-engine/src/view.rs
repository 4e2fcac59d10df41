//! Plain-text rendering of the dashboard.

use std::fmt;

use serde_json::Value;

use signaldesk_common::Signal;

use crate::reveal::Phase;

/// One visible row in the signal list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRow {
    pub signal_id: String,
    pub title: String,
    pub severity: Option<String>,
    pub fresh: bool,
}

/// Everything needed to draw the dashboard at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardView {
    pub phase: Phase,
    pub rows: Vec<SignalRow>,
    /// Known signals not yet revealed.
    pub hidden: usize,
    pub trace: Vec<String>,
    pub notice: Option<String>,
    pub prompt: bool,
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Phase::Idle => writeln!(f, "No signals yet. Run `analyze` to start an audit.")?,
            Phase::Revealing => writeln!(f, "Scanning...")?,
            _ => writeln!(f, "{} signal(s)", self.rows.len())?,
        }

        for row in &self.rows {
            let marker = if row.fresh { "NEW" } else { "   " };
            match &row.severity {
                Some(severity) => writeln!(
                    f,
                    "  {marker} {:<12} [{severity}] {}",
                    row.signal_id, row.title
                )?,
                None => writeln!(f, "  {marker} {:<12} {}", row.signal_id, row.title)?,
            }
        }

        if !self.trace.is_empty() {
            writeln!(f, "  --")?;
            for line in &self.trace {
                writeln!(f, "  > {line}")?;
            }
        }

        if self.prompt {
            writeln!(
                f,
                "* {} new signal(s) available. Type `scan` to reveal them.",
                self.hidden
            )?;
        }
        if let Some(notice) = &self.notice {
            writeln!(f, "* {notice}")?;
        }
        Ok(())
    }
}

/// Detail view of one signal.
pub struct SignalDetail<'a>(pub &'a Signal);

const DETAIL_FIELDS: [(&str, &str); 12] = [
    ("severity", "Severity"),
    ("status", "Status"),
    ("date", "Date"),
    ("region", "Region"),
    ("impact", "Impact"),
    ("summary", "Summary"),
    ("prose", "Analysis"),
    ("context_source", "Context source"),
    ("context_insight", "Context"),
    ("solution", "Solution"),
    ("recommendation", "Recommendation"),
    ("employee_attribution", "Owner"),
];

impl fmt::Display for SignalDetail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signal = self.0;
        writeln!(
            f,
            "{} {}",
            signal.signal_id,
            signal.title().unwrap_or("(untitled)")
        )?;
        for (key, label) in DETAIL_FIELDS {
            if let Some(value) = signal.field(key).filter(|v| !v.is_null()) {
                writeln!(f, "  {label}: {}", inline(value))?;
            }
        }
        Ok(())
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn marks_fresh_rows_and_prompt() {
        let view = DashboardView {
            phase: Phase::PromptArmed,
            rows: vec![
                SignalRow {
                    signal_id: "SIG-001".to_string(),
                    title: "APAC revenue drop".to_string(),
                    severity: Some("critical".to_string()),
                    fresh: true,
                },
                SignalRow {
                    signal_id: "SIG-002".to_string(),
                    title: "Churn spike".to_string(),
                    severity: None,
                    fresh: false,
                },
            ],
            hidden: 3,
            trace: Vec::new(),
            notice: None,
            prompt: true,
        };

        let text = view.to_string();

        assert!(text.contains("NEW SIG-001"));
        assert!(text.contains("[critical] APAC revenue drop"));
        assert!(text.contains("3 new signal(s) available"));
    }

    #[test]
    fn detail_lists_known_fields_in_order() {
        let signal = Signal::from_value(json!({
            "signal_id": "SIG-007",
            "title": "Zenith Labs acquisition",
            "recommendation": "Escalate to the regional VP",
            "severity": "high",
            "impact": 1_200_000,
            "svg": "<svg/>"
        }))
        .unwrap();

        let text = SignalDetail(&signal).to_string();

        assert!(text.starts_with("SIG-007 Zenith Labs acquisition\n"));
        let severity = text.find("Severity: high").unwrap();
        let recommendation = text.find("Recommendation: Escalate").unwrap();
        assert!(severity < recommendation);
        assert!(text.contains("Impact: 1200000"));
        assert!(!text.contains("svg"));
    }
}
