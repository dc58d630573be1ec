use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::{debug, info};

use clausewise_core::error::Result;
use clausewise_core::traits::GenerationRequest;
use clausewise_hybrid::ResolvedContext;

use super::{format_context, generation_error, locate_page, source_pages, StructuredGenerator};

const SYSTEM: &str = "You are a legal contract risk analyst. Identify legal and commercial risks in the contract sections you are given. \
For every risk report: risk_type (one of liability, termination, ip, confidentiality, indemnification, non_compete, payment, data_privacy, other), \
severity (low, medium, high or critical), clause_text (the exact problematic wording), explanation, recommendation, and page. \
Report only risks the text supports. Respond with JSON: {\"risks\": [...], \"summary\": \"...\"}.";

const NO_CONTEXT: &str = "No relevant contract text was found for risk analysis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Models are inconsistent about case ("High", "HIGH").
impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" | "moderate" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(de::Error::unknown_variant(other, &["low", "medium", "high", "critical"])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(default = "other_risk")]
    pub risk_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub clause_text: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub page: Option<u32>,
}

fn other_risk() -> String {
    "other".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub risks: Vec<Risk>,
    pub summary: String,
    pub total_risks: usize,
}

impl RiskReport {
    fn new(risks: Vec<Risk>, summary: String) -> Self {
        Self { total_risks: risks.len(), risks, summary }
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.risks.iter().map(|r| r.severity).max()
    }
}

#[derive(Deserialize)]
struct RiskReply {
    #[serde(default)]
    risks: Vec<Risk>,
    #[serde(default)]
    summary: String,
}

pub struct RiskAgent {
    generator: StructuredGenerator,
}

impl RiskAgent {
    pub fn new(generator: StructuredGenerator) -> Self {
        Self { generator }
    }

    pub async fn analyze(&self, focus: Option<&str>, contexts: &[ResolvedContext]) -> Result<RiskReport> {
        if contexts.is_empty() {
            info!("no context for risk analysis, skipping generation");
            return Ok(RiskReport::new(Vec::new(), NO_CONTEXT.into()));
        }

        let mut prompt = String::new();
        if let Some(focus) = focus {
            prompt.push_str(&format!("Focus: {}\n\n", focus));
        }
        prompt.push_str(&format!(
            "Analyze the following contract sections for legal risks:\n\n{}\n\nSource pages: {:?}",
            format_context(contexts),
            source_pages(contexts)
        ));
        let request = GenerationRequest {
            purpose: "risk_analysis".into(),
            system: SYSTEM.into(),
            prompt,
            schema: json!({
                "type": "object",
                "properties": {
                    "risks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "risk_type": { "type": "string" },
                                "severity": { "type": "string", "enum": ["low", "medium", "high", "critical"] },
                                "clause_text": { "type": "string" },
                                "explanation": { "type": "string" },
                                "recommendation": { "type": "string" },
                                "page": { "type": "integer" }
                            },
                            "required": ["risk_type", "severity", "clause_text", "explanation"]
                        }
                    },
                    "summary": { "type": "string" }
                },
                "required": ["risks", "summary"]
            }),
            temperature: 0.2,
            max_tokens: 2000,
        };

        let reply: RiskReply = self.generator.generate(&request).await.map_err(|e| generation_error("risk_analysis", e))?;
        let pages = source_pages(contexts);
        let risks: Vec<Risk> = reply
            .risks
            .into_iter()
            .map(|mut risk| {
                if risk.page.map_or(true, |p| !pages.contains(&p)) {
                    risk.page = locate_page(&risk.clause_text, contexts).or(risk.page);
                }
                risk
            })
            .collect();
        debug!(risks = risks.len(), "risk analysis parsed");
        Ok(RiskReport::new(risks, reply.summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_case_insensitive() {
        let risks: Vec<Risk> = serde_json::from_value(json!([
            { "risk_type": "payment", "severity": "HIGH", "clause_text": "x", "explanation": "y" },
            { "severity": " Low " }
        ]))
        .unwrap();
        assert_eq!(risks[0].severity, Severity::High);
        assert_eq!(risks[1].severity, Severity::Low);
        assert_eq!(risks[1].risk_type, "other");
    }

    #[test]
    fn unknown_severity_is_rejected() {
        let out = serde_json::from_value::<Risk>(json!({ "severity": "catastrophic" }));
        assert!(out.is_err());
    }

    #[test]
    fn report_counts_and_ranks_risks() {
        let risk = |severity| Risk {
            risk_type: "liability".into(),
            severity,
            clause_text: String::new(),
            explanation: String::new(),
            recommendation: String::new(),
            page: None,
        };
        let report = RiskReport::new(vec![risk(Severity::Medium), risk(Severity::Critical)], "two".into());
        assert_eq!(report.total_risks, 2);
        assert_eq!(report.highest_severity(), Some(Severity::Critical));
    }
}
