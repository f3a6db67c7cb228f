//! Structured intelligence extracted from a cleaned transcript
//!
//! These types bind the schema-constrained LLM call: the JSON schema sent
//! with the request is generated from the same shape the response is
//! deserialized into, so a response that parses is a response that
//! validates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Severity levels for identified risks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

impl RiskSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskSeverity::Low => "low",
            RiskSeverity::Medium => "medium",
            RiskSeverity::High => "high",
        }
    }
}

/// Multi-level summaries of the interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summaries {
    /// 5-10 word title capturing the essence
    pub title: String,
    /// 1-2 sentence headline for quick scanning
    pub headline: String,
    /// 2-3 paragraph executive summary
    pub brief: String,
    /// Comprehensive summary with all key points
    pub detailed: String,
    /// The single most important takeaway
    pub spotlight: String,
}

/// An actionable task extracted from the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// A decision made during the interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// A risk identified in the interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub risk: String,
    pub severity: RiskSeverity,
    #[serde(default)]
    pub mitigation: Option<String>,
}

/// Product-related feedback from the interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFeedback {
    pub text: String,
}

/// Market intelligence extracted from the interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIntelligence {
    pub text: String,
}

/// Complete structured analysis of an interaction transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionAnalysis {
    pub summaries: Summaries,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    #[serde(default)]
    pub product_feedback: Vec<ProductFeedback>,
    #[serde(default)]
    pub market_intelligence: Vec<MarketIntelligence>,
}

impl InteractionAnalysis {
    /// Total number of insight rows this analysis decomposes into
    pub fn insight_count(&self) -> usize {
        self.action_items.len()
            + self.decisions.len()
            + self.risks.len()
            + self.key_takeaways.len()
            + self.product_feedback.len()
            + self.market_intelligence.len()
    }

    /// Strict JSON schema for the structured-output LLM call.
    ///
    /// Every field is required and objects are closed
    /// (`additionalProperties: false`); optionality is expressed as
    /// nullable types, matching what the provider's strict mode demands.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": [
                "summaries", "action_items", "decisions", "risks",
                "key_takeaways", "product_feedback", "market_intelligence"
            ],
            "properties": {
                "summaries": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["title", "headline", "brief", "detailed", "spotlight"],
                    "properties": {
                        "title": {
                            "type": "string",
                            "description": "5-10 word title capturing the essence of the interaction"
                        },
                        "headline": {
                            "type": "string",
                            "description": "1-2 sentence headline summary for quick scanning"
                        },
                        "brief": {
                            "type": "string",
                            "description": "2-3 paragraph executive summary covering key points"
                        },
                        "detailed": {
                            "type": "string",
                            "description": "Comprehensive summary with all key points and context"
                        },
                        "spotlight": {
                            "type": "string",
                            "description": "Key highlight or most important takeaway"
                        }
                    }
                },
                "action_items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["description", "owner", "due_date"],
                        "properties": {
                            "description": {
                                "type": "string",
                                "description": "Clear description of the action item"
                            },
                            "owner": {
                                "type": ["string", "null"],
                                "description": "Person responsible, if mentioned"
                            },
                            "due_date": {
                                "type": ["string", "null"],
                                "description": "Due date in YYYY-MM-DD form, if mentioned"
                            }
                        }
                    }
                },
                "decisions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["decision", "rationale"],
                        "properties": {
                            "decision": {
                                "type": "string",
                                "description": "The decision that was made"
                            },
                            "rationale": {
                                "type": ["string", "null"],
                                "description": "Reasoning behind the decision, if provided"
                            }
                        }
                    }
                },
                "risks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["risk", "severity", "mitigation"],
                        "properties": {
                            "risk": {
                                "type": "string",
                                "description": "Description of the risk or concern"
                            },
                            "severity": {
                                "type": "string",
                                "enum": ["low", "medium", "high"]
                            },
                            "mitigation": {
                                "type": ["string", "null"],
                                "description": "Suggested mitigation, if mentioned"
                            }
                        }
                    }
                },
                "key_takeaways": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "product_feedback": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["text"],
                        "properties": {
                            "text": {
                                "type": "string",
                                "description": "Feature request, pain point, bug, or UX friction mentioned"
                            }
                        }
                    }
                },
                "market_intelligence": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["text"],
                        "properties": {
                            "text": {
                                "type": "string",
                                "description": "Competitor mention, market trend, or macro theme discussed"
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_round_trips() {
        let analysis = InteractionAnalysis {
            summaries: Summaries {
                title: "Quarterly renewal call".to_string(),
                headline: "Renewal on track.".to_string(),
                brief: "Two paragraphs.".to_string(),
                detailed: "Everything.".to_string(),
                spotlight: "Champion confirmed budget.".to_string(),
            },
            action_items: vec![ActionItem {
                description: "Send pricing".to_string(),
                owner: Some("Dana".to_string()),
                due_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            }],
            decisions: vec![],
            risks: vec![Risk {
                risk: "Competitor eval".to_string(),
                severity: RiskSeverity::High,
                mitigation: None,
            }],
            key_takeaways: vec!["Budget approved".to_string()],
            product_feedback: vec![],
            market_intelligence: vec![],
        };
        let json = serde_json::to_string(&analysis).unwrap();
        let back: InteractionAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(analysis, back);
        assert_eq!(analysis.insight_count(), 3);
    }

    #[test]
    fn severity_uses_lowercase_wire_names() {
        assert_eq!(
            serde_json::to_value(RiskSeverity::Medium).unwrap(),
            Value::String("medium".to_string())
        );
    }

    #[test]
    fn schema_requires_every_category() {
        let schema = InteractionAnalysis::json_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        for key in [
            "summaries",
            "action_items",
            "decisions",
            "risks",
            "key_takeaways",
            "product_feedback",
            "market_intelligence",
        ] {
            assert!(required.contains(&key), "schema missing {key}");
        }
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
    }
}
