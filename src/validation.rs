//! Validate-or-repair for model output
//!
//! Remote model output is untrusted JSON. It is first checked against size
//! and nesting limits, then parsed strictly into an [`AnalysisReport`]. When
//! the strict parse fails, a repair pass coerces the shape: missing arrays
//! become empty, out-of-range numbers are clamped, items without their
//! required text are dropped. Repair never invents content.

use crate::constants::caveats;
use crate::models::{
    clamp_signed_unit, clamp_unit, AnalysisReport, Anomaly, ChunkSummary, Confidence, Correlation,
    Intervention, Pattern, PredictiveInsight, Severity,
};
use serde_json::{Map, Value};

/// Maximum allowed size for a model payload (1MB)
const MAX_JSON_SIZE_BYTES: usize = 1024 * 1024;

/// Maximum nesting depth for JSON objects/arrays
const MAX_JSON_DEPTH: usize = 10;

/// Maximum number of keys in a JSON object
const MAX_JSON_KEYS: usize = 1000;

/// Maximum string length for JSON string values
const MAX_JSON_STRING_LENGTH: usize = 10000;

/// Top-level keys that identify a payload as report-shaped
const REPORT_KEYS: &[&str] = &[
    "summary",
    "keyFindings",
    "patterns",
    "correlations",
    "anomalies",
    "predictiveInsights",
    "suggestedInterventions",
    "insights",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid {
        report: AnalysisReport,
        repaired: bool,
        caveats: Vec<String>,
    },
    Invalid {
        error: String,
    },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid { .. })
    }
}

pub trait ReportValidator: Send + Sync {
    fn validate(&self, raw: &Value) -> ValidationOutcome;
}

/// Strict parse first, coercion second
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaRepairValidator;

impl ReportValidator for SchemaRepairValidator {
    fn validate(&self, raw: &Value) -> ValidationOutcome {
        if let Err(error) = check_payload_limits(raw) {
            return ValidationOutcome::Invalid { error };
        }

        if let Ok(report) = serde_json::from_value::<AnalysisReport>(raw.clone()) {
            if report.is_within_bounds() {
                return ValidationOutcome::Valid {
                    report,
                    repaired: false,
                    caveats: Vec::new(),
                };
            }
        }

        match repair_report(raw) {
            Ok(mut report) => {
                report.add_caveat(caveats::SCHEMA_REPAIRED);
                ValidationOutcome::Valid {
                    report,
                    repaired: true,
                    caveats: vec![caveats::SCHEMA_REPAIRED.to_string()],
                }
            }
            Err(error) => ValidationOutcome::Invalid { error },
        }
    }
}

/// Parse one window's summary. Lenient: anything report-shaped is coerced,
/// and every list is capped.
pub fn parse_chunk_summary(raw: &Value) -> Result<ChunkSummary, String> {
    check_payload_limits(raw)?;
    let object = raw
        .as_object()
        .ok_or_else(|| format!("summary must be an object, got {}", type_name(raw)))?;

    let summary = ChunkSummary {
        key_findings: strings(object.get("keyFindings")),
        patterns: items(object.get("patterns"), pattern),
        correlations: items(object.get("correlations"), correlation),
        anomalies: items(object.get("anomalies"), anomaly),
        suggested_interventions: items(object.get("suggestedInterventions"), intervention),
        predictive_insights: items(object.get("predictiveInsights"), predictive_insight),
    };
    Ok(summary.bounded())
}

/// Size, depth and key-count limits for untrusted payloads
pub fn check_payload_limits(value: &Value) -> Result<(), String> {
    let serialized =
        serde_json::to_string(value).map_err(|e| format!("Invalid JSON structure: {e}"))?;
    if serialized.len() > MAX_JSON_SIZE_BYTES {
        return Err(format!(
            "JSON payload too large: {} bytes (max: {})",
            serialized.len(),
            MAX_JSON_SIZE_BYTES
        ));
    }
    check_depth(value, 0)
}

fn check_depth(value: &Value, depth: usize) -> Result<(), String> {
    if depth > MAX_JSON_DEPTH {
        return Err(format!("JSON nesting too deep: {depth} levels (max: {MAX_JSON_DEPTH})"));
    }
    match value {
        Value::Object(map) => {
            if map.len() > MAX_JSON_KEYS {
                return Err(format!(
                    "Too many keys in JSON object: {} (max: {MAX_JSON_KEYS})",
                    map.len()
                ));
            }
            map.values().try_for_each(|v| check_depth(v, depth + 1))
        }
        Value::Array(values) => values.iter().try_for_each(|v| check_depth(v, depth + 1)),
        Value::String(s) if s.len() > MAX_JSON_STRING_LENGTH => Err(format!(
            "String value too long: {} characters (max: {MAX_JSON_STRING_LENGTH})",
            s.len()
        )),
        _ => Ok(()),
    }
}

fn repair_report(raw: &Value) -> Result<AnalysisReport, String> {
    let object = raw
        .as_object()
        .ok_or_else(|| format!("report must be an object, got {}", type_name(raw)))?;
    if !REPORT_KEYS.iter().any(|key| object.contains_key(*key)) {
        return Err("payload has no recognizable report fields".to_string());
    }

    Ok(AnalysisReport {
        summary: text(object.get("summary")),
        key_findings: strings(object.get("keyFindings")),
        patterns: items(object.get("patterns"), pattern),
        correlations: items(object.get("correlations"), correlation),
        anomalies: items(object.get("anomalies"), anomaly),
        predictive_insights: items(object.get("predictiveInsights"), predictive_insight),
        suggested_interventions: items(object.get("suggestedInterventions"), intervention),
        insights: strings(object.get("insights")),
        confidence: object
            .get("confidence")
            .and_then(Value::as_object)
            .map(|c| Confidence {
                overall: number(c.get("overall")).map(clamp_unit).unwrap_or(0.0),
                calibration: text(c.get("calibration")).unwrap_or_default(),
            })
            .unwrap_or_default(),
        caveats: strings(object.get("caveats")),
        ..AnalysisReport::default()
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers, or strings that parse as numbers; non-finite values are rejected
fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(values)) => values.iter().filter_map(|v| text(Some(v))).collect(),
        Some(single @ Value::String(_)) => text(Some(single)).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn items<T>(value: Option<&Value>, parse: fn(&Map<String, Value>) -> Option<T>) -> Vec<T> {
    match value {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_object)
            .filter_map(parse)
            .collect(),
        _ => Vec::new(),
    }
}

fn severity(value: Option<&Value>) -> Option<Severity> {
    match value?.as_str()?.trim().to_ascii_lowercase().as_str() {
        "low" => Some(Severity::Low),
        "medium" | "moderate" => Some(Severity::Medium),
        "high" => Some(Severity::High),
        _ => None,
    }
}

fn pattern(object: &Map<String, Value>) -> Option<Pattern> {
    Some(Pattern {
        name: text(object.get("name"))?,
        description: text(object.get("description")),
        strength: number(object.get("strength")).map(clamp_unit).unwrap_or(0.0),
        impact: severity(object.get("impact")),
    })
}

fn correlation(object: &Map<String, Value>) -> Option<Correlation> {
    let variables = match object.get("variables")? {
        Value::Array(pair) if pair.len() == 2 => (text(pair.first())?, text(pair.get(1))?),
        _ => return None,
    };
    Some(Correlation {
        variables,
        coefficient: clamp_signed_unit(number(object.get("coefficient"))?),
        description: text(object.get("description")),
    })
}

fn anomaly(object: &Map<String, Value>) -> Option<Anomaly> {
    Some(Anomaly {
        description: text(object.get("description"))?,
        severity: severity(object.get("severity")).unwrap_or_default(),
    })
}

fn predictive_insight(object: &Map<String, Value>) -> Option<PredictiveInsight> {
    Some(PredictiveInsight {
        outcome: text(object.get("outcome"))?,
        probability: clamp_unit(number(object.get("probability"))?),
    })
}

fn intervention(object: &Map<String, Value>) -> Option<Intervention> {
    Some(Intervention {
        title: text(object.get("title"))?,
        description: text(object.get("description")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid(outcome: ValidationOutcome) -> (AnalysisReport, bool) {
        match outcome {
            ValidationOutcome::Valid { report, repaired, .. } => (report, repaired),
            ValidationOutcome::Invalid { error } => panic!("expected valid, got {error}"),
        }
    }

    #[test]
    fn test_well_formed_report_passes_untouched() {
        let raw = json!({
            "keyFindings": ["Calm mornings"],
            "patterns": [{"name": "Morning calm", "strength": 0.7}],
            "confidence": {"overall": 0.5}
        });
        let (report, repaired) = valid(SchemaRepairValidator.validate(&raw));
        assert!(!repaired);
        assert!(report.caveats.is_empty());
        assert_eq!(report.patterns[0].strength, 0.7);
    }

    #[test]
    fn test_out_of_range_numbers_are_clamped() {
        let raw = json!({
            "patterns": [{"name": "Overstated", "strength": 3.5}],
            "correlations": [{"variables": ["noise", "anxiety"], "coefficient": -4}],
            "predictiveInsights": [{"outcome": "Better focus", "probability": "1.7"}]
        });
        let (report, repaired) = valid(SchemaRepairValidator.validate(&raw));
        assert!(repaired);
        assert!(report.has_caveat(caveats::SCHEMA_REPAIRED));
        assert_eq!(report.patterns[0].strength, 1.0);
        assert_eq!(report.correlations[0].coefficient, -1.0);
        assert_eq!(report.predictive_insights[0].probability, 1.0);
    }

    #[test]
    fn test_repair_drops_items_without_required_text() {
        let raw = json!({
            "keyFindings": "Only one finding",
            "anomalies": [{"severity": "high"}, {"description": "Spike on Monday", "severity": "extreme"}],
            "suggestedInterventions": [{"description": "no title"}]
        });
        let (report, repaired) = valid(SchemaRepairValidator.validate(&raw));
        assert!(repaired);
        assert_eq!(report.key_findings, vec!["Only one finding"]);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].severity, Severity::Medium);
        assert!(report.suggested_interventions.is_empty());
    }

    #[test]
    fn test_unrecognizable_payloads_are_invalid() {
        assert!(!SchemaRepairValidator.validate(&json!("just text")).is_valid());
        assert!(!SchemaRepairValidator.validate(&json!({"answer": 42})).is_valid());
    }

    #[test]
    fn test_json_too_deep() {
        let mut deep = json!({"patterns": []});
        for _ in 0..=MAX_JSON_DEPTH {
            deep = json!({ "nested": deep });
        }
        assert!(check_payload_limits(&deep).is_err());
        assert!(!SchemaRepairValidator.validate(&deep).is_valid());
    }

    #[test]
    fn test_string_too_long() {
        let raw = json!({"summary": "x".repeat(MAX_JSON_STRING_LENGTH + 1)});
        assert!(check_payload_limits(&raw).is_err());
    }

    #[test]
    fn test_chunk_summary_is_bounded() {
        let findings: Vec<String> = (0..25).map(|i| format!("finding {i}")).collect();
        let summary = parse_chunk_summary(&json!({"keyFindings": findings})).unwrap();
        assert_eq!(summary.key_findings.len(), crate::constants::MAX_SUMMARY_ITEMS);
        assert!(parse_chunk_summary(&json!([1, 2])).is_err());
    }
}
