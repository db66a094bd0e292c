use super::classifier::{ClassifiedError, ErrorKind};
use super::model::{GrammarIssue, PerformanceMetrics, PromptAnalysis};
use serde_json::{Map, Value};

const DIAGNOSTIC_PREFIX_CHARS: usize = 120;

fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```JSON", "").replace("```", "")
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses a single JSON object out of `raw`, tolerating fences and surrounding prose.
pub fn parse_json_payload(raw: &str) -> Result<Value, ClassifiedError> {
    let stripped = strip_fences(raw);
    let content = stripped.trim();

    match serde_json::from_str::<Value>(content) {
        Ok(value) => return Ok(value),
        Err(e) => log::debug!("Direct parse failed ({e}), trying brace span"),
    }

    if let Some(span) = brace_span(content) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Ok(value);
        }
    }

    let head: String = raw.chars().take(DIAGNOSTIC_PREFIX_CHARS).collect();
    log::warn!("Unrecoverable model output: {head}");
    Err(ClassifiedError::of(ErrorKind::ParsingError).with_detail(head))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, ClassifiedError> {
    value.as_object().ok_or_else(|| {
        ClassifiedError::new(ErrorKind::ValidationError, format!("{what} is not a JSON object"))
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn clamp_score(n: f64) -> u8 {
    n.round().clamp(0.0, 100.0) as u8
}

fn number_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn grammar_issues(obj: &Map<String, Value>) -> Vec<GrammarIssue> {
    let Some(items) = obj.get("grammarIssues").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|issue| GrammarIssue {
            issue_type: string_field(issue, "type"),
            original: string_field(issue, "original"),
            correction: string_field(issue, "correction"),
            explanation: string_field(issue, "explanation"),
        })
        .collect()
}

// optimizedPrompt and a numeric score are required; the rest default to empty.
pub fn analysis_from_value(original_text: &str, value: &Value) -> Result<PromptAnalysis, ClassifiedError> {
    let obj = as_object(value, "optimization response")?;

    let optimized_prompt = string_field(obj, "optimizedPrompt");
    if optimized_prompt.trim().is_empty() {
        return Err(ClassifiedError::new(
            ErrorKind::ValidationError,
            "The model response did not include an optimized prompt.",
        ));
    }

    let score = number_field(obj, "score").ok_or_else(|| {
        ClassifiedError::new(ErrorKind::ValidationError, "The model response did not include a score.")
    })?;

    let techniques_used = obj
        .get("techniquesUsed")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    Ok(PromptAnalysis {
        original_text: original_text.to_string(),
        critique: string_field(obj, "critique"),
        optimized_prompt,
        techniques_used,
        grammar_issues: grammar_issues(obj),
        score: clamp_score(score),
    })
}

/// Builds [`PerformanceMetrics`] from a judge payload about `generated_response`.
pub fn metrics_from_value(generated_response: &str, value: &Value) -> Result<PerformanceMetrics, ClassifiedError> {
    let obj = as_object(value, "judge response")?;

    Ok(PerformanceMetrics {
        generated_response: generated_response.to_string(),
        response_length: generated_response.chars().count(),
        quality_score: number_field(obj, "qualityScore").map_or(0, clamp_score),
        bias_detected: obj.get("biasDetected").and_then(Value::as_bool).unwrap_or(false),
        bias_analysis: string_field(obj, "biasAnalysis"),
        tone: string_field(obj, "tone"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_fence() {
        let value = parse_json_payload("```json\n{\"score\":10}\n```").unwrap();
        assert_eq!(value, json!({ "score": 10 }));
    }

    #[test]
    fn recovers_object_from_surrounding_prose() {
        let value = parse_json_payload("Sure! {\"score\":10} Hope that helps.").unwrap();
        assert_eq!(value, json!({ "score": 10 }));
    }

    #[test]
    fn brace_span_is_greedy_to_last_brace() {
        let raw = "Here: {\"a\": {\"b\": 1}} trailing";
        assert_eq!(parse_json_payload(raw).unwrap(), json!({ "a": { "b": 1 } }));
    }

    #[test]
    fn garbage_is_parsing_error_with_diagnostic_head() {
        let err = parse_json_payload("not json at all").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParsingError);
        assert_eq!(err.detail.as_deref(), Some("not json at all"));
        assert!(!err.message.contains("not json"));
    }

    #[test]
    fn unbalanced_braces_fail() {
        let err = parse_json_payload("} oops {").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParsingError);
    }

    #[test]
    fn analysis_defaults_optional_fields() {
        let value = json!({ "optimizedPrompt": "Better", "score": 72.6 });
        let analysis = analysis_from_value("orig", &value).unwrap();
        assert_eq!(analysis.original_text, "orig");
        assert_eq!(analysis.critique, "");
        assert!(analysis.grammar_issues.is_empty());
        assert!(analysis.techniques_used.is_empty());
        assert_eq!(analysis.score, 73);
    }

    #[test]
    fn analysis_drops_malformed_entries_and_clamps_score() {
        let value = json!({
            "critique": "Too vague",
            "optimizedPrompt": "Be specific",
            "techniquesUsed": ["role prompting", 7, null],
            "grammarIssues": [{ "type": "spelling", "original": "teh" }, "junk"],
            "score": 140
        });
        let analysis = analysis_from_value("x", &value).unwrap();
        assert_eq!(analysis.techniques_used, vec!["role prompting"]);
        assert_eq!(analysis.grammar_issues.len(), 1);
        assert_eq!(analysis.grammar_issues[0].issue_type, "spelling");
        assert_eq!(analysis.grammar_issues[0].correction, "");
        assert_eq!(analysis.score, 100);
    }

    #[test]
    fn missing_optimized_prompt_is_validation_error() {
        let err = analysis_from_value("x", &json!({ "score": 50 })).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn missing_score_is_validation_error() {
        let err = analysis_from_value("x", &json!({ "optimizedPrompt": "y" })).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn non_object_payload_is_validation_error() {
        let err = analysis_from_value("x", &json!([1, 2])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }

    #[test]
    fn metrics_take_length_from_judged_response() {
        let value = json!({ "qualityScore": 88, "biasDetected": true, "tone": "formal" });
        let metrics = metrics_from_value("héllo", &value).unwrap();
        assert_eq!(metrics.response_length, 5);
        assert_eq!(metrics.quality_score, 88);
        assert!(metrics.bias_detected);
        assert_eq!(metrics.bias_analysis, "");
        assert_eq!(metrics.tone, "formal");
    }
}
