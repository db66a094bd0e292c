use super::client::{GenerationConfig, GenerativeModel};
use super::prompts;
use super::schema_utils;
use crate::config::Config;
use crate::core::classifier::{classify_error, ClassifiedError};
use crate::core::model::{BenchmarkReport, Language, PerformanceMetrics, PromptAnalysis};
use crate::core::sanitizer;
use crate::error::OrionError;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct GrammarIssueResponse {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub original: String,
    pub correction: String,
    pub explanation: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResponse {
    pub critique: String,
    pub optimized_prompt: String,
    pub techniques_used: Vec<String>,
    pub grammar_issues: Vec<GrammarIssueResponse>,
    #[schemars(description = "Quality of the original prompt, 0 to 100.")]
    pub score: i64,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResponse {
    #[schemars(description = "0 to 100.")]
    pub quality_score: i64,
    pub bias_detected: bool,
    pub bias_analysis: String,
    pub tone: String,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub optimizer_model: String,
    pub simulation_model: String,
    pub judge_model: String,
    pub temperature: f32,
    pub thinking_budget: Option<u32>,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            optimizer_model: config.optimizer_model.clone(),
            simulation_model: config.simulation_model.clone(),
            judge_model: config.judge_model.clone(),
            temperature: config.temperature,
            thinking_budget: (config.thinking_budget > 0).then_some(config.thinking_budget),
        }
    }
}

pub struct PromptService<M: GenerativeModel> {
    model: M,
    settings: ServiceSettings,
}

fn schema_of(schema: schemars::schema::RootSchema) -> Result<serde_json::Value, ClassifiedError> {
    schema_utils::response_schema(schema).map_err(|e| classify_error(&OrionError::JsonError(e)))
}

impl<M: GenerativeModel> PromptService<M> {
    pub fn new(model: M, settings: ServiceSettings) -> Self {
        Self { model, settings }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    async fn call(&self, model: &str, content: &str, config: &GenerationConfig) -> Result<String, ClassifiedError> {
        self.model
            .generate(model, content, config)
            .await
            .map_err(|e| classify_error(&e))
    }

    pub async fn optimize_prompt(&self, text: &str, language: Language) -> Result<PromptAnalysis, ClassifiedError> {
        let config = GenerationConfig {
            system_instruction: Some(prompts::optimizer_instruction(language)),
            temperature: Some(self.settings.temperature),
            response_schema: Some(schema_of(schema_for!(OptimizationResponse))?),
            thinking_budget: self.settings.thinking_budget,
            ..GenerationConfig::default()
        };

        let raw = self
            .call(&self.settings.optimizer_model, &prompts::optimizer_request(text), &config)
            .await?;
        let value = sanitizer::parse_json_payload(&raw)?;
        sanitizer::analysis_from_value(text, &value)
    }

    pub async fn generate_response(&self, prompt: &str) -> Result<String, ClassifiedError> {
        let config = GenerationConfig {
            temperature: Some(self.settings.temperature),
            ..GenerationConfig::default()
        };
        self.call(&self.settings.simulation_model, prompt, &config).await
    }

    pub async fn judge_response(
        &self,
        prompt: &str,
        response: &str,
        language: Language,
    ) -> Result<PerformanceMetrics, ClassifiedError> {
        let config = GenerationConfig {
            system_instruction: Some(prompts::judge_instruction(language)),
            temperature: Some(0.0),
            response_schema: Some(schema_of(schema_for!(JudgeResponse))?),
            ..GenerationConfig::default()
        };

        let raw = self
            .call(&self.settings.judge_model, &prompts::judge_request(prompt, response), &config)
            .await?;
        let value = sanitizer::parse_json_payload(&raw)?;
        sanitizer::metrics_from_value(response, &value)
    }

    pub async fn evaluate(&self, prompt: &str, language: Language) -> Result<PerformanceMetrics, ClassifiedError> {
        let response = self.generate_response(prompt).await?;
        self.judge_response(prompt, &response, language).await
    }

    /// Evaluates both prompts concurrently. Either failure fails the whole benchmark.
    pub async fn benchmark(
        &self,
        original: &str,
        optimized: &str,
        language: Language,
    ) -> Result<BenchmarkReport, ClassifiedError> {
        let (original, optimized) =
            tokio::try_join!(self.evaluate(original, language), self.evaluate(optimized, language))?;
        Ok(BenchmarkReport { original, optimized })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::classifier::ErrorKind;
    use std::sync::Mutex;

    /// Replies are picked by the first matching substring of the request content.
    pub(crate) struct ScriptedModel {
        pub replies: Vec<(&'static str, Result<String, u16>)>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<(&'static str, Result<String, u16>)>) -> Self {
            Self { replies, calls: Mutex::new(Vec::new()) }
        }
    }

    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, model: &str, content: &str, _config: &GenerationConfig) -> Result<String, OrionError> {
            self.calls.lock().unwrap().push((model.to_string(), content.to_string()));
            tokio::task::yield_now().await;
            let (_, reply) = self
                .replies
                .iter()
                .find(|(needle, _)| content.contains(needle))
                .expect("no scripted reply for request");
            match reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => {
                    let reason = reqwest::StatusCode::from_u16(*status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("scripted");
                    Err(OrionError::Upstream { status: *status, message: reason.into() })
                }
            }
        }
    }

    pub(crate) fn settings() -> ServiceSettings {
        ServiceSettings::from(&Config::default())
    }

    #[tokio::test]
    async fn optimize_parses_fenced_payload() {
        let model = ScriptedModel::new(vec![(
            "ORIGINAL PROMPT",
            Ok("```json\n{\"critique\":\"vague\",\"optimizedPrompt\":\"Act as...\",\"score\":41}\n```".into()),
        )]);
        let service = PromptService::new(model, settings());

        let analysis = service.optimize_prompt("write stuff", Language::En).await.unwrap();
        assert_eq!(analysis.original_text, "write stuff");
        assert_eq!(analysis.optimized_prompt, "Act as...");
        assert_eq!(analysis.score, 41);
        assert!(analysis.grammar_issues.is_empty());
    }

    #[tokio::test]
    async fn optimize_classifies_upstream_failure() {
        let model = ScriptedModel::new(vec![("ORIGINAL PROMPT", Err(401))]);
        let service = PromptService::new(model, settings());

        let err = service.optimize_prompt("x", Language::En).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailure);
    }

    #[tokio::test]
    async fn evaluate_judges_the_generated_response() {
        let model = ScriptedModel::new(vec![
            ("RESPONSE:", Ok(r#"{"qualityScore":77,"biasDetected":false,"biasAnalysis":"none","tone":"calm"}"#.into())),
            ("Tell me", Ok("A calm answer".into())),
        ]);
        let service = PromptService::new(model, settings());

        let metrics = service.evaluate("Tell me a story", Language::Es).await.unwrap();
        assert_eq!(metrics.generated_response, "A calm answer");
        assert_eq!(metrics.response_length, 13);
        assert_eq!(metrics.quality_score, 77);

        let calls = service.model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, crate::config::DEFAULT_FAST_MODEL);
        assert!(calls[1].1.contains("A calm answer"));
    }

    #[tokio::test]
    async fn benchmark_fails_as_a_whole() {
        let model = ScriptedModel::new(vec![
            ("RESPONSE:", Ok(r#"{"qualityScore":50}"#.into())),
            ("good prompt", Ok("fine".into())),
            ("bad prompt", Err(429)),
        ]);
        let service = PromptService::new(model, settings());

        let err = service.benchmark("bad prompt", "good prompt", Language::En).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn benchmark_reports_both_sides() {
        let model = ScriptedModel::new(vec![
            ("RESPONSE:\n\"\"\"\nshort", Ok(r#"{"qualityScore":40}"#.into())),
            ("RESPONSE:", Ok(r#"{"qualityScore":90}"#.into())),
            ("v1", Ok("short".into())),
            ("v2", Ok("much better".into())),
        ]);
        let service = PromptService::new(model, settings());

        let report = service.benchmark("v1", "v2", Language::En).await.unwrap();
        assert_eq!(report.original.quality_score, 40);
        assert_eq!(report.optimized.quality_score, 90);
        assert_eq!(report.quality_delta(), 50);
    }
}
