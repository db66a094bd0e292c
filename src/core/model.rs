use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarIssue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub original: String,
    pub correction: String,
    pub explanation: String,
}

/// Result of one optimization run. Snapshotted verbatim into history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAnalysis {
    pub original_text: String,
    pub critique: String,
    pub optimized_prompt: String,
    pub techniques_used: Vec<String>,
    #[serde(default)]
    pub grammar_issues: Vec<GrammarIssue>,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub generated_response: String,
    pub response_length: usize,
    pub quality_score: u8,
    pub bias_detected: bool,
    pub bias_analysis: String,
    pub tone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub original: PerformanceMetrics,
    pub optimized: PerformanceMetrics,
}

impl BenchmarkReport {
    pub fn quality_delta(&self) -> i16 {
        i16::from(self.optimized.quality_score) - i16::from(self.original.quality_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Spanish",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "es" | "spanish" | "español" => Ok(Language::Es),
            other => Err(format!("unsupported language '{other}' (expected 'en' or 'es')")),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
