//! Insight generation over flattened report text.
//!
//! Per request: building_prompt → awaiting_completion → {parsed_ok |
//! salvaged | fallback}. Every terminal state returns the same result
//! shape; `analyze` and `answer` never error, so callers need no
//! exception handling around partial LLM failures.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::backend::{ChatBackend, CompletionOptions};

const SYSTEM_PROMPT: &str =
    "You are a financial analysis AI specialized in providing insights from accounting data.";

const SUGGESTED_QUESTIONS: &[&str] = &[
    "What is my current financial health?",
    "How can I improve my cash flow?",
    "What are my biggest expense categories?",
    "Is my debt-to-equity ratio healthy?",
    "What tax strategies should I consider?",
    "Are there any concerning financial trends?",
    "How can I reduce my operational costs?",
    "Should I be concerned about my current liabilities?",
];

/// Structured analysis result. Always fully populated; `error` is set
/// only when the completion call itself failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResult {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub question: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct InsightEngine {
    backend: Box<dyn ChatBackend>,
}

impl InsightEngine {
    pub fn new(backend: Box<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Analyze flattened report text. Never errors: malformed replies are
    /// salvaged or downgraded, network failures carry the `error` field.
    pub async fn analyze(&self, report_label: &str, report_text: &str) -> InsightResult {
        let prompt = format!(
            "As a financial analyst, review the following {report_label} and provide insights:\n\
             \n\
             # {report_label}\n\
             {report_text}\n\
             \n\
             Please provide:\n\
             1. Three notable insights about the financial situation\n\
             2. Three actionable recommendations\n\
             3. A brief summary of the overall financial health in 3-4 sentences\n\
             \n\
             Respond with JSON only, using this structure:\n\
             {{\"summary\": \"...\", \"insights\": [\"...\"], \"recommendations\": [\"...\"]}}"
        );

        let opts = CompletionOptions {
            temperature: 0.2,
            max_tokens: 1000,
        };

        match self.backend.complete(SYSTEM_PROMPT, &prompt, opts).await {
            Ok(reply) => parse_completion(&reply),
            Err(e) => InsightResult {
                summary: "Analysis unavailable: the completion request failed.".into(),
                insights: Vec::new(),
                recommendations: vec![
                    "Retry the analysis once the completion endpoint is reachable.".into(),
                ],
                error: Some(e.to_string()),
            },
        }
    }

    /// Answer a free-form question about the flattened report text.
    pub async fn answer(&self, report_text: &str, question: &str) -> AnswerResult {
        let prompt = format!(
            "As a financial analyst, use the following chart of accounts to answer this question:\n\
             \n\
             # Question\n\
             {question}\n\
             \n\
             # Chart of Accounts\n\
             {report_text}\n\
             \n\
             Provide a comprehensive answer with any relevant calculations, explanations, and insights."
        );

        let opts = CompletionOptions {
            temperature: 0.3,
            max_tokens: 800,
        };

        match self.backend.complete(SYSTEM_PROMPT, &prompt, opts).await {
            Ok(reply) => AnswerResult {
                question: question.to_string(),
                answer: reply,
                error: None,
            },
            Err(e) => AnswerResult {
                question: question.to_string(),
                answer: String::new(),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn suggested_questions() -> &'static [&'static str] {
        SUGGESTED_QUESTIONS
    }
}

/// Parse an LLM reply into an InsightResult.
///
/// Ladder: direct JSON parse, then a fenced ```json block, then the
/// outermost brace span, then a fallback embedding the raw text. Never
/// fails.
pub(crate) fn parse_completion(raw: &str) -> InsightResult {
    if let Ok(parsed) = serde_json::from_str::<InsightResult>(raw) {
        return parsed;
    }

    if let Some(block) = fenced_json_block(raw) {
        if let Ok(parsed) = serde_json::from_str::<InsightResult>(block) {
            return parsed;
        }
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(parsed) = serde_json::from_str::<InsightResult>(&raw[start..=end]) {
                return parsed;
            }
        }
    }

    InsightResult {
        summary: "The analysis reply could not be structured; raw model output attached.".into(),
        insights: vec![snippet(raw)],
        recommendations: vec!["Review the attached output and re-run the analysis.".into()],
        error: None,
    }
}

fn fenced_json_block(raw: &str) -> Option<&str> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence regex is valid")
    });
    fence.captures(raw).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn snippet(raw: &str) -> String {
    const MAX: usize = 500;
    let trimmed = raw.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FinsightError;
    use async_trait::async_trait;

    #[test]
    fn direct_json_roundtrips() {
        let result = InsightResult {
            summary: "Healthy overall.".into(),
            insights: vec!["Revenue is growing.".into()],
            recommendations: vec!["Build a cash reserve.".into()],
            error: None,
        };
        let raw = serde_json::to_string(&result).unwrap();
        assert_eq!(parse_completion(&raw), result);
    }

    #[test]
    fn fenced_block_is_salvaged() {
        let raw = "Here is the analysis you asked for:\n\
                   ```json\n\
                   {\"summary\": \"Stable.\", \"insights\": [\"Margins hold.\"], \"recommendations\": []}\n\
                   ```\n\
                   Let me know if you need more detail.";
        let parsed = parse_completion(raw);
        assert_eq!(parsed.summary, "Stable.");
        assert_eq!(parsed.insights, vec!["Margins hold."]);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn bare_brace_span_is_salvaged() {
        let raw = "Sure! {\"summary\": \"Okay.\", \"insights\": [], \"recommendations\": []} Hope that helps.";
        let parsed = parse_completion(raw);
        assert_eq!(parsed.summary, "Okay.");
    }

    #[test]
    fn plain_text_falls_back_without_error() {
        let parsed = parse_completion("The company looks fine to me.");
        assert!(parsed.error.is_none());
        assert!(!parsed.summary.is_empty());
        assert_eq!(parsed.insights, vec!["The company looks fine to me."]);
        assert!(!parsed.recommendations.is_empty());
    }

    struct ScriptedBackend {
        reply: Result<String, ()>,
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _opts: CompletionOptions,
        ) -> Result<String, FinsightError> {
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(FinsightError::Provider("connection refused".into())),
            }
        }
    }

    #[tokio::test]
    async fn analyze_parses_backend_reply() {
        let engine = InsightEngine::new(Box::new(ScriptedBackend {
            reply: Ok(
                "{\"summary\": \"Solid.\", \"insights\": [\"a\"], \"recommendations\": [\"b\"]}"
                    .into(),
            ),
        }));
        let result = engine.analyze("Profit and Loss", "- Sales: $100.00").await;
        assert_eq!(result.summary, "Solid.");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn analyze_converts_backend_failure_into_result() {
        let engine = InsightEngine::new(Box::new(ScriptedBackend { reply: Err(()) }));
        let result = engine.analyze("Profit and Loss", "- Sales: $100.00").await;
        assert!(result.error.is_some());
        assert!(!result.summary.is_empty());
        assert!(!result.recommendations.is_empty());
    }

    #[tokio::test]
    async fn answer_carries_question_and_error() {
        let engine = InsightEngine::new(Box::new(ScriptedBackend { reply: Err(()) }));
        let result = engine
            .answer("- Checking (Bank): $5,000.00", "How is my cash position?")
            .await;
        assert_eq!(result.question, "How is my cash position?");
        assert!(result.error.is_some());
    }

    #[test]
    fn suggested_questions_are_static() {
        assert!(!InsightEngine::suggested_questions().is_empty());
    }
}
