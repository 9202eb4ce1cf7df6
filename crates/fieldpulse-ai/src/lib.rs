//! Field-service assistance on top of a chat-completion model: job analysis,
//! estimate generation, customer replies, maintenance prediction and schedule
//! optimization, each with a fixed prompt template and a typed JSON answer.

mod prompts;
mod service;
mod transport;

use std::env;

pub use service::{
    CustomerContext, EquipmentReport, EstimateLineItem, GeneratedEstimate, JobAnalysis,
    MaintenancePrediction, PromptService, RiskLevel, ScheduleAssignment, ScheduleOptimization,
    Technician, CUSTOMER_RESPONSE_FALLBACK,
};
pub use transport::{CompletionRequest, CompletionTransport, OpenAiTransport};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("OpenAI integration not configured")]
    NotConfigured,
    #[error("No response from OpenAI")]
    EmptyResponse,
    #[error("malformed {operation} completion: {message}")]
    MalformedCompletion {
        operation: &'static str,
        message: String,
    },
    #[error("completion request failed: {message}")]
    Transport { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl AiConfig {
    /// Reads `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("OPENAI_API_KEY")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            base_url: env::var("OPENAI_BASE_URL")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }
}
