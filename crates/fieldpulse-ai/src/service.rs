use std::sync::{Arc, RwLock};

use fieldpulse_domain::{Customer, Job};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::transport::{CompletionRequest, CompletionTransport, OpenAiTransport};
use crate::{AiConfig, AiError, prompts};

const LOG_TARGET: &str = "fieldpulse.ai";

pub const CUSTOMER_RESPONSE_FALLBACK: &str =
    "I apologize, but I was unable to generate a response at this time.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalysis {
    pub insights: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub estimated_duration: f64,
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateLineItem {
    pub item: String,
    pub cost: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedEstimate {
    pub labor_hours: f64,
    pub material_costs: f64,
    pub total_estimate: f64,
    #[serde(default)]
    pub breakdown: Vec<EstimateLineItem>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Job>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentReport {
    #[serde(rename = "type")]
    pub kind: String,
    /// Years in service.
    pub age: f64,
    pub last_service: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenancePrediction {
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    pub timeframe: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub location: String,
    #[serde(default)]
    pub availability: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleAssignment {
    pub technician_id: String,
    pub job_id: String,
    pub scheduled_time: String,
    pub travel_time: f64,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOptimization {
    #[serde(default)]
    pub optimized_schedule: Vec<ScheduleAssignment>,
    pub efficiency: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Prompt service over a completion transport that is absent until configured.
pub struct PromptService {
    base_url: String,
    transport: RwLock<Option<Arc<dyn CompletionTransport>>>,
}

impl PromptService {
    /// Configured from `config.api_key` when present.
    pub fn new(config: &AiConfig) -> Self {
        let service = Self {
            base_url: config.base_url.clone(),
            transport: RwLock::new(None),
        };
        if let Some(api_key) = config.api_key.as_deref() {
            service.configure(api_key);
        }
        service
    }

    pub fn with_transport(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            base_url: crate::DEFAULT_OPENAI_BASE_URL.to_string(),
            transport: RwLock::new(Some(transport)),
        }
    }

    /// Installs a credential, replacing any previous one.
    pub fn configure(&self, api_key: &str) {
        let transport: Arc<dyn CompletionTransport> =
            Arc::new(OpenAiTransport::new(&self.base_url, api_key.trim()));
        *self
            .transport
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(transport);
        tracing::info!(target: LOG_TARGET, "openai integration configured");
    }

    pub fn is_configured(&self) -> bool {
        self.transport
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    fn transport(&self) -> Result<Arc<dyn CompletionTransport>, AiError> {
        self.transport
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(AiError::NotConfigured)
    }

    async fn complete(
        &self,
        operation: &'static str,
        request: CompletionRequest,
    ) -> Result<Option<String>, AiError> {
        let transport = self.transport()?;
        transport.complete(request).await.inspect_err(|error| {
            tracing::error!(target: LOG_TARGET, operation, error = %error, "completion failed");
        })
    }

    async fn complete_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: CompletionRequest,
    ) -> Result<T, AiError> {
        let content = self
            .complete(operation, request)
            .await?
            .ok_or(AiError::EmptyResponse)
            .inspect_err(|_| {
                tracing::error!(target: LOG_TARGET, operation, "completion had no content");
            })?;
        parse_completion(operation, &content)
    }

    pub async fn analyze_job(&self, job: &Job) -> Result<JobAnalysis, AiError> {
        self.complete_json(
            "job_analysis",
            CompletionRequest {
                model: "gpt-4",
                prompt: prompts::analyze_job(job),
                temperature: 0.3,
                max_tokens: 1000,
            },
        )
        .await
    }

    pub async fn generate_estimate(
        &self,
        job_description: &str,
        customer: &Customer,
    ) -> Result<GeneratedEstimate, AiError> {
        self.complete_json(
            "estimate_generation",
            CompletionRequest {
                model: "gpt-4",
                prompt: prompts::generate_estimate(job_description, customer),
                temperature: 0.2,
                max_tokens: 1200,
            },
        )
        .await
    }

    /// Plain-text reply; an empty completion yields a fixed apology.
    pub async fn generate_customer_response(
        &self,
        query: &str,
        context: &CustomerContext,
    ) -> Result<String, AiError> {
        let content = self
            .complete(
                "customer_response",
                CompletionRequest {
                    model: "gpt-3.5-turbo",
                    prompt: prompts::customer_response(query, context),
                    temperature: 0.7,
                    max_tokens: 500,
                },
            )
            .await?;
        Ok(content.unwrap_or_else(|| CUSTOMER_RESPONSE_FALLBACK.to_string()))
    }

    pub async fn predict_maintenance(
        &self,
        report: &EquipmentReport,
    ) -> Result<MaintenancePrediction, AiError> {
        self.complete_json(
            "maintenance_prediction",
            CompletionRequest {
                model: "gpt-4",
                prompt: prompts::predict_maintenance(report),
                temperature: 0.3,
                max_tokens: 800,
            },
        )
        .await
    }

    pub async fn optimize_schedule(
        &self,
        jobs: &[Job],
        technicians: &[Technician],
    ) -> Result<ScheduleOptimization, AiError> {
        self.complete_json(
            "schedule_optimization",
            CompletionRequest {
                model: "gpt-4",
                prompt: prompts::optimize_schedule(jobs, technicians),
                temperature: 0.3,
                max_tokens: 2000,
            },
        )
        .await
    }
}

/// Parses a JSON answer, tolerating a surrounding Markdown code fence.
fn parse_completion<T: DeserializeOwned>(
    operation: &'static str,
    content: &str,
) -> Result<T, AiError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body).map_err(|error| {
        tracing::error!(
            target: LOG_TARGET,
            operation,
            error = %error,
            "completion was not valid JSON",
        );
        AiError::MalformedCompletion {
            operation,
            message: error.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use fieldpulse_domain::{JobStatus, Priority};

    use super::*;

    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Option<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedTransport {
        fn replying(replies: &[Option<&str>]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .map(|reply| reply.map(ToString::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests
                .lock()
                .map(|requests| requests.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl CompletionTransport for ScriptedTransport {
        async fn complete(&self, request: CompletionRequest) -> Result<Option<String>, AiError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            Ok(self
                .replies
                .lock()
                .ok()
                .and_then(|mut replies| replies.pop_front())
                .flatten())
        }
    }

    fn job() -> Job {
        let now = Utc::now();
        Job {
            id: "job_1".to_string(),
            customer_id: "c1".to_string(),
            title: "Install Panel".to_string(),
            description: None,
            status: JobStatus::Scheduled,
            priority: Priority::High,
            scheduled_date: None,
            completed_date: None,
            assigned_to: None,
            location: Some("123 Main St".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn unconfigured_service_fails_fast() {
        let service = PromptService::new(&AiConfig::default());
        assert!(!service.is_configured());
        assert!(matches!(
            service.analyze_job(&job()).await,
            Err(AiError::NotConfigured)
        ));
        assert!(matches!(
            service
                .generate_customer_response("hello", &CustomerContext::default())
                .await,
            Err(AiError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn job_analysis_uses_fixed_parameters_and_parses_camel_case() -> anyhow::Result<()> {
        let transport = ScriptedTransport::replying(&[Some(
            r#"{"insights":"Straightforward","recommendations":["Bring a ladder"],"estimatedDuration":4,"riskFactors":["Old wiring"]}"#,
        )]);
        let service = PromptService::with_transport(transport.clone());

        let analysis = service.analyze_job(&job()).await?;
        assert_eq!(analysis.insights, "Straightforward");
        assert!((analysis.estimated_duration - 4.0).abs() < f64::EPSILON);
        assert_eq!(analysis.risk_factors, vec!["Old wiring".to_string()]);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4");
        assert_eq!(requests[0].max_tokens, 1000);
        assert!((requests[0].temperature - 0.3).abs() < f32::EPSILON);
        assert!(requests[0].prompt.contains("- Title: Install Panel"));
        assert!(requests[0].prompt.contains("- Description: No description provided"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_and_malformed_completions_are_distinct_errors() {
        let transport = ScriptedTransport::replying(&[None, Some("not json")]);
        let service = PromptService::with_transport(transport);
        let report = EquipmentReport {
            kind: "HVAC".to_string(),
            age: 12.0,
            last_service: "2025-11-01".to_string(),
            issues: vec!["noisy fan".to_string()],
        };

        assert!(matches!(
            service.predict_maintenance(&report).await,
            Err(AiError::EmptyResponse)
        ));
        assert!(matches!(
            service.predict_maintenance(&report).await,
            Err(AiError::MalformedCompletion {
                operation: "maintenance_prediction",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn customer_response_falls_back_on_empty_completion() -> anyhow::Result<()> {
        let transport = ScriptedTransport::replying(&[None]);
        let service = PromptService::with_transport(transport.clone());
        let context = CustomerContext {
            history: Some(vec![job()]),
            company_info: None,
        };

        let reply = service
            .generate_customer_response("When is my install?", &context)
            .await?;
        assert_eq!(reply, CUSTOMER_RESPONSE_FALLBACK);

        let requests = transport.requests();
        assert_eq!(requests[0].model, "gpt-3.5-turbo");
        assert!(requests[0]
            .prompt
            .contains("Customer History: Install Panel (scheduled)"));
        assert!(requests[0]
            .prompt
            .contains("Company Info: Professional field service company"));
        Ok(())
    }

    #[test]
    fn fenced_json_is_accepted() -> anyhow::Result<()> {
        let prediction: MaintenancePrediction = parse_completion(
            "maintenance_prediction",
            "```json\n{\"riskLevel\":\"high\",\"recommendedActions\":[],\"timeframe\":\"1 week\",\"reasoning\":\"age\"}\n```",
        )?;
        assert_eq!(prediction.risk_level, RiskLevel::High);
        Ok(())
    }
}
