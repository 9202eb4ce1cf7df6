//! Prompt templates. Each asks for a JSON answer with camelCase keys.

use fieldpulse_domain::{Customer, Job};
use serde_json::json;

use crate::service::{CustomerContext, EquipmentReport, Technician};

pub(crate) fn analyze_job(job: &Job) -> String {
    format!(
        "Analyze this field service job and provide insights:\n\
         \n\
         Job Details:\n\
         - Title: {title}\n\
         - Description: {description}\n\
         - Status: {status}\n\
         - Priority: {priority}\n\
         - Location: {location}\n\
         \n\
         Please provide:\n\
         1. Key insights about this job\n\
         2. Recommendations for execution\n\
         3. Estimated duration in hours\n\
         4. Potential risk factors\n\
         \n\
         Respond in JSON format with the following structure:\n\
         {{\n  \"insights\": \"string\",\n  \"recommendations\": [\"string array\"],\n  \
         \"estimatedDuration\": number,\n  \"riskFactors\": [\"string array\"]\n}}\n",
        title = job.title,
        description = job
            .description
            .as_deref()
            .unwrap_or("No description provided"),
        status = job.status.as_str(),
        priority = job.priority.as_str(),
        location = job.location.as_deref().unwrap_or("Not specified"),
    )
}

pub(crate) fn generate_estimate(job_description: &str, customer: &Customer) -> String {
    format!(
        "Generate a detailed estimate for this field service job:\n\
         \n\
         Job Description: {job_description}\n\
         Customer Type: Residential\n\
         Customer Location: {location}\n\
         \n\
         Please provide a detailed cost estimate including:\n\
         1. Labor hours required\n\
         2. Material costs\n\
         3. Total estimate\n\
         4. Itemized breakdown\n\
         5. Confidence level (0-100%)\n\
         \n\
         Respond in JSON format:\n\
         {{\n  \"laborHours\": number,\n  \"materialCosts\": number,\n  \"totalEstimate\": number,\n  \
         \"breakdown\": [{{\"item\": \"string\", \"cost\": number, \"description\": \"string\"}}],\n  \
         \"confidence\": number\n}}\n",
        location = customer.address.as_deref().unwrap_or("Not specified"),
    )
}

pub(crate) fn customer_response(query: &str, context: &CustomerContext) -> String {
    let history = context
        .history
        .as_ref()
        .map(|jobs| {
            let entries: Vec<String> = jobs
                .iter()
                .map(|job| format!("{} ({})", job.title, job.status.as_str()))
                .collect();
            format!("Customer History: {}", entries.join(", "))
        })
        .unwrap_or_default();
    let company = context
        .company_info
        .as_deref()
        .unwrap_or("Professional field service company");

    format!(
        "You are a helpful customer service assistant for a field service company.\n\
         Respond to this customer query professionally and helpfully.\n\
         \n\
         Customer Query: {query}\n\
         \n\
         {history}\n\
         \n\
         Company Info: {company}\n\
         \n\
         Provide a helpful, professional response that addresses the customer's needs.\n"
    )
}

pub(crate) fn predict_maintenance(report: &EquipmentReport) -> String {
    format!(
        "Analyze this equipment data and predict maintenance needs:\n\
         \n\
         Equipment Type: {kind}\n\
         Age: {age} years\n\
         Last Service: {last_service}\n\
         Recent Issues: {issues}\n\
         \n\
         Provide maintenance predictions in JSON format:\n\
         {{\n  \"riskLevel\": \"low|medium|high\",\n  \"recommendedActions\": [\"string array\"],\n  \
         \"timeframe\": \"string\",\n  \"reasoning\": \"string\"\n}}\n",
        kind = report.kind,
        age = report.age,
        last_service = report.last_service,
        issues = report.issues.join(", "),
    )
}

pub(crate) fn optimize_schedule(jobs: &[Job], technicians: &[Technician]) -> String {
    let jobs = json!(
        jobs.iter()
            .map(|job| json!({
                "id": job.id,
                "title": job.title,
                "priority": job.priority.as_str(),
                "location": job.location,
            }))
            .collect::<Vec<_>>()
    );
    let technicians = serde_json::to_string(technicians).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Optimize the schedule for these field service jobs and technicians:\n\
         \n\
         Jobs: {jobs}\n\
         \n\
         Technicians: {technicians}\n\
         \n\
         Create an optimized schedule considering:\n\
         - Technician skills and job requirements\n\
         - Travel time between locations\n\
         - Job priorities\n\
         - Technician availability\n\
         \n\
         Respond in JSON format:\n\
         {{\n  \"optimizedSchedule\": [{{\"technicianId\": \"string\", \"jobId\": \"string\", \
         \"scheduledTime\": \"string\", \"travelTime\": number, \"reasoning\": \"string\"}}],\n  \
         \"efficiency\": number,\n  \"recommendations\": [\"string array\"]\n}}\n"
    )
}
