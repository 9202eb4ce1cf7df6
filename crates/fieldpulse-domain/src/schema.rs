//! Presence checks applied to sample records before they are seeded.
//!
//! These are stricter than draft validation (a seeded customer needs an email)
//! and are not applied on the general create path.

use crate::patch::{CustomerDraft, EstimateDraft, InvoiceDraft, JobDraft, ValidationError};

pub fn validate_customer(draft: &CustomerDraft) -> Result<(), ValidationError> {
    if draft.name.trim().is_empty() {
        return Err(ValidationError::new("name", "customer name is required"));
    }
    if draft
        .email
        .as_deref()
        .is_none_or(|email| email.trim().is_empty())
    {
        return Err(ValidationError::new("email", "customer email is required"));
    }
    Ok(())
}

pub fn validate_job(draft: &JobDraft) -> Result<(), ValidationError> {
    if draft.customer_id.trim().is_empty() {
        return Err(ValidationError::new("customer_id", "job customer is required"));
    }
    if draft.title.trim().is_empty() {
        return Err(ValidationError::new("title", "job title is required"));
    }
    Ok(())
}

pub fn validate_estimate(draft: &EstimateDraft) -> Result<(), ValidationError> {
    if draft.customer_id.trim().is_empty() {
        return Err(ValidationError::new(
            "customer_id",
            "estimate customer is required",
        ));
    }
    if draft.title.trim().is_empty() {
        return Err(ValidationError::new("title", "estimate title is required"));
    }
    if !draft.total_amount.is_finite() {
        return Err(ValidationError::new(
            "total_amount",
            "estimate total must be a number",
        ));
    }
    Ok(())
}

pub fn validate_invoice(draft: &InvoiceDraft) -> Result<(), ValidationError> {
    if draft.customer_id.trim().is_empty() {
        return Err(ValidationError::new(
            "customer_id",
            "invoice customer is required",
        ));
    }
    if draft.invoice_number.trim().is_empty() {
        return Err(ValidationError::new(
            "invoice_number",
            "invoice number is required",
        ));
    }
    if !draft.total_amount.is_finite() {
        return Err(ValidationError::new(
            "total_amount",
            "invoice total must be a number",
        ));
    }
    Ok(())
}
