use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Customer, Estimate, Invoice, Job};
use crate::status::{EstimateStatus, InvoiceStatus, JobStatus};

/// Completion rate shown on the dashboard. There is no data source for it yet.
pub const COMPLETION_RATE_PERCENT: f64 = 87.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_customers: usize,
    pub active_jobs: usize,
    pub pending_estimates: usize,
    pub overdue_invoices: usize,
    pub monthly_revenue: f64,
    pub completion_rate: f64,
}

impl DashboardStats {
    pub fn compute(
        customers: &[Customer],
        jobs: &[Job],
        estimates: &[Estimate],
        invoices: &[Invoice],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            total_customers: customers.len(),
            active_jobs: jobs
                .iter()
                .filter(|job| job.status == JobStatus::InProgress)
                .count(),
            pending_estimates: estimates
                .iter()
                .filter(|estimate| estimate.status == EstimateStatus::Sent)
                .count(),
            overdue_invoices: invoices
                .iter()
                .filter(|invoice| invoice.status == InvoiceStatus::Overdue)
                .count(),
            monthly_revenue: monthly_revenue(invoices, now),
            completion_rate: COMPLETION_RATE_PERCENT,
        }
    }
}

/// Sum of paid invoices created in the calendar month of `now`.
pub fn monthly_revenue(invoices: &[Invoice], now: DateTime<Utc>) -> f64 {
    invoices
        .iter()
        .filter(|invoice| {
            invoice.status == InvoiceStatus::Paid
                && invoice.created_at.year() == now.year()
                && invoice.created_at.month() == now.month()
        })
        .map(|invoice| invoice.total_amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::status::Priority;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0)
            .single()
            .expect("valid date")
    }

    fn invoice(id: &str, amount: f64, status: InvoiceStatus, created_at: DateTime<Utc>) -> Invoice {
        Invoice {
            id: id.to_string(),
            customer_id: "c1".to_string(),
            job_id: None,
            invoice_number: format!("INV-{id}"),
            total_amount: amount,
            status,
            due_date: created_at + Duration::days(30),
            created_at,
            updated_at: created_at,
        }
    }

    fn job(id: &str, status: JobStatus) -> Job {
        Job {
            id: id.to_string(),
            customer_id: "c1".to_string(),
            title: "Install Panel".to_string(),
            description: None,
            status,
            priority: Priority::Medium,
            scheduled_date: None,
            completed_date: None,
            assigned_to: None,
            location: None,
            created_at: at(2026, 5, 1),
            updated_at: at(2026, 5, 1),
        }
    }

    #[test]
    fn paid_invoice_counts_only_in_its_own_month() {
        let now = at(2026, 5, 20);
        let this_month = invoice("1", 500.0, InvoiceStatus::Paid, at(2026, 5, 2));
        let last_month = invoice("2", 500.0, InvoiceStatus::Paid, at(2026, 4, 28));
        let last_year = invoice("3", 500.0, InvoiceStatus::Paid, at(2025, 5, 2));
        let unpaid = invoice("4", 900.0, InvoiceStatus::Sent, at(2026, 5, 3));

        assert!((monthly_revenue(std::slice::from_ref(&this_month), now) - 500.0).abs() < f64::EPSILON);
        assert!(monthly_revenue(&[last_month, last_year, unpaid], now).abs() < f64::EPSILON);
    }

    #[test]
    fn counts_follow_status_values() {
        let now = at(2026, 5, 20);
        let jobs = vec![
            job("j1", JobStatus::InProgress),
            job("j2", JobStatus::Scheduled),
            job("j3", JobStatus::InProgress),
        ];
        let invoices = vec![
            invoice("1", 120.0, InvoiceStatus::Overdue, at(2026, 5, 1)),
            invoice("2", 80.0, InvoiceStatus::Paid, at(2026, 5, 4)),
        ];

        let stats = DashboardStats::compute(&[], &jobs, &[], &invoices, now);
        assert_eq!(stats.active_jobs, 2);
        assert_eq!(stats.overdue_invoices, 1);
        assert_eq!(stats.pending_estimates, 0);
        assert_eq!(stats.total_customers, 0);
        assert!((stats.monthly_revenue - 80.0).abs() < f64::EPSILON);
        assert!((stats.completion_rate - COMPLETION_RATE_PERCENT).abs() < f64::EPSILON);
    }
}
