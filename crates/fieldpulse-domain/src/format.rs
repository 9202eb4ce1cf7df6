use chrono::{DateTime, Utc};

/// US dollar amount with thousands separators, e.g. `$12,000.00`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = cents / 100;
    let remainder = cents % 100;

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{remainder:02}")
}

pub fn format_date(value: DateTime<Utc>) -> String {
    value.format("%b %-d, %Y").to_string()
}

pub fn format_date_time(value: DateTime<Utc>) -> String {
    value.format("%b %-d, %Y, %I:%M %p").to_string()
}

pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Up to two uppercase initials, one per word.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}
