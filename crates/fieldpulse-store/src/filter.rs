use std::cmp::Ordering;
use std::str::FromStr;

use serde_json::Value;

use crate::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    ArrayContains,
    In,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported query operator '{0}'")]
pub struct UnknownOperator(pub String);

impl QueryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::ArrayContains => "array-contains",
            Self::In => "in",
        }
    }
}

impl FromStr for QueryOp {
    type Err = UnknownOperator;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::NotEq),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "array-contains" => Ok(Self::ArrayContains),
            "in" => Ok(Self::In),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// Single-field predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: QueryOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: QueryOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, QueryOp::Eq, value)
    }

    pub fn matches(&self, document: &Document) -> bool {
        let Some(actual) = document.get(&self.field) else {
            return false;
        };

        match self.op {
            QueryOp::Eq => values_equal(actual, &self.value),
            QueryOp::NotEq => !values_equal(actual, &self.value),
            QueryOp::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            QueryOp::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            QueryOp::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            QueryOp::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            QueryOp::ArrayContains => actual
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(item, &self.value))),
            QueryOp::In => self
                .value
                .as_array()
                .is_some_and(|options| options.iter().any(|option| values_equal(actual, option))),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(fields) => fields,
            _ => Document::new(),
        }
    }

    #[test]
    fn equality_treats_integer_and_float_alike() {
        let doc = document(json!({"total_amount": 500, "status": "paid"}));
        assert!(Filter::eq("total_amount", 500.0).matches(&doc));
        assert!(Filter::eq("status", "paid").matches(&doc));
        assert!(!Filter::eq("status", "sent").matches(&doc));
    }

    #[test]
    fn missing_fields_never_match() {
        let doc = document(json!({"status": "paid"}));
        assert!(!Filter::new("job_id", QueryOp::NotEq, "j1").matches(&doc));
        assert!(!Filter::eq("job_id", Value::Null).matches(&doc));
    }

    #[test]
    fn ordering_operators_require_matching_types() {
        let doc = document(json!({"total_amount": 350, "invoice_number": "INV-2024-002"}));
        assert!(Filter::new("total_amount", QueryOp::Lt, 400).matches(&doc));
        assert!(Filter::new("total_amount", QueryOp::Gte, 350).matches(&doc));
        assert!(!Filter::new("total_amount", QueryOp::Gt, "100").matches(&doc));
        assert!(Filter::new("invoice_number", QueryOp::Gt, "INV-2024-001").matches(&doc));
    }

    #[test]
    fn array_operators() {
        let doc = document(json!({"events": ["job.created", "job.completed"], "status": "sent"}));
        assert!(Filter::new("events", QueryOp::ArrayContains, "job.completed").matches(&doc));
        assert!(!Filter::new("events", QueryOp::ArrayContains, "invoice.paid").matches(&doc));
        assert!(Filter::new("status", QueryOp::In, json!(["draft", "sent"])).matches(&doc));
        assert!(!Filter::new("status", QueryOp::In, "sent").matches(&doc));
    }

    #[test]
    fn operators_parse_from_wire_form() {
        for op in [
            QueryOp::Eq,
            QueryOp::NotEq,
            QueryOp::Lt,
            QueryOp::Lte,
            QueryOp::Gt,
            QueryOp::Gte,
            QueryOp::ArrayContains,
            QueryOp::In,
        ] {
            assert_eq!(op.as_str().parse::<QueryOp>(), Ok(op));
        }
        assert_eq!(
            "like".parse::<QueryOp>(),
            Err(UnknownOperator("like".to_string()))
        );
    }
}
