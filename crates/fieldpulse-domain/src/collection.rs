use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named document collections. Wire names are fixed and shared with existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    #[serde(rename = "customers")]
    Customers,
    #[serde(rename = "jobs")]
    Jobs,
    #[serde(rename = "estimates")]
    Estimates,
    #[serde(rename = "invoices")]
    Invoices,
    #[serde(rename = "projects")]
    Projects,
    #[serde(rename = "users")]
    Users,
    #[serde(rename = "teams")]
    Teams,
    #[serde(rename = "assets")]
    Assets,
    #[serde(rename = "locations")]
    Locations,
    #[serde(rename = "subtasks")]
    Subtasks,
    #[serde(rename = "comments")]
    Comments,
    #[serde(rename = "timesheets")]
    Timesheets,
    #[serde(rename = "webhooks")]
    Webhooks,
    #[serde(rename = "apiKeys")]
    ApiKeys,
    #[serde(rename = "integrations")]
    Integrations,
    #[serde(rename = "aiAutomations")]
    AiAutomations,
    #[serde(rename = "settings")]
    Settings,
    #[serde(rename = "webhookEvents")]
    WebhookEvents,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection '{0}'")]
pub struct UnknownCollection(pub String);

impl Collection {
    pub const ALL: [Self; 18] = [
        Self::Customers,
        Self::Jobs,
        Self::Estimates,
        Self::Invoices,
        Self::Projects,
        Self::Users,
        Self::Teams,
        Self::Assets,
        Self::Locations,
        Self::Subtasks,
        Self::Comments,
        Self::Timesheets,
        Self::Webhooks,
        Self::ApiKeys,
        Self::Integrations,
        Self::AiAutomations,
        Self::Settings,
        Self::WebhookEvents,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Jobs => "jobs",
            Self::Estimates => "estimates",
            Self::Invoices => "invoices",
            Self::Projects => "projects",
            Self::Users => "users",
            Self::Teams => "teams",
            Self::Assets => "assets",
            Self::Locations => "locations",
            Self::Subtasks => "subtasks",
            Self::Comments => "comments",
            Self::Timesheets => "timesheets",
            Self::Webhooks => "webhooks",
            Self::ApiKeys => "apiKeys",
            Self::Integrations => "integrations",
            Self::AiAutomations => "aiAutomations",
            Self::Settings => "settings",
            Self::WebhookEvents => "webhookEvents",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == trimmed)
            .ok_or_else(|| UnknownCollection(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_unique_and_parse_back() {
        let mut seen = std::collections::HashSet::new();
        for collection in Collection::ALL {
            assert!(seen.insert(collection.as_str()), "duplicate {collection}");
            assert_eq!(collection.as_str().parse::<Collection>(), Ok(collection));
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let encoded = serde_json::to_string(&Collection::ApiKeys).expect("encode");
        assert_eq!(encoded, "\"apiKeys\"");
        assert_eq!(
            "aiAutomations".parse::<Collection>(),
            Ok(Collection::AiAutomations)
        );
        assert_eq!(
            "api_keys".parse::<Collection>(),
            Err(UnknownCollection("api_keys".to_string()))
        );
    }
}
