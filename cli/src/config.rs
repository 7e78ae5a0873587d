use anyhow::{Context, Result};
use chrono::NaiveDate;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub service_name: String,
    pub log_filter: Option<String>,
    pub otlp_endpoint: Option<String>,
    /// Pins "today" for reproducible reports.
    pub today: Option<NaiveDate>,
    pub pretty: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let service_name = non_empty("PIPELINE_SERVICE_NAME").unwrap_or_else(|| "pipeline".into());
        let log_filter = non_empty("PIPELINE_LOG");
        let otlp_endpoint = non_empty("OTLP_ENDPOINT");

        let today = non_empty("PIPELINE_TODAY")
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid PIPELINE_TODAY `{raw}`"))
            })
            .transpose()?;

        let pretty = non_empty("PIPELINE_PRETTY")
            .map(|val| matches!(val.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            service_name,
            log_filter,
            otlp_endpoint,
            today,
            pretty,
        })
    }
}
