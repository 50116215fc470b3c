use crate::segments::{option_str, Environment, Provider};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::{json, Map, Value};

const DEFAULT_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Default)]
pub struct TimeProvider {
    format: String,
    now: Option<DateTime<Local>>,
}

#[async_trait]
impl Provider for TimeProvider {
    fn init(&mut self, options: &Map<String, Value>, _env: &Environment) {
        self.format = option_str(options, "time_format", DEFAULT_FORMAT).to_string();
    }

    async fn enabled(&mut self) -> bool {
        self.now = Some(Local::now());
        true
    }

    fn template(&self) -> &str {
        " {{ .Time }} "
    }

    fn record(&self) -> Value {
        let Some(now) = self.now else {
            return json!({});
        };

        json!({
            "Time": now.format(&self.format).to_string(),
            "Timestamp": now.timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::tests::test_env;

    #[tokio::test]
    async fn test_time_format() {
        let mut provider = TimeProvider::default();
        provider.init(json!({ "time_format": "%Y" }).as_object().unwrap(), &test_env());
        assert!(provider.enabled().await);

        let record = provider.record();
        let year = record["Time"].as_str().unwrap();
        assert_eq!(year.len(), 4);
        assert!(record["Timestamp"].as_i64().unwrap() > 0);
    }
}
