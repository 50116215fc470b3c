use crate::segments::{option_str, Environment, Provider};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Static text; everything interesting happens in the template.
#[derive(Debug, Default)]
pub struct TextProvider {
    text: String,
}

#[async_trait]
impl Provider for TextProvider {
    fn init(&mut self, options: &Map<String, Value>, _env: &Environment) {
        self.text = option_str(options, "text", "").to_string();
    }

    async fn enabled(&mut self) -> bool {
        true
    }

    fn template(&self) -> &str {
        "{{ .Value }}"
    }

    fn record(&self) -> Value {
        json!({ "Value": self.text })
    }
}
