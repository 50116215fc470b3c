use crate::segments::{option_bool, Environment, Provider};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Exit code of the previous command. Hidden on success unless `always_enabled`.
#[derive(Debug, Default)]
pub struct StatusProvider {
    code: i32,
    always_enabled: bool,
}

#[async_trait]
impl Provider for StatusProvider {
    fn init(&mut self, options: &Map<String, Value>, env: &Environment) {
        self.code = env.flags.exit_code;
        self.always_enabled = option_bool(options, "always_enabled", false);
    }

    async fn enabled(&mut self) -> bool {
        self.always_enabled || self.code != 0
    }

    fn template(&self) -> &str {
        " {{ .Code }} "
    }

    fn record(&self) -> Value {
        json!({ "Code": self.code, "Error": self.code != 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::tests::test_env;

    #[test]
    fn test_status_hidden_on_success() {
        let options = Map::new();
        let mut provider = StatusProvider::default();
        provider.init(&options, &test_env());
        assert!(!tokio_test::block_on(provider.enabled()));

        let mut env = test_env();
        env.flags.exit_code = 127;
        provider.init(&options, &env);
        assert!(tokio_test::block_on(provider.enabled()));
        assert_eq!(provider.record(), json!({ "Code": 127, "Error": true }));
    }
}
