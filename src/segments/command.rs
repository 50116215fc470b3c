use crate::segments::{option_str, Environment, Provider};
use crate::utils::run_command;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::debug;

/// Output of a shell command, run in the segment's process group.
#[derive(Debug, Default)]
pub struct CommandProvider {
    shell: String,
    command: String,
    pwd: PathBuf,
    output: String,
}

#[async_trait]
impl Provider for CommandProvider {
    fn init(&mut self, options: &Map<String, Value>, env: &Environment) {
        self.shell = option_str(options, "shell", "sh").to_string();
        self.command = option_str(options, "command", "").to_string();
        self.pwd = env.pwd.clone();
    }

    async fn enabled(&mut self) -> bool {
        if self.command.is_empty() {
            return false;
        }

        match run_command(&self.shell, &["-c", &self.command], &self.pwd).await {
            Ok(output) => {
                self.output = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            Err(err) => {
                debug!(command = %self.command, error = %err, "command segment failed");
                return false;
            }
        }

        !self.output.is_empty()
    }

    fn template(&self) -> &str {
        " {{ .Output }} "
    }

    fn record(&self) -> Value {
        json!({ "Output": self.output })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::segments::tests::test_env;

    async fn run(options: Value) -> (bool, Value) {
        let mut provider = CommandProvider::default();
        provider.init(options.as_object().unwrap(), &test_env());
        let enabled = provider.enabled().await;
        (enabled, provider.record())
    }

    #[tokio::test]
    async fn test_command_output() {
        let (enabled, record) = run(json!({ "command": "printf ' v1.2 \\n'" })).await;
        assert!(enabled);
        assert_eq!(record["Output"], json!("v1.2"));
    }

    #[tokio::test]
    async fn test_empty_output_disables() {
        assert!(!run(json!({ "command": "true" })).await.0);
        assert!(!run(json!({})).await.0);
    }
}
