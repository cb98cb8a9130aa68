// Acquirer backed by an external command
// Each attempt runs the configured command through `sh -c`; exit status 0 means acquired.
// Placeholders expand to single-quoted shell words, so catalog text is never parsed as shell syntax.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::{AcquireError, Acquirer, Attempt};
use crate::domain::Resource;

/// Configuration for a command acquirer
#[derive(Debug, Clone)]
pub struct CommandAcquirerConfig {
    /// Command template; `{id}`, `{code}` and `{name}` are substituted as quoted words
    pub command: String,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
    /// Timeout in milliseconds (default: 10000)
    pub timeout_ms: u64,
}

impl Default for CommandAcquirerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            env: Vec::new(),
            timeout_ms: 10000,
        }
    }
}

impl CommandAcquirerConfig {
    /// Create a new config with the given command template
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the timeout in milliseconds
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

/// Acquirer that shells out once per attempt
pub struct CommandAcquirer {
    config: CommandAcquirerConfig,
}

impl CommandAcquirer {
    pub fn new(config: CommandAcquirerConfig) -> Self {
        Self { config }
    }

    /// Expand the command template for one resource
    pub fn render(&self, resource: &Resource) -> String {
        let mut rendered = String::with_capacity(self.config.command.len());
        let mut rest = self.config.command.as_str();

        // Single pass, so substituted text is never scanned for placeholders again
        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            let value = if tail.starts_with("{id}") {
                Some(resource.id.to_string())
            } else if tail.starts_with("{code}") {
                Some(resource.code.clone())
            } else if tail.starts_with("{name}") {
                Some(resource.name.clone())
            } else {
                None
            };
            match value {
                Some(value) => {
                    rendered.push_str(&shell_quote(&value));
                    rest = &tail[tail.find('}').map_or(tail.len(), |end| end + 1)..];
                }
                None => {
                    rendered.push('{');
                    rest = &tail[1..];
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }

    async fn execute(&self, command: &str, resource: &Resource) -> std::io::Result<std::process::Output> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.env("SEATGRAB_RESOURCE_ID", resource.id.to_string());
        cmd.env("SEATGRAB_RESOURCE_CODE", &resource.code);
        cmd.env("SEATGRAB_RESOURCE_NAME", &resource.name);

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let child = cmd.spawn()?;

        let timeout = tokio::time::Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("Command timed out after {}ms", self.config.timeout_ms),
            )),
        }
    }
}

/// Quote `value` as a single POSIX shell word.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[async_trait]
impl Acquirer for CommandAcquirer {
    async fn attempt(&self, resource: &Resource) -> Result<Attempt, AcquireError> {
        if self.config.command.trim().is_empty() {
            return Err(AcquireError::Other("no acquirer command configured".to_string()));
        }

        let command = self.render(resource);
        log::debug!("Running acquirer command: {}", command);

        match self.execute(&command, resource).await {
            Ok(output) if output.status.success() => Ok(Attempt::Acquired),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let reason = [stderr.trim(), stdout.trim()]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("exit code {:?}", output.status.code()));
                Ok(Attempt::Rejected { reason })
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(AcquireError::Timeout(self.config.timeout_ms)),
            Err(e) => Err(AcquireError::Other(format!("failed to run acquirer command: {}", e))),
        }
    }
}
