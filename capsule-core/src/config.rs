//! Configuration handed to the cloned child once the bootstrap handshake is done

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// What the freshly cloned process should become
///
/// The host sends this as a length-prefixed JSON blob over the same channel
/// the bootstrap used, after it has read back the child pid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitConfig {
    /// Program and arguments, `args[0]` is looked up in `PATH`
    pub args: Vec<String>,

    /// Extra environment variables (`KEY=VALUE`)
    #[serde(default)]
    pub env: Vec<String>,

    /// Hostname to set when the child got a new UTS namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl InitConfig {
    /// Create a new init configuration for a command
    #[must_use]
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Set hostname for the child's UTS namespace
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Check the configuration can actually be executed
    ///
    /// # Errors
    /// Returns error if there is no program or an env entry lacks `=`
    pub fn validate(&self) -> Result<()> {
        match self.args.first() {
            None => {
                return Err(Error::InvalidConfig {
                    message: "Command cannot be empty".to_string(),
                });
            }
            Some(program) if program.is_empty() => {
                return Err(Error::InvalidConfig {
                    message: "Program name cannot be empty".to_string(),
                });
            }
            Some(_) => {}
        }

        if let Some(bad) = self.env.iter().find(|e| !e.contains('=') || e.starts_with('=')) {
            return Err(Error::InvalidConfig {
                message: format!("Environment entry must be KEY=VALUE, got {bad:?}"),
            });
        }

        Ok(())
    }

    /// Serialize to the JSON wire form
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate the JSON wire form
    ///
    /// # Errors
    /// Returns error if the payload is not valid JSON or fails validation
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let config = InitConfig::new(["/bin/sh", "-c", "hostname"])
            .with_env("FOO", "bar")
            .with_hostname("box");

        assert_eq!(config.args, vec!["/bin/sh", "-c", "hostname"]);
        assert_eq!(config.env, vec!["FOO=bar"]);
        assert_eq!(config.hostname.as_deref(), Some("box"));
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        assert!(InitConfig::default().validate().is_err());
        assert!(InitConfig::new([""]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_env() {
        let mut config = InitConfig::new(["true"]);
        config.env.push("NOEQUALS".to_string());
        assert!(config.validate().is_err());

        config.env = vec!["=value".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_omits_missing_hostname() {
        let json = InitConfig::new(["true"]).to_json().unwrap();
        let text = String::from_utf8(json).unwrap();
        assert!(!text.contains("hostname"));
    }

    #[test]
    fn test_from_json_defaults_env() {
        let config = InitConfig::from_json(br#"{"args":["echo","hi"]}"#).unwrap();
        assert!(config.env.is_empty());
        assert_eq!(config.hostname, None);
    }

    #[test]
    fn test_from_json_validates() {
        assert!(InitConfig::from_json(br#"{"args":[]}"#).is_err());
        assert!(InitConfig::from_json(b"not json").is_err());
    }
}
