//! Bootstrap configuration

use crate::channel::ChannelDisposition;
use crate::cloner::CHILD_STACK_SIZE;

/// Variable holding the config pipe descriptor number
pub const ENV_CONFIG_PIPE: &str = "_LIBCAPSULE_CONFIG_PIPE";

/// When set to `1`/`true`, the config pipe is closed before resuming
pub const ENV_CLOSE_CONFIG_PIPE: &str = "_LIBCAPSULE_CLOSE_CONFIG_PIPE";

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Variable that triggers the bootstrap
    pub env_var: String,

    /// What happens to the config pipe after the handshake
    pub disposition: ChannelDisposition,

    /// Stack size for the cloned child
    pub stack_size: usize,

    /// Have the kernel check each handle's namespace type
    pub check_kinds: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            env_var: ENV_CONFIG_PIPE.to_string(),
            disposition: ChannelDisposition::Keep,
            stack_size: CHILD_STACK_SIZE,
            check_kinds: false,
        }
    }
}

impl BootstrapConfig {
    /// Create a new bootstrap configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the disposition taken from [`ENV_CLOSE_CONFIG_PIPE`]
    #[must_use]
    pub fn from_env() -> Self {
        let close = std::env::var(ENV_CLOSE_CONFIG_PIPE)
            .is_ok_and(|v| matches!(v.trim(), "1" | "true" | "yes"));

        Self::new().with_disposition(if close {
            ChannelDisposition::Close
        } else {
            ChannelDisposition::Keep
        })
    }

    /// Set the trigger variable
    #[must_use]
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = name.into();
        self
    }

    /// Set the post-handshake disposition of the config pipe
    #[must_use]
    pub const fn with_disposition(mut self, disposition: ChannelDisposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Set the child stack size
    #[must_use]
    pub const fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Enable namespace type checking on join
    #[must_use]
    pub const fn with_kind_check(mut self, enable: bool) -> Self {
        self.check_kinds = enable;
        self
    }

    /// Current value of the trigger variable, if set
    #[must_use]
    pub fn trigger(&self) -> Option<String> {
        std::env::var_os(&self.env_var).map(|v| v.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BootstrapConfig::default();
        assert_eq!(config.env_var, "_LIBCAPSULE_CONFIG_PIPE");
        assert_eq!(config.disposition, ChannelDisposition::Keep);
        assert_eq!(config.stack_size, CHILD_STACK_SIZE);
        assert!(!config.check_kinds);
    }

    #[test]
    fn test_builder_pattern() {
        let config = BootstrapConfig::new()
            .with_env_var("_TEST_PIPE")
            .with_disposition(ChannelDisposition::Close)
            .with_stack_size(64 * 1024)
            .with_kind_check(true);

        assert_eq!(config.env_var, "_TEST_PIPE");
        assert_eq!(config.disposition, ChannelDisposition::Close);
        assert_eq!(config.stack_size, 64 * 1024);
        assert!(config.check_kinds);
    }

    #[test]
    fn test_trigger_unset() {
        let config = BootstrapConfig::new().with_env_var("_CAPSULE_TEST_SURELY_UNSET_VAR");
        assert_eq!(config.trigger(), None);
    }
}
