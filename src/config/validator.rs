//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use crate::common::Result;
use crate::config::error::ConfigError;
use crate::config::ProxyConfig;

/// Configuration validator trait
pub trait ConfigValidator {
    /// Reject configurations the proxy cannot start with
    fn validate(&self) -> Result<()>;

    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for ProxyConfig {
    fn validate(&self) -> Result<()> {
        // Network settings
        self.listen_socket_addr()?;
        self.parent_url()?;

        // A colon in the user-id would split the basic credential in the wrong place
        if let Some(username) = &self.username {
            if username.contains(':') {
                return Err(ConfigError::bad("username", "must not contain ':'").into());
            }
        }

        Ok(())
    }

    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                warnings.push(format!("Invalid log level '{}', using default 'info'", level));
            }
        }

        if let Ok(url) = self.parent_url() {
            if url.scheme() == "https" {
                warnings.push(
                    "TLS certificate verification toward the parent proxy is disabled".to_string(),
                );
            }
            if !url.username().is_empty() {
                warnings.push(
                    "Credentials embedded in parent_proxy are ignored; use username/password".to_string(),
                );
            }
        }

        let has_username = self.username.as_deref().is_some_and(|u| !u.is_empty());
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        if has_password && !has_username {
            warnings.push("Password set without a username".to_string());
        }

        warnings
    }
}
