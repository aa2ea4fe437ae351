//! Application configuration.
//!
//! Passed once to [`App::new`](crate::App::new) and read-only afterwards.
//! Nothing in strata reads the environment on its own; call
//! [`Config::from_env`] explicitly if you want that.
//!
//! ## Environment variables
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `STRATA_ENV` | `env` | `development` |
//! | `STRATA_PROXY` | `proxy` | `false` |
//! | `STRATA_SILENT` | `silent` | `false` |
//!
//! Booleans accept `1`/`true`/`yes`/`on`, case-insensitive.

use std::env;

use serde_json::{Value, json};

#[derive(Clone, Debug)]
pub struct Config {
    /// Deployment environment name, e.g. `development` or `production`.
    pub env: String,
    /// Trust proxy headers. Resolution itself belongs to the proxy layer;
    /// the flag is carried for handlers that need it.
    pub proxy: bool,
    /// Number of trailing host labels that are not subdomains.
    pub subdomain_offset: usize,
    /// Header carrying the client address chain when `proxy` is set.
    pub proxy_ip_header: String,
    /// Maximum entries read from `proxy_ip_header`; `0` means unlimited.
    pub max_ips_count: usize,
    /// Suppress the default failure observer's log output.
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: "development".to_owned(),
            proxy: false,
            subdomain_offset: 2,
            proxy_ip_header: "X-Forwarded-For".to_owned(),
            max_ips_count: 0,
            silent: false,
        }
    }
}

impl Config {
    /// Defaults overridden by `STRATA_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            env: env::var("STRATA_ENV").unwrap_or_else(|_| defaults.env.clone()),
            proxy: flag("STRATA_PROXY").unwrap_or(defaults.proxy),
            silent: flag("STRATA_SILENT").unwrap_or(defaults.silent),
            ..defaults
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "subdomainOffset": self.subdomain_offset,
            "proxy": self.proxy,
            "env": self.env,
        })
    }
}

fn flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    Some(matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.env, "development");
        assert!(!config.silent);
        assert_eq!(config.to_json()["subdomainOffset"], 2);
    }
}
