use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_GUIDANCE_DEADLINE_SECS: u64 = 45;

/// Server configuration loaded from environment variables.
///
/// The guidance client reads its own variables (see `LlmClientConfig`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Redis connection URL (e.g. "redis://127.0.0.1:6379"). `None` keeps history in memory.
    pub redis_url: Option<String>,
    /// Serve MCP over streamable HTTP on this address. `None` serves on stdio.
    pub http_addr: Option<SocketAddr>,
    /// Upper bound on one guidance request before the fallback result is used.
    pub guidance_deadline: Duration,
    /// Requests per second allowed for tools that call the guidance service. `None` disables.
    pub rate_limit_rps: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `REDIS_URL`
    /// - `CARENAV_HTTP_ADDR`: socket address such as "127.0.0.1:8080"
    /// - `CARENAV_GUIDANCE_DEADLINE_SECS` (default: 45, must be > 0)
    /// - `CARENAV_RATE_LIMIT_RPS` (0 disables)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let redis_url = lookup("REDIS_URL").filter(|u| !u.trim().is_empty());

        let http_addr = lookup("CARENAV_HTTP_ADDR")
            .filter(|a| !a.trim().is_empty())
            .map(|a| {
                a.trim().parse::<SocketAddr>().map_err(|_| {
                    AppError::Config(format!(
                        "CARENAV_HTTP_ADDR must be a socket address like 127.0.0.1:8080, got '{a}'"
                    ))
                })
            })
            .transpose()?;

        let guidance_deadline = match lookup("CARENAV_GUIDANCE_DEADLINE_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(AppError::Config(format!(
                        "CARENAV_GUIDANCE_DEADLINE_SECS must be a positive integer, got '{raw}'"
                    )))
                }
            },
            None => Duration::from_secs(DEFAULT_GUIDANCE_DEADLINE_SECS),
        };

        let rate_limit_rps = lookup("CARENAV_RATE_LIMIT_RPS")
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| {
                    AppError::Config(format!(
                        "CARENAV_RATE_LIMIT_RPS must be a non-negative integer, got '{raw}'"
                    ))
                })
            })
            .transpose()?
            .filter(|&n| n > 0);

        Ok(Self {
            redis_url,
            http_addr,
            guidance_deadline,
            rate_limit_rps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(
            config,
            Config {
                redis_url: None,
                http_addr: None,
                guidance_deadline: Duration::from_secs(45),
                rate_limit_rps: None,
            }
        );
    }

    #[test]
    fn test_all_values() {
        let config = load(&[
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("CARENAV_HTTP_ADDR", "0.0.0.0:8080"),
            ("CARENAV_GUIDANCE_DEADLINE_SECS", "10"),
            ("CARENAV_RATE_LIMIT_RPS", "2"),
        ])
        .unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.http_addr, Some("0.0.0.0:8080".parse().unwrap()));
        assert_eq!(config.guidance_deadline, Duration::from_secs(10));
        assert_eq!(config.rate_limit_rps, Some(2));
    }

    #[test]
    fn test_zero_rate_limit_disables() {
        let config = load(&[("CARENAV_RATE_LIMIT_RPS", "0")]).unwrap();
        assert_eq!(config.rate_limit_rps, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for vars in [
            [("CARENAV_HTTP_ADDR", "localhost")],
            [("CARENAV_GUIDANCE_DEADLINE_SECS", "0")],
            [("CARENAV_GUIDANCE_DEADLINE_SECS", "soon")],
            [("CARENAV_RATE_LIMIT_RPS", "-1")],
        ] {
            let err = load(&vars).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{vars:?}");
        }
    }
}
