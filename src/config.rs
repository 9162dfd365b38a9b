use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Rate policy for one endpoint class.
#[derive(Debug, Clone)]
pub struct RatePolicy {
    pub window: Duration,
    pub max_requests: u32,
    /// When true, requests that later succeed are un-counted so only
    /// failures accumulate against the limit.
    pub count_failures_only: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub general: RatePolicy,
    pub auth: RatePolicy,
    pub messaging: RatePolicy,
    /// Entry count past which stale windows are reaped on the next check.
    pub cleanup_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: RatePolicy {
                window: Duration::from_secs(15 * 60),
                max_requests: 100,
                count_failures_only: false,
            },
            auth: RatePolicy {
                window: Duration::from_secs(15 * 60),
                max_requests: 10,
                count_failures_only: true,
            },
            messaging: RatePolicy {
                window: Duration::from_secs(60),
                max_requests: 30,
                count_failures_only: false,
            },
            cleanup_threshold: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub profile_service_url: String,
    pub request_timeout: Duration,
    pub rate_limits: RateLimitConfig,
}

impl Config {
    fn env_u32(name: &str, default: u32) -> u32 {
        env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    fn env_secs(name: &str, default: Duration) -> Duration {
        env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "JWT_SECRET must not be empty".into(),
            ));
        }

        let profile_service_url = env::var("PROFILE_SERVICE_URL")
            .unwrap_or_else(|_| "http://profile-service:3000".into());

        let request_timeout = Self::env_secs("REQUEST_TIMEOUT_SECS", Duration::from_secs(30));

        let defaults = RateLimitConfig::default();
        let rate_limits = RateLimitConfig {
            general: RatePolicy {
                window: Self::env_secs("RATE_LIMIT_GENERAL_WINDOW_SECS", defaults.general.window),
                max_requests: Self::env_u32(
                    "RATE_LIMIT_GENERAL_MAX",
                    defaults.general.max_requests,
                ),
                count_failures_only: false,
            },
            auth: RatePolicy {
                window: Self::env_secs("RATE_LIMIT_AUTH_WINDOW_SECS", defaults.auth.window),
                max_requests: Self::env_u32("RATE_LIMIT_AUTH_MAX", defaults.auth.max_requests),
                count_failures_only: env::var("RATE_LIMIT_AUTH_FAILURES_ONLY")
                    .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                    .unwrap_or(defaults.auth.count_failures_only),
            },
            messaging: RatePolicy {
                window: Self::env_secs(
                    "RATE_LIMIT_MESSAGING_WINDOW_SECS",
                    defaults.messaging.window,
                ),
                max_requests: Self::env_u32(
                    "RATE_LIMIT_MESSAGING_MAX",
                    defaults.messaging.max_requests,
                ),
                count_failures_only: false,
            },
            cleanup_threshold: defaults.cleanup_threshold,
        };

        Ok(Self {
            database_url,
            redis_url,
            port,
            jwt_secret,
            profile_service_url,
            request_timeout,
            rate_limits,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://127.0.0.1:6379/0".into(),
            port: 3000,
            jwt_secret: "test-secret".into(),
            profile_service_url: "http://localhost:3100".into(),
            request_timeout: Duration::from_secs(30),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_policies() {
        let cfg = RateLimitConfig::default();
        assert_eq!(cfg.general.window, Duration::from_secs(900));
        assert_eq!(cfg.messaging.window, Duration::from_secs(60));
        assert!(cfg.auth.count_failures_only);
        assert!(!cfg.general.count_failures_only);
    }
}
