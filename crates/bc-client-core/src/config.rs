//! Client configuration. Deliberately not a CLI: this is the typed struct
//! the core accepts, with an `from_env()` convenience constructor mirroring
//! the environment-variable mirror in spec.md §6. Loading flags from argv
//! is a host-binary concern, out of scope here.

use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ClientConfig {
    #[builder(setter(into))]
    pub base_url: String,
    #[builder(setter(into))]
    pub tenant_id: String,
    #[builder(setter(into))]
    pub username: String,
    #[builder(setter(into))]
    pub password: String,

    #[builder(default = 10_000)]
    pub connect_timeout_ms: u64,
    #[builder(default = 30_000)]
    pub rpc_timeout_ms: u64,
    #[builder(default = 15_000)]
    pub handler_wait_timeout_ms: u64,

    #[builder(default = 1)]
    pub pool_min_connections: usize,
    #[builder(default = 4)]
    pub pool_max_connections: usize,

    #[builder(default = 256)]
    pub form_cache_max_forms: u64,
    #[builder(default = 1_800)]
    pub form_cache_ttl_secs: u64,

    #[builder(default = false)]
    pub debug_log_raw_frames: bool,
}

macro_rules! env_or_default {
    ($key:literal, $parse:expr, $default:expr) => {
        std::env::var($key)
            .ok()
            .and_then(|v| $parse(&v))
            .unwrap_or($default)
    };
}

impl ClientConfig {
    /// Build a config from the environment-variable mirror named in
    /// spec.md §6. Required variables missing is a programmer error (the
    /// caller should validate deployment config up front), so this panics
    /// via `std::env::var(...).expect(...)` rather than returning a
    /// `Result`; callers that want graceful fallback should read
    /// `std::env::var` directly instead.
    #[must_use]
    pub fn from_env() -> Self {
        Self::builder()
            .base_url(std::env::var("BC_BASE_URL").expect("BC_BASE_URL must be set"))
            .tenant_id(std::env::var("BC_TENANT_ID").expect("BC_TENANT_ID must be set"))
            .username(std::env::var("BC_USERNAME").expect("BC_USERNAME must be set"))
            .password(std::env::var("BC_PASSWORD").expect("BC_PASSWORD must be set"))
            .connect_timeout_ms(env_or_default!(
                "BC_CONNECT_TIMEOUT_MS",
                |v: &str| v.parse().ok(),
                10_000
            ))
            .rpc_timeout_ms(env_or_default!(
                "BC_RPC_TIMEOUT_MS",
                |v: &str| v.parse().ok(),
                30_000
            ))
            .handler_wait_timeout_ms(env_or_default!(
                "BC_HANDLER_WAIT_TIMEOUT_MS",
                |v: &str| v.parse().ok(),
                15_000
            ))
            .pool_min_connections(env_or_default!(
                "BC_POOL_MIN_CONNECTIONS",
                |v: &str| v.parse().ok(),
                1
            ))
            .pool_max_connections(env_or_default!(
                "BC_POOL_MAX_CONNECTIONS",
                |v: &str| v.parse().ok(),
                4
            ))
            .form_cache_max_forms(env_or_default!(
                "BC_FORM_CACHE_MAX_FORMS",
                |v: &str| v.parse().ok(),
                256
            ))
            .form_cache_ttl_secs(env_or_default!(
                "BC_FORM_CACHE_TTL_SECS",
                |v: &str| v.parse().ok(),
                1_800
            ))
            .debug_log_raw_frames(env_or_default!(
                "BC_DEBUG_LOG_RAW_FRAMES",
                |v: &str| v.parse().ok(),
                false
            ))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_documented_defaults() {
        let config = ClientConfig::builder()
            .base_url("http://Cronus27/BC")
            .tenant_id("default")
            .username("sshadows")
            .password("hunter2")
            .build();

        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.pool_min_connections, 1);
        assert_eq!(config.pool_max_connections, 4);
        assert!(!config.debug_log_raw_frames);
    }
}
