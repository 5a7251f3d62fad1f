//! Provider-wide configuration (§9 "Eager-size threshold", §5 buffer pool,
//! §4.5 transfer concurrency). Loaded from the layered `config::Config`
//! the daemon builds from a JSON/TOML file plus environment overrides, with
//! programmatic defaults when a key is absent.

use config::Config;

pub const CONFIG_KEY_BIND_ADDR: &str = "bind-addr";
pub const CONFIG_KEY_PROVIDER_ID: &str = "provider-id";
pub const CONFIG_KEY_EAGER_LIMIT: &str = "eager-limit";
pub const CONFIG_KEY_PIPELINE_ENABLED: &str = "pipeline-enabled";
pub const CONFIG_KEY_BUFFER_COUNT: &str = "buffer-pool.count";
pub const CONFIG_KEY_BUFFER_CHUNK_SIZE: &str = "buffer-pool.chunk-size";
pub const CONFIG_KEY_TARGET_CONCURRENCY: &str = "target-concurrency";
pub const CONFIG_KEY_BLOCK_SIZE: &str = "block-size";

/// Historical default eager-write/-read threshold (§9): payloads at or
/// below this size are packed inline into the RPC instead of using the
/// bulk/RDMA path.
pub const DEFAULT_EAGER_LIMIT: usize = 2048;

/// Default direct-I/O alignment for the file backend (§4.4), used when the
/// runtime cannot discover the true block size via `statvfs`/`statx`.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

const DEFAULT_BUFFER_COUNT: usize = 32;
const DEFAULT_BUFFER_CHUNK_SIZE: usize = 256 * 1024;
const DEFAULT_TARGET_CONCURRENCY: usize = 16;

/// Per-provider configuration, shared by every target it hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub bind_addr: String,
    pub provider_id: u16,
    pub eager_limit: usize,
    pub pipeline_enabled: bool,
    pub buffer_pool_count: usize,
    pub buffer_pool_chunk_size: usize,
    pub target_concurrency: usize,
    pub block_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            provider_id: 1,
            eager_limit: DEFAULT_EAGER_LIMIT,
            pipeline_enabled: false,
            buffer_pool_count: DEFAULT_BUFFER_COUNT,
            buffer_pool_chunk_size: DEFAULT_BUFFER_CHUNK_SIZE,
            target_concurrency: DEFAULT_TARGET_CONCURRENCY,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ProviderConfig {
    /// Builds a config from a layered `config::Config`, falling back to
    /// defaults for any key that is absent — command-line flags that were
    /// merged into `config` as a higher-priority source win automatically.
    pub fn from_config(config: &Config) -> Self {
        let defaults = ProviderConfig::default();
        ProviderConfig {
            bind_addr: config
                .get_string(CONFIG_KEY_BIND_ADDR)
                .unwrap_or(defaults.bind_addr),
            provider_id: config
                .get_int(CONFIG_KEY_PROVIDER_ID)
                .map(|v| v as u16)
                .unwrap_or(defaults.provider_id),
            eager_limit: config
                .get_int(CONFIG_KEY_EAGER_LIMIT)
                .map(|v| v as usize)
                .unwrap_or(defaults.eager_limit),
            pipeline_enabled: config
                .get_bool(CONFIG_KEY_PIPELINE_ENABLED)
                .unwrap_or(defaults.pipeline_enabled),
            buffer_pool_count: config
                .get_int(CONFIG_KEY_BUFFER_COUNT)
                .map(|v| v as usize)
                .unwrap_or(defaults.buffer_pool_count),
            buffer_pool_chunk_size: config
                .get_int(CONFIG_KEY_BUFFER_CHUNK_SIZE)
                .map(|v| v as usize)
                .unwrap_or(defaults.buffer_pool_chunk_size),
            target_concurrency: config
                .get_int(CONFIG_KEY_TARGET_CONCURRENCY)
                .map(|v| v as usize)
                .unwrap_or(defaults.target_concurrency),
            block_size: config
                .get_int(CONFIG_KEY_BLOCK_SIZE)
                .map(|v| v as usize)
                .unwrap_or(defaults.block_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_config_is_empty() {
        let config = Config::builder().build().unwrap();
        let parsed = ProviderConfig::from_config(&config);
        assert_eq!(parsed.eager_limit, DEFAULT_EAGER_LIMIT);
        assert_eq!(parsed.block_size, DEFAULT_BLOCK_SIZE);
        assert!(!parsed.pipeline_enabled);
    }

    #[test]
    fn explicit_keys_override_defaults() {
        let config = Config::builder()
            .set_override(CONFIG_KEY_EAGER_LIMIT, 4096i64)
            .unwrap()
            .set_override(CONFIG_KEY_PIPELINE_ENABLED, true)
            .unwrap()
            .build()
            .unwrap();
        let parsed = ProviderConfig::from_config(&config);
        assert_eq!(parsed.eager_limit, 4096);
        assert!(parsed.pipeline_enabled);
    }
}
