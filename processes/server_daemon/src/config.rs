//! Layered configuration for the daemon (§6). Command-line flags take
//! precedence over `-j`'s JSON file, which takes
//! precedence over `bake_common::ProviderConfig`'s defaults — the same
//! order the original's `resolve_json` documents. The provider-wide
//! tunables themselves (eager limit, buffer pool shape, block size, ...)
//! live in `bake_common::ProviderConfig` so every process that builds a
//! `BakeProvider` agrees on what they mean and what they default to; this
//! module only adds the daemon-specific knobs (host file, multiplex mode)
//! around that shared core.

use bake_common::ProviderConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexMode {
    /// One provider, every pool becomes a target under it.
    Targets,
    /// One provider per pool.
    Providers,
}

impl MultiplexMode {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "targets" => Ok(MultiplexMode::Targets),
            "providers" => Ok(MultiplexMode::Providers),
            other => Err(format!("unrecognized multiplexing mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub provider: ProviderConfig,
    pub host_file: Option<String>,
    pub multiplex_mode: MultiplexMode,
}

impl DaemonConfig {
    /// Builds the layered config the way `processes/indexer` does: a JSON
    /// file source (if `-j` was given) overlaid with `BAKE_`-prefixed
    /// environment variables, read through `ProviderConfig::from_config`,
    /// then overridden by any command-line flag that was explicitly set.
    pub fn resolve(
        json_path: Option<&str>,
        cli_listen_addr: Option<&str>,
        cli_host_file: Option<&str>,
        cli_multiplex_mode: Option<MultiplexMode>,
        cli_pipeline_enabled: bool,
    ) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = json_path {
            builder = builder.add_source(
                config::File::with_name(path).format(config::FileFormat::Json),
            );
        }
        let loaded = builder
            .add_source(config::Environment::with_prefix("BAKE"))
            .build()?;

        let mut provider = ProviderConfig::from_config(&loaded);
        if let Some(addr) = cli_listen_addr {
            provider.bind_addr = addr.to_string();
        }
        if cli_pipeline_enabled {
            provider.pipeline_enabled = true;
        }

        let host_file = cli_host_file
            .map(str::to_string)
            .or_else(|| loaded.get_string("host_file").ok());
        let multiplex_mode = match cli_multiplex_mode {
            Some(mode) => mode,
            None => match loaded.get_string("multiplex_mode") {
                Ok(s) => MultiplexMode::parse(&s).map_err(anyhow::Error::msg)?,
                Err(_) => MultiplexMode::Targets,
            },
        };

        Ok(DaemonConfig {
            provider,
            host_file,
            multiplex_mode,
        })
    }

    /// A disabled pipeline folds the pool down to one buffer: transfers
    /// still proceed chunk by chunk, but serially instead of across many
    /// concurrent tasks — the CLI-level equivalent of the original's
    /// `pipeline_enable` toggle.
    pub fn effective_buffer_pool_capacity(&self) -> usize {
        if self.provider.pipeline_enabled {
            self.provider.buffer_pool_count
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_loaded_defaults() {
        let cfg = DaemonConfig::resolve(None, Some("na+sm://host"), None, None, true).unwrap();
        assert_eq!(cfg.provider.bind_addr, "na+sm://host");
        assert!(cfg.provider.pipeline_enabled);
        assert_eq!(cfg.multiplex_mode, MultiplexMode::Targets);
    }

    #[test]
    fn defaults_match_the_shared_provider_config() {
        let cfg = DaemonConfig::resolve(None, None, None, None, false).unwrap();
        assert_eq!(
            cfg.provider.eager_limit,
            bake_common::config::DEFAULT_EAGER_LIMIT
        );
        assert_eq!(cfg.effective_buffer_pool_capacity(), 1);
    }
}
