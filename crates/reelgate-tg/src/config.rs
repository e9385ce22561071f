use crate::prelude::*;
use crate::{provider, quota, store, tg, Result};
use serde::de::DeserializeOwned;

/// Full application config. It is assembled from environment variables
/// grouped by prefixes, one group per subsystem.
pub struct Config {
    pub(crate) tg: tg::Config,
    pub(crate) quota: quota::Config,
    pub(crate) provider: provider::Config,
    pub(crate) store: store::Config,
}

/// Errors that prevent the bot from starting. They are never produced
/// while handling the requests.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("Failed to read the config from environment variables with the prefix `{prefix}`")]
    Env {
        prefix: &'static str,
        source: envy::Error,
    },

    #[error("Invalid value of the environment variable `{var}`: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl Config {
    pub fn load() -> Result<Config> {
        Self::from_vars(std::env::vars().collect())
    }

    fn from_vars(vars: Vec<(String, String)>) -> Result<Config> {
        let config = Self {
            tg: from_vars("TG_", vars.clone())?,
            quota: from_vars("QUOTA_", vars.clone())?,
            provider: from_vars("PROVIDER_", vars.clone())?,
            store: from_vars("STORE_", vars)?,
        };

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let Self {
            tg,
            quota,
            provider,
            store,
        } = self;

        let checks = [
            ("TG_TOKEN", tg.token.trim().is_empty(), "must not be empty"),
            (
                "TG_REQUIRED_CHANNEL",
                tg.required_channel.0 == 0,
                "must be a non-zero chat id",
            ),
            (
                "TG_CHANNEL_INVITE_LINK",
                tg.channel_invite_link.trim().is_empty(),
                "must not be empty",
            ),
            ("TG_OPERATOR", tg.operator.0 == 0, "must be a non-zero user id"),
            (
                "PROVIDER_TIMEOUT_SECS",
                provider.timeout_secs == 0,
                "must be a positive number of seconds",
            ),
            (
                "STORE_DATA_DIR",
                store.data_dir.as_os_str().is_empty(),
                "must not be empty",
            ),
        ];

        if let Some((var, _, reason)) = checks.into_iter().find(|(_, invalid, _)| *invalid) {
            return Err(ConfigError::Invalid {
                var,
                reason: reason.to_owned(),
            });
        }

        if quota.daily_limit == 0 {
            warn!("QUOTA_DAILY_LIMIT is 0, all download requests will be denied");
        }

        Ok(())
    }
}

pub(crate) fn from_env<T: DeserializeOwned>(prefix: &'static str) -> Result<T> {
    from_vars(prefix, std::env::vars())
}

/// Same as [`from_env`], but reads the variables from the given iterator
pub(crate) fn from_vars<T: DeserializeOwned>(
    prefix: &'static str,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<T> {
    Ok(envy::prefixed(prefix)
        .from_iter(vars)
        .map_err(|source| ConfigError::Env { prefix, source })?)
}
