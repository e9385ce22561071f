mod access;
mod broadcast;
mod config;
mod download;
mod error;
mod http;
mod link;
mod observability;
mod provider;
mod quota;
mod registry;
mod store;
mod tg;

#[cfg(test)]
mod testing;

pub mod util;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::prelude::*;
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Run the telegram bot processing loop
pub async fn run(config: Config) -> Result<()> {
    let opts = tg::RunBotOptions {
        tg_cfg: config.tg,
        quota_cfg: config.quota,
        provider_cfg: config.provider,
        store_cfg: config.store,
    };

    tg::run_bot(opts).await
}
