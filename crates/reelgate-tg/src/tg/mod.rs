//! Telegram commands root module

mod cmd;
mod config;
mod message;
mod transport;

use crate::access::AccessGate;
use crate::broadcast::{BroadcastEngine, BroadcastSessions, BROADCAST_PACING};
use crate::download::{DownloadService, DownloadServiceOptions, Fetcher};
use crate::prelude::*;
use crate::provider::{ContentProvider, HttpProvider};
use crate::quota::{QuotaTracker, SystemClock};
use crate::registry::UserRegistry;
use crate::{http, provider, quota, store, Result};
use dptree::di::DependencyMap;
use std::sync::Arc;
use std::time::Duration;
use teloxide::adaptors::{CacheMe, Throttle, Trace};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

pub(crate) use config::*;
pub(crate) use transport::*;

pub(crate) type Bot = Trace<CacheMe<Throttle<teloxide::Bot>>>;

pub(crate) struct Ctx {
    bot: Bot,
    cfg: Arc<Config>,
    registry: Arc<UserRegistry>,
    quota: Arc<QuotaTracker>,
    download: DownloadService,
    broadcast: BroadcastEngine,
    sessions: BroadcastSessions,
}

pub(crate) struct RunBotOptions {
    pub(crate) tg_cfg: Config,
    pub(crate) quota_cfg: quota::Config,
    pub(crate) provider_cfg: provider::Config,
    pub(crate) store_cfg: store::Config,
}

pub(crate) async fn run_bot(opts: RunBotOptions) -> Result {
    let mut di = DependencyMap::new();

    let bot: Bot = teloxide::Bot::new(opts.tg_cfg.token.clone())
        .throttle(Default::default())
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all());

    let transport: Arc<dyn ChatTransport> = Arc::new(bot.clone());

    let provider: Arc<dyn ContentProvider> =
        Arc::new(HttpProvider::new(&opts.provider_cfg, http::create_client()));

    let fetcher = Fetcher::new(
        provider,
        Duration::from_secs(opts.provider_cfg.timeout_secs),
    );

    let quota = Arc::new(QuotaTracker::new(
        opts.store_cfg.quota_path(),
        opts.quota_cfg.daily_limit,
        Arc::new(SystemClock),
    ));

    let registry = Arc::new(UserRegistry::new(opts.store_cfg.users_path()));

    let gate = AccessGate::new(
        transport.clone(),
        quota.clone(),
        opts.tg_cfg.required_channel,
    );

    let download = DownloadService::new(DownloadServiceOptions {
        transport: transport.clone(),
        gate,
        quota: quota.clone(),
        fetcher,
        downloads_root: opts.store_cfg.downloads_dir(),
        invite_link: opts.tg_cfg.channel_invite_link.clone(),
        refund_on_failure: opts.quota_cfg.refund_on_failure,
    });

    let broadcast = BroadcastEngine::new(
        transport,
        registry.clone(),
        opts.tg_cfg.operator,
        BROADCAST_PACING,
    );

    di.insert(Arc::new(Ctx {
        bot: bot.clone(),
        cfg: Arc::new(opts.tg_cfg),
        registry,
        quota,
        download,
        broadcast,
        sessions: Default::default(),
    }));

    info!(
        data_dir = tracing_path(&opts.store_cfg.data_dir),
        daily_limit = opts.quota_cfg.daily_limit,
        "Starting bot..."
    );

    bot.set_my_commands(cmd::regular::Cmd::bot_commands())
        .await?;

    let handler = dptree::entry()
        .inspect(|update: Update| {
            metrics::increment_counter!("tg_updates_total");
            trace!(target: "tg_update", "{update:#?}");
        })
        .branch(
            Update::filter_message()
                .filter_command::<cmd::regular::Cmd>()
                .endpoint(cmd::handle::<cmd::regular::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter_command::<cmd::operator::Cmd>()
                .endpoint(cmd::handle::<cmd::operator::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter(message::filter)
                .endpoint(message::handle),
        )
        .inspect(|_: Update| metrics::increment_counter!("tg_updates_skipped_total"));

    Dispatcher::builder(bot, handler)
        .dependencies(di)
        // We don't handle all possible messages that users send,
        // so to suppress the warning that we don't do this we have
        // a noop default handler here
        .default_handler(|_| std::future::ready(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");

    Ok(())
}
