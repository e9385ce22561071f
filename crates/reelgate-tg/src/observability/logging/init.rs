use crate::config::{from_env, ConfigError};
use crate::observability::GLOBAL_LABELS;
use crate::prelude::*;
use crate::Result;
use serde::Deserialize;
use serde_with::serde_as;
use std::collections::HashMap;
use std::ops::Deref;
use tracing_subscriber::prelude::*;

/// Handle to the background task that ships the logs to Loki, if enabled.
pub struct LoggingTask {
    loki: Option<(
        tokio::task::JoinHandle<()>,
        tracing_loki::BackgroundTaskController,
    )>,
}

impl LoggingTask {
    pub async fn shutdown(self) {
        let Some((task, controller)) = self.loki else {
            return;
        };

        info!("Waiting for the logging task to finish nicely...");

        let start = std::time::Instant::now();
        controller.shutdown().await;
        let duration = start.elapsed();

        eprintln!("Stopped logging task in {:.2?}: {:?}", duration, task.await);
    }
}

/// Installs the global `tracing` subscriber. The verbosity is controlled
/// with the required `TG_BOT_LOG` env var (`EnvFilter` syntax).
pub fn init_logging() -> Result<LoggingTask> {
    LoggingConfig::load()?.init_logging()
}

#[serde_as]
#[derive(Deserialize)]
struct LoggingConfig {
    tg_bot_log: String,

    loki_url: Option<url::Url>,

    #[serde_as(as = "Option<serde_with::json::JsonString>")]
    #[serde(default)]
    loki_labels: Option<HashMap<String, String>>,
}

impl LoggingConfig {
    fn load() -> Result<LoggingConfig> {
        from_env("")
    }

    fn init_logging(self) -> Result<LoggingTask> {
        let env_filter = self.env_filter()?;

        let fmt = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(std::env::var("COLORS").as_deref() != Ok("0"))
            .pretty();

        let (loki_layer, loki) = match self.loki_url {
            Some(url) => {
                let (layer, controller, task) = Self::loki(url, self.loki_labels)?;
                (Some(layer), Some((tokio::spawn(task), controller)))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(fmt)
            .with(loki_layer)
            .with(env_filter)
            .with(tracing_error::ErrorLayer::default())
            .init();

        init_panic_hook();

        Ok(LoggingTask { loki })
    }

    fn env_filter(&self) -> Result<tracing_subscriber::EnvFilter, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            var: "TG_BOT_LOG",
            reason,
        };

        if self.tg_bot_log.trim().is_empty() {
            return Err(invalid("must not be empty".to_owned()));
        }

        tracing_subscriber::EnvFilter::try_new(&self.tg_bot_log)
            .map_err(|err| invalid(err.to_string()))
    }

    fn loki(
        url: url::Url,
        labels: Option<HashMap<String, String>>,
    ) -> Result<(
        tracing_loki::Layer,
        tracing_loki::BackgroundTaskController,
        tracing_loki::BackgroundTask,
    )> {
        let additional_labels = GLOBAL_LABELS
            .iter()
            .chain(&[("source", "reelgate-tg")])
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()));

        let mut labels = labels.unwrap_or_default();
        labels.extend(additional_labels);

        let invalid = |source: tracing_loki::Error| ConfigError::Invalid {
            var: "LOKI_URL",
            reason: source.to_string(),
        };

        let builder = labels
            .into_iter()
            .try_fold(tracing_loki::builder(), |builder, (key, value)| {
                builder.label(key, value)
            })
            .map_err(invalid)?;

        Ok(builder.build_controller_url(url).map_err(invalid)?)
    }
}

fn init_panic_hook() {
    let current_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        // The default hook must run first, the panic may come from
        // inside of the `tracing` machinery itself and never reach the logs.
        current_hook(panic_info);

        let backtrace = std::backtrace::Backtrace::capture();
        let location = panic_info.location().map(|location| {
            format!(
                "{}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            )
        });

        // If the panic message was formatted using interpolated values,
        // it will be a `String`. Otherwise, it will be a `&str`.
        let payload = panic_info.payload();
        let message = payload
            .downcast_ref::<String>()
            .map(<_>::deref)
            .or_else(|| payload.downcast_ref::<&str>().map(<_>::deref))
            .unwrap_or("<unknown>");

        let span_trace = tracing_error::SpanTrace::capture();

        error!(
            target: "panic",
            thread = std::thread::current().name(),
            location,
            span_trace = %span_trace,
            backtrace = format_args!("\n{backtrace}"),
            "{message}"
        );
    }));
}
