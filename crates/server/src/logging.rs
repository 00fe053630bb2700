use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";

pub struct LoggingHandle {
    pub guard: WorkerGuard,
}

pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var("PAGETURNER_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    // Log to a file when a log dir is configured, otherwise to stdout.
    let (writer, guard) = match std::env::var("PAGETURNER_LOG_DIR") {
        Ok(dir) if !dir.is_empty() => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(&dir, "server.log");
            tracing_appender::non_blocking(appender)
        }
        _ => tracing_appender::non_blocking(std::io::stdout()),
    };

    let format = std::env::var("PAGETURNER_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
            .init();
    }

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        format = %format,
    );

    Ok(LoggingHandle { guard })
}
