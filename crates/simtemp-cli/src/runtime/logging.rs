use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "simtemp.log";

/// Initialize the tracing subscriber. Logs go to stderr so stdout stays the
/// sample stream; with `log_dir` set, JSON lines are also written to a daily
/// rotating file. Keep the returned guard alive until exit so the file writer
/// flushes.
pub fn init_tracing(json_output: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,simtemp_core=info,simtemp_io=info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json_output {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(io::stderr))
            .init();
    }
    guard
}
