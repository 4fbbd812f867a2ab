use std::sync::Once;

/// Filters applied when neither the config nor `RUST_LOG` names one.
///
/// `wgpu_core` and `wgpu_hal` log every resource at info level.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger configuration.
///
/// `env_filter` uses `env_logger` syntax, e.g. `"lumen_engine=trace"` to see
/// every barrier the backend validates.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
    /// Prefix records with milliseconds, useful when reading gate waits.
    pub millis: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            millis: false,
        }
    }
}

impl LoggingConfig {
    /// Filter string in effect: the explicit one, else `RUST_LOG`, else
    /// [`DEFAULT_FILTER`].
    pub fn resolved_filter(&self) -> String {
        self.env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string())
    }
}

static INIT: Once = Once::new();

/// Installs the global logger. Later calls do nothing.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&config.resolved_filter());
        builder.write_style(config.write_style);
        if config.millis {
            builder.format_timestamp_millis();
        }

        if let Err(err) = builder.try_init() {
            eprintln!("logger already installed: {err}");
            return;
        }
        log::debug!("logging initialized");
    });
}
