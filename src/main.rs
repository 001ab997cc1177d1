use clap::Parser;
use lambda_runtime::{run, service_fn, LambdaEvent};
use rdspool::api::{adapter::handle_event, server::build_router};
use rdspool::config::{Config, ConfigSource, EnvSource, FileSource, LoggingConfig};
use rdspool::db::{rds_token_provider, PgConnector, PoolHolder};
use rdspool::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[cfg(feature = "fast-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "rdspool")]
#[command(about = "Lambda status endpoint backed by an IAM-authenticated connection pool", long_about = None)]
#[command(version)]
struct Args {
    /// TOML configuration file (takes precedence over --config-key)
    #[arg(short, long, value_name = "FILE", env = "RDSPOOL_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Environment variable holding the JSON configuration document
    #[arg(long, default_value = "RDSPOOL_CONFIG")]
    config_key: String,

    /// Log level (overrides config)
    #[arg(long, env = "RDSPOOL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), lambda_runtime::Error> {
    let args = Args::parse();

    // Handle config generation
    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        return Ok(());
    }

    // Configuration failures are fatal for the environment
    let loaded = match &args.config {
        Some(path) => FileSource { path: path.clone() }.load(&args.config_key),
        None => EnvSource.load(&args.config_key),
    };

    let logging = startup_logging(&loaded, args.log_level);
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e.into());
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("rdspool v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.db.host,
        database = %config.db.name,
        username = %config.db.username,
        "Loaded database configuration"
    );

    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let pools = Arc::new(PoolHolder::new(
        &config,
        PgConnector,
        rds_token_provider(sdk_config),
    ));
    let router = build_router(pools);

    let result = run(service_fn(move |event: LambdaEvent<Value>| {
        let router = router.clone();
        let span = info_span!("invocation", request_id = %event.context.request_id);
        async move {
            Ok::<_, lambda_runtime::Error>(handle_event(router, event.payload).await)
        }
        .instrument(span)
    }))
    .await;

    if let Err(e) = &result {
        error!("Lambda runtime error: {}", e);
    }
    result
}

/// Logging settings for startup. A failed config load still gets the default
/// subscriber so its error reaches the log stream.
fn startup_logging(loaded: &Result<Config>, level: Option<String>) -> LoggingConfig {
    let mut logging = match loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };
    if let Some(level) = level {
        logging.level = level;
    }
    logging
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&logging.level)
        .map_err(|e| rdspool::RdsPoolError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_current_span(true).without_time())
            .init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdspool::RdsPoolError;

    #[test]
    fn failed_config_load_still_logs_as_json() {
        let loaded: Result<Config> = Err(RdsPoolError::Config("missing".to_string()));

        let logging = startup_logging(&loaded, None);
        assert_eq!(logging.format, "json");
        assert_eq!(logging.level, "info");
        assert!(init_logging(&logging).is_ok());

        let logging = startup_logging(&loaded, Some("debug".to_string()));
        assert_eq!(logging.level, "debug");
    }
}
