pub mod config;
pub mod config_flow;
pub mod coordinator;
mod error;
mod logging;
pub mod runtime;
pub mod services;

pub use error::AppError;

pub fn run() -> Result<(), AppError> {
    let config = init()?;
    runtime::run(config)
}

pub fn run_service() -> Result<(), AppError> {
    let config = init()?;
    runtime::run_service(config)
}

fn init() -> Result<config::AppConfig, AppError> {
    let dotenv_path = dotenvy::dotenv().ok();

    logging::init()?;

    if let Some(path) = dotenv_path {
        tracing::info!(path = %path.display(), "loaded environment from file");
    }

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        api_base_url = %config.api_base_url,
        poll_interval_secs = config.poll_interval_secs,
        bootstrap_account = config.bootstrap_account.is_some(),
        "application bootstrap initialized"
    );

    Ok(config)
}
