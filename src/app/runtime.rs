use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::liander_http::{
    ClientError, Endpoints, LianderApi, LianderHttpClient, REQUEST_TIMEOUT_SECONDS,
};
use crate::app::config::{AppConfig, BootstrapAccount};
use crate::app::config_flow::HttpCredentialCheck;
use crate::app::coordinator::{Coordinator, CoordinatorSnapshot, Credentials, UpdateFailed};
use crate::app::error::AppError;
use crate::app::services::{EntryCommandHandler, EntryQueryHandler, SqliteEntryService};
use crate::domain::config_flow::DEFAULT_TIMEOUT_SECS;
use crate::domain::models::{ConfigEntry, NewConfigEntry, format_timestamp};
use crate::domain::token::Clock;

/// Upper bound on how long a caller waits for the poller to answer a command.
pub const COMMAND_REPLY_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    SetupInProgress,
    Loaded,
    SetupError,
    NotLoaded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryStatus {
    pub state: LoadState,
    pub coordinator: CoordinatorSnapshot,
}

impl EntryStatus {
    fn setup_in_progress() -> Self {
        Self {
            state: LoadState::SetupInProgress,
            coordinator: CoordinatorSnapshot::default(),
        }
    }

    /// Entities are available only while the entry is loaded and the last poll succeeded.
    pub fn available(&self) -> bool {
        self.state == LoadState::Loaded && self.coordinator.last_update_success
    }
}

pub type Reply<T> = Sender<Result<T, UpdateFailed>>;

pub enum PollerCommand {
    Refresh(Reply<CoordinatorSnapshot>),
    Profile(Reply<Value>),
    ApplicationDetails(Reply<Value>),
    Outages(Reply<Value>),
    Stop,
}

pub type ApiFactory = Arc<dyn Fn() -> Result<Box<dyn LianderApi>, ClientError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("entry registry lock poisoned")]
    LockPoisoned,
    #[error("failed to spawn poller thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("config entry {0} is not loaded")]
    NotLoaded(String),
    #[error("poller for config entry {0} did not answer in time")]
    NoReply(String),
    #[error(transparent)]
    Update(#[from] UpdateFailed),
}

struct EntryHandle {
    commands: Sender<PollerCommand>,
    status: Arc<Mutex<EntryStatus>>,
    join: Option<JoinHandle<()>>,
}

/// Loaded config entries, one polling thread each.
pub struct EntryRegistry {
    api_factory: ApiFactory,
    poll_interval: Duration,
    entries: Mutex<HashMap<String, EntryHandle>>,
}

impl EntryRegistry {
    pub fn new(endpoints: Endpoints, poll_interval: Duration) -> Self {
        let api_factory: ApiFactory = Arc::new(move || {
            LianderHttpClient::new(
                endpoints.clone(),
                Duration::from_secs(REQUEST_TIMEOUT_SECONDS),
            )
            .map(|client| Box::new(client) as Box<dyn LianderApi>)
        });

        Self::with_api_factory(api_factory, poll_interval)
    }

    pub fn with_api_factory(api_factory: ApiFactory, poll_interval: Duration) -> Self {
        Self {
            api_factory,
            poll_interval,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Starts polling for `entry`, replacing any poller already running for it.
    pub fn setup(&self, entry: &ConfigEntry) -> Result<(), RegistryError> {
        self.unload(&entry.entry_id)?;

        let (commands, receiver) = mpsc::channel();
        let status = Arc::new(Mutex::new(EntryStatus::setup_in_progress()));

        let join = start_poller(PollerContext {
            entry_id: entry.entry_id.clone(),
            credentials: Credentials {
                username: entry.username.clone(),
                password: entry.password.clone(),
            },
            api_factory: Arc::clone(&self.api_factory),
            clock: SystemClock,
            poll_interval: self.poll_interval,
            commands: receiver,
            status: Arc::clone(&status),
        })?;

        tracing::debug!(entry_id = %entry.entry_id, "setting up config entry");
        self.lock_entries()?.insert(
            entry.entry_id.clone(),
            EntryHandle {
                commands,
                status,
                join: Some(join),
            },
        );

        Ok(())
    }

    /// Stops the poller, ending its remote session. Returns false when nothing was loaded.
    pub fn unload(&self, entry_id: &str) -> Result<bool, RegistryError> {
        let handle = self.lock_entries()?.remove(entry_id);
        let Some(mut handle) = handle else {
            return Ok(false);
        };

        tracing::debug!(entry_id, "unloading config entry");
        let _ = handle.commands.send(PollerCommand::Stop);
        if let Some(join) = handle.join.take()
            && join.join().is_err()
        {
            tracing::error!(entry_id, "poller thread panicked");
        }

        Ok(true)
    }

    pub fn status(&self, entry_id: &str) -> Result<Option<EntryStatus>, RegistryError> {
        let entries = self.lock_entries()?;
        Ok(entries
            .get(entry_id)
            .map(|handle| lock_status(&handle.status).clone()))
    }

    pub fn refresh(&self, entry_id: &str) -> Result<CoordinatorSnapshot, RegistryError> {
        self.request(entry_id, PollerCommand::Refresh)
    }

    pub fn profile(&self, entry_id: &str) -> Result<Value, RegistryError> {
        self.request(entry_id, PollerCommand::Profile)
    }

    pub fn application_details(&self, entry_id: &str) -> Result<Value, RegistryError> {
        self.request(entry_id, PollerCommand::ApplicationDetails)
    }

    pub fn outages(&self, entry_id: &str) -> Result<Value, RegistryError> {
        self.request(entry_id, PollerCommand::Outages)
    }

    pub fn shutdown(&self) {
        let entry_ids: Vec<String> = match self.lock_entries() {
            Ok(entries) => entries.keys().cloned().collect(),
            Err(error) => {
                tracing::error!(error = %error, "cannot stop pollers");
                return;
            }
        };

        for entry_id in entry_ids {
            if let Err(error) = self.unload(&entry_id) {
                tracing::error!(entry_id = %entry_id, error = %error, "failed to unload entry");
            }
        }
    }

    fn request<T>(
        &self,
        entry_id: &str,
        command: impl FnOnce(Reply<T>) -> PollerCommand,
    ) -> Result<T, RegistryError> {
        let commands = {
            let entries = self.lock_entries()?;
            let handle = entries
                .get(entry_id)
                .filter(|handle| lock_status(&handle.status).state == LoadState::Loaded)
                .ok_or_else(|| RegistryError::NotLoaded(entry_id.to_string()))?;
            handle.commands.clone()
        };

        let (reply, answer) = mpsc::channel();
        commands
            .send(command(reply))
            .map_err(|_| RegistryError::NotLoaded(entry_id.to_string()))?;

        answer
            .recv_timeout(COMMAND_REPLY_TIMEOUT)
            .map_err(|_| RegistryError::NoReply(entry_id.to_string()))?
            .map_err(RegistryError::from)
    }

    fn lock_entries(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, EntryHandle>>, RegistryError> {
        self.entries.lock().map_err(|_| RegistryError::LockPoisoned)
    }

    #[cfg(test)]
    pub(crate) fn insert_status(&self, entry_id: &str, status: EntryStatus) {
        let (commands, _) = mpsc::channel();
        self.entries
            .lock()
            .expect("registry lock should be available")
            .insert(
                entry_id.to_string(),
                EntryHandle {
                    commands,
                    status: Arc::new(Mutex::new(status)),
                    join: None,
                },
            );
    }
}

impl Drop for EntryRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct PollerContext<C> {
    entry_id: String,
    credentials: Credentials,
    api_factory: ApiFactory,
    clock: C,
    poll_interval: Duration,
    commands: Receiver<PollerCommand>,
    status: Arc<Mutex<EntryStatus>>,
}

fn start_poller<C>(context: PollerContext<C>) -> Result<JoinHandle<()>, RegistryError>
where
    C: Clock + Send + 'static,
{
    std::thread::Builder::new()
        .name("liander-poller".to_string())
        .spawn(move || run_poller(context))
        .map_err(RegistryError::Spawn)
}

fn run_poller<C: Clock>(context: PollerContext<C>) {
    let PollerContext {
        entry_id,
        credentials,
        api_factory,
        clock,
        poll_interval,
        commands,
        status,
    } = context;

    let api = match api_factory() {
        Ok(api) => api,
        Err(error) => {
            tracing::error!(entry_id = %entry_id, error = %error, "error setting up coordinator");
            lock_status(&status).state = LoadState::SetupError;
            return;
        }
    };

    let mut coordinator = Coordinator::new(api, clock, credentials);

    if let Err(error) = coordinator.refresh() {
        tracing::error!(entry_id = %entry_id, error = %error, "failed to fetch initial data");
        publish(&status, LoadState::SetupError, &coordinator);
        coordinator.logout();
        return;
    }

    publish(&status, LoadState::Loaded, &coordinator);
    tracing::info!(entry_id = %entry_id, "config entry loaded");

    let mut next_poll = Instant::now() + poll_interval;

    loop {
        let wait = next_poll.saturating_duration_since(Instant::now());

        match commands.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {
                if let Err(error) = coordinator.refresh() {
                    tracing::warn!(entry_id = %entry_id, error = %error, "scheduled update failed");
                }
                publish(&status, LoadState::Loaded, &coordinator);
                next_poll = Instant::now() + poll_interval;
            }
            Ok(PollerCommand::Refresh(reply)) => {
                let result = coordinator.refresh().map(|()| coordinator.snapshot());
                publish(&status, LoadState::Loaded, &coordinator);
                next_poll = Instant::now() + poll_interval;
                let _ = reply.send(result);
            }
            Ok(PollerCommand::Profile(reply)) => {
                let _ = reply.send(coordinator.fetch_profile());
            }
            Ok(PollerCommand::ApplicationDetails(reply)) => {
                let _ = reply.send(coordinator.fetch_application_details());
            }
            Ok(PollerCommand::Outages(reply)) => {
                let _ = reply.send(coordinator.fetch_outages());
            }
            Ok(PollerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    coordinator.logout();
    publish(&status, LoadState::NotLoaded, &coordinator);
    tracing::info!(entry_id = %entry_id, "config entry unloaded");
}

fn publish<A, C>(status: &Mutex<EntryStatus>, state: LoadState, coordinator: &Coordinator<A, C>)
where
    A: LianderApi,
    C: Clock,
{
    let mut status = lock_status(status);
    status.state = state;
    status.coordinator = coordinator.snapshot();
}

fn lock_status(status: &Mutex<EntryStatus>) -> MutexGuard<'_, EntryStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn import_bootstrap_account(
    entries: &SqliteEntryService,
    account: &BootstrapAccount,
) -> Result<(), AppError> {
    let existing = entries
        .get_entry_by_unique_id(&account.username)
        .map_err(AppError::database_init)?;
    if existing.is_some() {
        tracing::debug!(username = %account.username, "bootstrap account already configured");
        return Ok(());
    }

    let entry = entries
        .insert_entry(&NewConfigEntry {
            unique_id: account.username.clone(),
            title: account.username.clone(),
            username: account.username.clone(),
            password: account.password.clone(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            created_at: format_timestamp(Utc::now()),
        })
        .map_err(AppError::database_init)?;

    tracing::info!(entry_id = %entry.entry_id, "imported config entry from environment");
    Ok(())
}

struct Bootstrapped {
    entries: SqliteEntryService,
    registry: Arc<EntryRegistry>,
}

fn bootstrap(config: &AppConfig) -> Result<Bootstrapped, AppError> {
    let mut connection = open_connection(&config.db_path).map_err(AppError::database_init)?;
    run_migrations(&mut connection).map_err(AppError::database_init)?;

    let entries = SqliteEntryService::new(Arc::new(Mutex::new(connection)));
    if let Some(account) = &config.bootstrap_account {
        import_bootstrap_account(&entries, account)?;
    }

    let registry = Arc::new(EntryRegistry::new(
        config.endpoints(),
        Duration::from_secs(config.poll_interval_secs),
    ));
    let loaded = entries.list_entries().map_err(AppError::runtime)?;
    for entry in &loaded {
        registry.setup(entry).map_err(AppError::runtime)?;
    }
    tracing::info!(entries = loaded.len(), "config entries set up");

    Ok(Bootstrapped { entries, registry })
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let Bootstrapped { entries, registry } = bootstrap(&config)?;

    let api_state = ApiState {
        entries,
        registry: Arc::clone(&registry),
        credential_check: Arc::new(HttpCredentialCheck::new(config.endpoints())),
    };

    tracing::info!(bind = %config.http_bind, "http server starting");

    let server_result = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)?
        .run()
        .await
    });

    registry.shutdown();

    server_result.map_err(AppError::runtime)
}

/// Polls every stored entry without the HTTP surface until interrupted.
pub fn run_service(config: AppConfig) -> Result<(), AppError> {
    let Bootstrapped { registry, .. } = bootstrap(&config)?;

    tracing::info!("pollers running, waiting for shutdown signal");
    let signal_result =
        actix_web::rt::System::new().block_on(actix_web::rt::signal::ctrl_c());

    tracing::info!("shutdown requested");
    registry.shutdown();

    signal_result.map_err(AppError::runtime)
}
