use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

use crate::adapters::db;
use crate::adapters::db::DbError;
use crate::domain::models::{ConfigEntry, CredentialsUpdate, NewConfigEntry};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("database lock poisoned")]
    DbLockPoisoned,
    #[error("database operation failed: {0}")]
    Database(#[from] DbError),
}

pub trait EntryQueryHandler {
    fn list_entries(&self) -> Result<Vec<ConfigEntry>, ServiceError>;
    fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>, ServiceError>;
    fn get_entry_by_unique_id(&self, unique_id: &str)
    -> Result<Option<ConfigEntry>, ServiceError>;
}

pub trait EntryCommandHandler {
    fn insert_entry(&self, new_entry: &NewConfigEntry) -> Result<ConfigEntry, ServiceError>;
    fn update_credentials(
        &self,
        entry_id: &str,
        update: &CredentialsUpdate,
    ) -> Result<ConfigEntry, ServiceError>;
    fn delete_entry(&self, entry_id: &str) -> Result<bool, ServiceError>;
}

#[derive(Clone)]
pub struct SqliteEntryService {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteEntryService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, ServiceError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| ServiceError::DbLockPoisoned)?;
        op(&connection).map_err(ServiceError::from)
    }
}

impl EntryQueryHandler for SqliteEntryService {
    fn list_entries(&self) -> Result<Vec<ConfigEntry>, ServiceError> {
        self.with_connection(db::list_entries)
    }

    fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>, ServiceError> {
        self.with_connection(|connection| db::get_entry(connection, entry_id))
    }

    fn get_entry_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<ConfigEntry>, ServiceError> {
        self.with_connection(|connection| db::get_entry_by_unique_id(connection, unique_id))
    }
}

impl EntryCommandHandler for SqliteEntryService {
    fn insert_entry(&self, new_entry: &NewConfigEntry) -> Result<ConfigEntry, ServiceError> {
        self.with_connection(|connection| db::insert_entry(connection, new_entry))
    }

    fn update_credentials(
        &self,
        entry_id: &str,
        update: &CredentialsUpdate,
    ) -> Result<ConfigEntry, ServiceError> {
        self.with_connection(|connection| db::update_credentials(connection, entry_id, update))
    }

    fn delete_entry(&self, entry_id: &str) -> Result<bool, ServiceError> {
        self.with_connection(|connection| db::delete_entry(connection, entry_id))
    }
}
