use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use crate::domain::models::{ConfigEntry, CredentialsUpdate, NewConfigEntry};

pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    r#"
CREATE TABLE IF NOT EXISTS config_entries (
    entry_id TEXT PRIMARY KEY,
    unique_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    timeout_secs INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
)];

const ENTRY_COLUMNS: &str =
    "entry_id, unique_id, title, username, password, timeout_secs, created_at, updated_at";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported schema version {current}; latest supported is {latest}")]
    UnsupportedSchemaVersion { current: u32, latest: u32 },
    #[error("an entry with unique id {0} already exists")]
    DuplicateUniqueId(String),
    #[error("config entry {0} not found")]
    EntryNotFound(String),
}

pub fn open_connection(path: &str) -> Result<Connection, DbError> {
    Connection::open(path).map_err(DbError::from)
}

pub fn run_migrations(connection: &mut Connection) -> Result<(), DbError> {
    let current_version = schema_version(connection)?;

    if current_version > LATEST_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            current: current_version,
            latest: LATEST_SCHEMA_VERSION,
        });
    }

    let transaction = connection.transaction()?;

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            transaction.execute_batch(sql)?;
            transaction.pragma_update(None, "user_version", version)?;
        }
    }

    transaction.commit()?;

    Ok(())
}

pub fn schema_version(connection: &Connection) -> Result<u32, DbError> {
    let version = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

pub fn insert_entry(
    connection: &Connection,
    new_entry: &NewConfigEntry,
) -> Result<ConfigEntry, DbError> {
    if get_entry_by_unique_id(connection, &new_entry.unique_id)?.is_some() {
        return Err(DbError::DuplicateUniqueId(new_entry.unique_id.clone()));
    }

    let entry = ConfigEntry {
        entry_id: uuid::Uuid::new_v4().to_string(),
        unique_id: new_entry.unique_id.clone(),
        title: new_entry.title.clone(),
        username: new_entry.username.clone(),
        password: new_entry.password.clone(),
        timeout_secs: new_entry.timeout_secs,
        created_at: new_entry.created_at.clone(),
        updated_at: new_entry.created_at.clone(),
    };

    connection.execute(
        "INSERT INTO config_entries (entry_id, unique_id, title, username, password, timeout_secs, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.entry_id,
            entry.unique_id,
            entry.title,
            entry.username,
            entry.password,
            entry.timeout_secs,
            entry.created_at,
            entry.updated_at,
        ],
    )?;

    Ok(entry)
}

pub fn get_entry(connection: &Connection, entry_id: &str) -> Result<Option<ConfigEntry>, DbError> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM config_entries WHERE entry_id = ?1");
    connection
        .query_row(&sql, params![entry_id], map_entry)
        .optional()
        .map_err(DbError::from)
}

pub fn get_entry_by_unique_id(
    connection: &Connection,
    unique_id: &str,
) -> Result<Option<ConfigEntry>, DbError> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM config_entries WHERE unique_id = ?1");
    connection
        .query_row(&sql, params![unique_id], map_entry)
        .optional()
        .map_err(DbError::from)
}

pub fn list_entries(connection: &Connection) -> Result<Vec<ConfigEntry>, DbError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM config_entries ORDER BY created_at ASC, entry_id ASC"
    );
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map([], map_entry)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }

    Ok(entries)
}

pub fn update_credentials(
    connection: &Connection,
    entry_id: &str,
    update: &CredentialsUpdate,
) -> Result<ConfigEntry, DbError> {
    let changed = connection.execute(
        "UPDATE config_entries SET username = ?2, password = ?3, timeout_secs = ?4, updated_at = ?5
         WHERE entry_id = ?1",
        params![
            entry_id,
            update.username,
            update.password,
            update.timeout_secs,
            update.updated_at,
        ],
    )?;

    if changed == 0 {
        return Err(DbError::EntryNotFound(entry_id.to_string()));
    }

    get_entry(connection, entry_id)?.ok_or_else(|| DbError::EntryNotFound(entry_id.to_string()))
}

pub fn delete_entry(connection: &Connection, entry_id: &str) -> Result<bool, DbError> {
    let changed = connection.execute(
        "DELETE FROM config_entries WHERE entry_id = ?1",
        params![entry_id],
    )?;
    Ok(changed > 0)
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<ConfigEntry> {
    Ok(ConfigEntry {
        entry_id: row.get(0)?,
        unique_id: row.get(1)?,
        title: row.get(2)?,
        username: row.get(3)?,
        password: row.get(4)?,
        timeout_secs: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
