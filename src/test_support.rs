use std::path::PathBuf;

use rusqlite::Connection;
use serde_json::{Value, json};

use crate::adapters::db::{open_connection, run_migrations};
use crate::domain::models::NewConfigEntry;

pub fn temp_db_path(name: &str) -> PathBuf {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join(name);
    std::mem::forget(dir);
    path
}

pub fn open_test_connection(name: &str) -> Connection {
    let path = temp_db_path(name);
    let mut connection =
        open_connection(path.to_string_lossy().as_ref()).expect("test db should open");
    run_migrations(&mut connection).expect("test migrations should succeed");
    connection
}

pub fn sample_new_entry(username: &str) -> NewConfigEntry {
    NewConfigEntry {
        unique_id: username.to_string(),
        title: username.to_string(),
        username: username.to_string(),
        password: "secret".to_string(),
        timeout_secs: 5,
        created_at: "2026-10-01T08:00:00.000Z".to_string(),
    }
}

/// Connections payload as returned by the Liander gateway for a single address.
pub fn sample_connections() -> Value {
    json!([
        {
            "adres": {
                "postcode": "1000 AAB",
                "straat": "Mijnstraat",
                "huisnummer": "1",
                "toevoeging": "",
                "plaats": "AMSTERDAM"
            },
            "aansluitingen": {
                "elektra": [
                    {
                        "type": "ElektraAansluiting",
                        "ean": "123456789012345678",
                        "aansluitwaarde": "3x25A",
                        "status": "In bedrijf",
                        "netwerkkosten": "400.92",
                        "meters": [
                            {
                                "type": "Elektrameter",
                                "meternummer": "E0000000000000000",
                                "aantalTelwerken": 4,
                                "aantalFasen": "3"
                            }
                        ],
                        "maximaalVermogen": "17"
                    }
                ],
                "gas": []
            }
        }
    ])
}
