use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use mijn_liander::adapters::liander_http::{LianderHttpClient, REQUEST_TIMEOUT_SECONDS};
use mijn_liander::app::config::AppConfig;
use mijn_liander::app::coordinator::{Coordinator, Credentials};
use mijn_liander::app::runtime::SystemClock;
use mijn_liander::domain::entities::{EntityOwner, binary_sensor_states, sensor_states};
use mijn_liander::domain::models::format_timestamp;
use mijn_liander::domain::outage::active_outage_count;

fn main() {
    let _ = dotenvy::dotenv();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            println!("[{}] ERROR: {err}", now_iso());
            std::process::exit(1);
        }
    };

    let Some(account) = config.bootstrap_account.clone() else {
        println!(
            "[{}] ERROR: LIANDER_USERNAME and LIANDER_PASSWORD must be set",
            now_iso()
        );
        std::process::exit(1);
    };

    let client = match LianderHttpClient::new(
        config.endpoints(),
        Duration::from_secs(REQUEST_TIMEOUT_SECONDS),
    ) {
        Ok(client) => client,
        Err(err) => {
            println!("[{}] ERROR: {err}", now_iso());
            std::process::exit(1);
        }
    };

    let username = account.username.clone();
    let mut coordinator = Coordinator::new(
        client,
        SystemClock,
        Credentials {
            username: account.username,
            password: account.password,
        },
    );

    if let Err(err) = coordinator.refresh() {
        println!("[{}] {username}: ERROR fetching connections: {err}", now_iso());
        coordinator.logout();
        std::process::exit(1);
    }

    let snapshot = coordinator.snapshot();
    println!(
        "[{}] {username} | token expires: {}",
        now_iso(),
        snapshot
            .token_expires_at
            .unwrap_or_else(|| "n/a".to_string())
    );

    let owner = EntityOwner {
        entry_id: "status-job",
        unique_id: &username,
    };
    let data = snapshot.data.as_ref();

    println!("  Sensors:");
    for sensor in sensor_states(owner, data, snapshot.last_update_success) {
        println!("    {:<22} {}", sensor.name, display(sensor.state.as_ref()));
    }

    println!("  Binary sensors:");
    for sensor in binary_sensor_states(owner, data, snapshot.last_update_success) {
        println!("    {:<22} {}", sensor.name, on_off(sensor.is_on));
    }

    match coordinator.fetch_outages() {
        Ok(feed) => println!("  Active outages: {}", active_outage_count(&feed)),
        Err(err) => println!("  Active outages: n/a ({err})"),
    }

    coordinator.logout();
}

fn display(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "n/a".to_string(),
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn now_iso() -> String {
    format_timestamp(Utc::now())
}
