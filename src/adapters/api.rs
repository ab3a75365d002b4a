use std::sync::Arc;

use actix_web::{HttpResponse, Responder, delete, get, post, web};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use crate::app::config_flow::{
    ABORT_REAUTH_SUCCESSFUL, ConfigFlow, CredentialCheck, FlowOutcome, STEP_REAUTH, STEP_USER,
};
use crate::app::runtime::{EntryRegistry, EntryStatus, LoadState, RegistryError};
use crate::app::services::{
    EntryCommandHandler, EntryQueryHandler, ServiceError, SqliteEntryService,
};
use crate::domain::config_flow::{FlowErrorCode, FlowInput};
use crate::domain::entities::{EntityOwner, binary_sensor_states, sensor_states};
use crate::domain::models::ConfigEntry;
use crate::domain::outage::active_outage_count;

#[derive(Clone)]
pub struct ApiState {
    pub entries: SqliteEntryService,
    pub registry: Arc<EntryRegistry>,
    pub credential_check: Arc<dyn CredentialCheck>,
}

/// Config entry as exposed over HTTP. The password never leaves the store.
#[derive(Debug, Serialize, PartialEq)]
pub struct EntryResponse {
    pub entry_id: String,
    pub unique_id: String,
    pub title: String,
    pub username: String,
    pub timeout: u32,
    pub state: LoadState,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub last_updated: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl EntryResponse {
    fn new(entry: ConfigEntry, status: Option<EntryStatus>) -> Self {
        let (state, last_update_success, last_error, last_updated) = match status {
            Some(status) => (
                status.state,
                status.coordinator.last_update_success,
                status.coordinator.last_error,
                status.coordinator.last_updated,
            ),
            None => (LoadState::NotLoaded, false, None, None),
        };

        Self {
            entry_id: entry.entry_id,
            unique_id: entry.unique_id,
            title: entry.title,
            username: entry.username,
            timeout: entry.timeout_secs,
            state,
            last_update_success,
            last_error,
            last_updated,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_entries_endpoint)
        .service(create_entry_endpoint)
        .service(reauth_entry_endpoint)
        .service(delete_entry_endpoint)
        .service(list_sensors_endpoint)
        .service(list_binary_sensors_endpoint)
        .service(refresh_entry_endpoint)
        .service(get_profile_endpoint)
        .service(get_outages_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[get("/config/entries")]
async fn list_entries_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let entries = match state.entries.list_entries() {
        Ok(entries) => entries,
        Err(error) => return service_error_response(error),
    };

    let mut mapped = Vec::with_capacity(entries.len());
    for entry in entries {
        let status = match state.registry.status(&entry.entry_id) {
            Ok(status) => status,
            Err(error) => return registry_error_response(error),
        };
        mapped.push(EntryResponse::new(entry, status));
    }

    HttpResponse::Ok().json(mapped)
}

#[post("/config/entries")]
async fn create_entry_endpoint(
    state: web::Data<ApiState>,
    body: web::Json<Value>,
) -> impl Responder {
    let input = match parse_flow_input(body.into_inner(), STEP_USER) {
        Ok(input) => input,
        Err(response) => return response,
    };

    let worker_state = state.clone();
    let result = web::block(move || {
        let flow = ConfigFlow::new(
            &worker_state.entries,
            worker_state.credential_check.as_ref(),
        );
        let outcome = flow.user_step(&input, Utc::now())?;
        if let FlowOutcome::CreateEntry(entry) = &outcome
            && let Err(error) = worker_state.registry.setup(entry)
        {
            tracing::error!(
                entry_id = %entry.entry_id,
                error = %error,
                "failed to set up entry"
            );
        }
        Ok::<_, ServiceError>(outcome)
    })
    .await;

    match result {
        Ok(Ok(outcome)) => flow_response(&state, outcome),
        Ok(Err(error)) => service_error_response(error),
        Err(_) => blocking_error_response(),
    }
}

#[post("/config/entries/{entry_id}/reauth")]
async fn reauth_entry_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> impl Responder {
    let entry = match find_entry(&state, &path) {
        Ok(entry) => entry,
        Err(response) => return response,
    };
    let input = match parse_flow_input(body.into_inner(), STEP_REAUTH) {
        Ok(input) => input,
        Err(response) => return response,
    };

    let worker_state = state.clone();
    let result = web::block(move || {
        let flow = ConfigFlow::new(
            &worker_state.entries,
            worker_state.credential_check.as_ref(),
        );
        let outcome = flow.reauth_step(&entry, &input, Utc::now())?;
        if let FlowOutcome::Reauthenticated(updated) = &outcome
            && let Err(error) = worker_state.registry.setup(updated)
        {
            tracing::error!(
                entry_id = %updated.entry_id,
                error = %error,
                "failed to restart entry"
            );
        }
        Ok::<_, ServiceError>(outcome)
    })
    .await;

    match result {
        Ok(Ok(outcome)) => flow_response(&state, outcome),
        Ok(Err(error)) => service_error_response(error),
        Err(_) => blocking_error_response(),
    }
}

#[delete("/config/entries/{entry_id}")]
async fn delete_entry_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    let worker_state = state.clone();
    let result = web::block(move || {
        if let Err(error) = worker_state.registry.unload(&entry_id) {
            tracing::error!(entry_id = %entry_id, error = %error, "failed to unload entry");
        }
        worker_state.entries.delete_entry(&entry_id)
    })
    .await;

    match result {
        Ok(Ok(true)) => HttpResponse::NoContent().finish(),
        Ok(Ok(false)) => entry_not_found_response(),
        Ok(Err(error)) => service_error_response(error),
        Err(_) => blocking_error_response(),
    }
}

#[get("/entries/{entry_id}/sensors")]
async fn list_sensors_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let (entry, status) = match entry_with_status(&state, &path) {
        Ok(value) => value,
        Err(response) => return response,
    };

    let available = status.as_ref().is_some_and(EntryStatus::available);
    let data = status.as_ref().and_then(|status| status.coordinator.data.as_ref());

    HttpResponse::Ok().json(sensor_states(owner(&entry), data, available))
}

#[get("/entries/{entry_id}/binary_sensors")]
async fn list_binary_sensors_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let (entry, status) = match entry_with_status(&state, &path) {
        Ok(value) => value,
        Err(response) => return response,
    };

    let available = status.as_ref().is_some_and(EntryStatus::available);
    let data = status.as_ref().and_then(|status| status.coordinator.data.as_ref());

    HttpResponse::Ok().json(binary_sensor_states(owner(&entry), data, available))
}

#[post("/entries/{entry_id}/refresh")]
async fn refresh_entry_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    let worker_state = state.clone();

    match web::block(move || worker_state.registry.refresh(&entry_id)).await {
        Ok(Ok(snapshot)) => HttpResponse::Ok().json(snapshot),
        Ok(Err(error)) => registry_error_response(error),
        Err(_) => blocking_error_response(),
    }
}

#[get("/entries/{entry_id}/profile")]
async fn get_profile_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    let worker_state = state.clone();
    let result = web::block(move || {
        let profile = worker_state.registry.profile(&entry_id)?;
        let application_details = worker_state.registry.application_details(&entry_id)?;
        Ok::<_, RegistryError>(json!({
            "profile": profile,
            "application_details": application_details,
        }))
    })
    .await;

    match result {
        Ok(Ok(body)) => HttpResponse::Ok().json(body),
        Ok(Err(error)) => registry_error_response(error),
        Err(_) => blocking_error_response(),
    }
}

#[get("/entries/{entry_id}/outages")]
async fn get_outages_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    let worker_state = state.clone();

    match web::block(move || worker_state.registry.outages(&entry_id)).await {
        Ok(Ok(feed)) => HttpResponse::Ok().json(json!({
            "active_outages": active_outage_count(&feed),
            "outages": feed.get("features").cloned().unwrap_or_else(|| json!([])),
        })),
        Ok(Err(error)) => registry_error_response(error),
        Err(_) => blocking_error_response(),
    }
}

fn owner(entry: &ConfigEntry) -> EntityOwner<'_> {
    EntityOwner {
        entry_id: &entry.entry_id,
        unique_id: &entry.unique_id,
    }
}

fn parse_flow_input(body: Value, step_id: &'static str) -> Result<FlowInput, HttpResponse> {
    serde_json::from_value(body).map_err(|error| {
        tracing::error!(error = %error, "schema validation failed");
        form_response(step_id, FlowErrorCode::InvalidInput.as_str())
    })
}

fn find_entry(state: &ApiState, entry_id: &str) -> Result<ConfigEntry, HttpResponse> {
    match state.entries.get_entry(entry_id) {
        Ok(Some(entry)) => Ok(entry),
        Ok(None) => Err(entry_not_found_response()),
        Err(error) => Err(service_error_response(error)),
    }
}

fn entry_with_status(
    state: &ApiState,
    entry_id: &str,
) -> Result<(ConfigEntry, Option<EntryStatus>), HttpResponse> {
    let entry = find_entry(state, entry_id)?;
    let status = state
        .registry
        .status(entry_id)
        .map_err(registry_error_response)?;
    Ok((entry, status))
}

fn flow_response(state: &ApiState, outcome: FlowOutcome) -> HttpResponse {
    match outcome {
        FlowOutcome::CreateEntry(entry) => {
            let status = state.registry.status(&entry.entry_id).ok().flatten();
            HttpResponse::Created().json(json!({
                "type": "create_entry",
                "title": entry.title.clone(),
                "entry": EntryResponse::new(entry, status),
            }))
        }
        FlowOutcome::Reauthenticated(_) => HttpResponse::Ok().json(json!({
            "type": "abort",
            "reason": ABORT_REAUTH_SUCCESSFUL,
        })),
        FlowOutcome::Abort { reason } => HttpResponse::Conflict().json(json!({
            "type": "abort",
            "reason": reason,
        })),
        FlowOutcome::ShowForm {
            step_id,
            base_error,
        } => form_response(step_id, &base_error),
    }
}

fn form_response(step_id: &'static str, base_error: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "type": "form",
        "step_id": step_id,
        "errors": { "base": base_error },
    }))
}

fn entry_not_found_response() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "config entry not found" }))
}

fn blocking_error_response() -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({ "error": "background task failed" }))
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => HttpResponse::InternalServerError().json(json!({
            "error": "database lock poisoned"
        })),
        ServiceError::Database(error) => HttpResponse::InternalServerError().json(json!({
            "error": format!("database query failed: {error}")
        })),
    }
}

fn registry_error_response(error: RegistryError) -> HttpResponse {
    match error {
        RegistryError::NotLoaded(_) => HttpResponse::Conflict().json(json!({
            "error": error.to_string()
        })),
        RegistryError::Update(error) => HttpResponse::BadGateway().json(json!({
            "error": error.to_string()
        })),
        RegistryError::NoReply(_) => HttpResponse::GatewayTimeout().json(json!({
            "error": error.to_string()
        })),
        RegistryError::LockPoisoned | RegistryError::Spawn(_) => {
            HttpResponse::InternalServerError().json(json!({
                "error": error.to_string()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use actix_web::{App, body::to_bytes, http::StatusCode, test, web};
    use serde_json::{Value, json};

    use crate::adapters::liander_http::LianderApi;
    use crate::app::config_flow::CredentialCheck;
    use crate::app::config_flow::tests::StaticCheck;
    use crate::app::coordinator::CoordinatorSnapshot;
    use crate::app::coordinator::tests::FakeApi;
    use crate::app::runtime::{ApiFactory, EntryRegistry, EntryStatus, LoadState};
    use crate::app::services::{EntryCommandHandler, SqliteEntryService};
    use crate::domain::config_flow::FlowErrorCode;
    use crate::domain::token::encode_test_jwt;
    use crate::test_support::{open_test_connection, sample_connections, sample_new_entry};

    use super::{ApiState, configure_routes};

    fn build_state(name: &str, check: StaticCheck) -> ApiState {
        build_state_with_api(name, check, FakeApi::default())
    }

    fn build_state_with_api(name: &str, check: StaticCheck, api: FakeApi) -> ApiState {
        let connection = open_test_connection(name);
        let factory: ApiFactory =
            Arc::new(move || Ok(Box::new(api.clone()) as Box<dyn LianderApi>));
        let credential_check: Arc<dyn CredentialCheck> = Arc::new(check);

        ApiState {
            entries: SqliteEntryService::new(Arc::new(Mutex::new(connection))),
            registry: Arc::new(EntryRegistry::with_api_factory(
                factory,
                Duration::from_secs(3600),
            )),
            credential_check,
        }
    }

    async fn read_json(resp: actix_web::dev::ServiceResponse) -> Value {
        let body = to_bytes(resp.into_body())
            .await
            .expect("body should be readable");
        serde_json::from_slice(&body).expect("body should be json")
    }

    #[actix_web::test]
    async fn health_endpoint_returns_ok() {
        let state = build_state("health.sqlite", StaticCheck::accepting());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn list_entries_is_empty_initially() {
        let state = build_state("entries-empty.sqlite", StaticCheck::accepting());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/config/entries").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(read_json(resp).await, json!([]));
    }

    #[actix_web::test]
    async fn create_entry_then_duplicate_aborts() {
        let state = build_state("entries-create.sqlite", StaticCheck::accepting());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;
        let form = json!({ "username": "user@example.nl", "password": "secret", "timeout": 10 });

        let req = test::TestRequest::post()
            .uri("/config/entries")
            .set_json(&form)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = read_json(resp).await;
        assert_eq!(json["type"], "create_entry");
        assert_eq!(json["title"], "user@example.nl");
        assert_eq!(json["entry"]["timeout"], 10);
        assert!(json["entry"].get("password").is_none());

        let req = test::TestRequest::post()
            .uri("/config/entries")
            .set_json(&form)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let json = read_json(resp).await;
        assert_eq!(json["type"], "abort");
        assert_eq!(json["reason"], "already_configured");

        let req = test::TestRequest::get().uri("/config/entries").to_request();
        let resp = test::call_service(&app, req).await;
        let json = read_json(resp).await;
        let items = json.as_array().expect("response should be an array");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["unique_id"], "user@example.nl");
    }

    #[actix_web::test]
    async fn create_entry_reports_schema_errors() {
        let state = build_state("entries-schema.sqlite", StaticCheck::accepting());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        for body in [
            json!({ "username": "user@example.nl" }),
            json!({ "username": 42, "password": "secret" }),
            json!({ "username": "user@example.nl", "password": "secret", "timeout": 0 }),
        ] {
            let req = test::TestRequest::post()
                .uri("/config/entries")
                .set_json(&body)
                .to_request();
            let resp = test::call_service(&app, req).await;

            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let json = read_json(resp).await;
            assert_eq!(json["type"], "form");
            assert_eq!(json["errors"]["base"], "invalid_input");
        }
    }

    #[actix_web::test]
    async fn create_entry_reports_rejected_credentials() {
        let state = build_state(
            "entries-rejected.sqlite",
            StaticCheck::rejecting(FlowErrorCode::InvalidAuth),
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/config/entries")
            .set_json(json!({ "username": "user@example.nl", "password": "wrong" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = read_json(resp).await;
        assert_eq!(json["step_id"], "user");
        assert_eq!(json["errors"]["base"], "Invalid username or password.");
    }

    fn wait_for_loaded(registry: &EntryRegistry, entry_id: &str) -> EntryStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = registry
                .status(entry_id)
                .expect("status should be readable");
            if let Some(status) = status.filter(|status| status.state == LoadState::Loaded) {
                return status;
            }
            assert!(Instant::now() < deadline, "entry {entry_id} was not loaded");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[actix_web::test]
    async fn reauth_reports_success() {
        let api = FakeApi::default();
        api.push_login(Ok(encode_test_jwt(&json!({ "exp": 4_102_444_800_i64 }))));
        api.push_connections(Ok(sample_connections()));
        let state = build_state_with_api(
            "entries-reauth.sqlite",
            StaticCheck::accepting(),
            api.clone(),
        );
        let registry = Arc::clone(&state.registry);
        let entry = state
            .entries
            .insert_entry(&sample_new_entry("user@example.nl"))
            .expect("insert should succeed");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/config/entries/{}/reauth", entry.entry_id))
            .set_json(json!({ "username": "user@example.nl", "password": "new-secret" }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let json = read_json(resp).await;
        assert_eq!(json["type"], "abort");
        assert_eq!(json["reason"], "reauth_successful");

        let status = wait_for_loaded(&registry, &entry.entry_id);
        assert!(status.available());
        assert_eq!(status.coordinator.data, Some(sample_connections()));
        assert_eq!(
            api.lock().login_credentials,
            vec![("user@example.nl".to_string(), "new-secret".to_string())]
        );
    }

    #[actix_web::test]
    async fn sensors_return_404_for_unknown_entry() {
        let state = build_state("sensors-missing.sqlite", StaticCheck::accepting());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/entries/missing/sensors")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn sensors_map_loaded_connection_data() {
        let state = build_state("sensors-loaded.sqlite", StaticCheck::accepting());
        let entry = state
            .entries
            .insert_entry(&sample_new_entry("user@example.nl"))
            .expect("insert should succeed");
        state.registry.insert_status(
            &entry.entry_id,
            EntryStatus {
                state: LoadState::Loaded,
                coordinator: CoordinatorSnapshot {
                    data: Some(sample_connections()),
                    last_update_success: true,
                    ..CoordinatorSnapshot::default()
                },
            },
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/entries/{}/sensors", entry.entry_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = read_json(resp).await;
        let sensors = json.as_array().expect("response should be an array");
        assert_eq!(sensors.len(), 10);
        assert_eq!(sensors[0]["unique_id"], "user@example.nl.address");
        assert_eq!(sensors[0]["state"], "Mijnstraat 1 1000 AAB AMSTERDAM");
        assert_eq!(sensors[0]["available"], true);
        assert_eq!(sensors[1]["state"], "123456789012345678");
    }

    #[actix_web::test]
    async fn binary_sensors_are_off_and_unavailable_without_data() {
        let state = build_state("binary-unloaded.sqlite", StaticCheck::accepting());
        let entry = state
            .entries
            .insert_entry(&sample_new_entry("user@example.nl"))
            .expect("insert should succeed");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/entries/{}/binary_sensors", entry.entry_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let json = read_json(resp).await;
        let sensors = json.as_array().expect("response should be an array");
        assert_eq!(sensors.len(), 6);
        assert!(sensors.iter().all(|sensor| sensor["is_on"] == false));
        assert!(sensors.iter().all(|sensor| sensor["available"] == false));
        assert_eq!(sensors[0]["attributes"]["attribution"], "Data provided by Liander");
    }

    #[actix_web::test]
    async fn refresh_of_unloaded_entry_conflicts() {
        let state = build_state("refresh-unloaded.sqlite", StaticCheck::accepting());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/entries/missing/refresh")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn delete_entry_removes_it() {
        let state = build_state("entries-delete.sqlite", StaticCheck::accepting());
        let entry = state
            .entries
            .insert_entry(&sample_new_entry("user@example.nl"))
            .expect("insert should succeed");
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;
        let uri = format!("/config/entries/{}", entry.entry_id);

        let req = test::TestRequest::delete().uri(&uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::delete().uri(&uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
