// Split Ledger - API Server
// REST API with Axum over the same SQLite ledger the CLI and TUI use.

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, put},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use split_ledger::{
    insert_event, ledger_summary, load_ledger, logging, open_database, parse_amount, save_ledger,
    Balances, Config, Event, Expense, ExpenseDraft, ExpenseId, Ledger, LedgerError,
    ParticipantSelection, Settlement,
};

const ACTOR: &str = "api";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidAmount(_)
            | LedgerError::EmptyParticipantSet
            | LedgerError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            LedgerError::UnknownParticipant(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::ReferentialIntegrity { .. } => StatusCode::CONFLICT,
            LedgerError::InvalidSnapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(ApiResponse::err(self.message))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run `f` against the current ledger while holding the database lock.
fn with_ledger<T>(
    state: &AppState,
    f: impl FnOnce(&Connection, &mut Ledger) -> ApiResult<T>,
) -> ApiResult<T> {
    let conn = state
        .db
        .lock()
        .map_err(|_| ApiError::internal("database lock poisoned"))?;
    let mut ledger = load_ledger(&conn, &state.config.currency)?;
    f(&conn, &mut ledger)
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Serialize, Deserialize)]
struct ParticipantView {
    name: String,
    expense_count: usize,
    default_payer: bool,
}

#[derive(Deserialize)]
struct NameRequest {
    name: String,
}

#[derive(Serialize)]
struct AddParticipantResponse {
    name: String,
    added: bool,
}

/// Amount may be a JSON number or a string; a missing participant list
/// splits between everyone.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewExpense {
    amount: serde_json::Value,
    #[serde(default, alias = "paidBy")]
    payer: Option<String>,
    #[serde(default)]
    participants: Option<Vec<String>>,
    #[serde(default)]
    description: Option<String>,
}

impl NewExpense {
    fn into_draft(self) -> ApiResult<ExpenseDraft> {
        let raw = match &self.amount {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(LedgerError::invalid_amount(format!("not a number: {}", other)).into())
            }
        };

        Ok(ExpenseDraft {
            amount: parse_amount(&raw)?,
            payer: self.payer.filter(|p| !p.trim().is_empty()),
            participants: match self.participants {
                Some(names) => ParticipantSelection::Named(names),
                None => ParticipantSelection::All,
            },
            description: self.description.filter(|d| !d.trim().is_empty()),
        })
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/participants
async fn list_participants(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    with_ledger(&state, |_, ledger| {
        let people: Vec<ParticipantView> = ledger
            .participants()
            .iter()
            .map(|name| ParticipantView {
                name: name.clone(),
                expense_count: ledger.reference_count(name),
                default_payer: ledger.default_payer() == Some(name.as_str()),
            })
            .collect();
        Ok(Json(ApiResponse::ok(people)))
    })
}

/// POST /api/participants - Duplicate or blank names are a no-op
async fn add_participant(
    State(state): State<AppState>,
    Json(body): Json<NameRequest>,
) -> ApiResult<impl IntoResponse> {
    with_ledger(&state, |conn, ledger| {
        let name = body.name.trim().to_string();
        let added = ledger.add_participant(&name);
        if added {
            save_ledger(conn, ledger)?;
            insert_event(conn, &Event::participant_added(&name, ACTOR))?;
        }
        let status = if added { StatusCode::CREATED } else { StatusCode::OK };
        Ok((status, Json(ApiResponse::ok(AddParticipantResponse { name, added }))))
    })
}

/// DELETE /api/participants/:name
async fn remove_participant(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    with_ledger(&state, |conn, ledger| {
        if !ledger.remove_participant(&name)? {
            return Err(ApiError::not_found(format!("unknown participant: {}", name)));
        }
        save_ledger(conn, ledger)?;
        insert_event(conn, &Event::participant_removed(&name, ACTOR))?;
        Ok(Json(ApiResponse::ok(name.clone())))
    })
}

/// PUT /api/payer
async fn set_payer(
    State(state): State<AppState>,
    Json(body): Json<NameRequest>,
) -> ApiResult<impl IntoResponse> {
    with_ledger(&state, |conn, ledger| {
        ledger.set_default_payer(&body.name)?;
        save_ledger(conn, ledger)?;
        Ok(Json(ApiResponse::ok(body.name.clone())))
    })
}

/// GET /api/expenses
async fn list_expenses(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    with_ledger(&state, |_, ledger| {
        Ok(Json(ApiResponse::ok(ledger.expenses().to_vec())))
    })
}

/// POST /api/expenses
async fn add_expense(
    State(state): State<AppState>,
    Json(body): Json<NewExpense>,
) -> ApiResult<impl IntoResponse> {
    let draft = body.into_draft()?;

    with_ledger(&state, |conn, ledger| {
        let id = draft.apply(ledger)?;
        save_ledger(conn, ledger)?;
        let expense: Expense = ledger
            .expense(id)
            .cloned()
            .ok_or_else(|| ApiError::internal("recorded expense is missing"))?;
        insert_event(conn, &Event::expense_added(&expense, ACTOR))?;
        Ok((StatusCode::CREATED, Json(ApiResponse::ok(expense))))
    })
}

/// DELETE /api/expenses/:id - Unknown ids are a no-op (`data: null`)
async fn remove_expense(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: ExpenseId = id.parse()?;

    with_ledger(&state, |conn, ledger| {
        let removed = ledger.remove_expense(id);
        if let Some(expense) = &removed {
            save_ledger(conn, ledger)?;
            insert_event(conn, &Event::expense_removed(expense, ACTOR))?;
        }
        Ok(Json(ApiResponse {
            success: true,
            data: removed,
            error: None,
        }))
    })
}

/// GET /api/balances
async fn get_balances(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let engine = state.config.engine();
    with_ledger(&state, |_, ledger| {
        let balances: Balances = engine.balances(ledger.participants(), ledger.expenses());
        Ok(Json(ApiResponse::ok(balances)))
    })
}

/// GET /api/settlements
async fn get_settlements(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let engine = state.config.engine();
    with_ledger(&state, |_, ledger| {
        let balances = engine.balances(ledger.participants(), ledger.expenses());
        let settlements: Vec<Settlement> = engine.settle(&balances);
        Ok(Json(ApiResponse::ok(settlements)))
    })
}

/// GET /api/summary - Plain-text summary inside the envelope
async fn get_summary(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let engine = state.config.engine();
    with_ledger(&state, |_, ledger| {
        Ok(Json(ApiResponse::ok(ledger_summary(ledger, &engine))))
    })
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/participants", get(list_participants).post(add_participant))
        .route("/participants/:name", delete(remove_participant))
        .route("/payer", put(set_payer))
        .route("/expenses", get(list_expenses).post(add_expense))
        .route("/expenses/:id", delete(remove_expense))
        .route("/balances", get(get_balances))
        .route("/settlements", get(get_settlements))
        .route("/summary", get(get_summary))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info");

    let config = Config::from_env()?;
    let conn = open_database(&config.db_path)?;
    info!(db = %config.db_path.display(), "database opened");

    let addr = config.server_addr;
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("🚀 Split Ledger API running on http://{}", addr);
    println!("   Press Ctrl+C to stop");

    axum::serve(listener, build_router(state))
        .await
        .context("Server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        split_ledger::setup_database(&conn).unwrap();
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(Config::default()),
        }
    }

    async fn call(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(json) => request.body(Body::from(json.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn add_people(state: &AppState, names: &[&str]) {
        for name in names {
            let (status, _) = call(state, "POST", "/api/participants", Some(json!({ "name": name }))).await;
            assert_eq!(status, StatusCode::CREATED);
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&test_state(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_expense_flow_and_settlements() {
        let state = test_state();
        add_people(&state, &["A", "B", "C"]).await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/expenses",
            Some(json!({ "amount": 90, "paidBy": "A", "participants": ["A", "B", "C"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["splitAmount"], "30");

        let (_, body) = call(&state, "GET", "/api/balances", None).await;
        assert_eq!(body["data"][0]["participant"], "A");
        assert_eq!(body["data"][0]["amount"], "60");

        let (_, body) = call(&state, "GET", "/api/settlements", None).await;
        let plan = body["data"].as_array().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0]["from"], "B");
        assert_eq!(plan[0]["to"], "A");
        assert_eq!(plan[1]["from"], "C");

        let (_, body) = call(&state, "GET", "/api/summary", None).await;
        assert!(body["data"].as_str().unwrap().contains("B pays A ₹30.00"));
        println!("✅ API expense flow test PASSED");
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let state = test_state();
        add_people(&state, &["A", "B"]).await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/expenses",
            Some(json!({ "amount": "-5", "payer": "A" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = call(
            &state,
            "POST",
            "/api/expenses",
            Some(json!({ "amount": 10, "payer": "A", "participants": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &state,
            "POST",
            "/api/expenses",
            Some(json!({ "amount": 10, "payer": "Zed" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&state, "PUT", "/api/payer", Some(json!({ "name": "Zed" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&state, "DELETE", "/api/expenses/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        println!("✅ API error mapping test PASSED");
    }

    #[tokio::test]
    async fn test_referential_integrity_conflict() {
        let state = test_state();
        add_people(&state, &["A", "B", "C"]).await;
        call(
            &state,
            "POST",
            "/api/expenses",
            Some(json!({ "amount": "10", "payer": "A", "participants": ["A", "B"] })),
        )
        .await;

        let (status, body) = call(&state, "DELETE", "/api/participants/B", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("cannot remove B"));

        let (status, _) = call(&state, "DELETE", "/api/participants/C", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&state, "DELETE", "/api/participants/C", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&state, "GET", "/api/participants", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_selected_payer_applies_to_later_requests() {
        let state = test_state();
        add_people(&state, &["A", "B"]).await;

        let (status, _) = call(&state, "PUT", "/api/payer", Some(json!({ "name": "B" }))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&state, "POST", "/api/expenses", Some(json!({ "amount": 10 }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["payer"], "B");

        let (_, body) = call(&state, "GET", "/api/participants", None).await;
        assert_eq!(body["data"][1]["name"], "B");
        assert_eq!(body["data"][1]["default_payer"], true);
        println!("✅ API default payer test PASSED");
    }

    #[tokio::test]
    async fn test_remove_expense() {
        let state = test_state();
        add_people(&state, &["A", "B"]).await;
        let (_, body) = call(
            &state,
            "POST",
            "/api/expenses",
            Some(json!({ "amount": 40, "payer": "A" })),
        )
        .await;
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&state, "DELETE", &format!("/api/expenses/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], id.as_str());

        // Removing it again is a no-op, not an error
        let (status, body) = call(&state, "DELETE", &format!("/api/expenses/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["data"].is_null());

        let (_, body) = call(&state, "GET", "/api/settlements", None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}
