use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    AgentId, CustomerId, LoanId, LoanStatus, LoanSubmission, NewAgent, NewCustomer,
};
use super::error::LendingError;
use super::repository::{LendingRepository, Notifier};
use super::service::LoanService;

type SharedService<R, N> = Arc<LoanService<R, N>>;

/// Router builder exposing customer, loan, and agent endpoints.
pub fn underwriting_router<R, N>(service: SharedService<R, N>) -> Router
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/customers",
            post(create_customer_handler::<R, N>).get(list_customers_handler::<R, N>),
        )
        .route("/api/v1/customers/top", get(top_customers_handler::<R, N>))
        .route("/api/v1/customers/:id", get(customer_handler::<R, N>))
        .route(
            "/api/v1/loans",
            post(submit_loan_handler::<R, N>).get(list_loans_handler::<R, N>),
        )
        .route("/api/v1/loans/status-count", get(status_count_handler::<R, N>))
        .route("/api/v1/loans/dead-letters", get(dead_letters_handler::<R, N>))
        .route("/api/v1/loans/:id", get(loan_handler::<R, N>))
        .route(
            "/api/v1/agents",
            post(create_agent_handler::<R, N>).get(list_agents_handler::<R, N>),
        )
        .route(
            "/api/v1/agents/:agent_id/loans/:loan_id/decision",
            put(decision_handler::<R, N>),
        )
        .with_state(service)
}

/// Query string accepted by the loan listing.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListLoansQuery {
    pub status: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    pub decision: String,
}

pub(crate) fn status_code(err: &LendingError) -> StatusCode {
    match err {
        LendingError::Validation(_) | LendingError::InvalidDecision(_) => StatusCode::BAD_REQUEST,
        LendingError::NotFound(_) => StatusCode::NOT_FOUND,
        LendingError::StateConflict { .. } => StatusCode::CONFLICT,
        LendingError::NotAssigned { .. } => StatusCode::FORBIDDEN,
        LendingError::NoAgentAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        LendingError::DataIntegrity(_) | LendingError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn error_response(err: LendingError) -> Response {
    let status = status_code(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    let payload = json!({
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}

pub(crate) async fn create_customer_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Json(customer): Json<NewCustomer>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.create_customer(customer) {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_customers_handler<R, N>(
    State(service): State<SharedService<R, N>>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.list_customers() {
        Ok(customers) => (StatusCode::OK, Json(json!({ "customers": customers }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn top_customers_handler<R, N>(
    State(service): State<SharedService<R, N>>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.top_customers() {
        Ok(top) => (StatusCode::OK, Json(json!({ "top_customers": top }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn customer_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(customer_id): Path<u64>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.get_customer(CustomerId(customer_id)) {
        Ok(customer) => (StatusCode::OK, Json(customer)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_loan_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Json(submission): Json<LoanSubmission>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.submit_loan(submission) {
        Ok(loan) => (StatusCode::CREATED, Json(loan)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_loans_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Query(query): Query<ListLoansQuery>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match LoanStatus::from_label(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(LendingError::Validation(format!(
                    "unknown loan status '{raw}'"
                )))
            }
        },
    };

    match service.list_loans(status, query.page.unwrap_or(1), query.size) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_count_handler<R, N>(
    State(service): State<SharedService<R, N>>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.status_counts() {
        Ok(counts) => {
            let by_label: BTreeMap<&'static str, usize> = counts
                .into_iter()
                .map(|(status, count)| (status.label(), count))
                .collect();
            (StatusCode::OK, Json(by_label)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn dead_letters_handler<R, N>(
    State(service): State<SharedService<R, N>>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.dead_letters() {
        Ok(entries) => (StatusCode::OK, Json(json!({ "dead_letters": entries }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn loan_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(loan_id): Path<u64>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.get_loan(LoanId(loan_id)) {
        Ok(loan) => (StatusCode::OK, Json(loan)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_agent_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Json(agent): Json<NewAgent>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.create_agent(agent) {
        Ok(created) => {
            let payload = json!({
                "message": "Agent created successfully",
                "agent": created,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_agents_handler<R, N>(
    State(service): State<SharedService<R, N>>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.list_agents() {
        Ok(agents) => (StatusCode::OK, Json(json!({ "agents": agents }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn decision_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path((agent_id, loan_id)): Path<(u64, u64)>,
    Json(request): Json<DecisionRequest>,
) -> Response
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    match service.apply_decision(AgentId(agent_id), LoanId(loan_id), &request.decision) {
        Ok(loan) => {
            let payload = json!({
                "message": "Decision recorded successfully",
                "loan": loan,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}
