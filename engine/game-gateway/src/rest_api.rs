//! REST API endpoints for the GameGateway
//!
//! Provider callbacks (`get-user-balance`, `change-balance`) authenticate with
//! the UID/token pair in the body. Operator endpoints (`game-auth`,
//! `launch-game`) require the configured `x-api-key` header.

use crate::error::GatewayError;
use crate::messages::{
    BalanceRequest, ChangeBalanceRequest, GameAuthData, GameAuthRequest, LaunchGameRequest,
    LaunchResponse, OperatorResponse, ProviderResponse,
};
use crate::provider::BuffaloService;
use crate::token::constant_time_eq;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

/// Largest request body accepted
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Header carrying the operator key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Parse a JSON body, keeping the raw value for auditing
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<(T, serde_json::Value), GatewayError> {
    let raw: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed JSON: {}", e)))?;
    let request = serde_json::from_value(raw.clone())
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    Ok((request, raw))
}

fn invalid_request(err: &GatewayError) -> warp::reply::Json {
    tracing::warn!("{}", err);
    warp::reply::json(&ProviderResponse::failure(err.public_message()))
}

/// Provider balance query
pub async fn get_user_balance(
    body: Bytes,
    service: Arc<BuffaloService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let request: BalanceRequest = match parse_body(&body) {
        Ok((request, _)) => request,
        Err(e) => return Ok(invalid_request(&e)),
    };
    Ok(warp::reply::json(&service.balance_query(&request).await))
}

/// Provider balance change
pub async fn change_balance(
    body: Bytes,
    service: Arc<BuffaloService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (request, payload): (ChangeBalanceRequest, _) = match parse_body(&body) {
        Ok(parsed) => parsed,
        Err(e) => return Ok(invalid_request(&e)),
    };
    Ok(warp::reply::json(&service.balance_change(&request, payload).await))
}

fn operator_authorized(service: &BuffaloService, api_key: Option<&str>) -> bool {
    let expected = service.config().auth.operator_api_key.as_bytes();
    api_key.map(|key| constant_time_eq(key.as_bytes(), expected)).unwrap_or(false)
}

fn unauthorized() -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&OperatorResponse::<()>::failure("Unauthorized")),
        StatusCode::UNAUTHORIZED,
    )
}

/// Operator request for provider credentials
pub async fn game_auth(
    api_key: Option<String>,
    body: Bytes,
    service: Arc<BuffaloService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if !operator_authorized(&service, api_key.as_deref()) {
        tracing::warn!("Rejected game-auth call with missing or wrong API key");
        return Ok(unauthorized());
    }

    let request: GameAuthRequest = match parse_body(&body) {
        Ok((request, _)) => request,
        Err(e) => {
            tracing::warn!("{}", e);
            return Ok(warp::reply::with_status(
                warp::reply::json(&OperatorResponse::<()>::failure(e.public_message())),
                StatusCode::OK,
            ));
        }
    };

    let reply = match service.game_auth(&request.user_name).await {
        Ok(data) => warp::reply::json(&OperatorResponse::<GameAuthData>::ok(
            "Game authentication data generated",
            data,
        )),
        Err(e) => {
            tracing::warn!("Game auth failed for {}: {}", request.user_name, e);
            warp::reply::json(&OperatorResponse::<()>::failure(e.public_message()))
        }
    };
    Ok(warp::reply::with_status(reply, StatusCode::OK))
}

/// Operator request for a launch URL
pub async fn launch_game(
    api_key: Option<String>,
    body: Bytes,
    service: Arc<BuffaloService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if !operator_authorized(&service, api_key.as_deref()) {
        tracing::warn!("Rejected launch-game call with missing or wrong API key");
        return Ok(unauthorized());
    }

    let request: LaunchGameRequest = match parse_body(&body) {
        Ok((request, _)) => request,
        Err(e) => {
            tracing::warn!("{}", e);
            return Ok(warp::reply::with_status(
                warp::reply::json(&OperatorResponse::<()>::failure(e.public_message())),
                StatusCode::OK,
            ));
        }
    };

    let reply = match service
        .launch(&request.user_name, request.room_id, request.lobby_url.as_deref())
        .await
    {
        Ok(launch) => warp::reply::json(&LaunchResponse {
            code: 1,
            msg: "Game launched successfully".to_string(),
            launch,
        }),
        Err(e) => {
            tracing::warn!("Launch failed for {}: {}", request.user_name, e);
            warp::reply::json(&OperatorResponse::<()>::failure(e.public_message()))
        }
    };
    Ok(warp::reply::with_status(reply, StatusCode::OK))
}

/// Create all REST API routes
pub fn create_routes(
    service: Arc<BuffaloService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let service_filter = warp::any().map(move || service.clone());
    let body = warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::bytes());

    // Provider callbacks
    let get_balance = warp::path!("api" / "buffalo" / "get-user-balance")
        .and(warp::post())
        .and(body.clone())
        .and(service_filter.clone())
        .and_then(get_user_balance);

    let change = warp::path!("api" / "buffalo" / "change-balance")
        .and(warp::post())
        .and(body.clone())
        .and(service_filter.clone())
        .and_then(change_balance);

    // Operator endpoints
    let auth = warp::path!("api" / "buffalo" / "game-auth")
        .and(warp::post())
        .and(warp::header::optional::<String>(API_KEY_HEADER))
        .and(body.clone())
        .and(service_filter.clone())
        .and_then(game_auth);

    let launch = warp::path!("api" / "buffalo" / "launch-game")
        .and(warp::post())
        .and(warp::header::optional::<String>(API_KEY_HEADER))
        .and(body)
        .and(service_filter)
        .and_then(launch_game);

    // Health check endpoint
    let health = warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    });

    get_balance.or(change).or(auth).or(launch).or(health).with(
        warp::cors()
            .allow_any_origin()
            .allow_headers(vec!["content-type", API_KEY_HEADER])
            .allow_methods(vec!["GET", "POST", "OPTIONS"]),
    )
}
