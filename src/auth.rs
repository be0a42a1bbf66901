use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{errors::AppError, AppState};

/// Guards snapshot routes, which can expose connection settings in verbose mode.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = auth_header.as_ref().map(|TypedHeader(auth)| auth.token());
    authorize(&state.api_token, presented)?;
    Ok(next.run(request).await)
}

fn authorize(expected: &str, presented: Option<&str>) -> Result<(), AppError> {
    match presented {
        None => Err(AppError::unauthorized(
            "missing_token",
            "missing authorization header",
        )),
        Some(token) if !tokens_match(expected.as_bytes(), token.as_bytes()) => Err(
            AppError::unauthorized("invalid_token", "invalid bearer token"),
        ),
        Some(_) => Ok(()),
    }
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(expected: &[u8], presented: &[u8]) -> bool {
    if expected.len() != presented.len() {
        return false;
    }
    expected
        .iter()
        .zip(presented)
        .fold(0u8, |diff, (left, right)| diff | (left ^ right))
        == 0
}
