//! Root route: service banner, useful for smoke checks.

use axum::{http::StatusCode, response::IntoResponse};

pub async fn root() -> impl IntoResponse {
    (StatusCode::OK, crate::APP_USER_AGENT)
}

#[cfg(test)]
mod tests {
    use super::root;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn root_returns_banner() {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
