use axum::{http::StatusCode, response::Html, Json};
use serde_json::Value;

const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Latest</title></head>
  <body><h1>Latest topics</h1></body>
</html>
"#;

/// Navigational HTML page; counts as a page view
pub async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

/// Long-poll transport endpoint. Always answers with an empty batch.
pub async fn message_bus_poll() -> Json<Vec<Value>> {
    Json(Vec::new())
}

/// Read-timing beacon; accepted and discarded
pub async fn timings_beacon() -> StatusCode {
    StatusCode::OK
}
