use axum::response::IntoResponse;

/// Undocumented root, handy as a liveness probe behind load balancers.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
