use axum::response::Html;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Handler for `GET /`: the single-page client
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
