//! HTTP routers for the public API and the admin surface.

use axum::{
    Json,
    Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    engine::Engine,
    error::{Error, Result},
    lifecycle::ShutdownTrigger,
    pagination::ListingWindow,
    service::Service,
};

/// Routes for index, search, doc, list and delete.
pub fn api_router<E: Engine>(service: Service<E>) -> Router {
    Router::new()
        .route(
            "/api/index/{index}/{doc_id}",
            post(index_document::<E>).put(index_document::<E>),
        )
        .route("/api/index/{index}/", post(missing_id).put(missing_id))
        .route("/api/update/{index}/{doc_id}", put(index_document::<E>))
        .route("/api/update/{index}/", put(missing_id))
        .route("/api/search/{index}", post(search::<E>))
        .route("/api/doc/{index}/{doc_id}", get(get_document::<E>))
        .route("/api/doc/{index}/", get(missing_id))
        .route("/api/list/{index}", get(list::<E>))
        .route("/api/delete/{index}/{doc_id}", delete(delete_document::<E>))
        .route("/api/delete/{index}/", delete(missing_id))
        .with_state(service)
}

/// The admin surface: a single delayed-shutdown endpoint.
pub fn admin_router(trigger: ShutdownTrigger) -> Router {
    Router::new()
        .route("/admin/shutdown", get(shutdown))
        .with_state(trigger)
}

#[derive(Debug, Deserialize)]
struct DocParams {
    callback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    start: Option<String>,
    limit: Option<String>,
    callback: Option<String>,
}

async fn index_document<E: Engine>(
    State(service): State<Service<E>>,
    Path((index, doc_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>> {
    blocking(move || service.index_document(&index, &doc_id, &body)).await?;
    Ok(ok())
}

async fn search<E: Engine>(
    State(service): State<Service<E>>,
    Path(index): Path<String>,
    body: Bytes,
) -> Result<Json<Value>> {
    let ids = blocking(move || service.search(&index, &body)).await?;
    Ok(Json(json!({ "status": ids })))
}

async fn get_document<E: Engine>(
    State(service): State<Service<E>>,
    Path((index, doc_id)): Path<(String, String)>,
    Query(params): Query<DocParams>,
) -> Result<Response> {
    let callback = Callback::parse(params.callback)?;
    let doc =
        blocking(move || service.get_document(&index, &doc_id)).await?;
    Ok(callback.wrap(json!({ "status": "ok", "doc": doc })))
}

async fn list<E: Engine>(
    State(service): State<Service<E>>,
    Path(index): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let callback = Callback::parse(params.callback)?;
    let window = ListingWindow::from_params(
        params.start.as_deref(),
        params.limit.as_deref(),
    );
    let docs = blocking(move || service.list(&index, window)).await?;
    let count = docs.len();
    Ok(callback.wrap(json!({ "status": "ok", "docs": docs, "count": count })))
}

async fn delete_document<E: Engine>(
    State(service): State<Service<E>>,
    Path((index, doc_id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    blocking(move || service.delete(&index, &doc_id)).await?;
    Ok(ok())
}

async fn missing_id() -> Error {
    Error::MissingId
}

async fn shutdown(State(trigger): State<ShutdownTrigger>) -> Json<Value> {
    let grace = trigger.schedule();
    Json(json!({
        "status": format!("shutdown after {}s.", grace.as_secs()),
    }))
}

fn ok() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run an engine-bound operation off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Optional JSONP wrapping requested through `?callback=`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Callback(Option<String>);

impl Callback {
    /// An empty callback means plain JSON. Anything that is not a dotted
    /// JavaScript identifier path is refused, since it is echoed verbatim
    /// into a script response.
    fn parse(raw: Option<String>) -> Result<Self> {
        match raw {
            None => Ok(Self(None)),
            Some(name) if name.is_empty() => Ok(Self(None)),
            Some(name) if is_identifier_path(&name) => Ok(Self(Some(name))),
            Some(name) => Err(Error::InvalidCallback(name)),
        }
    }

    fn wrap(&self, body: Value) -> Response {
        match &self.0 {
            None => Json(body).into_response(),
            Some(name) => (
                [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
                format!("{name}({body});"),
            )
                .into_response(),
        }
    }
}

fn is_identifier_path(name: &str) -> bool {
    name.split('.').all(|part| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_names_are_identifier_paths() {
        assert_eq!(Callback::parse(None).unwrap(), Callback(None));
        assert_eq!(Callback::parse(Some(String::new())).unwrap(), Callback(None));
        for good in ["cb", "jQuery123_456", "$.handlers.onDoc", "_x"] {
            assert!(Callback::parse(Some(good.to_string())).is_ok(), "{good}");
        }
        for bad in ["alert(1)", "a..b", "1abc", "cb;", "a b", "."] {
            assert!(
                matches!(
                    Callback::parse(Some(bad.to_string())),
                    Err(Error::InvalidCallback(_))
                ),
                "{bad}"
            );
        }
    }
}
