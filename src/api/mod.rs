//! HTTP Boundary
//!
//! Thin endpoint surface over the engine and the canonical store. The
//! boundary owns the key and tag conventions (`item:{id}` keyed,
//! tagged `{"items", "item:{id}"}`) and maps engine errors to status
//! codes; the engine itself knows nothing about HTTP.
//!
//! Conditional reads: responses carry an ETag (the value fingerprint);
//! a request whose `If-None-Match` matches gets `304 Not Modified`
//! without the payload.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::cache::fingerprint::fingerprint_bytes;
use crate::cache::{CacheEngine, EntryOptions, RefreshLoader};
use crate::error::{Error, Result};
use crate::store::{Record, RecordStore};

/// Caching directive attached to read responses, enabling the caller's
/// own store as a third freshness layer
const CACHE_CONTROL: &str = "private, max-age=300";

/// Cache key for a record id
pub fn cache_key(id: &str) -> String {
    format!("item:{id}")
}

/// Tag set supplied with every write: the whole collection plus the
/// single-record tag
pub fn item_tags(id: &str) -> Vec<String> {
    vec!["items".to_string(), format!("item:{id}")]
}

/// Refresh-ahead loader reading back through the canonical store
pub fn record_loader(store: Arc<dyn RecordStore>) -> RefreshLoader {
    Arc::new(move |key: String| {
        let store = Arc::clone(&store);
        Box::pin(async move {
            let id = key.strip_prefix("item:").unwrap_or(&key).to_string();
            load_record_bytes(&*store, &id).await
        })
    })
}

async fn load_record_bytes(store: &dyn RecordStore, id: &str) -> Result<Option<Bytes>> {
    match store.get(id).await? {
        Some(record) => Ok(Some(Bytes::from(serde_json::to_vec(&record)?))),
        None => Ok(None),
    }
}

/// Shared state behind every handler
pub struct ApiState {
    engine: Arc<CacheEngine>,
    store: Arc<dyn RecordStore>,
}

impl ApiState {
    /// Bundle the engine and store for the handlers
    pub fn new(engine: Arc<CacheEngine>, store: Arc<dyn RecordStore>) -> Self {
        Self { engine, store }
    }
}

/// Accept loop in front of [`handle`]
pub async fn run_server(addr: &str, state: Arc<ApiState>) -> Result<()> {
    let addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("invalid listen address: {e}")))?;

    let listener = TcpListener::bind(addr).await?;
    info!("api server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, Arc::clone(&state)));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("api connection error: {}", e);
            }
        });
    }
}

/// Entry point per request: peel the routing inputs off, collect the
/// body, and dispatch
pub async fn handle(
    req: Request<Incoming>,
    state: Arc<ApiState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let if_none_match = req
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                &json!({ "error": format!("failed to read body: {e}") }),
            ))
        }
    };

    Ok(dispatch(&method, &path, if_none_match.as_deref(), body, &state).await)
}

/// Route a request; separated from [`handle`] so tests can drive it
/// without a live connection
pub async fn dispatch(
    method: &Method,
    path: &str,
    if_none_match: Option<&str>,
    body: Bytes,
    state: &ApiState,
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (method, segments.as_slice()) {
        (&Method::GET, ["healthz"]) => text_response(StatusCode::OK, "ok"),
        (&Method::GET, ["items", id]) => get_item(state, id, if_none_match).await,
        (&Method::PUT, ["items", id]) => put_item(state, id, body).await,
        (&Method::DELETE, ["items", "tag", tag]) => delete_by_tag(state, tag).await,
        (&Method::DELETE, ["items", id]) => delete_item(state, id).await,
        (&Method::POST, ["items", id, "refresh"]) => refresh_item(state, id).await,
        _ => json_response(StatusCode::NOT_FOUND, &json!({ "error": "no such route" })),
    }
}

/// Read path: local → shared → canonical store, plus a conditional-read
/// short circuit on the fingerprint
async fn get_item(state: &ApiState, id: &str, if_none_match: Option<&str>) -> Response<Full<Bytes>> {
    let key = cache_key(id);
    let store = Arc::clone(&state.store);
    let load_id = id.to_string();

    let result = state
        .engine
        .get_or_load(&key, item_tags(id), EntryOptions::default(), move || async move {
            load_record_bytes(&*store, &load_id).await
        })
        .await;

    match result {
        Ok((value, tier)) => {
            let etag = fingerprint_bytes(&value);
            if if_none_match == Some(etag.as_str()) {
                return Response::builder()
                    .status(StatusCode::NOT_MODIFIED)
                    .header(header::ETAG, etag)
                    .body(Full::new(Bytes::new()))
                    .unwrap();
            }
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ETAG, etag)
                .header(header::CACHE_CONTROL, CACHE_CONTROL)
                .header("x-cache-tier", tier.to_string())
                .body(Full::new(value))
                .unwrap()
        }
        Err(e) => error_response(&e),
    }
}

/// Write path: canonical store first, then write-through to both tiers
async fn put_item(state: &ApiState, id: &str, body: Bytes) -> Response<Full<Bytes>> {
    let mut record: Record = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({ "error": format!("invalid record payload: {e}") }),
            )
        }
    };
    // The path id wins over whatever the payload carried.
    record.id = id.to_string();

    let stored = match state.store.upsert(record).await {
        Ok(stored) => stored,
        Err(e) => return error_response(&e),
    };

    let bytes = match serde_json::to_vec(&stored) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => return error_response(&Error::Serialization(e)),
    };

    if let Err(e) = state
        .engine
        .put(&cache_key(id), bytes, item_tags(id), EntryOptions::default())
        .await
    {
        return error_response(&e);
    }

    json_response(StatusCode::OK, &json!({ "updated": id }))
}

async fn delete_item(state: &ApiState, id: &str) -> Response<Full<Bytes>> {
    match state.engine.evict(&cache_key(id)).await {
        Ok(()) => json_response(StatusCode::OK, &json!({ "removed": id })),
        Err(e) => error_response(&e),
    }
}

async fn delete_by_tag(state: &ApiState, tag: &str) -> Response<Full<Bytes>> {
    match state.engine.evict_by_tag(tag).await {
        Ok(swept) => json_response(
            StatusCode::OK,
            &json!({ "removedTag": tag, "sweptKeys": swept }),
        ),
        Err(Error::EvictionPartialFailure { tag, keys }) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({ "removedTag": tag, "failedKeys": keys }),
        ),
        Err(e) => error_response(&e),
    }
}

/// Explicit refresh: reload from the canonical store and write through,
/// bypassing normal miss handling
async fn refresh_item(state: &ApiState, id: &str) -> Response<Full<Bytes>> {
    let record = match state.store.get(id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return json_response(StatusCode::NOT_FOUND, &json!({ "error": "no such record" }))
        }
        Err(e) => return error_response(&e),
    };

    let bytes = match serde_json::to_vec(&record) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => return error_response(&Error::Serialization(e)),
    };

    match state
        .engine
        .put(&cache_key(id), bytes, item_tags(id), EntryOptions::default())
        .await
    {
        Ok(()) => json_response(StatusCode::OK, &json!({ "refreshed": id })),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &Error) -> Response<Full<Bytes>> {
    let status = match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::LoadError { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_response(status, &json!({ "error": err.to_string() }))
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(value.to_string())))
        .unwrap()
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EngineConfig, InMemorySharedTier};
    use crate::store::InMemoryRecordStore;

    fn state() -> (Arc<ApiState>, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let engine = Arc::new(CacheEngine::new(
            Arc::new(InMemorySharedTier::new()),
            EngineConfig::default(),
        ));
        (
            Arc::new(ApiState::new(engine, store.clone())),
            store,
        )
    }

    async fn get(state: &ApiState, path: &str, if_none_match: Option<&str>) -> Response<Full<Bytes>> {
        dispatch(&Method::GET, path, if_none_match, Bytes::new(), state).await
    }

    fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
        futures::executor::block_on(response.into_body().collect())
            .unwrap()
            .to_bytes()
    }

    fn header_str(response: &Response<Full<Bytes>>, name: header::HeaderName) -> Option<String> {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    #[tokio::test]
    async fn test_get_missing_item_is_404() {
        let (state, _) = state();
        let response = get(&state, "/items/9", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_loads_from_store_with_etag() {
        let (state, store) = state();
        store.upsert(Record::new("1", "Widget")).await.unwrap();

        let response = get(&state, "/items/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            header_str(&response, header::CACHE_CONTROL).unwrap(),
            CACHE_CONTROL
        );
        assert_eq!(header_str(&response, header::HeaderName::from_static("x-cache-tier")).unwrap(), "loaded");

        let etag = header_str(&response, header::ETAG).unwrap();
        assert_eq!(etag.len(), 64);

        let record: Record = serde_json::from_slice(&body_bytes(response)).unwrap();
        assert_eq!(record.name, "Widget");

        // Second read is a local hit.
        let response = get(&state, "/items/1", None).await;
        assert_eq!(header_str(&response, header::HeaderName::from_static("x-cache-tier")).unwrap(), "local");
    }

    #[tokio::test]
    async fn test_conditional_get_returns_304() {
        let (state, store) = state();
        store.upsert(Record::new("1", "Widget")).await.unwrap();

        let response = get(&state, "/items/1", None).await;
        let etag = header_str(&response, header::ETAG).unwrap();

        let response = get(&state, "/items/1", Some(&etag)).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(body_bytes(response).is_empty());

        // A stale fingerprint still gets the payload.
        let response = get(&state, "/items/1", Some("DEADBEEF")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_put_writes_store_and_cache() {
        let (state, store) = state();

        let payload = serde_json::to_vec(&Record::new("ignored", "Widget")).unwrap();
        let response = dispatch(
            &Method::PUT,
            "/items/1",
            None,
            Bytes::from(payload),
            &state,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // The path id won over the payload id.
        assert_eq!(store.get("1").await.unwrap().unwrap().name, "Widget");
        assert!(store.get("ignored").await.unwrap().is_none());

        // The cached copy serves without another store read.
        let reads_before = store.reads();
        let response = get(&state, "/items/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.reads(), reads_before);
    }

    #[tokio::test]
    async fn test_put_rejects_bad_payload() {
        let (state, _) = state();
        let response = dispatch(
            &Method::PUT,
            "/items/1",
            None,
            Bytes::from_static(b"not json"),
            &state,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_key_and_tag_routes() {
        let (state, store) = state();

        for id in ["1", "2"] {
            store.upsert(Record::new(id, "Widget")).await.unwrap();
            get(&state, &format!("/items/{id}"), None).await;
        }

        let response = dispatch(&Method::DELETE, "/items/1", None, Bytes::new(), &state).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = dispatch(&Method::DELETE, "/items/tag/items", None, Bytes::new(), &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response)).unwrap();
        assert_eq!(body["removedTag"], "items");
    }

    #[tokio::test]
    async fn test_refresh_endpoint() {
        let (state, store) = state();

        let response = dispatch(&Method::POST, "/items/1/refresh", None, Bytes::new(), &state).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        store.upsert(Record::new("1", "Widget")).await.unwrap();
        let response = dispatch(&Method::POST, "/items/1/refresh", None, Bytes::new(), &state).await;
        assert_eq!(response.status(), StatusCode::OK);

        // The refresh wrote through, so the read is a cache hit.
        let reads_before = store.reads();
        let response = get(&state, "/items/1", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.reads(), reads_before);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (state, _) = state();
        let response = get(&state, "/nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_route() {
        let (state, _) = state();
        let response = get(&state, "/healthz", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
