//! Read-only JSON endpoint over the snapshot store.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use holdwatch_core::display::{format_date, format_percent, format_shares, format_usd};
use holdwatch_core::HoldingRecord;
use holdwatch_store::{HoldingsQuery, SnapshotRepository, StoreError};
use hyper::header::CONTENT_TYPE;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const DEFAULT_LIMIT: usize = 1_000;

#[derive(Debug, Default, Deserialize)]
struct HoldingsParams {
    fund: Option<String>,
    as_of: Option<NaiveDate>,
    ticker: Option<String>,
    cusip: Option<String>,
    limit: Option<usize>,
}

impl HoldingsParams {
    fn into_query(self) -> HoldingsQuery {
        let mut query = HoldingsQuery::default().with_limit(self.limit.unwrap_or(DEFAULT_LIMIT));
        if let Some(fund) = self.fund.filter(|v| !v.trim().is_empty()) {
            query = query.with_fund(fund.trim());
        }
        if let Some(as_of) = self.as_of {
            query = query.with_as_of(as_of);
        }
        if let Some(ticker) = self.ticker.filter(|v| !v.trim().is_empty()) {
            query = query.with_ticker(ticker.trim());
        }
        if let Some(cusip) = self.cusip.filter(|v| !v.trim().is_empty()) {
            query = query.with_cusip(cusip.trim());
        }
        query
    }
}

#[derive(Debug, Default, Deserialize)]
struct SnapshotsParams {
    fund: Option<String>,
}

/// Human-readable rendering next to the stored values; missing values render as `-`.
#[derive(Debug, Serialize)]
struct DisplayFields {
    as_of_date: String,
    shares: String,
    weight: String,
    market_value: String,
}

#[derive(Debug, Serialize)]
struct HoldingView {
    #[serde(flatten)]
    record: HoldingRecord,
    display: DisplayFields,
}

impl From<HoldingRecord> for HoldingView {
    fn from(record: HoldingRecord) -> Self {
        let display = DisplayFields {
            as_of_date: format_date(Some(record.as_of_date)),
            shares: format_shares(record.shares),
            weight: format_percent(record.weight_pct, 2),
            market_value: format_usd(record.market_value_usd),
        };
        Self { record, display }
    }
}

/// Serves `/health`, `/holdings` and `/snapshots` until `shutdown` resolves.
pub async fn run_server<F>(
    addr: SocketAddr,
    store: Arc<dyn SnapshotRepository>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let make_svc = make_service_fn(move |_conn| {
        let store = store.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(store.clone(), req)))
        }
    });
    let server = Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(make_svc);
    info!(addr = %server.local_addr(), "holdings endpoint listening");
    server
        .with_graceful_shutdown(shutdown)
        .await
        .context("holdings endpoint failed")
}

async fn handle_request(
    store: Arc<dyn SnapshotRepository>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let query = req.uri().query().unwrap_or_default().to_string();
    debug!(method = %req.method(), path = req.uri().path(), %query, "request");
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => json(StatusCode::OK, &serde_json::json!({ "status": "ok" })),
        (&Method::GET, "/holdings") => match serde_urlencoded::from_str::<HoldingsParams>(&query) {
            Ok(params) => {
                let query = params.into_query();
                blocking(move || store.query(query), |records| {
                    records.into_iter().map(HoldingView::from).collect::<Vec<_>>()
                })
                .await
            }
            Err(err) => bad_request(&err.to_string()),
        },
        (&Method::GET, "/snapshots") => match serde_urlencoded::from_str::<SnapshotsParams>(&query) {
            Ok(params) => {
                blocking(move || store.list_snapshots(params.fund.as_deref()), |list| list).await
            }
            Err(err) => bad_request(&err.to_string()),
        },
        _ => json(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "not found" }),
        ),
    };
    Ok(response)
}

/// Runs a store call off the reactor and renders its result as JSON.
async fn blocking<T, V, F, M>(call: F, render: M) -> Response<Body>
where
    T: Send + 'static,
    V: Serialize,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    M: FnOnce(T) -> V,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(Ok(value)) => json(StatusCode::OK, &render(value)),
        Ok(Err(err)) => {
            warn!(error = %err, "store query failed");
            json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({ "error": err.to_string() }),
            )
        }
        Err(err) => json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &serde_json::json!({ "error": err.to_string() }),
        ),
    }
}

fn bad_request(message: &str) -> Response<Body> {
    json(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "error": message }),
    )
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{{\"error\":\"{err}\"}}").into_bytes(),
        ),
    };
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_store::SqliteSnapshotStore;
    use holdwatch_test_utils::{date, holding};
    use rust_decimal_macros::dec;
    use tempfile::{tempdir, TempDir};

    fn seeded_store() -> (TempDir, Arc<dyn SnapshotRepository>) {
        let dir = tempdir().unwrap();
        let store = SqliteSnapshotStore::new(dir.path().join("holdings.db")).unwrap();
        store
            .append(
                "TCI",
                date("2025-06-30"),
                &[
                    holding("TCI", "2025-06-30", "X1")
                        .shares(dec!(1500))
                        .weight(dec!(12.5))
                        .market_value(dec!(1234000))
                        .build(),
                    holding("TCI", "2025-06-30", "GE").build(),
                ],
            )
            .unwrap();
        store
            .append(
                "ARKK",
                date("2025-06-30"),
                &[holding("ARKK", "2025-06-30", "TSLA").build()],
            )
            .unwrap();
        (dir, Arc::new(store))
    }

    async fn get(store: &Arc<dyn SnapshotRepository>, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = handle_request(store.clone(), req).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_dir, store) = seeded_store();
        let (status, body) = get(&store, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn holdings_filter_by_fund_and_date() {
        let (_dir, store) = seeded_store();
        let (status, body) = get(&store, "/holdings?fund=tci&as_of=2025-06-30").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ticker"], "X1");
        assert_eq!(rows[0]["display"]["market_value"], "$1,234,000.00");
        assert_eq!(rows[0]["display"]["weight"], "12.5%");
        assert_eq!(rows[1]["display"]["shares"], "-");

        let (_, all) = get(&store, "/holdings").await;
        assert_eq!(all.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_bad_parameters_and_unknown_paths() {
        let (_dir, store) = seeded_store();
        let (status, body) = get(&store, "/holdings?as_of=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        let (status, _) = get(&store, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lists_snapshots() {
        let (_dir, store) = seeded_store();
        let (status, body) = get(&store, "/snapshots?fund=TCI").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["fund_ticker"], "TCI");
        assert_eq!(body[0]["rows"], 2);
    }
}
