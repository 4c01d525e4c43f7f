//! The JSON HTTP surface of the collector.
//!
//! `Api::dispatch` maps a method, URL and body onto the store and produces a
//! status and JSON body. It knows nothing about sockets; `http::Handler` is
//! implemented on top of it for the live server.

use http;
use protocols::otlp;
use query::SeriesQuery;
use serde_json::{self, Value};
use std::io::Read;
use std::sync::{Arc, RwLock};
use store::Store;
use time;
use url::form_urlencoded;

/// Request bodies larger than this are refused with a 413.
pub const MAX_BODY_BYTES: u64 = 2 * 1024 * 1024;

const ROUTES: &[&str] = &["/", "/health", "/v1/metrics", "/api/series", "/api/metrics"];

/// A status code and JSON body, ready to be written out.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Value,
}

impl Reply {
    fn ok(body: Value) -> Reply {
        Reply {
            status: 200,
            body: body,
        }
    }

    fn error(status: u16, message: &str) -> Reply {
        Reply {
            status: status,
            body: json!({ "ok": false, "error": message }),
        }
    }
}

/// Request routing over a shared store.
#[derive(Clone, Debug)]
pub struct Api {
    store: Arc<RwLock<Store>>,
}

impl Api {
    /// Serve requests from `store`.
    pub fn new(store: Arc<RwLock<Store>>) -> Api {
        Api { store: store }
    }

    /// Answer one request
    ///
    /// `url` is the request target, path plus optional query string. `now_ms`
    /// stamps records that carry no timestamp and anchors query defaults.
    pub fn dispatch(&self, method: &str, url: &str, body: &[u8], now_ms: i64) -> Reply {
        let (path, raw_query) = match url.find('?') {
            Some(idx) => (&url[..idx], &url[idx + 1..]),
            None => (url, ""),
        };
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };

        match (method, path) {
            ("GET", "/") => Reply::ok(index()),
            ("GET", "/health") => Reply::ok(json!({ "ok": true })),
            ("POST", "/v1/metrics") => self.ingest(body, now_ms),
            ("GET", "/api/series") => self.series(raw_query, now_ms),
            ("GET", "/api/metrics") => self.metrics(),
            (_, path) if ROUTES.contains(&path) => {
                debug!("rejecting {} {}", method, path);
                Reply::error(405, "method not allowed")
            }
            _ => {
                debug!("no route for {} {}", method, path);
                Reply::error(404, "not found")
            }
        }
    }

    fn ingest(&self, body: &[u8], now_ms: i64) -> Reply {
        let records = match otlp::parse_metrics(body) {
            Ok(records) => records,
            Err(e) => {
                debug!("rejecting export: {}", e);
                return Reply::error(400, "invalid OTLP JSON body");
            }
        };
        let decoded = records.len();
        let ingested = match self.store.write() {
            Ok(mut store) => store.ingest(records, now_ms),
            Err(_) => return poisoned(),
        };
        trace!("export decoded {} points, stored {}", decoded, ingested);
        Reply::ok(json!({ "ok": true, "ingested": ingested }))
    }

    fn series(&self, raw_query: &str, now_ms: i64) -> Reply {
        let params: Vec<(String, String)> = form_urlencoded::parse(raw_query.as_bytes())
            .into_owned()
            .collect();
        let metric = match param(&params, "metric") {
            Some(metric) if !metric.is_empty() => metric,
            _ => return Reply::error(400, "metric is required"),
        };

        let mut query = SeriesQuery::new(metric);
        query.start = param(&params, "start").map(String::from);
        query.end = param(&params, "end").map(String::from);
        query.step = param(&params, "step").map(String::from);
        query.agg = param(&params, "agg").map(String::from);
        if let Some(group_by) = param(&params, "group_by") {
            query = query.group_by(
                group_by
                    .split(',')
                    .map(|key| key.trim())
                    .filter(|key| !key.is_empty())
                    .collect(),
            );
        }
        if let Some(compact) = param(&params, "compact") {
            query = query.compact(match compact.trim() {
                "false" | "0" | "no" => false,
                _ => true,
            });
        }

        let result = match self.store.read() {
            Ok(store) => store.query_series(&query, now_ms),
            Err(_) => return poisoned(),
        };
        match serde_json::to_value(result) {
            Ok(Value::Object(mut body)) => {
                body.insert("ok".into(), Value::Bool(true));
                Reply::ok(Value::Object(body))
            }
            Ok(_) | Err(_) => {
                error!("query result for {} did not serialize to an object", metric);
                Reply::error(500, "internal error")
            }
        }
    }

    fn metrics(&self) -> Reply {
        let listing = match self.store.read() {
            Ok(store) => store.list_metrics(),
            Err(_) => return poisoned(),
        };
        Reply::ok(json!({ "ok": true, "metrics": listing }))
    }
}

impl http::Handler for Api {
    fn handle(&self, mut request: http::Request) -> () {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let mut body = Vec::new();
        let reply = match request
            .as_reader()
            .take(MAX_BODY_BYTES + 1)
            .read_to_end(&mut body)
        {
            Ok(len) if len as u64 > MAX_BODY_BYTES => {
                debug!("{} {} body exceeds {} bytes", method, url, MAX_BODY_BYTES);
                Reply::error(413, "request body too large")
            }
            Ok(_) => self.dispatch(&method, &url, &body, time::now_ms()),
            Err(e) => {
                debug!("failed reading body of {} {}: {}", method, url, e);
                Reply::error(400, "unreadable request body")
            }
        };

        let payload = serde_json::to_vec(&reply.body).unwrap_or_else(|_| b"{}".to_vec());
        let response = http::response(reply.status, "application/json; charset=utf-8", payload);
        if let Err(e) = request.respond(response) {
            warn!("Failed to send response to {} {}: {:?}", method, url, e);
        }
    }
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|&&(ref k, _)| k == key)
        .map(|&(_, ref v)| v.as_str())
}

fn poisoned() -> Reply {
    error!("store lock poisoned by a panicking request");
    Reply::error(500, "store unavailable")
}

fn index() -> Value {
    json!({
        "name": "tidepool",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            {
                "method": "GET",
                "path": "/",
                "description": "List available endpoints for this collector."
            },
            {
                "method": "GET",
                "path": "/health",
                "description": "Health check for the collector."
            },
            {
                "method": "POST",
                "path": "/v1/metrics",
                "description": "Ingest OTLP/HTTP JSON metrics payloads."
            },
            {
                "method": "GET",
                "path": "/api/series",
                "description": "Query time-series data with aggregation and labels.",
                "query": {
                    "metric": "Required metric name",
                    "start": "Start time (ISO or epoch ms)",
                    "end": "End time (ISO or epoch ms)",
                    "step": "Bucket size in ms",
                    "group_by": "Comma-separated label keys",
                    "agg": "avg | sum | min | max | count | last | p25 | p50 | p90 | p99",
                    "compact": "false to emit empty windows as null points"
                },
                "example": "/api/series?metric=gossip_delay_ms&start=2026-01-19T10:00:00Z&end=2026-01-19T10:05:00Z&step=5000&group_by=from_node,to_node&agg=avg"
            },
            {
                "method": "GET",
                "path": "/api/metrics",
                "description": "List known metrics and their label keys."
            }
        ]
    })
}
