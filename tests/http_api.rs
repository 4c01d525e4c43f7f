extern crate tidepool;
#[macro_use]
extern crate serde_json;

use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, RwLock};
use tidepool::api::Api;
use tidepool::http;
use tidepool::store::Store;
use tidepool::thread::Stoppable;

// 2026-01-19T10:00:00Z
const NOW: i64 = 1_768_816_800_000;

fn api(window_ms: i64) -> Api {
    Api::new(Arc::new(RwLock::new(Store::new(window_ms, 5_000))))
}

fn nanos(ms: i64) -> String {
    format!("{}000000", ms)
}

fn gossip_payload(ts_ms: i64) -> Value {
    json!({
        "resourceMetrics": [{
            "resource": {
                "attributes": [{ "key": "service.name", "value": { "stringValue": "demo" } }]
            },
            "scopeMetrics": [{
                "metrics": [
                    {
                        "name": "gossip_delay_ms",
                        "gauge": { "dataPoints": [
                            {
                                "timeUnixNano": nanos(ts_ms),
                                "asDouble": 50.5,
                                "attributes": [
                                    { "key": "from_node", "value": { "stringValue": "1" } },
                                    { "key": "to_node", "value": { "stringValue": "2" } }
                                ]
                            },
                            {
                                "timeUnixNano": nanos(ts_ms),
                                "asDouble": 40.0,
                                "attributes": [
                                    { "key": "from_node", "value": { "stringValue": "1" } },
                                    { "key": "to_node", "value": { "stringValue": "3" } }
                                ]
                            }
                        ]}
                    },
                    {
                        "name": "gossip_message_total",
                        "sum": {
                            "aggregationTemporality": "AGGREGATION_TEMPORALITY_DELTA",
                            "isMonotonic": true,
                            "dataPoints": [{
                                "timeUnixNano": nanos(ts_ms),
                                "asInt": "1",
                                "attributes": [
                                    { "key": "from_node", "value": { "stringValue": "1" } },
                                    { "key": "to_node", "value": { "stringValue": "2" } }
                                ]
                            }]
                        }
                    }
                ]
            }]
        }]
    })
}

fn post(api: &Api, payload: &Value, now_ms: i64) -> Value {
    let body = serde_json::to_vec(payload).unwrap();
    let reply = api.dispatch("POST", "/v1/metrics", &body, now_ms);
    assert_eq!(200, reply.status, "{}", reply.body);
    reply.body
}

fn get(api: &Api, url: &str, now_ms: i64) -> Value {
    let reply = api.dispatch("GET", url, b"", now_ms);
    assert_eq!(200, reply.status, "{}", reply.body);
    reply.body
}

#[test]
fn ingests_otlp_and_queries_series() {
    let api = api(60_000);
    let ingest = post(&api, &gossip_payload(NOW), NOW);
    assert_eq!(json!({ "ok": true, "ingested": 3 }), ingest);

    let query = get(
        &api,
        "/api/series?metric=gossip_delay_ms&start=2026-01-19T09:59:50Z\
         &end=2026-01-19T10:00:10Z&step=5000&group_by=from_node,to_node&agg=avg",
        NOW,
    );
    assert_eq!(json!(true), query["ok"]);
    assert_eq!(json!("gossip_delay_ms"), query["metric"]);
    assert_eq!(json!("2026-01-19T09:59:50.000Z"), query["start"]);
    assert_eq!(json!("2026-01-19T10:00:10.000Z"), query["end"]);
    assert_eq!(json!(5000), query["stepMs"]);
    assert_eq!(
        json!([
            {
                "labels": { "from_node": "1", "to_node": "2" },
                "points": [{ "ts": "2026-01-19T10:00:00.000Z", "value": 50.5 }]
            },
            {
                "labels": { "from_node": "1", "to_node": "3" },
                "points": [{ "ts": "2026-01-19T10:00:00.000Z", "value": 40.0 }]
            }
        ]),
        query["series"]
    );
}

#[test]
fn catalog_lists_metrics_and_label_keys() {
    let api = api(60_000);
    post(&api, &gossip_payload(NOW), NOW);
    assert_eq!(
        json!({
            "ok": true,
            "metrics": [
                { "metric": "gossip_delay_ms", "labels": ["from_node", "to_node"] },
                { "metric": "gossip_message_total", "labels": ["from_node", "to_node"] }
            ]
        }),
        get(&api, "/api/metrics", NOW)
    );
}

#[test]
fn gauge_average_and_histogram_median() {
    let api = api(900_000);
    let payload = json!({
        "resourceMetrics": [{
            "scopeMetrics": [{
                "metrics": [
                    {
                        "name": "gossip_delay_ms",
                        "gauge": { "dataPoints": [{
                            "timeUnixNano": nanos(NOW + 1_000),
                            "asDouble": 45.2,
                            "attributes": [
                                { "key": "from_node", "value": { "stringValue": "1" } },
                                { "key": "to_node", "value": { "stringValue": "2" } }
                            ]
                        }]}
                    },
                    {
                        "name": "gossip_delay_hist_ms",
                        "histogram": { "dataPoints": [{
                            "timeUnixNano": nanos(NOW + 1_000),
                            "count": "1",
                            "sum": 5.0,
                            "bucketCounts": ["1", "0", "0", "0"],
                            "explicitBounds": [10.0, 20.0, 30.0],
                            "attributes": [
                                { "key": "from_node", "value": { "stringValue": "1" } }
                            ]
                        }]}
                    }
                ]
            }]
        }]
    });
    assert_eq!(json!(2), post(&api, &payload, NOW + 2_000)["ingested"]);

    let avg = get(
        &api,
        "/api/series?metric=gossip_delay_ms&start=1768816800000&end=1768816810000&agg=avg",
        NOW + 2_000,
    );
    assert_eq!(json!(45.2), avg["series"][0]["points"][0]["value"]);

    let p50 = get(
        &api,
        "/api/series?metric=gossip_delay_hist_ms&start=1768816800000&end=1768816810000&agg=p50",
        NOW + 2_000,
    );
    let value = &p50["series"][0]["points"][0]["value"];
    assert!(value.is_number(), "p50 was {}", value);
    assert_eq!(json!(10.0), *value);
}

#[test]
fn last_value_round_trips() {
    let api = api(60_000);
    post(&api, &gossip_payload(NOW), NOW);
    let query = get(
        &api,
        "/api/series?metric=gossip_message_total&agg=last",
        NOW + 1_000,
    );
    assert_eq!(json!(1.0), query["series"][0]["points"][0]["value"]);
}

#[test]
fn evicted_points_disappear() {
    let api = api(60_000);
    post(&api, &gossip_payload(NOW - 60_001), NOW - 60_001);
    let before = get(&api, "/api/series?metric=gossip_delay_ms&start=0", NOW - 60_001);
    assert_eq!(1, before["series"][0]["points"].as_array().unwrap().len());

    // another ingest after the window has passed evicts the old buckets
    post(&api, &json!({ "resourceMetrics": [] }), NOW);
    let after = get(&api, "/api/series?metric=gossip_delay_ms&start=0", NOW);
    for series in after["series"].as_array().unwrap() {
        assert_eq!(json!([]), series["points"]);
    }
}

#[test]
fn sparse_output_reports_empty_windows() {
    let api = api(60_000);
    post(&api, &gossip_payload(NOW), NOW);
    let query = get(
        &api,
        "/api/series?metric=gossip_message_total&start=1768816790000\
         &end=1768816805000&step=5000&agg=sum&compact=false",
        NOW,
    );
    let values: Vec<Value> = query["series"][0]["points"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["value"].clone())
        .collect();
    assert_eq!(vec![json!(null), json!(null), json!(1.0), json!(null)], values);
}

#[test]
fn serves_over_a_socket() {
    let api = api(60_000);
    let server = http::Server::new("127.0.0.1:0".into(), api.clone()).unwrap();
    let addr = server.local_addr().unwrap();

    let body = serde_json::to_vec(&gossip_payload(tidepool::time::now_ms())).unwrap();
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "POST /v1/metrics HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    ).unwrap();
    stream.write_all(&body).unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();
    assert!(raw.starts_with("HTTP/1.1 200"), "{}", raw);
    assert!(raw.contains("application/json"));
    let reply: Value = serde_json::from_str(raw.split("\r\n\r\n").nth(1).unwrap()).unwrap();
    assert_eq!(json!({ "ok": true, "ingested": 3 }), reply);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET /nowhere HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();
    assert!(raw.starts_with("HTTP/1.1 404"), "{}", raw);

    server.shutdown();
}

#[test]
fn histogram_with_non_numeric_sum_is_dropped() {
    let api = api(60_000);
    let payload = json!({
        "resourceMetrics": [{
            "scopeMetrics": [{
                "metrics": [{
                    "name": "lat",
                    "histogram": { "dataPoints": [
                        {
                            "timeUnixNano": nanos(NOW),
                            "count": 1,
                            "sum": "NaN",
                            "bucketCounts": [1, 0],
                            "explicitBounds": [10]
                        },
                        {
                            "timeUnixNano": nanos(NOW),
                            "count": 1,
                            "sum": 5,
                            "bucketCounts": [1, 0],
                            "explicitBounds": [10]
                        }
                    ]}
                }]
            }]
        }]
    });
    assert_eq!(json!(1), post(&api, &payload, NOW)["ingested"]);

    for &(agg, value) in &[("avg", 5.0), ("sum", 5.0), ("count", 1.0)] {
        let url = format!(
            "/api/series?metric=lat&start=1768816800000&end=1768816804999&agg={}",
            agg
        );
        let query = get(&api, &url, NOW);
        assert_eq!(
            json!([{ "ts": "2026-01-19T10:00:00.000Z", "value": value }]),
            query["series"][0]["points"],
            "agg {}",
            agg
        );
    }
}
