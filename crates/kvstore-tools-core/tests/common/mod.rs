// crates/kvstore-tools-core/tests/common/mod.rs
// ============================================================================
// Module: Test Helpers
// Description: In-memory KV store behind the Transport trait.
// ============================================================================
//! ## Overview
//! [`MockKvStore`] answers the REST calls the engine makes from in-memory
//! collections, records every request, and can inject failures or emulate a
//! server-side row cap.

#![allow(dead_code, reason = "Shared helpers are not used by every test binary.")]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use kvstore_tools_core::CollectionIdentity;
use kvstore_tools_core::HttpMethod;
use kvstore_tools_core::KvStoreApi;
use kvstore_tools_core::KvStoreEndpoint;
use kvstore_tools_core::SessionToken;
use kvstore_tools_core::SharingLevel;
use kvstore_tools_core::Transport;
use kvstore_tools_core::TransportError;
use kvstore_tools_core::TransportRequest;
use kvstore_tools_core::TransportResponse;
use serde_json::Value;
use serde_json::json;
use url::Url;

pub const TEST_TOKEN: &str = "test-token";

/// Builds `count` records with sequential keys.
pub fn sample_records(count: usize) -> Vec<Value> {
    (0..count)
        .map(|index| json!({"_key": format!("k{index:06}"), "name": format!("row {index}"), "value": index}))
        .collect()
}

#[derive(Default)]
struct MockState {
    apps: Vec<(String, bool)>,
    collections: Vec<CollectionIdentity>,
    data: HashMap<(String, String), Vec<Value>>,
    max_rows: Option<usize>,
    fail_batch_number: Option<usize>,
    batches_seen: usize,
    fail_clear: bool,
    fail_page_skip: Option<usize>,
    fail_listing: bool,
    next_key: u64,
    capabilities: Vec<String>,
    roles: BTreeMap<String, Vec<String>>,
    users: Vec<(String, Vec<String>)>,
    requests: Vec<(HttpMethod, String)>,
}

/// In-memory KV store.
#[derive(Default)]
pub struct MockKvStore {
    state: Mutex<MockState>,
}

impl MockKvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_app(&self, app: &str, disabled: bool) {
        self.state.lock().unwrap().apps.push((app.to_string(), disabled));
    }

    pub fn add_collection(&self, app: &str, name: &str, sharing: SharingLevel, records: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        if !state.apps.iter().any(|(existing, _)| existing == app) {
            state.apps.push((app.to_string(), false));
        }
        state.collections.push(CollectionIdentity::new(app, name).with_sharing(sharing));
        state.data.insert((app.to_string(), name.to_string()), records);
    }

    pub fn set_max_rows(&self, max_rows: usize) {
        self.state.lock().unwrap().max_rows = Some(max_rows);
    }

    pub fn fail_batch_number(&self, batch: usize) {
        self.state.lock().unwrap().fail_batch_number = Some(batch);
    }

    pub fn fail_clear(&self) {
        self.state.lock().unwrap().fail_clear = true;
    }

    pub fn fail_page_at_skip(&self, skip: usize) {
        self.state.lock().unwrap().fail_page_skip = Some(skip);
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn set_capabilities(&self, capabilities: &[&str]) {
        self.state.lock().unwrap().capabilities =
            capabilities.iter().map(|capability| (*capability).to_string()).collect();
    }

    pub fn add_role(&self, role: &str, imported: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .roles
            .insert(role.to_string(), imported.iter().map(|r| (*r).to_string()).collect());
    }

    pub fn add_user(&self, user: &str, roles: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .users
            .push((user.to_string(), roles.iter().map(|r| (*r).to_string()).collect()));
    }

    pub fn records(&self, app: &str, name: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .data
            .get(&(app.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<(HttpMethod, String)> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of page requests issued against one collection.
    pub fn page_requests(&self, app: &str, name: &str) -> usize {
        let needle = format!("/servicesNS/nobody/{app}/storage/collections/data/{name}?");
        self.requests()
            .iter()
            .filter(|(method, url)| *method == HttpMethod::Get && url.contains(&needle))
            .count()
    }

    pub fn count_requests(&self, method: HttpMethod, fragment: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(m, url)| *m == method && url.contains(fragment))
            .count()
    }
}

/// Builds an API client against the mock.
pub fn api_for(store: &Arc<MockKvStore>) -> KvStoreApi {
    let transport: Arc<dyn Transport> = store.clone();
    KvStoreApi::new(
        transport,
        KvStoreEndpoint::new("https://mock.local:8089", SessionToken::new(TEST_TOKEN)),
    )
}

fn respond(status: u16, body: &Value) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status,
        body: serde_json::to_vec(body).unwrap(),
    })
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let hex = &segment[index + 1..index + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                index += 3;
                continue;
            }
        }
        out.push(bytes[index]);
        index += 1;
    }
    String::from_utf8(out).unwrap()
}

fn listing(entries: Vec<Value>) -> Value {
    json!({ "entry": entries })
}

impl Transport for MockKvStore {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.requests.push((request.method, request.url.clone()));

        let url = Url::parse(&request.url).map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        let segments: Vec<String> = url.path_segments().unwrap().map(percent_decode).collect();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        if segments == ["services", "auth", "login"] {
            return respond(200, &json!({ "sessionKey": "issued-session" }));
        }
        let expected = format!("Splunk {TEST_TOKEN}");
        if request.header_value("Authorization") != Some(expected.as_str()) {
            return respond(401, &json!({ "messages": [{ "type": "ERROR", "text": "unauthorized" }] }));
        }

        match (request.method, segments.as_slice()) {
            (HttpMethod::Get, ["services", "apps", "local"]) => {
                if state.fail_listing {
                    return respond(500, &json!({ "messages": [] }));
                }
                let entries = state
                    .apps
                    .iter()
                    .map(|(name, disabled)| json!({ "name": name, "content": { "disabled": disabled } }))
                    .collect();
                respond(200, &listing(entries))
            }
            (HttpMethod::Get, ["servicesNS", "nobody", app, "storage", "collections", "config"]) => {
                let entries = state
                    .collections
                    .iter()
                    .filter(|entry| entry.app == *app || entry.sharing == SharingLevel::Global)
                    .map(|entry| {
                        json!({ "name": entry.name, "acl": { "app": entry.app, "sharing": entry.sharing } })
                    })
                    .collect();
                respond(200, &listing(entries))
            }
            (HttpMethod::Get, ["servicesNS", "nobody", app, "storage", "collections", "data", name]) => {
                let limit: usize = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(0);
                let skip: usize = query.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0);
                if state.fail_page_skip == Some(skip) {
                    return respond(503, &json!({ "messages": [{ "text": "page failure" }] }));
                }
                let Some(records) = state.data.get(&((*app).to_string(), (*name).to_string())) else {
                    return respond(404, &json!({ "messages": [] }));
                };
                let reachable = state.max_rows.map_or(records.len(), |cap| cap.min(records.len()));
                let start = skip.min(reachable);
                let end = if limit == 0 { reachable } else { (skip + limit).min(reachable) };
                let page: Vec<Value> = records[start..end.max(start)].to_vec();
                respond(200, &Value::Array(page))
            }
            (HttpMethod::Delete, ["servicesNS", "nobody", app, "storage", "collections", "data", name]) => {
                if state.fail_clear {
                    return respond(500, &json!({ "messages": [{ "text": "clear failed" }] }));
                }
                match state.data.get_mut(&((*app).to_string(), (*name).to_string())) {
                    Some(records) => {
                        records.clear();
                        respond(200, &json!({}))
                    }
                    None => respond(404, &json!({ "messages": [] })),
                }
            }
            (HttpMethod::Delete, ["servicesNS", "nobody", app, "storage", "collections", "data", name, key]) => {
                let Some(records) = state.data.get_mut(&((*app).to_string(), (*name).to_string())) else {
                    return respond(404, &json!({ "messages": [] }));
                };
                let before = records.len();
                records.retain(|record| record["_key"] != *key);
                if records.len() == before {
                    respond(404, &json!({ "messages": [{ "text": "key not found" }] }))
                } else {
                    respond(200, &json!({}))
                }
            }
            (
                HttpMethod::Post,
                ["servicesNS", "nobody", app, "storage", "collections", "data", name, "batch_save"],
            ) => {
                state.batches_seen += 1;
                if state.fail_batch_number == Some(state.batches_seen) {
                    return respond(500, &json!({ "messages": [{ "text": "batch rejected" }] }));
                }
                let body = request.body.clone().unwrap_or_default();
                let Ok(batch) = serde_json::from_slice::<Vec<Value>>(&body) else {
                    return respond(400, &json!({ "messages": [{ "text": "bad batch" }] }));
                };
                let key = ((*app).to_string(), (*name).to_string());
                let mut ids = Vec::with_capacity(batch.len());
                for mut record in batch {
                    let id = match record.get("_key").and_then(Value::as_str) {
                        Some(id) => id.to_string(),
                        None => {
                            state.next_key += 1;
                            let id = format!("generated{}", state.next_key);
                            record["_key"] = Value::String(id.clone());
                            id
                        }
                    };
                    let records = state.data.entry(key.clone()).or_default();
                    match records.iter_mut().find(|existing| existing["_key"] == id.as_str()) {
                        Some(existing) => *existing = record,
                        None => records.push(record),
                    }
                    ids.push(Value::String(id));
                }
                respond(200, &Value::Array(ids))
            }
            (HttpMethod::Get, ["services", "authentication", "current-context"]) => respond(
                200,
                &listing(vec![json!({
                    "content": { "username": "admin", "roles": ["admin"], "capabilities": state.capabilities }
                })]),
            ),
            (HttpMethod::Get, ["services", "admin", "roles"]) => {
                let entries = state
                    .roles
                    .iter()
                    .map(|(name, imported)| json!({ "name": name, "content": { "imported_roles": imported } }))
                    .collect();
                respond(200, &listing(entries))
            }
            (HttpMethod::Get, ["services", "admin", "users"]) => {
                let entries = state
                    .users
                    .iter()
                    .map(|(name, roles)| json!({ "name": name, "content": { "roles": roles } }))
                    .collect();
                respond(200, &listing(entries))
            }
            _ => respond(404, &json!({ "messages": [{ "text": "no route" }] })),
        }
    }
}
