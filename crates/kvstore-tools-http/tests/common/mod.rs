// crates/kvstore-tools-http/tests/common/mod.rs
// ============================================================================
// Module: Test Helpers
// Description: Scripted tiny_http servers for transport tests.
// ============================================================================
//! ## Overview
//! [`scripted_server`] answers a fixed list of responses in order and hands
//! back what it received once the script is exhausted.

#![allow(dead_code, reason = "Shared helpers are not used by every test binary.")]

use std::io::Read;
use std::thread;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// Starts a server that replies with `script` in order, one response per
/// request, and returns the base URI plus a handle yielding the captured
/// requests.
pub fn scripted_server(
    script: Vec<(u16, String)>,
) -> (String, thread::JoinHandle<Vec<CapturedRequest>>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let handle = thread::spawn(move || {
        let mut captured = Vec::new();
        for (status, body) in script {
            let Ok(mut request) = server.recv() else {
                break;
            };
            let header = |name: &'static str| {
                request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv(name))
                    .map(|header| header.value.as_str().to_string())
            };
            let authorization = header("Authorization");
            let content_type = header("Content-Type");
            let mut text = String::new();
            let _ = request.as_reader().read_to_string(&mut text);
            captured.push(CapturedRequest {
                method: request.method().to_string(),
                url: request.url().to_string(),
                authorization,
                content_type,
                body: text,
            });
            let json = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let _ = request.respond(Response::from_string(body).with_status_code(status).with_header(json));
        }
        captured
    });
    (format!("http://{addr}"), handle)
}
