// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for faking the Kubernetes API server.

use http::{Method, Request, Response};
use kube::client::Body;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

type Route = (Method, String);

/// A fake API server answering canned responses by method and exact path.
///
/// Every request it sees is recorded, so tests can check what was sent.
#[derive(Clone, Default)]
pub struct MockService {
    routes: Arc<Mutex<HashMap<Route, (u16, String)>>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(self, method: Method, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), (status, body.to_string()));
        self
    }

    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.route(Method::GET, path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.route(Method::PUT, path, status, body)
    }

    /// `"METHOD path?query"` of every request received so far
    pub fn requests(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Build a kube Client on top of this service; keep a clone to inspect requests
    pub fn client(&self) -> Client {
        Client::new(self.clone(), "default")
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let path = req.uri().path().to_string();
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| path.clone());
        self.seen
            .lock()
            .unwrap()
            .push(format!("{} {}", req.method(), target));

        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&(req.method().clone(), path.clone()))
            .cloned()
            .unwrap_or_else(|| (404, not_found_json("path", &path)));

        Box::pin(async move {
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// ServiceAccount as returned by the API server
pub fn service_account_json(namespace: &str, name: &str, resource_version: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": "test-uid",
            "resourceVersion": resource_version
        }
    })
    .to_string()
}

fn status_json(code: u16, reason: &str, message: String) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", format!("{} \"{}\" not found", resource, name))
}

pub fn conflict_json(resource: &str, name: &str) -> String {
    status_json(
        409,
        "Conflict",
        format!(
            "Operation cannot be fulfilled on {} \"{}\": the object has been modified",
            resource, name
        ),
    )
}
