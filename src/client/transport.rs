use std::sync::Arc;

use async_trait::async_trait;
use dyn_clone::DynClone;
use reqwest::header::HeaderMap;
use reqwest::Method;

use crate::error::Result;
use crate::request::{capture, Captured};

/// Body encodings the upstream accepts
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

/// The single seam between the request engine and the wire. Production
/// goes through reqwest; tests script responses through the same trait
#[async_trait]
pub trait Transport: Send + Sync + DynClone {
    async fn execute(&self, request: WireRequest) -> Result<Captured>;
}

dyn_clone::clone_trait_object!(Transport);

#[derive(Clone)]
pub struct HttpTransport {
    client: Arc<reqwest::Client>,
}

impl HttpTransport {
    pub fn new(client: Arc<reqwest::Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: WireRequest) -> Result<Captured> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Form(pairs)) => builder.form(&pairs),
            None => builder,
        };
        let response = builder.send().await?;
        capture(response).await
    }
}
