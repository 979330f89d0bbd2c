// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::Result;
use crate::errors::CredentialsError;
use http::{HeaderMap, StatusCode};

/// A `POST` request for the token endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    /// The full URL, typically the `token_uri` from the key material.
    pub url: String,
    /// Additional headers, e.g. `Content-Type`.
    pub headers: HeaderMap,
    /// The request body, already encoded.
    pub body: String,
}

/// The status and body returned by the token endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

/// The HTTP capability used to exchange assertions for access tokens.
///
/// The credentials issue exactly one `POST` per refresh and never retry.
/// Implementations are responsible for any timeouts. They should only return
/// an error when the request did not produce a response; error statuses are
/// returned as a regular [HttpResponse].
#[async_trait::async_trait]
pub trait HttpClient: std::fmt::Debug + Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// The default [HttpClient], implemented with [reqwest].
#[derive(Clone, Debug, Default)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a pre-configured `reqwest::Client`, e.g. one with custom timeouts.
    pub fn with_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestClient {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .inner
            .post(request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(CredentialsError::transport)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(CredentialsError::transport)?;
        Ok(HttpResponse { status, body })
    }
}
