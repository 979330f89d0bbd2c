// Copyright 2025 Google LLC
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

//! Exchange a signed assertion for an access token, using the OAuth2
//! [JWT bearer grant].
//!
//! [JWT bearer grant]: https://datatracker.ietf.org/doc/html/rfc7523

use crate::Result;
use crate::constants::{FORM_URLENCODED, JWT_BEARER_GRANT_TYPE};
use crate::credentials::jws::{assertion_components, make_jwt_assertion};
use crate::credentials::service_account_info::ServiceAccountInfo;
use crate::errors::CredentialsError;
use crate::http::{HttpClient, HttpRequest};
use crate::token::TemporaryToken;
use http::HeaderMap;
use http::header::{CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use time::OffsetDateTime;

/// The fields in a successful response from the token endpoint.
#[derive(serde::Deserialize)]
struct RefreshResponse {
    token_type: Option<String>,
    access_token: Option<String>,
    expires_in: Option<Value>,
}

/// The JWT bearer grant type, escaped for use in a form body.
pub fn escaped_grant_type() -> String {
    url::form_urlencoded::byte_serialize(JWT_BEARER_GRANT_TYPE.as_bytes()).collect()
}

/// Returns the form body to exchange a new assertion for an access token.
///
/// The body is `grant_type=<grant_type_escaped>&assertion=<assertion>`, in that
/// order.
pub fn refresh_payload(
    info: &ServiceAccountInfo,
    grant_type_escaped: &str,
    now: OffsetDateTime,
) -> Result<String> {
    let (header, payload) = assertion_components(info, now)?;
    let assertion = make_jwt_assertion(&header, &payload, info.private_key())?;
    Ok(format!("grant_type={grant_type_escaped}&assertion={assertion}"))
}

/// Parses the body of a token endpoint response received at `now`.
///
/// The `token_type` and `access_token` fields are required. If `expires_in`
/// is missing or is not a non-negative number of seconds the token has
/// already expired.
pub fn parse_refresh_response(body: &str, now: OffsetDateTime) -> Result<TemporaryToken> {
    let missing_fields = || {
        CredentialsError::invalid_argument(format!(
            "Could not find all required fields in response (access_token, token_type), body=<{body}>"
        ))
    };
    let response = serde_json::from_str::<RefreshResponse>(body).map_err(|_| missing_fields())?;
    let (Some(token_type), Some(access_token)) = (response.token_type, response.access_token)
    else {
        return Err(missing_fields());
    };
    let expires_in = expires_in_seconds(response.expires_in.as_ref());
    let expiration_time = crate::clock::truncate_to_seconds(now)
        .checked_add(time::Duration::seconds(expires_in))
        .ok_or_else(|| {
            CredentialsError::invalid_argument(format!(
                "the expires_in field is out of range in response, body=<{body}>"
            ))
        })?;
    Ok(TemporaryToken {
        token: format!("Authorization: {token_type} {access_token}"),
        expiration_time,
    })
}

// Some endpoints send the lifetime as a string or a float.
fn expires_in_seconds(value: Option<&Value>) -> i64 {
    let seconds = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    seconds.unwrap_or(0).max(0)
}

/// Obtains a new access token for `info`, `now` is the current time.
///
/// Makes exactly one `POST` request to the `token_uri` in `info`.
pub async fn refresh(
    http: &dyn HttpClient,
    info: &ServiceAccountInfo,
    now: OffsetDateTime,
) -> Result<TemporaryToken> {
    let body = refresh_payload(info, &escaped_grant_type(), now)?;
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));

    tracing::debug!(
        token_uri = info.token_uri(),
        client_email = info.client_email(),
        "refreshing access token"
    );
    let response = http
        .post(HttpRequest {
            url: info.token_uri().to_string(),
            headers,
            body,
        })
        .await?;
    if !response.status.is_success() {
        return Err(CredentialsError::from_http_status(response.status, response.body));
    }
    parse_refresh_response(&response.body, now)
}
