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

//! Create the [JWT] assertions exchanged for access tokens.
//!
//! The assertion is signed, and the token endpoint verifies the signature over
//! the exact bytes we send. The JSON objects are serialized with their keys in
//! alphabetical order, the structs below declare their fields in that order.
//!
//! [JWT]: https://datatracker.ietf.org/doc/html/rfc7519

use crate::Result;
use crate::constants::DEFAULT_TOKEN_TIMEOUT;
use crate::credentials::service_account_info::ServiceAccountInfo;
use crate::credentials::signing_key;
use crate::errors::CredentialsError;
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use time::OffsetDateTime;

/// The header that describes who, what, and how a token was created.
#[derive(Serialize, Debug)]
struct JwsHeader<'a> {
    alg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
    typ: &'a str,
}

/// The claims in the assertion.
#[derive(Serialize, Debug)]
struct JwsClaims<'a> {
    aud: &'a str,
    #[serde(with = "time::serde::timestamp")]
    exp: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    iat: OffsetDateTime,
    iss: &'a str,
    scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

/// Returns the JSON header and payload of the assertion for `info` at `now`.
///
/// The payload requests all the scopes in `info`, separated by spaces. The
/// assertion is valid for one hour.
pub fn assertion_components(
    info: &ServiceAccountInfo,
    now: OffsetDateTime,
) -> Result<(String, String)> {
    let now = crate::clock::truncate_to_seconds(now);
    let header = JwsHeader {
        alg: "RS256",
        kid: info.private_key_id(),
        typ: "JWT",
    };
    let claims = JwsClaims {
        aud: info.token_uri(),
        exp: now + DEFAULT_TOKEN_TIMEOUT,
        iat: now,
        iss: info.client_email(),
        scope: info
            .scopes()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        sub: info.subject(),
    };
    let header = serde_json::to_string(&header).map_err(CredentialsError::signing)?;
    let claims = serde_json::to_string(&claims).map_err(CredentialsError::signing)?;
    Ok((header, claims))
}

/// Encodes and signs the header and payload, returning a compact JWS.
///
/// The result is `<header>.<payload>.<signature>`, each segment encoded with
/// URL-safe base64 without padding.
pub fn make_jwt_assertion(header: &str, payload: &str, private_key: &str) -> Result<String> {
    let encoded_header_claims = format!(
        "{}.{}",
        BASE64_URL_SAFE_NO_PAD.encode(header),
        BASE64_URL_SAFE_NO_PAD.encode(payload)
    );
    let sig = signing_key::sign(private_key, encoded_header_claims.as_bytes())?;
    Ok(format!(
        "{}.{}",
        encoded_header_claims,
        BASE64_URL_SAFE_NO_PAD.encode(sig)
    ))
}
