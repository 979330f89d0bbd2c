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

//! Errors created while parsing, refreshing, or signing with service account
//! credentials.

use http::StatusCode;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents an error creating or using service account credentials.
///
/// The messages embed enough context (field names, the source of the key
/// material, the HTTP status) for applications to diagnose the problem. Use
/// the `is_*()` predicates to classify the error.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct CredentialsError(ErrorKind);

impl CredentialsError {
    /// The key material, the token endpoint response, or a caller-provided
    /// argument is invalid.
    ///
    /// Retrying the operation with the same inputs will not succeed.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidArgument(_))
    }

    /// The token endpoint could not be reached, or it rejected the request.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.0, ErrorKind::Unavailable { .. })
    }

    /// The private key could not be used to create a signature.
    pub fn is_signing(&self) -> bool {
        matches!(self.0, ErrorKind::Signing(_))
    }

    /// A key file could not be found, opened, or read.
    pub fn is_loading(&self) -> bool {
        matches!(self.0, ErrorKind::Loading(_))
    }

    /// Returns `true` if a future attempt of the same operation may succeed.
    ///
    /// This crate never retries on its own. Applications should use
    /// [Exponential backoff] in their retry loops.
    ///
    /// [Exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff
    pub fn is_retryable(&self) -> bool {
        match &self.0 {
            ErrorKind::Unavailable { status: None, .. } => true,
            ErrorKind::Unavailable {
                status: Some(code), ..
            } => is_retryable(*code),
            _ => false,
        }
    }

    /// The HTTP status returned by the token endpoint, if any.
    pub fn http_status(&self) -> Option<StatusCode> {
        match &self.0 {
            ErrorKind::Unavailable { status, .. } => *status,
            _ => None,
        }
    }

    pub(crate) fn invalid_argument<T: Into<String>>(message: T) -> Self {
        Self(ErrorKind::InvalidArgument(message.into()))
    }

    /// A transport-level problem, the request never produced a response.
    pub(crate) fn transport<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Unavailable {
            status: None,
            source: source.into(),
        })
    }

    /// The token endpoint responded with an error status.
    pub(crate) fn from_http_status<T>(status: StatusCode, body: T) -> Self
    where
        T: Into<String>,
    {
        let body: String = body.into();
        Self(ErrorKind::Unavailable {
            status: Some(status),
            source: format!("the token endpoint returned {status}, body=<{body}>").into(),
        })
    }

    pub(crate) fn signing<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Signing(source.into()))
    }

    pub(crate) fn loading<T>(source: T) -> Self
    where
        T: Into<BoxError>,
    {
        Self(ErrorKind::Loading(source.into()))
    }
}

#[derive(thiserror::Error, Debug)]
enum ErrorKind {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("cannot refresh the access token: {source}")]
    Unavailable {
        status: Option<StatusCode>,
        #[source]
        source: BoxError,
    },
    #[error("cannot sign with the service account key: {0}")]
    Signing(#[source] BoxError),
    #[error("could not find or read the key file: {0}")]
    Loading(#[source] BoxError),
}

pub(crate) fn is_retryable(c: StatusCode) -> bool {
    match c {
        // Internal server errors do not indicate that there is anything wrong
        // with our request, so we retry them.
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => true,
        _ => false,
    }
}
