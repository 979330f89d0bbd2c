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

//! Types and functions to work with auth [Tokens].
//!
//! [Tokens]: https://cloud.google.com/docs/authentication#token

use crate::Result;
use time::OffsetDateTime;

/// An access token returned by the token endpoint.
#[derive(Clone, PartialEq)]
pub struct TemporaryToken {
    /// The full header line, `Authorization: <token_type> <access_token>`.
    pub token: String,

    /// The time at which the token expires, with second precision.
    ///
    /// The token is valid while the current time is strictly before this
    /// value.
    pub expiration_time: OffsetDateTime,
}

impl TemporaryToken {
    /// Returns `true` if the token can be used at `now`.
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expiration_time
    }
}

impl std::fmt::Debug for TemporaryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryToken")
            .field("token", &"[censored]")
            .field("expiration_time", &self.expiration_time)
            .finish()
    }
}

#[async_trait::async_trait]
pub(crate) trait TokenProvider: std::fmt::Debug + Send + Sync {
    /// Fetches a new token, `now` is the current time.
    async fn token(&self, now: OffsetDateTime) -> Result<TemporaryToken>;
}
