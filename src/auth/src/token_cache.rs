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

use crate::Result;
use crate::clock::Clock;
use crate::token::{TemporaryToken, TokenProvider};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug)]
pub(crate) struct TokenCache<T>
where
    T: TokenProvider,
{
    // The last token obtained from `inner`. Kept after it expires.
    token: Arc<Mutex<Option<TemporaryToken>>>,

    // The token provider. This thing does the refreshing.
    inner: Arc<T>,
}

#[derive(Debug, PartialEq)]
enum CacheState<'a> {
    Empty,
    Expired(&'a TemporaryToken),
    Valid(&'a TemporaryToken),
}

impl<'a> CacheState<'a> {
    fn new(token: Option<&'a TemporaryToken>, now: OffsetDateTime) -> Self {
        match token {
            None => Self::Empty,
            Some(t) if t.is_valid_at(now) => Self::Valid(t),
            Some(t) => Self::Expired(t),
        }
    }
}

// We manually implement the `Clone` trait because the Rust compiler will
// squawk if `T` is not `Clone`, even though we only hold an `Arc<T>`. :shrug:
impl<T: TokenProvider> Clone for TokenCache<T> {
    fn clone(&self) -> TokenCache<T> {
        TokenCache {
            token: self.token.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: TokenProvider> TokenCache<T> {
    pub(crate) fn new(inner: T) -> TokenCache<T> {
        TokenCache {
            token: Arc::new(Mutex::new(None)),
            inner: Arc::new(inner),
        }
    }

    /// Returns the `Authorization:` header line, refreshing the token if it
    /// is missing or expired.
    ///
    /// The lock is held during the refresh, concurrent callers wait for it
    /// and then use the refreshed token. The clock is read once the lock is
    /// acquired. If the refresh fails the previous token, if any, stays in
    /// the cache but is not returned.
    pub(crate) async fn authorization_header(&self, clock: &dyn Clock) -> Result<String> {
        let mut guard = self.token.lock().await;
        let now = clock.now();
        match CacheState::new(guard.as_ref(), now) {
            CacheState::Valid(token) => return Ok(token.token.clone()),
            CacheState::Expired(token) => {
                tracing::debug!(
                    expiration_time = %token.expiration_time,
                    "cached token expired, refreshing"
                );
            }
            CacheState::Empty => tracing::debug!("no cached token, refreshing"),
        }

        let token = self.inner.token(now).await.inspect_err(|e| {
            tracing::warn!("cannot refresh the access token: {e}");
        })?;
        let header = token.token.clone();
        *guard = Some(token);
        Ok(header)
    }

    #[cfg(test)]
    async fn cached(&self) -> Option<TemporaryToken> {
        self.token.lock().await.clone()
    }
}
