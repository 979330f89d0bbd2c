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

//! [Service Account] Credentials type.
//!
//! A service account is an account for an application or compute workload
//! instead of an individual end user. When running outside Google Cloud you
//! may need to create and download a [service account key] to authenticate
//! as a service account. The key contains an id for the service account, and
//! the cryptographic materials (an RSA private key) required to authenticate
//! the caller.
//!
//! Service account keys should be treated as any other secret with security
//! implications. Think of them as unencrypted passwords. Do not store them
//! where unauthorized persons or programs may read them.
//!
//! The credentials in this module exchange a signed JWT assertion for an
//! access token, and cache the token until it expires. They can also sign
//! blobs with the service account key, for example to create signed URLs.
//!
//! [Service Account]: https://cloud.google.com/iam/docs/service-account-creds
//! [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating

pub mod jws;
pub mod service_account_info;
pub(crate) mod signing_key;
pub mod token_exchange;

use crate::Result;
use crate::clock::{Clock, SystemClock};
use crate::http::{HttpClient, ReqwestClient};
use crate::signer::SigningAccount;
use crate::token::{TemporaryToken, TokenProvider};
use crate::token_cache::TokenCache;
use service_account_info::ServiceAccountInfo;
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;

/// Credentials for a service account, created from its key.
///
/// Use [Builder] to create values of this type. Cloning the credentials is
/// cheap, clones share the cached access token.
#[derive(Clone, Debug)]
pub struct ServiceAccountCredentials {
    info: Arc<ServiceAccountInfo>,
    cache: TokenCache<ServiceAccountTokenProvider>,
    clock: Arc<dyn Clock>,
}

impl ServiceAccountCredentials {
    /// Returns the `Authorization:` header line for outgoing requests.
    ///
    /// The header is `Authorization: <token_type> <access_token>`. A new
    /// access token is requested if there is no cached token, or the cached
    /// token has expired. Errors are not retried.
    pub async fn authorization_header(&self) -> Result<String> {
        self.cache.authorization_header(self.clock.as_ref()).await
    }

    /// Signs `blob` with the service account private key.
    ///
    /// Returns the raw RSA-SHA256 signature. See [crate::signer::sign_blob].
    pub fn sign_blob(&self, account: &SigningAccount, blob: &[u8]) -> Result<Vec<u8>> {
        crate::signer::sign_blob(account, blob, &self.info)
    }

    /// The service account email.
    pub fn account_email(&self) -> &str {
        self.info.client_email()
    }

    /// The id of the service account key, not available for PKCS#12 keys.
    pub fn key_id(&self) -> Option<&str> {
        self.info.private_key_id()
    }
}

/// Creates [ServiceAccountCredentials].
///
/// ```
/// # use google_cloud_storage_oauth2::credentials::Builder;
/// # use google_cloud_storage_oauth2::credentials::service_account_info::ServiceAccountInfo;
/// # use google_cloud_storage_oauth2::clock::SystemClock;
/// # fn sample(info: ServiceAccountInfo) {
/// let credentials = Builder::new(info)
///     .with_scopes(["https://www.googleapis.com/auth/devstorage.read_only"])
///     .with_subject("user@example.com")
///     .with_clock(SystemClock)
///     .build();
/// # }
/// ```
#[derive(Debug)]
pub struct Builder {
    info: ServiceAccountInfo,
    http: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl Builder {
    pub fn new(info: ServiceAccountInfo) -> Self {
        Self {
            info,
            http: None,
            clock: None,
        }
    }

    /// Sets the [scopes] requested for the access tokens.
    ///
    /// Defaults to `https://www.googleapis.com/auth/cloud-platform`.
    ///
    /// [scopes]: https://developers.google.com/identity/protocols/oauth2/scopes
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.info = self.info.with_scopes(scopes);
        self
    }

    /// Sets the user to impersonate with domain-wide delegation.
    pub fn with_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.info = self.info.with_subject(subject);
        self
    }

    /// Sets the HTTP client used to reach the token endpoint.
    ///
    /// Defaults to a [ReqwestClient].
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.http = Some(Arc::new(client));
        self
    }

    /// Sets the clock used to timestamp assertions and expire tokens.
    ///
    /// Defaults to [SystemClock].
    pub fn with_clock<T: Clock + 'static>(mut self, clock: T) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> ServiceAccountCredentials {
        let info = Arc::new(self.info);
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestClient::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let provider = ServiceAccountTokenProvider {
            info: info.clone(),
            http,
        };
        ServiceAccountCredentials {
            info,
            cache: TokenCache::new(provider),
            clock,
        }
    }
}

/// Creates credentials from a JSON service account key file.
pub async fn from_json_file_path<P: AsRef<Path>>(path: P) -> Result<ServiceAccountCredentials> {
    let info = ServiceAccountInfo::from_json_file(path, None).await?;
    Ok(Builder::new(info).build())
}

/// Creates credentials from a PKCS#12 service account key file.
pub async fn from_p12_file_path<P: AsRef<Path>>(path: P) -> Result<ServiceAccountCredentials> {
    let info = ServiceAccountInfo::from_pkcs12_file(path).await?;
    Ok(Builder::new(info).build())
}

/// Creates credentials from a service account key file.
///
/// Files with a `.p12` extension are loaded as PKCS#12 keys, any other file
/// as a JSON key.
pub async fn from_file_path<P: AsRef<Path>>(path: P) -> Result<ServiceAccountCredentials> {
    let path = path.as_ref();
    if path.extension().is_some_and(|ext| ext == "p12") {
        return from_p12_file_path(path).await;
    }
    from_json_file_path(path).await
}

#[derive(Debug)]
struct ServiceAccountTokenProvider {
    info: Arc<ServiceAccountInfo>,
    http: Arc<dyn HttpClient>,
}

#[async_trait::async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn token(&self, now: OffsetDateTime) -> Result<TemporaryToken> {
        token_exchange::refresh(self.http.as_ref(), &self.info, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::FakeClock;
    use crate::credentials::jws::tests::{EXPECTED_ASSERTION, FIXED_JWT_TIMESTAMP};
    use crate::credentials::service_account_info::tests::{JSON_KEY_FILE, test_info};
    use crate::errors::CredentialsError;
    use crate::http::{HttpRequest, HttpResponse};
    use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
    use http::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;

    type TestResult = anyhow::Result<()>;

    // Records the requests and returns the canned responses in order.
    #[derive(Debug)]
    struct FakeHttpClient {
        requests: Arc<Mutex<Vec<HttpRequest>>>,
        responses: Mutex<Vec<std::result::Result<HttpResponse, String>>>,
    }

    impl FakeHttpClient {
        fn new<I>(responses: I) -> Self
        where
            I: IntoIterator<Item = std::result::Result<HttpResponse, String>>,
        {
            let mut responses = responses.into_iter().collect::<Vec<_>>();
            responses.reverse();
            Self {
                requests: Arc::default(),
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for FakeHttpClient {
        async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            match self.responses.lock().unwrap().pop() {
                Some(Ok(r)) => Ok(r),
                Some(Err(e)) => Err(CredentialsError::transport(e)),
                None => Err(CredentialsError::transport("no more responses")),
            }
        }
    }

    fn token_response(
        access_token: &str,
        expires_in: u64,
    ) -> std::result::Result<HttpResponse, String> {
        Ok(HttpResponse {
            status: StatusCode::OK,
            body: json!({
                "token_type": "Type",
                "access_token": access_token,
                "expires_in": expires_in,
            })
            .to_string(),
        })
    }

    // Lets the test advance the clock after it is moved into the builder.
    #[derive(Debug)]
    struct SharedClock(Arc<FakeClock>);

    impl Clock for SharedClock {
        fn now(&self) -> OffsetDateTime {
            self.0.now()
        }
    }

    #[tokio::test]
    async fn authorization_header() -> TestResult {
        let client = FakeHttpClient::new([token_response("access-token-value", 1234)]);
        let requests = client.requests.clone();
        let credentials = Builder::new(test_info())
            .with_http_client(client)
            .with_clock(FakeClock::new(FIXED_JWT_TIMESTAMP))
            .build();

        let header = credentials.authorization_header().await?;
        assert_eq!(header, "Authorization: Type access-token-value");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://oauth2.googleapis.com/token");
        assert_eq!(
            requests[0].headers.get(http::header::CONTENT_TYPE),
            Some(&http::HeaderValue::from_static("application/x-www-form-urlencoded"))
        );
        assert_eq!(
            requests[0].body,
            format!(
                "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer&assertion={EXPECTED_ASSERTION}"
            )
        );
        Ok(())
    }

    #[tokio::test]
    async fn refresh_only_when_missing_or_expired() -> TestResult {
        let client = FakeHttpClient::new([
            token_response("access-token-r1", 0),
            token_response("access-token-r2", 1000),
        ]);
        let requests = client.requests.clone();
        let credentials = Builder::new(test_info())
            .with_http_client(client)
            .with_clock(FakeClock::new(FIXED_JWT_TIMESTAMP))
            .build();

        // The first token is expired as soon as it is received.
        assert_eq!(
            credentials.authorization_header().await?,
            "Authorization: Type access-token-r1"
        );
        assert_eq!(
            credentials.authorization_header().await?,
            "Authorization: Type access-token-r2"
        );
        // Still valid, should use the cached token.
        assert_eq!(
            credentials.authorization_header().await?,
            "Authorization: Type access-token-r2"
        );
        assert_eq!(requests.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_updates_timestamps() -> TestResult {
        let client = FakeHttpClient::new([
            token_response("mock-token-value-10000", 3600),
            token_response("mock-token-value-20000", 3600),
        ]);
        let requests = client.requests.clone();
        let clock = Arc::new(FakeClock::new(10000));
        let credentials = Builder::new(test_info())
            .with_http_client(client)
            .with_clock(SharedClock(clock.clone()))
            .build();

        assert_eq!(
            credentials.authorization_header().await?,
            "Authorization: Type mock-token-value-10000"
        );
        // Advance the clock past the expiration time of the token.
        clock.set(20000);
        assert_eq!(
            credentials.authorization_header().await?,
            "Authorization: Type mock-token-value-20000"
        );

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        for (request, timestamp) in requests.iter().zip([10000, 20000]) {
            let prefix =
                "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer&assertion=";
            let assertion = request
                .body
                .strip_prefix(prefix)
                .unwrap_or_else(|| panic!("{request:?}"));
            let payload = assertion.split('.').nth(1).unwrap();
            let payload: serde_json::Value =
                serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(payload)?)?;
            assert_eq!(payload["iat"], timestamp);
            assert_eq!(payload["exp"], timestamp + 3600);
        }
        Ok(())
    }

    #[tokio::test]
    async fn refresh_failure_is_not_cached() -> TestResult {
        let client = FakeHttpClient::new([
            Ok(HttpResponse {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "try-again".to_string(),
            }),
            Err("connection reset".to_string()),
            token_response("access-token-value", 1000),
        ]);
        let credentials = Builder::new(test_info())
            .with_http_client(client)
            .with_clock(FakeClock::new(FIXED_JWT_TIMESTAMP))
            .build();

        let err = credentials.authorization_header().await.unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
        assert_eq!(err.http_status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        let err = credentials.authorization_header().await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
        assert_eq!(
            credentials.authorization_header().await?,
            "Authorization: Type access-token-value"
        );
        Ok(())
    }

    #[tokio::test]
    async fn clones_share_the_cache() -> TestResult {
        let client = FakeHttpClient::new([token_response("access-token-value", 1000)]);
        let requests = client.requests.clone();
        let credentials = Builder::new(test_info())
            .with_http_client(client)
            .with_clock(FakeClock::new(FIXED_JWT_TIMESTAMP))
            .build();
        let clone = credentials.clone();
        assert_eq!(
            credentials.authorization_header().await?,
            clone.authorization_header().await?
        );
        assert_eq!(requests.lock().unwrap().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn builder_scopes_and_subject() -> TestResult {
        let client = FakeHttpClient::new([token_response("access-token-value", 1000)]);
        let requests = client.requests.clone();
        let credentials = Builder::new(test_info())
            .with_scopes(["scope-a", "scope-b"])
            .with_subject("user@foo.bar")
            .with_http_client(client)
            .with_clock(FakeClock::new(FIXED_JWT_TIMESTAMP))
            .build();
        credentials.authorization_header().await?;

        let requests = requests.lock().unwrap();
        let payload = requests[0].body.split('.').nth(1).unwrap();
        let payload: serde_json::Value =
            serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(payload)?)?;
        assert_eq!(payload["scope"], "scope-a scope-b");
        assert_eq!(payload["sub"], "user@foo.bar");
        Ok(())
    }

    #[test]
    fn accessors() {
        let credentials = Builder::new(test_info()).build();
        assert_eq!(
            credentials.account_email(),
            "foo-email@foo-project.iam.gserviceaccount.com"
        );
        assert_eq!(
            credentials.key_id(),
            Some("a1a111aa1111a11a11a11aa111a111a1a1111111")
        );
    }

    #[test]
    fn sign_blob() -> TestResult {
        let credentials = Builder::new(test_info()).build();
        let signature = credentials.sign_blob(&SigningAccount::default(), b"test-blob")?;
        assert_eq!(
            signature,
            crate::signer::sign_blob(&SigningAccount::default(), b"test-blob", &test_info())?
        );

        let err = credentials
            .sign_blob(&SigningAccount::new("fake@fake.com"), b"test-blob")
            .unwrap_err();
        assert!(err.is_invalid_argument(), "{err:?}");
        Ok(())
    }

    #[test]
    fn debug() {
        let credentials = Builder::new(test_info()).build();
        let got = format!("{credentials:?}");
        assert!(got.contains("foo-email@foo-project.iam.gserviceaccount.com"), "{got}");
        assert!(!got.contains("BEGIN PRIVATE KEY"), "{got}");
    }

    #[tokio::test]
    async fn file_factories() -> TestResult {
        let dir = tempfile::tempdir()?;
        let json = dir.path().join("key.json");
        std::fs::write(&json, JSON_KEY_FILE)?;
        let p12 = dir.path().join("key.p12");
        std::fs::write(
            &p12,
            include_bytes!(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/tests/data/service_account_key.p12"
            )),
        )?;

        let credentials = from_json_file_path(&json).await?;
        assert_eq!(
            credentials.account_email(),
            "foo-email@foo-project.iam.gserviceaccount.com"
        );
        let credentials = from_file_path(&json).await?;
        assert!(credentials.key_id().is_some());

        let credentials = from_p12_file_path(&p12).await?;
        assert_eq!(credentials.account_email(), "104849618361176160538");
        let credentials = from_file_path(&p12).await?;
        assert_eq!(credentials.key_id(), None);

        let err = from_file_path(dir.path().join("missing.p12")).await.unwrap_err();
        assert!(err.is_loading(), "{err:?}");
        let err = from_file_path(dir.path().join("missing.json")).await.unwrap_err();
        assert!(err.is_loading(), "{err:?}");
        Ok(())
    }
}
