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

//! Parse [service account key] material into a [ServiceAccountInfo].
//!
//! Google Cloud issues service account keys in two formats. The JSON format
//! described by [aip/4112] is the recommended one. Older keys may be PKCS#12
//! containers, protected with the well-known `notasecret` password.
//!
//! [aip/4112]: https://google.aip.dev/auth/4112
//! [service account key]: https://cloud.google.com/iam/docs/keys-create-delete#creating

use crate::Result;
use crate::constants::{DEFAULT_PKCS12_PASSWORD, DEFAULT_SCOPE, GOOGLE_OAUTH_REFRESH_ENDPOINT};
use crate::errors::CredentialsError;
use openssl::nid::Nid;
use openssl::pkcs12::{ParsedPkcs12_2, Pkcs12};
use openssl::provider::Provider;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

/// The parsed contents of a service account key.
///
/// Once created the required fields are guaranteed to be non-empty. Use
/// [ServiceAccountInfo::from_json] or [ServiceAccountInfo::from_pkcs12] to
/// create values of this type.
#[derive(Clone, PartialEq)]
pub struct ServiceAccountInfo {
    client_email: String,
    private_key: String,
    private_key_id: Option<String>,
    token_uri: String,
    scopes: BTreeSet<String>,
    subject: Option<String>,
}

// The fields consumed from a JSON key file. Any other fields are ignored.
#[derive(serde::Deserialize)]
struct JsonKeyFile {
    private_key_id: Option<String>,
    private_key: Option<String>,
    client_email: Option<String>,
    token_uri: Option<String>,
}

impl ServiceAccountInfo {
    /// Parses the contents of a JSON service account key file.
    ///
    /// `source` describes where `contents` came from, typically a file name.
    /// It is only used in error messages. If the key file has no `token_uri`
    /// field, `default_token_uri` is used when it is not empty, otherwise the
    /// Google OAuth2 endpoint.
    pub fn from_json(
        contents: &str,
        source: &str,
        default_token_uri: Option<&str>,
    ) -> Result<Self> {
        let value = serde_json::from_str::<serde_json::Value>(contents).map_err(|e| {
            CredentialsError::invalid_argument(format!(
                "Invalid ServiceAccountCredentials, parsing failed on data loaded from {source}: {e}"
            ))
        })?;
        if !value.is_object() {
            return Err(CredentialsError::invalid_argument(format!(
                "Invalid ServiceAccountCredentials, expected a JSON object in data loaded from {source}"
            )));
        }
        let key_file = serde_json::from_value::<JsonKeyFile>(value).map_err(|e| {
            CredentialsError::invalid_argument(format!(
                "Invalid ServiceAccountCredentials, unexpected field types in data loaded from {source}: {e}"
            ))
        })?;

        let private_key_id = required_field("private_key_id", key_file.private_key_id, source)?;
        let private_key = required_field("private_key", key_file.private_key, source)?;
        let client_email = required_field("client_email", key_file.client_email, source)?;
        let token_uri = match key_file.token_uri {
            Some(uri) if uri.is_empty() => return Err(empty_field("token_uri", source)),
            Some(uri) => uri,
            None => default_token_uri
                .filter(|uri| !uri.is_empty())
                .unwrap_or(GOOGLE_OAUTH_REFRESH_ENDPOINT)
                .to_string(),
        };

        Ok(Self {
            client_email,
            private_key,
            private_key_id: Some(private_key_id),
            token_uri,
            scopes: default_scopes(),
            subject: None,
        })
    }

    /// Parses a PKCS#12 service account key protected with the default
    /// `notasecret` password.
    pub fn from_pkcs12(contents: &[u8], source: &str) -> Result<Self> {
        Self::from_pkcs12_with_password(contents, source, DEFAULT_PKCS12_PASSWORD)
    }

    /// Parses a PKCS#12 service account key.
    ///
    /// The service account email is the common name in the subject of the
    /// certificate. PKCS#12 keys have no key id, and always use the Google
    /// OAuth2 endpoint.
    ///
    /// The keys generated by Google are encrypted with RC2-40. With OpenSSL 3
    /// this requires the `legacy` provider, which is loaded the first time
    /// such a key fails to decrypt.
    pub fn from_pkcs12_with_password(
        contents: &[u8],
        source: &str,
        password: &str,
    ) -> Result<Self> {
        let invalid = |detail: String| {
            CredentialsError::invalid_argument(format!(
                "Invalid ServiceAccountCredentials, {detail} in PKCS#12 data loaded from {source}"
            ))
        };
        let parsed = decrypt_pkcs12(contents, password)
            .map_err(|e| invalid(format!("cannot decode the contents ({e})")))?;
        let pkey = parsed
            .pkey
            .ok_or_else(|| invalid("no private key".to_string()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| invalid("no certificate".to_string()))?;

        let client_email = cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .map(|entry| entry.data().as_utf8())
            .transpose()
            .map_err(|e| invalid(format!("cannot decode the certificate common name ({e})")))?
            .map(|cn| cn.to_string())
            .filter(|cn| !cn.is_empty())
            .ok_or_else(|| invalid("no common name in the certificate subject".to_string()))?;

        // Store the key as PKCS#8 PEM, the same representation used by the
        // JSON key files.
        let private_key = pkey
            .private_key_to_pem_pkcs8()
            .map_err(|e| invalid(format!("cannot re-encode the private key ({e})")))
            .and_then(|pem| {
                String::from_utf8(pem).map_err(|e| invalid(format!("invalid PEM encoding ({e})")))
            })?;

        Ok(Self {
            client_email,
            private_key,
            private_key_id: None,
            token_uri: GOOGLE_OAUTH_REFRESH_ENDPOINT.to_string(),
            scopes: default_scopes(),
            subject: None,
        })
    }

    /// Loads and parses a JSON service account key file.
    ///
    /// Fails with a loading error if the file cannot be read or is empty.
    pub async fn from_json_file<P: AsRef<Path>>(
        path: P,
        default_token_uri: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| read_error(path, e))?;
        if contents.is_empty() {
            return Err(empty_file(path));
        }
        Self::from_json(&contents, &path.display().to_string(), default_token_uri)
    }

    /// Loads and parses a PKCS#12 service account key file.
    ///
    /// Fails with a loading error if the file cannot be read or is empty.
    pub async fn from_pkcs12_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;
        if contents.is_empty() {
            return Err(empty_file(path));
        }
        Self::from_pkcs12(&contents, &path.display().to_string())
    }

    /// Replaces the OAuth2 scopes requested for the access tokens.
    ///
    /// An empty set restores the default `cloud-platform` scope.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: BTreeSet<String> = scopes.into_iter().map(Into::into).collect();
        self.scopes = if scopes.is_empty() {
            default_scopes()
        } else {
            scopes
        };
        self
    }

    /// Sets the user to impersonate with [domain-wide delegation].
    ///
    /// [domain-wide delegation]: https://developers.google.com/identity/protocols/oauth2/service-account#delegatingauthority
    pub fn with_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// The service account email, e.g. `my-sa@my-project.iam.gserviceaccount.com`.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// The PEM-encoded private key.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// The id of the private key, not available for PKCS#12 keys.
    pub fn private_key_id(&self) -> Option<&str> {
        self.private_key_id.as_deref()
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

impl std::fmt::Debug for ServiceAccountInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountInfo")
            .field("client_email", &self.client_email)
            .field("private_key", &"[censored]")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .field("subject", &self.subject)
            .finish()
    }
}

fn decrypt_pkcs12(
    contents: &[u8],
    password: &str,
) -> std::result::Result<ParsedPkcs12_2, openssl::error::ErrorStack> {
    let pkcs12 = Pkcs12::from_der(contents)?;
    match pkcs12.parse2(password) {
        Err(_) if load_legacy_provider() => pkcs12.parse2(password),
        result => result,
    }
}

// Loads the OpenSSL `legacy` provider, at most once per process. The
// provider stays loaded for the lifetime of the process. Returns `false` if
// the provider is not available.
fn load_legacy_provider() -> bool {
    static LEGACY: OnceLock<Option<Provider>> = OnceLock::new();
    LEGACY
        .get_or_init(|| {
            Provider::try_load(None, "legacy", true)
                .inspect_err(|e| tracing::warn!("cannot load the OpenSSL legacy provider: {e}"))
                .ok()
        })
        .is_some()
}

fn default_scopes() -> BTreeSet<String> {
    BTreeSet::from([DEFAULT_SCOPE.to_string()])
}

fn required_field(name: &str, value: Option<String>, source: &str) -> Result<String> {
    match value {
        None => Err(CredentialsError::invalid_argument(format!(
            "Invalid ServiceAccountCredentials, the {name} field is missing on data loaded from {source}"
        ))),
        Some(v) if v.is_empty() => Err(empty_field(name, source)),
        Some(v) => Ok(v),
    }
}

fn empty_field(name: &str, source: &str) -> CredentialsError {
    CredentialsError::invalid_argument(format!(
        "Invalid ServiceAccountCredentials, the {name} field is empty on data loaded from {source}"
    ))
}

fn read_error(path: &Path, e: std::io::Error) -> CredentialsError {
    CredentialsError::loading(format!("cannot read {}: {e}", path.display()))
}

fn empty_file(path: &Path) -> CredentialsError {
    CredentialsError::loading(format!("the file {} is empty", path.display()))
}
