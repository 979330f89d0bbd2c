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
use crate::errors::CredentialsError;
use rustls::crypto::CryptoProvider;
use rustls::sign::Signer;
use rustls_pemfile::Item;

// Creates a RSA-SHA256 signer from a PEM-encoded private key.
//
// Uses the process-level default `CryptoProvider` if the application installed
// one, and `ring` otherwise.
pub(crate) fn signer(private_key: &str) -> Result<Box<dyn Signer>> {
    let key_provider = CryptoProvider::get_default().map_or_else(
        || rustls::crypto::ring::default_provider().key_provider,
        |p| p.key_provider,
    );

    let private_key = rustls_pemfile::read_one(&mut private_key.as_bytes())
        .map_err(CredentialsError::signing)?
        .ok_or_else(|| CredentialsError::signing("missing PEM section in service account key"))?;
    let pk = match private_key {
        Item::Pkcs1Key(item) => key_provider.load_private_key(item.into()),
        Item::Pkcs8Key(item) => key_provider.load_private_key(item.into()),
        other => {
            return Err(CredentialsError::signing(format!(
                "expected key to be in form of PKCS1 or PKCS8, found {other:?}"
            )));
        }
    };
    let sk = pk.map_err(CredentialsError::signing)?;

    sk.choose_scheme(&[rustls::SignatureScheme::RSA_PKCS1_SHA256])
        .ok_or_else(|| {
            CredentialsError::signing(
                "unable to choose RSA_PKCS1_SHA256 signing scheme as it is not supported by current signer",
            )
        })
}

/// Signs `payload` with RSA-SHA256 (PKCS#1 v1.5 padding).
pub(crate) fn sign(private_key: &str, payload: &[u8]) -> Result<Vec<u8>> {
    signer(private_key)?
        .sign(payload)
        .map_err(CredentialsError::signing)
}
