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

use std::time::Duration;

pub(crate) const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// The OAuth2 endpoint used when the key material does not name one.
pub(crate) const GOOGLE_OAUTH_REFRESH_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
/// JWT Bearer OAuth Grant Type
pub(crate) const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// The password Google uses for all the PKCS12 service account keys it generates.
pub(crate) const DEFAULT_PKCS12_PASSWORD: &str = "notasecret";
/// The lifetime requested for each assertion.
pub(crate) const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(3600);
pub(crate) const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
