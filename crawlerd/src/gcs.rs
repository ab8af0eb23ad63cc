//! A narrow Google Cloud Storage uploader (§4.9 `GcsStore`): authenticates
//! with a service-account JSON key and uploads each finished artifact,
//! matching `output.py::upload_files_to_gcs`'s use of
//! `google.cloud.storage`. No resumable-upload session, no retry policy
//! beyond what `reqwest` gives for free; this stays deliberately minimal.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// GCS object names keep `-_.~` unescaped in the upload query string; every
/// other non-alphanumeric byte is percent-encoded.
const OBJECT_NAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const UPLOAD_ENDPOINT: &str = "https://storage.googleapis.com/upload/storage/v1/b";

#[derive(Debug, thiserror::Error)]
pub enum GcsError {
    #[error("could not read service-account key at {path}: {source}")]
    KeyFile { path: std::path::PathBuf, source: std::io::Error },
    #[error("service-account key is not valid JSON: {0}")]
    KeyJson(#[from] serde_json::Error),
    #[error("failed to sign OAuth2 JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("HTTP request to GCS/OAuth2 failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OAuth2 token exchange returned HTTP {0}")]
    TokenHttpStatus(reqwest::StatusCode),
    #[error("upload of {path} returned HTTP {status}")]
    UploadHttpStatus { path: std::path::PathBuf, status: reqwest::StatusCode },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn load_key(credentials_path: &Path) -> Result<ServiceAccountKey, GcsError> {
    let json = std::fs::read_to_string(credentials_path)
        .map_err(|source| GcsError::KeyFile { path: credentials_path.to_owned(), source })?;
    Ok(serde_json::from_str(&json)?)
}

/// Exchanges a service-account key for a bearer token via the standard
/// JWT-bearer grant (RFC 7523), the same flow the Python `google-auth`
/// library performs under `storage.Client.from_service_account_json`.
fn fetch_access_token(client: &reqwest::blocking::Client, key: &ServiceAccountKey) -> Result<String, GcsError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs();
    let claims =
        Claims { iss: key.client_email.clone(), scope: SCOPE.to_owned(), aud: TOKEN_URI.to_owned(), iat: now, exp: now + 3600 };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)?;

    let response = client
        .post(TOKEN_URI)
        .form(&[("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"), ("assertion", assertion.as_str())])
        .send()?;
    if !response.status().is_success() {
        return Err(GcsError::TokenHttpStatus(response.status()));
    }
    Ok(response.json::<TokenResponse>()?.access_token)
}

/// Uploads every path in `paths` to `gs://{bucket}/{location}/{filename}`,
/// matching `upload_files_to_gcs`'s per-file loop (minus the 8MB
/// chunk-size workaround, which is a `google-cloud-storage`-client-specific
/// quirk with no equivalent in a plain multipart upload).
pub fn upload_files(credentials_path: &Path, bucket: &str, location: &str, paths: &[std::path::PathBuf]) -> anyhow::Result<()> {
    let key = load_key(credentials_path)?;
    let client = reqwest::blocking::Client::new();
    let access_token = fetch_access_token(&client, &key)?;

    for path in paths {
        let started_at = std::time::Instant::now();
        let file_name = path.file_name().expect("artifact paths are always files").to_string_lossy();
        let object_name = format!("{location}/{file_name}");
        let bytes = std::fs::read(path)?;

        let url = format!(
            "{UPLOAD_ENDPOINT}/{bucket}/o?uploadType=media&name={}",
            utf8_percent_encode(&object_name, OBJECT_NAME_ESCAPE)
        );
        let response = client
            .post(&url)
            .bearer_auth(&access_token)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .map_err(GcsError::Http)?;
        if !response.status().is_success() {
            return Err(GcsError::UploadHttpStatus { path: path.clone(), status: response.status() }.into());
        }

        tracing::info!(
            path = %path.display(),
            bucket,
            object = %object_name,
            elapsed_ms = started_at.elapsed().as_millis(),
            "uploaded artifact to GCS"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters_but_not_unreserved() {
        assert_eq!(utf8_percent_encode("abc-_.~", OBJECT_NAME_ESCAPE).to_string(), "abc-_.~");
        assert_eq!(utf8_percent_encode("a/b c", OBJECT_NAME_ESCAPE).to_string(), "a%2Fb%20c");
    }
}
