use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{reason}")]
    Rejected { reason: String },
}

/// What the rest of the app knows about a signed-in user: a display name and
/// an opaque token. Credential storage and token validation stay with the
/// provider.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub email: String,
    pub access_token: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    email: String,
}

/// Error payloads vary by endpoint; take whichever reason field is present.
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Email/password client for a GoTrue-style identity endpoint.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&Credentials { email, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                reason: rejection_reason(status.as_u16(), &body),
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(AuthSession {
            email: token.user.email,
            access_token: token.access_token,
        })
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&Credentials { email, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                reason: rejection_reason(status.as_u16(), &body),
            });
        }
        Ok(())
    }
}

fn rejection_reason(status: u16, body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.error)
        .unwrap_or_else(|| format!("identity provider returned status {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_prefers_error_description() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(rejection_reason(400, body), "Invalid login credentials");
    }

    #[test]
    fn rejection_falls_back_to_msg() {
        let body = r#"{"msg":"User already registered"}"#;
        assert_eq!(rejection_reason(422, body), "User already registered");
    }

    #[test]
    fn unparsable_rejection_reports_the_status() {
        assert_eq!(
            rejection_reason(503, "<html>gateway error</html>"),
            "identity provider returned status 503"
        );
    }
}
