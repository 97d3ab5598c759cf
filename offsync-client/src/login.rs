use crate::client::{ApiClient, ApiRequest};
use offsync::{AuthSession, AuthUser, LoginPayload, OffsyncError, Result, TokenType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<()> {
        let login_len = self.login.chars().count();
        if !(3..=255).contains(&login_len) {
            return Err(OffsyncError::InvalidRequest(
                "login must be between 3 and 255 characters".into(),
            ));
        }
        let password_len = self.password.chars().count();
        if !(6..=255).contains(&password_len) {
            return Err(OffsyncError::InvalidRequest(
                "password must be between 6 and 255 characters".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub user: AuthUser,
    pub token_type: TokenType,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl ApiClient {
    /// Authenticate and replace the session. Never queued: a sign-in made
    /// offline fails with the transport error.
    pub async fn sign_in(&self, credentials: LoginRequest) -> Result<AuthSession> {
        credentials.validate()?;

        let request = ApiRequest::new(http::Method::POST, self.login_url())
            .json(serde_json::to_value(&credentials)?);
        let resp = self.dispatch_direct(request).await?;
        let login: LoginResponse = serde_json::from_value(resp.body)?;

        let session = self.session();
        session.login(LoginPayload {
            token_type: login.token_type,
            token: login.token.clone(),
            refresh_token: login.refresh_token,
            expires_in: login.expires_in,
            user: Some(login.user),
        });
        session.present_credential(&login.token);
        tracing::info!("[AUTH] signed in as {}", credentials.login);
        Ok(session.snapshot())
    }

    pub fn sign_out(&self) {
        self.session().logout();
    }
}
