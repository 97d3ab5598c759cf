use crate::client::{read_response, status_error, CACHE_CONTROL, NO_STORE};
use offsync::{LoginPayload, OffsyncError, Result, SessionStore, TokenType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    token: Option<&'a str>,
    refresh_token: &'a str,
}

/// Turns a 401 into either a fresh session or a forced logout.
///
/// The only writer of the session besides explicit sign-in/sign-out.
pub struct TokenRefresher {
    http: reqwest::Client,
    url: String,
}

impl TokenRefresher {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    /// Refresh the session and return the new Authorization header value.
    ///
    /// Without a refresh token the session is cleared and `original` is
    /// returned wrapped in `AuthInvalid`. A failed refresh also clears the
    /// session, but surfaces the refresh error instead.
    pub async fn refresh(&self, session: &SessionStore, original: OffsyncError) -> Result<String> {
        let current = session.snapshot();
        let Some(refresh_token) = current.refresh_token.clone() else {
            tracing::warn!("[AUTH] 401 without refresh token, logging out");
            session.logout();
            return Err(OffsyncError::auth_invalid(original));
        };

        match self.request(current.token.as_deref(), &refresh_token).await {
            Ok(resp) => {
                let authorization = format!("{} {}", TokenType::Bearer, resp.token);
                session.login(LoginPayload {
                    token_type: TokenType::Bearer,
                    token: resp.token,
                    refresh_token: resp.refresh_token.or(Some(refresh_token)),
                    expires_in: resp.expires_in.or(current.expires_in),
                    user: current.user,
                });
                tracing::info!("[AUTH] token refreshed");
                Ok(authorization)
            }
            Err(e) => {
                tracing::warn!("[AUTH] refresh failed, logging out: {}", e);
                session.logout();
                Err(OffsyncError::auth_invalid(e))
            }
        }
    }

    async fn request(&self, token: Option<&str>, refresh_token: &str) -> Result<RefreshResponse> {
        let response = self
            .http
            .post(&self.url)
            .header(CACHE_CONTROL, NO_STORE)
            .json(&RefreshRequest {
                token,
                refresh_token,
            })
            .send()
            .await
            .map_err(|e| OffsyncError::Transport(format!("POST {}: {}", self.url, e)))?;

        let resp = read_response(response).await?;
        if !resp.is_success() {
            return Err(status_error(&resp));
        }
        Ok(serde_json::from_value(resp.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync::{AuthUser, Technician};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signed_in(refresh: Option<&str>) -> SessionStore {
        let session = SessionStore::in_memory();
        session.login(LoginPayload {
            token_type: TokenType::Bearer,
            token: "old".into(),
            refresh_token: refresh.map(String::from),
            expires_in: Some(60),
            user: Some(AuthUser {
                login: "tecnico1".into(),
                name: "Maria".into(),
                technician: Technician {
                    id: 1,
                    email: None,
                    phone: None,
                },
            }),
        });
        session.present_credential("old");
        session
    }

    fn unauthorized() -> OffsyncError {
        OffsyncError::Status {
            status: 401,
            body: "expired".into(),
        }
    }

    #[tokio::test]
    async fn test_refresh_carries_over_missing_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/refresh"))
            .and(body_json(json!({"token": "old", "refreshToken": "r1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "new"})))
            .expect(1)
            .mount(&server)
            .await;

        let session = signed_in(Some("r1"));
        let refresher = TokenRefresher::new(
            reqwest::Client::new(),
            format!("{}/users/refresh", server.uri()),
        );

        let header = refresher.refresh(&session, unauthorized()).await.unwrap();
        assert_eq!(header, "Bearer new");

        let snap = session.snapshot();
        assert_eq!(snap.token.as_deref(), Some("new"));
        assert_eq!(snap.refresh_token.as_deref(), Some("r1"));
        assert_eq!(snap.expires_in, Some(60));
        assert_eq!(snap.user.unwrap().login, "tecnico1");
    }

    #[tokio::test]
    async fn test_missing_refresh_token_logs_out_with_original_error() {
        let session = signed_in(None);
        let refresher = TokenRefresher::new(reqwest::Client::new(), "http://127.0.0.1:9/r".into());

        let err = refresher.refresh(&session, unauthorized()).await.unwrap_err();
        match err {
            OffsyncError::AuthInvalid { source } => {
                assert!(matches!(*source, OffsyncError::Status { status: 401, .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!session.snapshot().is_authenticated);
        assert!(session.credential().is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_refresh_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/refresh"))
            .respond_with(ResponseTemplate::new(403).set_body_string("refresh revoked"))
            .mount(&server)
            .await;

        let session = signed_in(Some("r1"));
        let refresher = TokenRefresher::new(
            reqwest::Client::new(),
            format!("{}/users/refresh", server.uri()),
        );

        let err = refresher.refresh(&session, unauthorized()).await.unwrap_err();
        match err {
            OffsyncError::AuthInvalid { source } => match *source {
                OffsyncError::Status { status, ref body } => {
                    assert_eq!(status, 403);
                    assert_eq!(body, "refresh revoked");
                }
                ref other => panic!("unexpected source {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(session.snapshot().token.is_none());
    }
}
