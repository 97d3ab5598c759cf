use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

const SESSION_FILE: &str = "auth-session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Bearer,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Bearer => f.write_str("Bearer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technician {
    #[serde(rename = "idTecnico")]
    pub id: i64,
    pub email: Option<String>,
    #[serde(rename = "celular")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub login: String,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "tecnico")]
    pub technician: Technician,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token_type: Option<TokenType>,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: Option<AuthUser>,
    pub is_authenticated: bool,
}

impl AuthSession {
    /// `"<tokenType> <token>"`, when both are known.
    pub fn authorization(&self) -> Option<String> {
        match (&self.token_type, &self.token) {
            (Some(kind), Some(token)) => Some(format!("{} {}", kind, token)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginPayload {
    pub token_type: TokenType,
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub user: Option<AuthUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    session: AuthSession,
    /// Credential presented to the host (the `auth-token` cookie).
    #[serde(default)]
    auth_token: Option<String>,
}

/// Current authentication state, optionally persisted to `{data_dir}/auth-session.json`.
pub struct SessionStore {
    data: RwLock<SessionFile>,
    file_path: Option<PathBuf>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(SessionFile::default()),
            file_path: None,
        }
    }

    pub fn load_or_default(data_dir: &Path) -> Self {
        let file_path = data_dir.join(SESSION_FILE);
        let data = if file_path.exists() {
            match std::fs::read_to_string(&file_path) {
                Ok(contents) => match serde_json::from_str::<SessionFile>(&contents) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(
                            "[AUTH] Failed to parse {}, starting signed out: {}",
                            SESSION_FILE,
                            e
                        );
                        SessionFile::default()
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        "[AUTH] Failed to read {}, starting signed out: {}",
                        SESSION_FILE,
                        e
                    );
                    SessionFile::default()
                }
            }
        } else {
            SessionFile::default()
        };

        Self {
            data: RwLock::new(data),
            file_path: Some(file_path),
        }
    }

    pub fn snapshot(&self) -> AuthSession {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .clone()
    }

    pub fn authorization(&self) -> Option<String> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .authorization()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session
            .refresh_token
            .clone()
    }

    pub fn credential(&self) -> Option<String> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .auth_token
            .clone()
    }

    pub fn login(&self, payload: LoginPayload) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.session = AuthSession {
            token_type: Some(payload.token_type),
            token: Some(payload.token),
            refresh_token: payload.refresh_token,
            expires_in: payload.expires_in,
            user: payload.user,
            is_authenticated: true,
        };
        drop(data);
        self.save();
    }

    /// Store the credential presented to the host alongside the session.
    pub fn present_credential(&self, token: &str) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.auth_token = Some(token.to_string());
        drop(data);
        self.save();
    }

    /// Clear the session and the presented credential.
    pub fn logout(&self) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *data = SessionFile::default();
        drop(data);
        tracing::info!("[AUTH] session cleared");
        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.file_path else {
            return;
        };
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let Ok(json) = serde_json::to_vec_pretty(&*data) else {
            return;
        };
        drop(data);

        // Readers in other contexts must never see a half-written file.
        let tmp_path = path.with_file_name(format!(
            ".{}.{}.tmp",
            SESSION_FILE,
            uuid::Uuid::new_v4().simple()
        ));
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp_path, path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            tracing::warn!("[AUTH] Failed to save {}: {}", SESSION_FILE, e);
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
