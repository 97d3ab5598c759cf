pub mod session;

pub use session::{AuthSession, AuthUser, LoginPayload, SessionStore, Technician, TokenType};
