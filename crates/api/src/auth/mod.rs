//! Authentication module for LiteMaaS

pub mod api_key;
pub mod jwt;
pub mod middleware;

pub use api_key::ApiKeyManager;
pub use jwt::{Claims, JwtError, JwtManager, TokenSubject, TokenType};
pub use middleware::{rate_limit, require_auth, AuthUser};
