pub mod password;
pub mod tokens;

pub use password::{compute_password_hash, verify_password_hash, AuthError};
pub use tokens::{AccessClaims, RefreshClaims, TokenSettings};
