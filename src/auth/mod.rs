//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! TokenProvider::get_token(cancel)
//!     → ResponseCache["spresso.auth.token.{group}"]  hit and now < expires_at - leeway → token
//!     → ResilientExecutor("token")
//!         → POST {auth_base_url}/identity/v1/public/token  (client_credentials grant)
//!     → cache token until expires_at - leeway
//! ```
//!
//! # Design Decisions
//! - The cached payload carries an absolute `expires_at`, so a cache hit never extends a token's life
//! - 401/403 are terminal; a 400 is reported as `Unknown` but never retried
//! - Cache write failures are logged and ignored

pub mod token;
pub mod types;

pub use token::{TokenProvider, TOKEN_LEEWAY_SECS, TOKEN_PATH};
pub use types::{AccessToken, AuthError};
