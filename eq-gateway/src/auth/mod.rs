//! Request authentication and identity context resolution

mod context;
mod jwt;

pub use context::{resolve_context, resolve_token_context};
pub use jwt::{extract_bearer_token, verify_internal_jwt, JwtClaims};
