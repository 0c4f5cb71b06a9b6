//! Authentication of incoming upgrade requests

pub mod authenticator;
pub mod token;

// Re-export main components
pub use authenticator::ConnectionAuthenticator;
pub use token::{Claims, Identity, JwtTokenValidator, TokenValidator};
