//! Bearer tokens and their server-side validation.
//!
//! A token is issued once at registration or login and then attached as
//! `authorization` metadata to every stream the peer opens.

pub mod interceptor;
pub mod token;

pub use interceptor::{principal, AuthInterceptor};
pub use token::{Principal, Token, TokenIssuer};
