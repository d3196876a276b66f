use super::token::{Principal, TokenIssuer};
use crate::proto::AUTHORIZATION_KEY;
use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Resolves the `authorization` metadata of incoming calls into a [`Principal`].
///
/// Calls without the entry pass through untouched (registration and roster
/// queries are open); a present but invalid token is rejected here. Handlers
/// that need an identity read it back with [`principal`].
#[derive(Clone)]
pub struct AuthInterceptor {
    issuer: Arc<TokenIssuer>,
}

impl AuthInterceptor {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let header = match request.metadata().get(AUTHORIZATION_KEY) {
            Some(value) => value
                .to_str()
                .map_err(|_| Status::unauthenticated("Invalid token"))?
                .to_string(),
            None => return Ok(request),
        };

        let principal = self
            .issuer
            .validate(extract_bearer_token(&header))
            .map_err(|e| {
                tracing::debug!("Authentication was not successful: {}", e);
                Status::unauthenticated("Invalid token")
            })?;

        tracing::trace!(?principal, "Token accepted");
        request.extensions_mut().insert(principal);
        Ok(request)
    }
}

/// Returns the principal stored by [`AuthInterceptor`], or `UNAUTHENTICATED`.
pub fn principal<T>(request: &Request<T>) -> Result<Principal, Status> {
    request
        .extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| Status::unauthenticated("Invalid token"))
}

fn extract_bearer_token(header_value: &str) -> &str {
    let trimmed = header_value.trim();
    match trimmed.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;

    fn interceptor() -> (AuthInterceptor, Arc<TokenIssuer>) {
        let issuer = Arc::new(TokenIssuer::new(b"interceptor-test"));
        (AuthInterceptor::new(issuer.clone()), issuer)
    }

    #[test]
    fn test_missing_header_passes_without_principal() {
        let (mut interceptor, _) = interceptor();
        let request = interceptor.call(Request::new(())).unwrap();
        assert!(principal(&request).is_err());
    }

    #[test]
    fn test_valid_token_stores_principal() {
        let (mut interceptor, issuer) = interceptor();
        let token = issuer
            .issue(&Principal::Client {
                login: "carol".into(),
            })
            .unwrap();
        let mut request = Request::new(());
        token.attach(&mut request).unwrap();

        let request = interceptor.call(request).unwrap();
        assert_eq!(
            principal(&request).unwrap(),
            Principal::Client {
                login: "carol".into()
            }
        );
    }

    #[test]
    fn test_bearer_prefix_accepted() {
        let (mut interceptor, issuer) = interceptor();
        let token = issuer
            .issue(&Principal::Client { login: "dan".into() })
            .unwrap();
        let mut request = Request::new(());
        Token::new(format!("Bearer {}", token.as_str()))
            .attach(&mut request)
            .unwrap();
        assert!(interceptor.call(request).is_ok());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let (mut interceptor, _) = interceptor();
        let mut request = Request::new(());
        Token::new("not-a-token").attach(&mut request).unwrap();
        let status = interceptor.call(request).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }
}
