//! Basic-auth guard for the management routes.

use actix_web::{
    Error,
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use pinger_service::config::Credentials;
use tracing::debug;

use crate::error::ApiError;

/// Split an `Authorization` header value into username and password.
///
/// The value must be exactly `Basic <base64(user:password)>`.
pub fn parse_basic(value: &str) -> Result<(String, String), ApiError> {
    let parts: Vec<&str> = value.split(' ').collect();
    let [scheme, token] = parts.as_slice() else {
        return Err(ApiError::BadRequest("Bad authorization header".into()));
    };

    let decoded = STANDARD
        .decode(token)
        .map_err(|_| ApiError::BadRequest("Bad credentials encoding".into()))?;

    let separator = decoded.iter().position(|&b| b == b':');
    let (Some(index), true) = (separator, *scheme == "Basic") else {
        return Err(ApiError::BadRequest("Bad authorization header".into()));
    };

    let username = String::from_utf8_lossy(&decoded[..index]).into_owned();
    let password = String::from_utf8_lossy(&decoded[index + 1..]).into_owned();
    Ok((username, password))
}

fn check(req: &ServiceRequest) -> Result<(), ApiError> {
    let credentials = req
        .app_data::<web::Data<Credentials>>()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("credentials not configured")))?;

    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Err(ApiError::Unauthorized("Unauthorized".into()));
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("Bad authorization header".into()))?;

    let (username, password) = parse_basic(value)?;
    if credentials.matches(&username, &password) {
        Ok(())
    } else {
        debug!(%username, path = %req.path(), "Rejected credentials");
        Err(ApiError::Unauthorized("Unauthorized".into()))
    }
}

/// `from_fn` middleware rejecting requests without the configured credentials
pub async fn basic_auth<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    match check(&req) {
        Ok(()) => next.call(req).await.map(ServiceResponse::map_into_left_body),
        Err(e) => Ok(req.error_response(e).map_into_right_body()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(raw: &str) -> String {
        STANDARD.encode(raw)
    }

    #[test]
    fn test_parse_valid_header() {
        let (user, password) = parse_basic(&format!("Basic {}", encode("foo:bar"))).unwrap();
        assert_eq!((user.as_str(), password.as_str()), ("foo", "bar"));

        // Only the first colon separates, passwords may contain more
        let (user, password) = parse_basic(&format!("Basic {}", encode("foo:b:a:r"))).unwrap();
        assert_eq!((user.as_str(), password.as_str()), ("foo", "b:a:r"));

        let (user, password) = parse_basic(&format!("Basic {}", encode(":"))).unwrap();
        assert!(user.is_empty() && password.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_headers() {
        let token = encode("foo:bar");
        let cases = [
            format!("Basic{token}"),
            format!("Basic  {token}"),
            format!("Basic {token} extra"),
            "Basic not*base64".to_string(),
            format!("Bearer {token}"),
            format!("basic {token}"),
            format!("Basic {}", encode("foobar")),
        ];

        for value in cases {
            assert!(
                matches!(parse_basic(&value), Err(ApiError::BadRequest(_))),
                "{value:?} should be rejected"
            );
        }
    }
}
