use actix_web::{error::InternalError, middleware::from_fn, web};

use crate::{auth::basic_auth, error::ApiError};

mod health;
mod jobs;
mod pings;

/// Health stays open, everything else sits behind basic auth
pub fn routes(cfg: &mut web::ServiceConfig) {
    health::routes(cfg);
    cfg.service(
        web::scope("")
            .wrap(from_fn(basic_auth))
            .configure(jobs::routes)
            .configure(pings::routes),
    );
}

/// Malformed JSON bodies answer 400 with the usual error body
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = actix_web::ResponseError::error_response(&ApiError::BadRequest(err.to_string()));
        InternalError::from_response(err, response).into()
    })
}


#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, http::header, test};
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde_json::Value;

    use super::testing::{TestState, authorized};

    #[actix_web::test]
    async fn test_missing_credentials_challenge() {
        let state = TestState::new().await;
        let app = test::init_service(state.app()).await;

        for uri in ["/jobs", "/pings"] {
            let res = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(res.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Basic");
        }
    }

    #[actix_web::test]
    async fn test_wrong_and_malformed_credentials() {
        let state = TestState::new().await;
        let app = test::init_service(state.app()).await;

        let wrong = format!("Basic {}", STANDARD.encode("foo:baz"));
        let req = test::TestRequest::get().uri("/jobs").insert_header(("Authorization", wrong));
        let res = test::call_service(&app, req.to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/jobs").insert_header(("Authorization", "Basic !!!"));
        let res = test::call_service(&app, req.to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "Bad credentials encoding");

        let bearer = format!("Bearer {}", STANDARD.encode("foo:bar"));
        let req = test::TestRequest::get().uri("/jobs").insert_header(("Authorization", bearer));
        let res = test::call_service(&app, req.to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health_bypasses_auth_but_jobs_do_not() {
        let state = TestState::new().await;
        let app = test::init_service(state.app()).await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = test::call_service(&app, authorized(test::TestRequest::get().uri("/jobs")).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body, Value::Array(vec![]));
    }
}
