use actix_web::{HttpResponse, Responder, get};

macros_utils::routes! {
    route health_route,
}

/// Liveness probe, reachable without credentials.
/// The status alone is the answer, there is no body.
#[get("/")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}
