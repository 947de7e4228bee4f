use actix_web::{get, web};
use pinger_service::{Observation, PingSearch, SearchParams};

use crate::error::ApiError;

macros_utils::routes! {
    route search_pings,
}

/// `GET /pings?url=&last=&statuscode=`; unparsable filters are ignored
#[get("/pings")]
pub async fn search_pings(
    search: web::Data<PingSearch>,
    params: web::Query<SearchParams>,
) -> Result<web::Json<Vec<Observation>>, ApiError> {
    Ok(web::Json(search.search_params(params.into_inner()).await?))
}
