use actix_web::{Responder, delete, get, post, web};
use pinger_service::{JobRegistry, JobSnapshot, validation::parse_period};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;

macros_utils::routes! {
    route list_jobs,
    route create_job,
    route show_job,
    route stop_job,
    route restart_job,
    route delete_job,
}

#[derive(Debug, Deserialize)]
pub struct CreateJob {
    #[serde(alias = "Period")]
    period: String,
    #[serde(alias = "Url")]
    url: String,
}

type JobResult = Result<web::Json<JobSnapshot>, ApiError>;

#[get("/jobs")]
pub async fn list_jobs(registry: web::Data<JobRegistry>) -> impl Responder {
    web::Json(registry.list().await)
}

#[post("/jobs")]
pub async fn create_job(registry: web::Data<JobRegistry>, body: web::Json<CreateJob>) -> JobResult {
    let CreateJob { period, url } = body.into_inner();
    let period = parse_period(&period)?;

    let job = registry.create(&url, period).await?;
    info!(job = %job.id, url = %job.url, period = %job.period, "Job created");
    Ok(web::Json(job))
}

#[get("/jobs/{id}")]
pub async fn show_job(registry: web::Data<JobRegistry>, id: web::Path<String>) -> JobResult {
    Ok(web::Json(registry.get(&id).await?))
}

#[post("/jobs/{id}/_stop")]
pub async fn stop_job(registry: web::Data<JobRegistry>, id: web::Path<String>) -> JobResult {
    Ok(web::Json(registry.stop(&id).await?))
}

#[post("/jobs/{id}/_restart")]
pub async fn restart_job(registry: web::Data<JobRegistry>, id: web::Path<String>) -> JobResult {
    Ok(web::Json(registry.restart(&id).await?))
}

#[delete("/jobs/{id}")]
pub async fn delete_job(registry: web::Data<JobRegistry>, id: web::Path<String>) -> JobResult {
    Ok(web::Json(registry.delete(&id).await?))
}
