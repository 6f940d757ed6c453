//! Request handler definitions.
//!
//! Every cron handler has the same shape: run the pipeline, wrap its result in a [`RunSummary`],
//! return 200. Partial failure lives inside the summary; only a pipeline-level crash becomes a
//! 500 through [`ServerError`]. Authentication happens in the scope wrapper in
//! [`crate::server`], not here.

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use log::*;
use treasury_engine::db_types::Actor;

use crate::{
    auth::admin_id,
    data_objects::RunSummary,
    errors::ServerError,
    server::{Batcher, Drain, Executor, Monitor, Sweeper, TreasuryMon},
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Cron jobs  --------------------------------------------------

#[post("/deposits")]
pub async fn run_deposit_monitor(api: web::Data<Monitor>) -> Result<HttpResponse, ServerError> {
    let result = api.run().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

#[post("/payout-batches")]
pub async fn run_payout_batcher(api: web::Data<Batcher>) -> Result<HttpResponse, ServerError> {
    let result = api.run().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

#[post("/payouts")]
pub async fn run_payout_executor(api: web::Data<Executor>) -> Result<HttpResponse, ServerError> {
    let result = api.run(Actor::Cron).await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

#[post("/sweep/fund")]
pub async fn run_sweep_fund(api: web::Data<Sweeper>) -> Result<HttpResponse, ServerError> {
    let result = api.run_fund_stage().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

#[post("/sweep/dispatch")]
pub async fn run_sweep_dispatch(api: web::Data<Sweeper>) -> Result<HttpResponse, ServerError> {
    let result = api.run_dispatch_stage().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

#[post("/sweep/verify")]
pub async fn run_sweep_verify(api: web::Data<Sweeper>) -> Result<HttpResponse, ServerError> {
    let result = api.run_verify_stage().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

#[post("/treasury")]
pub async fn run_treasury_monitor(api: web::Data<TreasuryMon>) -> Result<HttpResponse, ServerError> {
    let result = api.run().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

#[post("/outbox")]
pub async fn run_outbox_drain(api: web::Data<Drain>) -> Result<HttpResponse, ServerError> {
    let result = api.run().await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(RunSummary::from(result)))
}

// ----------------------------------------------   Admin  ------------------------------------------------------

/// Manually pays out a single commission, attributed to the calling admin.
#[post("/payouts/{commission_id}")]
pub async fn execute_single_payout(
    req: HttpRequest,
    path: web::Path<i64>,
    api: web::Data<Executor>,
) -> Result<HttpResponse, ServerError> {
    let commission_id = path.into_inner();
    let actor = Actor::Admin(admin_id(&req));
    info!("💸️ Manual payout of commission #{commission_id} requested by {actor}");
    let outcome = api
        .execute(commission_id, actor)
        .await
        .map_err(|e| match e {
            treasury_engine::PayoutError::CommissionNotFound(id) => {
                ServerError::NoRecordFound(format!("Commission {id}"))
            },
            other => ServerError::BackendError(other.to_string()),
        })?;
    Ok(HttpResponse::Ok().json(outcome))
}
