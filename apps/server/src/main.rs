#![warn(clippy::all, clippy::pedantic)]

use std::{net::SocketAddr, sync::Arc};

use actix_web::{App, HttpServer, middleware::Logger, web};
use dotenvy::dotenv;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod auth;
mod error;
mod routes;

use error::AppError;
use logger::init_tracing;
use pinger_service::{
    Config, HttpProber, JobRegistry, LibsqlStore, PingSearch, SinkPump, database, pipeline,
};

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    if let Err(e) = dotenv() {
        // A missing .env is the normal case in deployments
        if !e.not_found() {
            eprintln!("Failed to load .env: {e}");
        }
    }
    init_tracing();

    let config = Config::from_env();
    info!("{config}");

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    run_server(config, addr).await
}

async fn run_server(config: Config, addr: SocketAddr) -> Result<(), AppError> {
    let pool = database::open(&config.database).await?;
    let store = Arc::new(LibsqlStore::new(pool));

    let (sender, receiver) = pipeline::channel(config.pipeline.channel);
    let pump = SinkPump::new(receiver, store.clone(), config.pipeline.failure);
    let stats = pump.stats();
    let pump_shutdown = CancellationToken::new();
    let pump_handle = pump.spawn(pump_shutdown.clone());

    let prober = HttpProber::new(config.probe_timeout)?;
    let registry = web::Data::new(JobRegistry::new(Arc::new(prober), sender, Handle::current()));
    let search = web::Data::new(PingSearch::new(store));
    let credentials = web::Data::new(config.credentials.clone());

    info!(%addr, "Starting management server");
    let server = {
        let registry = registry.clone();
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .app_data(registry.clone())
                .app_data(search.clone())
                .app_data(credentials.clone())
                .app_data(routes::json_config())
                .configure(routes::routes)
        })
        .bind(addr)?
        .run()
    };

    // A pump that halts on its own takes the server down with it
    let watcher = {
        let server_handle = server.handle();
        let pump_shutdown = pump_shutdown.clone();
        tokio::spawn(async move {
            let result = pump_handle.await;
            if !pump_shutdown.is_cancelled() {
                error!("Sink pump stopped unexpectedly, shutting down");
                server_handle.stop(true).await;
            }
            result
        })
    };
    let served = server.await;

    let stopped = registry.shutdown().await;
    info!(jobs = stopped, "Stopped all jobs");

    pump_shutdown.cancel();
    let pumped = match watcher.await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) | Err(e) => {
            warn!("Sink pump task failed: {e}");
            Ok(())
        }
    };
    info!(
        persisted = stats.persisted(),
        dead_lettered = stats.dead_lettered(),
        dropped = stats.dropped(),
        "Shutdown complete"
    );

    served?;
    pumped?;
    Ok(())
}
