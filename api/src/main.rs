//! An api for fetching, editing and submitting course grades.

#[macro_use]
extern crate rocket;

mod helpers;
mod routes;

use anyhow::anyhow;
use gradebridge_common::db_util::PgStore;
use helpers::{RequestLogFairing, SharedStore, StoreShutdownFairing};
use rocket::{Build, Rocket};
use rocket_prometheus::PrometheusMetrics;
use tracing_subscriber::EnvFilter;

/// Assemble the service around an already constructed store.
pub fn build_rocket(store: SharedStore) -> Rocket<Build> {
    let prometheus = PrometheusMetrics::new();

    rocket::build()
        .manage(store)
        .attach(RequestLogFairing)
        .attach(StoreShutdownFairing)
        .attach(prometheus.clone())
        .mount(
            "/",
            routes![
                routes::students,
                routes::assignments,
                routes::modules,
                routes::identities,
                routes::grades,
                routes::course_workspace,
            ],
        )
        .mount("/metrics", prometheus)
        .register("/", catchers![routes::default_catcher])
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = PgStore::from_env().map_err(|err| anyhow!(err))?;
    tracing::info!("Grade store ready");

    if let Err(err) = build_rocket(Box::new(store)).launch().await {
        return Err(anyhow!("Server stopped with an error: {err}"));
    }
    Ok(())
}
