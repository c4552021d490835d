#[deny(clippy::all)]
use dotenv::dotenv;
use poem::{
    listener::TcpListener,
    middleware::{Cors, Tracing},
    Endpoint, EndpointExt, Route, Server,
};
use poem_openapi::OpenApiService;
use products::products_api;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool};
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utils::{get_db_options, get_db_pool, BasicAuth};

mod health;
mod products;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // This line loads the environment variables from the ".env" file.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = get_db_options()?;
    let pool = get_db_pool(options.clone()).await?;
    let port = utils::get_port();
    let hostname = utils::get_host(port);

    let route = app(pool.clone(), options, hostname, BasicAuth::from_env()).await;

    info!(port, "Server running");
    Server::new(TcpListener::bind(format!("0.0.0.0:{}", port)))
        .run_with_graceful_shutdown(
            route,
            async move {
                let _ = tokio::signal::ctrl_c().await;
                pool.close().await;
            },
            Some(Duration::from_secs(5)),
        )
        .await?;

    Ok(())
}

/// API docs are mounted only when `docs_auth` is given. `options` rides along
/// with the pool so handlers can diagnose connect failures.
async fn app(
    pool: MySqlPool,
    options: MySqlConnectOptions,
    hostname: String,
    docs_auth: Option<BasicAuth>,
) -> impl Endpoint {
    let health_api = health::health_checks(pool.clone()).await;
    let products_api = products_api().await;

    let api_service = OpenApiService::new((health_api, products_api), "Products Backend", "1.0")
        .server(hostname);

    let mut route = Route::new();
    if let Some(auth) = docs_auth {
        let ui = api_service.swagger_ui().with(auth.clone());
        let spec = api_service.spec_endpoint_yaml().with(auth);
        route = route.nest("/swagger", ui).nest("/swagger/spec", spec);
    }

    route
        .nest("/", api_service)
        .with(Cors::new())
        .with(Tracing)
        .data(pool)
        .data(options)
}
