use anyhow::Context;
use poem::{
    http::StatusCode,
    web::headers::authorization::Basic,
    web::headers::{self, HeaderMapExt},
    Endpoint, Error as PoemError, Middleware, Request, Response, Result as PoemResult,
};
use poem_openapi::Tags;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions},
    ConnectOptions, Connection,
};
use std::{env, str::FromStr, time::Duration};
use tracing::{error, info, warn};

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Tags)]
pub enum ApiTags {
    /// Health check endpoints
    HealthCheck,
    /// Product catalogue
    Products,
}

/// Connection options from `DATABASE_URL`, or from the `DB_*` variables when it is unset.
pub fn get_db_options() -> anyhow::Result<MySqlConnectOptions> {
    if let Ok(database_url) = env::var("DATABASE_URL") {
        return MySqlConnectOptions::from_str(&database_url).context("DATABASE_URL is invalid");
    }

    let mut options = MySqlConnectOptions::new()
        .host(&env::var("DB_HOST").unwrap_or("localhost".to_string()))
        .port(env_number("DB_PORT", 3306)?)
        .username(&env::var("DB_USER").unwrap_or("root".to_string()))
        .database(&env::var("DB_NAME").unwrap_or("products".to_string()));

    if let Ok(password) = env::var("DB_PASSWORD") {
        options = options.password(&password);
    }

    Ok(options)
}

/// Builds the shared pool and tries one connection. A failed attempt is
/// logged and the pool is returned anyway, so requests fail later instead.
pub async fn get_db_pool(options: MySqlConnectOptions) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(env_number("DB_MAX_CONNECTIONS", 1)?)
        .acquire_timeout(Duration::from_secs(env_number("DB_ACQUIRE_TIMEOUT_SECS", 5)?))
        .connect_lazy_with(options.clone());

    match pool.acquire().await {
        Ok(_) => info!("Connected to MySQL database"),
        Err(e) => {
            let e = underlying_error(e, &options).await;
            error!(error = %e, "Database connection failed");
        }
    }

    Ok(pool)
}

/// The pool hides connect failures behind `PoolTimedOut`. One direct
/// connection attempt recovers the driver error (refused, unknown host, bad
/// credentials). Any other error is returned unchanged.
pub async fn underlying_error(err: sqlx::Error, options: &MySqlConnectOptions) -> sqlx::Error {
    if !matches!(err, sqlx::Error::PoolTimedOut) {
        return err;
    }

    match options.connect().await {
        Ok(conn) => {
            // reachable again; the timeout was plain contention
            let _ = conn.close().await;
            err
        }
        Err(connect_err) => connect_err,
    }
}

fn env_number<T: FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", name, value)),
        Err(_) => Ok(default),
    }
}

pub fn get_host(port: u16) -> String {
    env::var("HOST").unwrap_or(format!("http://localhost:{}", port))
}

pub fn get_port() -> u16 {
    parse_port(env::var("PORT").ok())
}

fn parse_port(value: Option<String>) -> u16 {
    match value {
        Some(value) => match value.trim().parse() {
            Ok(port) => port,
            Err(_) => {
                warn!(port = %value, default = DEFAULT_PORT, "Ignoring invalid PORT");
                DEFAULT_PORT
            }
        },
        None => DEFAULT_PORT,
    }
}

const DOCS_REALM: &str = "Basic realm=\"products-backend docs\", charset=\"UTF-8\"";

/// Basic-auth gate for the API docs.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        BasicAuth {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `None` unless both `BASIC_AUTH_USERNAME` and `BASIC_AUTH_PASSWORD` are set.
    pub fn from_env() -> Option<Self> {
        let username = env::var("BASIC_AUTH_USERNAME").ok()?;
        let password = env::var("BASIC_AUTH_PASSWORD").ok()?;
        Some(BasicAuth::new(username, password))
    }

    fn accepts(&self, req: &Request) -> bool {
        match req.headers().typed_get::<headers::Authorization<Basic>>() {
            // both halves are always compared so timing does not reveal which one failed
            Some(auth) => {
                let username_ok = constant_time_eq(auth.0.username(), &self.username);
                let password_ok = constant_time_eq(auth.0.password(), &self.password);
                username_ok & password_ok
            }
            None => false,
        }
    }
}

fn constant_time_eq(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    let diff = given
        .iter()
        .zip(expected)
        .fold(given.len() ^ expected.len(), |acc, (a, b)| {
            acc | usize::from(a ^ b)
        });
    diff == 0
}

impl<E: Endpoint> Middleware<E> for BasicAuth {
    type Output = DocsAuthEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        DocsAuthEndpoint {
            ep,
            auth: self.clone(),
        }
    }
}

pub struct DocsAuthEndpoint<E> {
    ep: E,
    auth: BasicAuth,
}

impl<E: Endpoint> Endpoint for DocsAuthEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, req: Request) -> PoemResult<Self::Output> {
        if self.auth.accepts(&req) {
            return self.ep.call(req).await;
        }

        warn!(path = %req.uri().path(), "Rejected docs request");
        Err(PoemError::from_response(
            Response::builder()
                .header("WWW-Authenticate", DOCS_REALM)
                .status(StatusCode::UNAUTHORIZED)
                .finish(),
        ))
    }
}
