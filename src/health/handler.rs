use crate::utils::ApiTags;
use poem::{error::InternalServerError, Result};
use poem_openapi::{payload::PlainText, OpenApi};
use sqlx::mysql::MySqlPool;

pub const BANNER: &str = "Backend is working!";

pub struct HealthCheck {
    pool: MySqlPool,
}

#[OpenApi(tag = "ApiTags::HealthCheck")]
impl HealthCheck {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Confirms the backend is up
    #[oai(path = "/", method = "get", operation_id = "health::index")]
    async fn index(&self) -> PlainText<String> {
        PlainText(BANNER.to_string())
    }

    #[oai(path = "/health/liveness", method = "get")]
    async fn liveness(&self) -> PlainText<String> {
        PlainText("OK".to_string())
    }

    /// OK once the database answers
    #[oai(path = "/health/readiness", method = "get")]
    async fn readiness(&self) -> Result<PlainText<String>> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(InternalServerError)?;

        Ok(PlainText("OK".to_string()))
    }
}
