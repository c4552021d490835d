use sqlx::mysql::MySqlPool;

pub mod handler;

pub async fn health_checks(pool: MySqlPool) -> handler::HealthCheck {
    handler::HealthCheck::new(pool)
}
