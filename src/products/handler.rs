use super::model::{QueryError, QueryFailed};
use super::utils::row_to_json;
use crate::utils::{underlying_error, ApiTags};
use poem::web::Data;
use poem_openapi::{payload::Json, OpenApi};
use serde_json::Value;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool},
    Executor,
};
use tracing::{debug, error};

pub const PRODUCTS_QUERY: &str = "SELECT * FROM products";

#[derive(Default)]
pub struct Products;

#[OpenApi(tag = "ApiTags::Products")]
impl Products {
    /// List every product row as stored
    #[oai(path = "/products", method = "get", operation_id = "products::list")]
    async fn list(
        &self,
        pool: Data<&MySqlPool>,
        options: Data<&MySqlConnectOptions>,
    ) -> Result<Json<Vec<Value>>, QueryFailed> {
        match fetch_products(pool.0, options.0).await {
            Ok(rows) => {
                debug!(rows = rows.len(), "Fetched products");
                Ok(Json(rows))
            }
            Err(e) => {
                let err = QueryError::new(&e, PRODUCTS_QUERY);
                error!(
                    code = %err.code,
                    errno = ?err.errno,
                    error = %err.sql_message,
                    "Products query failed"
                );
                Err(err.into())
            }
        }
    }
}

// plain &str goes over the text protocol, so every cell decodes as its textual form
async fn fetch_products(
    pool: &MySqlPool,
    options: &MySqlConnectOptions,
) -> Result<Vec<Value>, sqlx::Error> {
    let rows = match pool.fetch_all(PRODUCTS_QUERY).await {
        Ok(rows) => rows,
        Err(e) => return Err(underlying_error(e, options).await),
    };
    rows.iter().map(row_to_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use poem::{http::StatusCode, test::TestClient, Endpoint, EndpointExt, Route};
    use poem_openapi::OpenApiService;
    use serde_json::json;
    use sqlx::mysql::MySqlPoolOptions;
    use std::{str::FromStr, time::Duration};

    fn unreachable_options() -> MySqlConnectOptions {
        MySqlConnectOptions::from_str("mysql://root@127.0.0.1:1/products").unwrap()
    }

    fn unreachable_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy_with(unreachable_options())
    }

    fn client(pool: MySqlPool, options: MySqlConnectOptions) -> TestClient<impl Endpoint> {
        let api = OpenApiService::new(Products, "test", "1.0");
        TestClient::new(Route::new().nest("/", api).data(pool).data(options))
    }

    #[tokio::test]
    async fn unreachable_database_returns_error_object() {
        let resp = client(unreachable_pool(), unreachable_options()).get("/products").send().await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = resp.0.into_body().into_json().await.unwrap();
        assert_eq!(body["code"], json!("IO"));
        assert!(body["sqlMessage"]
            .as_str()
            .unwrap()
            .to_lowercase()
            .contains("refused"));
        assert_eq!(body["fatal"], json!(true));
        assert_eq!(body["sql"], json!(PRODUCTS_QUERY));
    }

    #[tokio::test]
    async fn concurrent_requests_all_fail_cleanly() {
        let cli = client(unreachable_pool(), unreachable_options());

        let (a, b, c) = tokio::join!(
            cli.get("/products").send(),
            cli.get("/products").send(),
            cli.get("/products").send(),
        );
        for resp in [a, b, c] {
            resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        }

        // still serving afterwards
        let resp = cli.get("/products").send().await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    #[ignore = "needs a MySQL server at TEST_DATABASE_URL"]
    async fn lists_every_row_unchanged() {
        let options =
            MySqlConnectOptions::from_str(&std::env::var("TEST_DATABASE_URL").unwrap()).unwrap();
        // one connection, so the temporary table is visible to the handler's query
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await
            .unwrap();

        sqlx::query(
            "CREATE TEMPORARY TABLE products (
                id INT UNSIGNED PRIMARY KEY,
                name VARCHAR(64) NOT NULL,
                price DECIMAL(10, 2),
                attributes JSON,
                in_stock BOOLEAN NOT NULL,
                added_at DATETIME NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO products VALUES
                (1, 'Coffee mug', 9.50, '{\"color\": \"red\"}', 1, '2024-03-01 12:30:00'),
                (2, 'Desk lamp', NULL, NULL, 0, '2024-03-02 08:00:00'),
                (3, 'Notebook', 3.00, '[]', 1, '2024-03-03 17:45:10')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let resp = client(pool, options).get("/products").send().await;
        resp.assert_status_is_ok();

        let body: Value = resp.0.into_body().into_json().await.unwrap();
        assert_eq!(
            body,
            json!([
                {"id": 1, "name": "Coffee mug", "price": "9.50", "attributes": {"color": "red"}, "in_stock": 1, "added_at": "2024-03-01T12:30:00"},
                {"id": 2, "name": "Desk lamp", "price": null, "attributes": null, "in_stock": 0, "added_at": "2024-03-02T08:00:00"},
                {"id": 3, "name": "Notebook", "price": "3.00", "attributes": [], "in_stock": 1, "added_at": "2024-03-03T17:45:10"},
            ])
        );
    }
}
