use poem_openapi::{payload::Json, ApiResponse, Object};
use serde::Serialize;
use sqlx::mysql::MySqlDatabaseError;

/// Why a products query failed
#[derive(Debug, Object, Clone, Eq, PartialEq, Serialize)]
#[oai(skip_serializing_if_is_none, rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    /// Class of failure: DATABASE, IO, TLS, PROTOCOL, POOL_TIMED_OUT, POOL_CLOSED, DECODE, CONFIGURATION or UNKNOWN
    pub code: String,

    /// MySQL server error number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<u16>,

    /// SQLSTATE reported by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,

    /// Driver message
    pub sql_message: String,

    /// Whether the connection itself failed rather than the statement
    pub fatal: bool,

    /// Statement that failed
    pub sql: String,
}

impl QueryError {
    pub fn new(err: &sqlx::Error, sql: &str) -> Self {
        let (code, fatal) = match err {
            sqlx::Error::Database(_) => ("DATABASE", false),
            sqlx::Error::Io(_) => ("IO", true),
            sqlx::Error::Tls(_) => ("TLS", true),
            sqlx::Error::Protocol(_) => ("PROTOCOL", true),
            sqlx::Error::PoolTimedOut => ("POOL_TIMED_OUT", true),
            sqlx::Error::PoolClosed => ("POOL_CLOSED", true),
            sqlx::Error::Configuration(_) => ("CONFIGURATION", true),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => ("DECODE", false),
            _ => ("UNKNOWN", false),
        };

        let (errno, sql_state) = match err {
            sqlx::Error::Database(db_err) => (
                db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(MySqlDatabaseError::number),
                db_err.code().map(|code| code.into_owned()),
            ),
            _ => (None, None),
        };

        let sql_message = match err {
            sqlx::Error::Database(db_err) => db_err.message().to_string(),
            _ => err.to_string(),
        };

        QueryError {
            code: code.to_string(),
            errno,
            sql_state,
            sql_message,
            fatal,
            sql: sql.to_string(),
        }
    }
}

#[derive(ApiResponse)]
pub enum QueryFailed {
    /// The query could not be run or its rows could not be read
    #[oai(status = 500)]
    InternalServerError(Json<QueryError>),
}

impl From<QueryError> for QueryFailed {
    fn from(err: QueryError) -> Self {
        QueryFailed::InternalServerError(Json(err))
    }
}
