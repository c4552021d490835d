mod handler;
mod model;
mod utils;

pub async fn products_api() -> handler::Products {
    handler::Products::default()
}
