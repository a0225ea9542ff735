pub mod v1;

use axum::Router;

use crate::infra::app_state::AppState;

pub fn create_api_router() -> Router<AppState> {
    Router::new().nest("/v1", v1::create_v1_router())
}
