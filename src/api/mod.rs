pub mod error;
pub mod forecast;
pub mod health;
pub mod response;
pub mod status;
pub mod v1;

use axum::http::{HeaderValue, Method};
use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{config::Config, controller::AppState};

pub fn router(state: AppState, cfg: &Config) -> Router {
    let mut router = Router::new().nest("/api/v1", v1::router(state));

    if cfg.server.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_static("http://localhost:3000")))
            .allow_methods([Method::GET]);
        router = router.layer(cors);
    }

    router
        .layer(ServiceBuilder::new().layer(TimeoutLayer::new(Duration::from_secs(cfg.server.request_timeout_secs))))
        .layer(TraceLayer::new_for_http())
}
