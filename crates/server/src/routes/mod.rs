use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::DeploymentImpl;

pub mod accounting;
pub mod activity;
pub mod chat;
pub mod comments;
pub mod documents;
pub mod health;
pub mod leads;
pub mod messages;
pub mod planning;
pub mod reports;
pub mod users;

pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .merge(health::router(&deployment))
        .merge(users::router(&deployment))
        .merge(leads::router(&deployment))
        .merge(comments::router(&deployment))
        .merge(accounting::router(&deployment))
        .merge(planning::router(&deployment))
        .merge(documents::router(&deployment))
        .merge(messages::router(&deployment))
        .merge(reports::router(&deployment))
        .merge(chat::router(&deployment))
        .merge(activity::router(&deployment));

    Router::new()
        .nest("/api", api)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
