pub mod health;
pub mod questionnaire;
pub mod respond;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{
    auth::require_bearer_auth,
    cors::api_cors,
    rate_limit::{rps_middleware, RateLimiter},
};
use crate::AppState;

/// Builds the HTTP surface: `/health` stays open, everything else needs a
/// bearer token and shares one request budget.
pub fn router(state: AppState, rps: u32) -> Router {
    let authoring = Router::new()
        .route(
            "/questionnaires/events/:event_id/draft",
            post(questionnaire::create_draft),
        )
        .route(
            "/questionnaires/events/:event_id",
            get(questionnaire::get_for_event),
        )
        .route("/questionnaires/:id", put(questionnaire::update_questionnaire))
        .route(
            "/questionnaires/:id/questions",
            post(questionnaire::add_question),
        )
        .route(
            "/questionnaires/:id/questions/:question_id",
            put(questionnaire::update_question).delete(questionnaire::delete_question),
        )
        .route(
            "/questions/:question_id/alternatives",
            post(questionnaire::add_alternative),
        )
        .route(
            "/questions/:question_id/alternatives/:alternative_id",
            put(questionnaire::update_alternative).delete(questionnaire::delete_alternative),
        )
        .route("/questionnaires/:id/publish", post(questionnaire::publish))
        .route("/questionnaires/:id/audit", get(questionnaire::audit_trail));

    let responding = Router::new()
        .route(
            "/questionnaires/available/users/:user_id",
            get(respond::list_available),
        )
        .route(
            "/questionnaires/:id/respond/classes/:class_id",
            get(respond::respond),
        )
        .route(
            "/questionnaires/:id/start/classes/:class_id",
            post(respond::start),
        )
        .route(
            "/questionnaires/:id/submit/classes/:class_id",
            post(respond::submit),
        )
        .route(
            "/questionnaires/:id/my-attempt/classes/:class_id",
            get(respond::my_attempt),
        );

    let api = authoring
        .merge(responding)
        .route_layer(axum::middleware::from_fn(require_bearer_auth))
        .layer(axum::middleware::from_fn_with_state(
            RateLimiter::new(rps),
            rps_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state)
        .layer(api_cors())
        .layer(TraceLayer::new_for_http())
}
