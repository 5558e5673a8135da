pub mod answers;
pub mod health;
pub mod tests;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{
    auth::{require_bearer_auth, require_role},
    cors::exam_cors,
    rate_limit::{rps_middleware, RateLimiter},
};
use crate::models::user::Role;
use crate::AppState;

/// Full application router. `main` adds nothing but the listener.
pub fn router(state: AppState) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let admin_api = Router::new()
        .route("/tests", post(tests::create_test).get(tests::list_tests))
        .route("/tests/check-title/:title", get(tests::check_title))
        .route("/tests/:id", put(tests::update_test).delete(tests::delete_test))
        .route_layer(from_fn_with_state(Role::Admin, require_role));

    let student_api = Router::new()
        .route("/tests/student", get(tests::student_tests))
        .route("/tests/student/my-tests", get(tests::my_tests))
        .route("/tests/:id/start", post(tests::start_test))
        .route("/tests/:id/submit", post(tests::submit_test))
        .route("/answers/start-exam", post(answers::start_exam))
        .route(
            "/answers/exam-status/:domain_id/:section",
            get(answers::exam_status),
        )
        .route(
            "/answers/my-answers/:domain_id/:section",
            get(answers::my_answers),
        )
        .route("/answers/submit", post(answers::submit_answer))
        .route_layer(from_fn_with_state(Role::Student, require_role));

    let staff_api = Router::new()
        .route("/answers/marks/add", post(answers::add_mark))
        .route("/answers/marks/edit/:id", put(answers::edit_mark))
        .route("/answers/calculate-total", post(answers::calculate_total))
        .route("/answers/:id/image", delete(answers::remove_image))
        .route("/answers/:id", delete(answers::delete_answer))
        .route_layer(from_fn_with_state(Role::Staff, require_role));

    let shared_api = Router::new().route("/tests/:id", get(tests::get_test));

    let authenticated = admin_api
        .merge(student_api)
        .merge(staff_api)
        .merge(shared_api)
        .route_layer(from_fn_with_state(state.clone(), require_bearer_auth));

    base_routes
        .merge(authenticated)
        .layer(from_fn_with_state(
            RateLimiter::new(state.config.api_rps),
            rps_middleware,
        ))
        .with_state(state)
        .layer(exam_cors())
        .layer(TraceLayer::new_for_http())
}
