pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod state;

pub use state::{ApiState, Backends, SecurityConfig};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::domain::entities::{BlogRecord, PressReleaseRecord, ReportRecord};
use crate::infra::http::middleware::{log_responses, set_request_context};

use handlers::{
    audit, auth, content, content::ContentResource, dashboard, submissions, system, taxonomy,
    users,
};

pub const API_PREFIX: &str = "/api/v1";

/// Transition and lifecycle endpoints accept both PATCH and POST.
fn action_routes<R: ContentResource>(router: Router<ApiState>, base: &str) -> Router<ApiState> {
    let action = |name: &str| format!("{base}/{{id}}/{name}");
    router
        .route(
            &action("soft-delete"),
            post(content::soft_delete::<R>).patch(content::soft_delete::<R>),
        )
        .route(
            &action("restore"),
            post(content::restore::<R>).patch(content::restore::<R>),
        )
        .route(
            &action("schedule"),
            post(content::schedule::<R>).patch(content::schedule::<R>),
        )
        .route(
            &action("cancel-schedule"),
            post(content::cancel_schedule::<R>).patch(content::cancel_schedule::<R>),
        )
        .route(
            &action("submit-review"),
            post(content::submit_review::<R>).patch(content::submit_review::<R>),
        )
        .route(
            &action("approve"),
            post(content::approve::<R>).patch(content::approve::<R>),
        )
        .route(
            &action("reject"),
            post(content::reject::<R>).patch(content::reject::<R>),
        )
        .route(
            &action("unpublish"),
            post(content::unpublish::<R>).patch(content::unpublish::<R>),
        )
}

fn content_routes<R: ContentResource>(router: Router<ApiState>, base: &str) -> Router<ApiState> {
    let router = router
        .route(base, get(content::list::<R>).post(content::create::<R>))
        .route(
            &format!("{base}/{{id}}"),
            get(content::get::<R>)
                .put(content::update::<R>)
                .delete(content::delete::<R>),
        );
    action_routes::<R>(router, base)
}

fn report_routes(router: Router<ApiState>) -> Router<ApiState> {
    let router = router
        .route(
            "/reports",
            get(content::list::<ReportRecord>).post(content::create::<ReportRecord>),
        )
        .route(
            "/reports/{id}",
            get(content::get_report)
                .put(content::update::<ReportRecord>)
                .delete(content::delete::<ReportRecord>),
        )
        .route("/reports/{id}/versions", get(content::report_versions))
        .route(
            "/reports/{id}/images",
            get(content::list_images).post(content::upload_image),
        )
        .route(
            "/reports/{id}/images/{image_id}/soft-delete",
            post(content::soft_delete_image).patch(content::soft_delete_image),
        )
        .route(
            "/reports/{id}/images/{image_id}/restore",
            post(content::restore_image).patch(content::restore_image),
        );
    action_routes::<ReportRecord>(router, "/reports")
}

fn routes() -> Router<ApiState> {
    let router = Router::new()
        .route("/health", get(system::health))
        .route("/csrf-token", get(system::csrf_token))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::me))
        .route("/users", get(users::list).post(users::create))
        .route("/users/by-role/{role}", get(users::by_role))
        .route(
            "/users/{id}",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route(
            "/categories",
            get(taxonomy::list_categories).post(taxonomy::create_category),
        )
        .route(
            "/categories/{id}",
            get(taxonomy::get_category)
                .put(taxonomy::update_category)
                .delete(taxonomy::delete_category),
        )
        .route(
            "/authors",
            get(taxonomy::list_authors).post(taxonomy::create_author),
        )
        .route(
            "/authors/{id}",
            get(taxonomy::get_author)
                .put(taxonomy::update_author)
                .delete(taxonomy::delete_author),
        )
        .route(
            "/forms/submissions",
            get(submissions::list).post(submissions::submit),
        )
        .route(
            "/forms/submissions/{id}",
            get(submissions::get)
                .patch(submissions::update)
                .delete(submissions::delete),
        )
        .route("/audit-logs", get(audit::list))
        .route("/audit-logs/{id}", get(audit::get))
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/dashboard/activity", get(dashboard::activity));

    let router = report_routes(router);
    let router = content_routes::<BlogRecord>(router, "/blogs");
    content_routes::<PressReleaseRecord>(router, "/press-releases")
}

/// Build the `/api/v1` router. Layers run outer to inner: request context, response
/// logging, rate limiting, CSRF, principal resolution.
pub fn build_router(state: ApiState, max_body_bytes: usize) -> Router {
    Router::new()
        .nest(API_PREFIX, routes())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_principal,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
