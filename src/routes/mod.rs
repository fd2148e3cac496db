use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod analytics;
pub mod assessments;
pub mod assessor_assignments;
pub mod auth;
pub mod competencies;
pub mod departments;
pub mod employees;
pub mod health;
pub mod job_roles;
pub mod navigation;
pub mod roles;

const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let role_routes = Router::new()
        .route(
            "/",
            get(roles::list_assignments).post(roles::create_assignment),
        )
        .route("/:user_id/:role", delete(roles::delete_assignment));

    let navigation_routes = Router::new()
        .route("/", get(navigation::list_routes))
        .route("/check", get(navigation::check_route));

    let employee_routes = Router::new()
        .route(
            "/",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route("/me", get(employees::get_my_profile))
        .route(
            "/:id",
            get(employees::get_employee).patch(employees::update_employee),
        )
        .route("/:id/departments", put(employees::replace_departments))
        .route(
            "/:id/picture",
            post(employees::upload_picture).delete(employees::delete_picture),
        )
        .route("/:id/assessments", get(assessments::list_for_employee));

    let department_routes = Router::new()
        .route(
            "/",
            get(departments::list_departments).post(departments::create_department),
        )
        .route(
            "/:id",
            patch(departments::update_department)
                .delete(departments::delete_department),
        );

    let job_role_routes = Router::new()
        .route(
            "/",
            get(job_roles::list_job_roles).post(job_roles::create_job_role),
        )
        .route(
            "/:id",
            patch(job_roles::update_job_role).delete(job_roles::delete_job_role),
        )
        .route("/:id/competencies", put(job_roles::replace_competencies));

    let competency_routes = Router::new()
        .route(
            "/",
            get(competencies::list_competencies).post(competencies::create_competency),
        )
        .route(
            "/:id",
            patch(competencies::update_competency)
                .delete(competencies::delete_competency),
        );

    let assessment_routes = Router::new()
        .route("/", post(assessments::create_assessment))
        .route("/:id", get(assessments::get_assessment))
        .route("/:id/self-ratings", put(assessments::put_self_ratings))
        .route("/:id/assessor-ratings", put(assessments::put_assessor_ratings))
        .route(
            "/:id/status",
            patch(assessments::update_status),
        );

    let assignment_routes = Router::new()
        .route(
            "/",
            get(assessor_assignments::list_assignments)
                .post(assessor_assignments::create_assignment),
        )
        .route("/mine", get(assessor_assignments::my_assignments))
        .route("/:id", delete(assessor_assignments::delete_assignment));

    let analytics_routes = Router::new()
        .route("/employees/:id/gap", get(analytics::employee_gap))
        .route("/organization/gap", get(analytics::organization_gap));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/roles/assignments", role_routes)
        .nest("/api/navigation", navigation_routes)
        .nest("/api/employees", employee_routes)
        .nest("/api/departments", department_routes)
        .nest("/api/job-roles", job_role_routes)
        .nest("/api/competencies", competency_routes)
        .nest("/api/assessments", assessment_routes)
        .nest("/api/assessor-assignments", assignment_routes)
        .nest("/api/analytics", analytics_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
