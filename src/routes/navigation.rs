use axum::{extract::Query, Json};
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    policy::{
        navigation::{accessible_routes, RouteSpec},
        check_path, Role, RouteDecision,
    },
};

#[derive(Serialize)]
pub struct NavigationResponse {
    pub roles: Vec<Role>,
    pub landing_route: &'static str,
    pub routes: Vec<&'static RouteSpec>,
}

#[derive(Deserialize)]
pub struct CheckQuery {
    pub path: String,
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub path: String,
    #[serde(flatten)]
    pub decision: RouteDecision,
}

pub async fn list_routes(user: AuthenticatedUser) -> Json<NavigationResponse> {
    let routes = accessible_routes(&user.roles);
    let landing_route = user.landing_route();
    Json(NavigationResponse {
        roles: user.roles,
        landing_route,
        routes,
    })
}

pub async fn check_route(
    user: AuthenticatedUser,
    Query(query): Query<CheckQuery>,
) -> AppResult<Json<CheckResponse>> {
    if !query.path.starts_with('/') {
        return Err(AppError::bad_request("path must start with `/`"));
    }

    let decision = check_path(&user.roles, &query.path);
    Ok(Json(CheckResponse {
        path: query.path,
        decision,
    }))
}
