use serde::Serialize;

use super::roles::{can_access, landing_route, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    Redirect,
    UnauthorizedPage,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RouteSpec {
    pub path: &'static str,
    pub required: &'static [Role],
    pub mode: GuardMode,
}

const EMPLOYEE: &[Role] = &[Role::Employee];
const ASSESSOR: &[Role] = &[Role::Assessor];
const HR: &[Role] = &[Role::Hr];

const fn route(path: &'static str, required: &'static [Role]) -> RouteSpec {
    RouteSpec {
        path,
        required,
        mode: GuardMode::Redirect,
    }
}

pub const ROUTES: &[RouteSpec] = &[
    route("/page-description", EMPLOYEE),
    route("/profile", EMPLOYEE),
    route("/employee-details/:id", EMPLOYEE),
    route("/self-assessment", EMPLOYEE),
    route("/assessment-results", EMPLOYEE),
    route("/gap-analysis", EMPLOYEE),
    route("/assessor-dashboard", ASSESSOR),
    route("/assessor/employees", ASSESSOR),
    route("/assessor/assessments/:id", ASSESSOR),
    route("/hr-dashboard", HR),
    route("/hr/employees", HR),
    route("/hr/departments", HR),
    route("/hr/job-roles", HR),
    route("/hr/competencies", HR),
    route("/hr/assessor-assignments", HR),
    route("/hr/roles", HR),
    RouteSpec {
        path: "/hr/organization-gap",
        required: HR,
        mode: GuardMode::UnauthorizedPage,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    Allow,
    Redirect { to: &'static str },
    Unauthorized { roles: Vec<Role> },
}

impl RouteDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RouteDecision::Allow)
    }
}

pub fn guard(held: &[Role], route: &RouteSpec) -> RouteDecision {
    if can_access(held, route.required) {
        return RouteDecision::Allow;
    }

    tracing::debug!(
        path = route.path,
        roles = ?held,
        required = ?route.required,
        "route access denied"
    );

    match route.mode {
        GuardMode::Redirect => RouteDecision::Redirect {
            to: landing_route(held),
        },
        GuardMode::UnauthorizedPage => RouteDecision::Unauthorized {
            roles: held.to_vec(),
        },
    }
}

/// Guard decision for a concrete client path. Paths not in the table carry
/// no role requirement.
pub fn check_path(held: &[Role], path: &str) -> RouteDecision {
    match find_route(path) {
        Some(route) => guard(held, route),
        None => RouteDecision::Allow,
    }
}

pub fn find_route(path: &str) -> Option<&'static RouteSpec> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    ROUTES.iter().find(|route| matches_pattern(route.path, path))
}

pub fn accessible_routes(held: &[Role]) -> Vec<&'static RouteSpec> {
    ROUTES
        .iter()
        .filter(|route| can_access(held, route.required))
        .collect()
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.split('/').filter(|s| !s.is_empty());
    let mut path_segments = path.split('/').filter(|s| !s.is_empty());

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(expected), Some(actual)) => {
                if !expected.starts_with(':') && expected != actual {
                    return false;
                }
            }
            _ => return false,
        }
    }
}
