use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Assessor,
    Hr,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}`")]
pub struct ParseRoleError(pub String);

impl Role {
    pub const ALL: [Role; 3] = [Role::Employee, Role::Assessor, Role::Hr];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Assessor => "assessor",
            Role::Hr => "hr",
        }
    }

    /// Roles whose routes a holder of `self` may enter.
    pub fn accessible_roles(self) -> &'static [Role] {
        match self {
            Role::Hr => &[Role::Hr, Role::Assessor, Role::Employee],
            Role::Assessor => &[Role::Assessor, Role::Employee],
            Role::Employee => &[Role::Employee],
        }
    }

    pub fn covers(self, other: Role) -> bool {
        self.accessible_roles().contains(&other)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Role::Employee),
            "assessor" => Ok(Role::Assessor),
            "hr" => Ok(Role::Hr),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// Parses stored role names, dropping anything unknown.
pub fn parse_roles<I, S>(names: I) -> Vec<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut roles: Vec<Role> = names
        .into_iter()
        .filter_map(|name| name.as_ref().parse().ok())
        .collect();
    roles.sort();
    roles.dedup();
    roles
}

/// True when any held role's accessible set intersects `required`.
/// An empty requirement admits every authenticated actor.
pub fn can_access(held: &[Role], required: &[Role]) -> bool {
    if required.is_empty() {
        return true;
    }
    held.iter()
        .any(|role| required.iter().any(|needed| role.covers(*needed)))
}

pub fn is_privileged(held: &[Role]) -> bool {
    held.iter().any(|role| matches!(role, Role::Hr | Role::Assessor))
}

pub fn highest(held: &[Role]) -> Option<Role> {
    held.iter().copied().max()
}

pub const HR_LANDING: &str = "/hr-dashboard";
pub const ASSESSOR_LANDING: &str = "/assessor-dashboard";
pub const EMPLOYEE_LANDING: &str = "/page-description";

pub fn landing_route(held: &[Role]) -> &'static str {
    match highest(held) {
        Some(Role::Hr) => HR_LANDING,
        Some(Role::Assessor) => ASSESSOR_LANDING,
        _ => EMPLOYEE_LANDING,
    }
}
