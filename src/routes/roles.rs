use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{NewUserRoleAssignment, RoleRow},
    policy::{roles::parse_roles, Role},
    schema::{roles, user_role_assignments, users},
    state::AppState,
};

use super::auth::normalize_email;

#[derive(Deserialize)]
pub struct GrantRoleRequest {
    pub email: String,
    pub role: Role,
}

#[derive(Serialize)]
pub struct AccountRoles {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<Role>,
}

pub fn load_roles(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<Role>> {
    let names: Vec<String> = user_role_assignments::table
        .inner_join(roles::table)
        .filter(user_role_assignments::user_id.eq(user_id))
        .select(roles::name)
        .load(conn)?;
    Ok(parse_roles(names))
}

pub fn grant_role(conn: &mut PgConnection, user_id: Uuid, role: Role) -> QueryResult<()> {
    let role_row: RoleRow = roles::table
        .filter(roles::name.eq(role.as_str()))
        .first(conn)?;

    diesel::insert_into(user_role_assignments::table)
        .values(&NewUserRoleAssignment {
            user_id,
            role_id: role_row.id,
        })
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(())
}

pub fn revoke_role(conn: &mut PgConnection, user_id: Uuid, role: Role) -> QueryResult<usize> {
    let role_id: Uuid = roles::table
        .filter(roles::name.eq(role.as_str()))
        .select(roles::id)
        .first(conn)?;

    diesel::delete(
        user_role_assignments::table
            .filter(user_role_assignments::user_id.eq(user_id))
            .filter(user_role_assignments::role_id.eq(role_id)),
    )
    .execute(conn)
}

pub async fn list_assignments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<AccountRoles>>> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;

    let accounts: Vec<(Uuid, String)> = users::table
        .select((users::id, users::email))
        .order(users::email.asc())
        .load(&mut conn)?;

    let rows: Vec<(Uuid, String)> = user_role_assignments::table
        .inner_join(roles::table)
        .select((user_role_assignments::user_id, roles::name))
        .load(&mut conn)?;

    let response = accounts
        .into_iter()
        .map(|(user_id, email)| AccountRoles {
            user_id,
            email,
            roles: parse_roles(
                rows.iter()
                    .filter(|(owner, _)| *owner == user_id)
                    .map(|(_, name)| name.as_str()),
            ),
        })
        .collect();

    Ok(Json(response))
}

pub async fn create_assignment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<GrantRoleRequest>,
) -> AppResult<Json<AccountRoles>> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;
    let email = normalize_email(&payload.email);

    let user_id: Uuid = users::table
        .filter(users::email.eq(&email))
        .select(users::id)
        .first(&mut conn)?;

    grant_role(&mut conn, user_id, payload.role)?;
    info!(granted_by = %user.user_id, %user_id, role = %payload.role, "role granted");

    Ok(Json(AccountRoles {
        user_id,
        email,
        roles: load_roles(&mut conn, user_id)?,
    }))
}

pub async fn delete_assignment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((user_id, role)): Path<(Uuid, String)>,
) -> AppResult<StatusCode> {
    user.require_any(&[Role::Hr])?;
    let role: Role = role
        .parse()
        .map_err(|err: crate::policy::roles::ParseRoleError| AppError::bad_request(err.to_string()))?;

    if user_id == user.user_id && role == Role::Hr {
        return Err(AppError::bad_request("cannot revoke your own hr role"));
    }

    let mut conn = state.db()?;
    let deleted = revoke_role(&mut conn, user_id, role)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    info!(revoked_by = %user.user_id, %user_id, %role, "role revoked");
    Ok(StatusCode::NO_CONTENT)
}
