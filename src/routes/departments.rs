use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::{dsl::count_star, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Department, NewDepartment};
use crate::policy::Role;
use crate::schema::{departments, employee_departments};
use crate::state::AppState;
use crate::utils::json::{optional_text, required_text, Patch};

use super::to_iso;

#[derive(Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = departments)]
struct UpdateDepartmentChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
    updated_at: Option<chrono::NaiveDateTime>,
}

#[derive(Serialize)]
pub struct DepartmentEntry {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub employee_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn to_entry(department: Department, employee_count: i64) -> DepartmentEntry {
    DepartmentEntry {
        id: department.id,
        name: department.name,
        description: department.description,
        employee_count,
        created_at: to_iso(department.created_at),
        updated_at: to_iso(department.updated_at),
    }
}

fn employee_count(conn: &mut PgConnection, department_id: Uuid) -> QueryResult<i64> {
    employee_departments::table
        .filter(employee_departments::department_id.eq(department_id))
        .select(count_star())
        .first(conn)
}

pub async fn list_departments(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<DepartmentEntry>>> {
    let mut conn = state.db()?;

    let rows: Vec<Department> = departments::table
        .order(departments::name.asc())
        .load(&mut conn)?;

    let counts: HashMap<Uuid, i64> = employee_departments::table
        .group_by(employee_departments::department_id)
        .select((employee_departments::department_id, count_star()))
        .load::<(Uuid, i64)>(&mut conn)?
        .into_iter()
        .collect();

    let response = rows
        .into_iter()
        .map(|department| {
            let count = counts.get(&department.id).copied().unwrap_or(0);
            to_entry(department, count)
        })
        .collect();

    Ok(Json(response))
}

pub async fn create_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateDepartmentRequest>,
) -> AppResult<(StatusCode, Json<DepartmentEntry>)> {
    user.require_any(&[Role::Hr])?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;
    let new_department = NewDepartment {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: payload
            .description
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
    };

    match diesel::insert_into(departments::table)
        .values(&new_department)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::conflict("department name already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let department: Department = departments::table
        .find(new_department.id)
        .first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(to_entry(department, 0))))
}

pub async fn update_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(department_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<DepartmentEntry>> {
    user.require_any(&[Role::Hr])?;

    let mut conn = state.db()?;
    let existing: Department = departments::table.find(department_id).first(&mut conn)?;

    let name = required_text(&body, "name").map_err(AppError::bad_request)?;
    let description = optional_text(&body, "description").map_err(AppError::bad_request)?;

    let mut changeset = UpdateDepartmentChangeset::default();
    if let Some(name) = name.filter(|name| *name != existing.name) {
        let duplicate = departments::table
            .filter(departments::name.eq(&name))
            .filter(departments::id.ne(department_id))
            .first::<Department>(&mut conn)
            .optional()?;
        if duplicate.is_some() {
            return Err(AppError::conflict("department name already exists"));
        }
        changeset.name = Some(name);
    }
    if !matches!(description, Patch::Omitted) {
        changeset.description = description.into_change();
    }

    if changeset.name.is_none() && changeset.description.is_none() {
        let count = employee_count(&mut conn, department_id)?;
        return Ok(Json(to_entry(existing, count)));
    }

    changeset.updated_at = Some(chrono::Utc::now().naive_utc());
    diesel::update(departments::table.find(department_id))
        .set(&changeset)
        .execute(&mut conn)?;

    let updated: Department = departments::table.find(department_id).first(&mut conn)?;
    let count = employee_count(&mut conn, department_id)?;
    Ok(Json(to_entry(updated, count)))
}

pub async fn delete_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(department_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;

    if employee_count(&mut conn, department_id)? > 0 {
        return Err(AppError::bad_request(
            "cannot delete department that still has employees",
        ));
    }

    let deleted = diesel::delete(departments::table.find(department_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
