use std::collections::HashMap;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{AssessorAssignment, Employee, NewAssessorAssignment};
use crate::policy::{can_access, Role};
use crate::schema::{employee_assessor_assignments, employees};
use crate::state::AppState;

use super::employees::{find_profile_for_user, to_employee_responses, EmployeeResponse};
use super::roles::load_roles;
use super::to_iso;

#[derive(Deserialize)]
pub struct ListQuery {
    pub employee_id: Option<Uuid>,
    pub assessor_employee_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateAssignmentRequest {
    pub employee_id: Uuid,
    pub assessor_employee_id: Uuid,
    pub department_id: Option<Uuid>,
    pub job_role_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct AssignmentEntry {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub employee_name: String,
    pub assessor_employee_id: Uuid,
    pub assessor_name: String,
    pub department_id: Option<Uuid>,
    pub job_role_id: Option<Uuid>,
    pub created_at: String,
}

fn load_names(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<HashMap<Uuid, String>> {
    let rows: Vec<Employee> = employees::table
        .filter(employees::id.eq_any(ids))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|employee| (employee.id, employee.full_name()))
        .collect())
}

fn to_entries(
    conn: &mut PgConnection,
    rows: Vec<AssessorAssignment>,
) -> QueryResult<Vec<AssignmentEntry>> {
    let ids: Vec<Uuid> = rows
        .iter()
        .flat_map(|row| [row.employee_id, row.assessor_employee_id])
        .collect();
    let names = load_names(conn, &ids)?;
    let name_of = |id: &Uuid| names.get(id).cloned().unwrap_or_default();

    Ok(rows
        .into_iter()
        .map(|row| AssignmentEntry {
            id: row.id,
            employee_name: name_of(&row.employee_id),
            employee_id: row.employee_id,
            assessor_name: name_of(&row.assessor_employee_id),
            assessor_employee_id: row.assessor_employee_id,
            department_id: row.department_id,
            job_role_id: row.job_role_id,
            created_at: to_iso(row.created_at),
        })
        .collect())
}

pub async fn list_assignments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<AssignmentEntry>>> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;

    let mut statement = employee_assessor_assignments::table
        .order(employee_assessor_assignments::created_at.desc())
        .into_boxed();
    if let Some(employee_id) = query.employee_id {
        statement = statement.filter(employee_assessor_assignments::employee_id.eq(employee_id));
    }
    if let Some(assessor_id) = query.assessor_employee_id {
        statement =
            statement.filter(employee_assessor_assignments::assessor_employee_id.eq(assessor_id));
    }

    let rows: Vec<AssessorAssignment> = statement.load(&mut conn)?;
    Ok(Json(to_entries(&mut conn, rows)?))
}

pub async fn create_assignment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateAssignmentRequest>,
) -> AppResult<(StatusCode, Json<AssignmentEntry>)> {
    user.require_any(&[Role::Hr])?;
    if payload.employee_id == payload.assessor_employee_id {
        return Err(AppError::bad_request("an employee cannot assess themselves"));
    }

    let mut conn = state.db()?;
    employees::table
        .find(payload.employee_id)
        .first::<Employee>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("employee does not exist"))?;
    let assessor: Employee = employees::table
        .find(payload.assessor_employee_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("assessor does not exist"))?;

    let assessor_roles = match assessor.user_id {
        Some(user_id) => load_roles(&mut conn, user_id)?,
        None => Vec::new(),
    };
    if !can_access(&assessor_roles, &[Role::Assessor]) {
        return Err(AppError::bad_request(
            "assessor must have an account with the assessor role",
        ));
    }

    let new_assignment = NewAssessorAssignment {
        id: Uuid::new_v4(),
        employee_id: payload.employee_id,
        assessor_employee_id: payload.assessor_employee_id,
        department_id: payload.department_id,
        job_role_id: payload.job_role_id,
    };

    match diesel::insert_into(employee_assessor_assignments::table)
        .values(&new_assignment)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::conflict("assessor is already assigned"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    info!(
        assignment_id = %new_assignment.id,
        employee_id = %new_assignment.employee_id,
        assessor_employee_id = %new_assignment.assessor_employee_id,
        "assessor assigned"
    );

    let row: AssessorAssignment = employee_assessor_assignments::table
        .find(new_assignment.id)
        .first(&mut conn)?;
    let mut entries = to_entries(&mut conn, vec![row])?;
    let entry = entries.pop().ok_or_else(AppError::not_found)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn delete_assignment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(assignment_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;

    let deleted = diesel::delete(employee_assessor_assignments::table.find(assignment_id))
        .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    info!(%assignment_id, "assessor assignment removed");
    Ok(StatusCode::NO_CONTENT)
}

/// Employees the caller has been assigned to assess.
pub async fn my_assignments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<EmployeeResponse>>> {
    user.require_any(&[Role::Assessor])?;
    let mut conn = state.db()?;

    let Some(profile) = find_profile_for_user(&mut conn, &user)? else {
        return Ok(Json(Vec::new()));
    };

    let assigned: Vec<Uuid> = employee_assessor_assignments::table
        .filter(employee_assessor_assignments::assessor_employee_id.eq(profile.id))
        .select(employee_assessor_assignments::employee_id)
        .load(&mut conn)?;
    let rows: Vec<Employee> = employees::table
        .filter(employees::id.eq_any(&assigned))
        .order((employees::last_name.asc(), employees::first_name.asc()))
        .load(&mut conn)?;

    Ok(Json(to_employee_responses(&state, &mut conn, rows)?))
}
