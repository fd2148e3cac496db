use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::{dsl::count_star, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{JobRole, JobRoleCompetency, NewJobRole};
use crate::policy::{consensus::MAX_RATING, Role};
use crate::schema::{competencies, departments, employees, job_role_competencies, job_roles};
use crate::state::AppState;
use crate::utils::json::{classify, optional_text, required_text, Patch};

use super::to_iso;

#[derive(Deserialize)]
pub struct CreateJobRoleRequest {
    pub title: String,
    pub department_id: Option<Uuid>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct RequiredCompetency {
    pub competency_id: Uuid,
    pub required_level: i16,
}

#[derive(Deserialize)]
pub struct ReplaceCompetenciesRequest {
    pub competencies: Vec<RequiredCompetency>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = job_roles)]
struct UpdateJobRoleChangeset {
    title: Option<String>,
    department_id: Option<Option<Uuid>>,
    description: Option<Option<String>>,
    updated_at: Option<chrono::NaiveDateTime>,
}

#[derive(Serialize, Clone)]
pub struct RequiredCompetencyEntry {
    pub competency_id: Uuid,
    pub name: String,
    pub required_level: i16,
}

#[derive(Serialize)]
pub struct JobRoleEntry {
    pub id: Uuid,
    pub title: String,
    pub department_id: Option<Uuid>,
    pub description: Option<String>,
    pub competencies: Vec<RequiredCompetencyEntry>,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn load_requirements(
    conn: &mut PgConnection,
    job_role_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<RequiredCompetencyEntry>>> {
    let rows: Vec<(Uuid, Uuid, String, i16)> = job_role_competencies::table
        .inner_join(competencies::table)
        .filter(job_role_competencies::job_role_id.eq_any(job_role_ids))
        .order(competencies::name.asc())
        .select((
            job_role_competencies::job_role_id,
            job_role_competencies::competency_id,
            competencies::name,
            job_role_competencies::required_level,
        ))
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<RequiredCompetencyEntry>> = HashMap::new();
    for (job_role_id, competency_id, name, required_level) in rows {
        map.entry(job_role_id)
            .or_default()
            .push(RequiredCompetencyEntry {
                competency_id,
                name,
                required_level,
            });
    }
    Ok(map)
}

fn to_entry(job_role: JobRole, competencies: Vec<RequiredCompetencyEntry>) -> JobRoleEntry {
    JobRoleEntry {
        id: job_role.id,
        title: job_role.title,
        department_id: job_role.department_id,
        description: job_role.description,
        competencies,
        created_at: to_iso(job_role.created_at),
        updated_at: to_iso(job_role.updated_at),
    }
}

fn load_entry(conn: &mut PgConnection, job_role_id: Uuid) -> AppResult<JobRoleEntry> {
    let job_role: JobRole = job_roles::table.find(job_role_id).first(conn)?;
    let mut requirements = load_requirements(conn, &[job_role_id])?;
    Ok(to_entry(
        job_role,
        requirements.remove(&job_role_id).unwrap_or_default(),
    ))
}

fn ensure_department_exists(conn: &mut PgConnection, department_id: Uuid) -> AppResult<()> {
    let found: i64 = departments::table
        .filter(departments::id.eq(department_id))
        .select(count_star())
        .first(conn)?;
    if found == 0 {
        return Err(AppError::bad_request("department does not exist"));
    }
    Ok(())
}

pub async fn list_job_roles(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<JobRoleEntry>>> {
    let mut conn = state.db()?;
    let rows: Vec<JobRole> = job_roles::table
        .order(job_roles::title.asc())
        .load(&mut conn)?;
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut requirements = load_requirements(&mut conn, &ids)?;

    let response = rows
        .into_iter()
        .map(|row| {
            let competencies = requirements.remove(&row.id).unwrap_or_default();
            to_entry(row, competencies)
        })
        .collect();
    Ok(Json(response))
}

pub async fn create_job_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateJobRoleRequest>,
) -> AppResult<(StatusCode, Json<JobRoleEntry>)> {
    user.require_any(&[Role::Hr])?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let mut conn = state.db()?;
    if let Some(department_id) = payload.department_id {
        ensure_department_exists(&mut conn, department_id)?;
    }

    let new_job_role = NewJobRole {
        id: Uuid::new_v4(),
        title: title.to_string(),
        department_id: payload.department_id,
        description: payload
            .description
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
    };

    match diesel::insert_into(job_roles::table)
        .values(&new_job_role)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::conflict("job role title already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    Ok((
        StatusCode::CREATED,
        Json(load_entry(&mut conn, new_job_role.id)?),
    ))
}

pub async fn update_job_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(job_role_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<JobRoleEntry>> {
    user.require_any(&[Role::Hr])?;

    let mut conn = state.db()?;
    let existing: JobRole = job_roles::table.find(job_role_id).first(&mut conn)?;

    let title = required_text(&body, "title").map_err(AppError::bad_request)?;
    let department = classify::<Uuid>(&body, "department_id").map_err(AppError::bad_request)?;
    let description = optional_text(&body, "description").map_err(AppError::bad_request)?;

    let mut changeset = UpdateJobRoleChangeset::default();
    if let Some(title) = title.filter(|title| *title != existing.title) {
        let duplicate = job_roles::table
            .filter(job_roles::title.eq(&title))
            .filter(job_roles::id.ne(job_role_id))
            .first::<JobRole>(&mut conn)
            .optional()?;
        if duplicate.is_some() {
            return Err(AppError::conflict("job role title already exists"));
        }
        changeset.title = Some(title);
    }
    if let Patch::Value(department_id) = &department {
        ensure_department_exists(&mut conn, *department_id)?;
    }
    changeset.department_id = department.into_change();
    if !matches!(description, Patch::Omitted) {
        changeset.description = description.into_change();
    }

    if changeset.title.is_some()
        || changeset.department_id.is_some()
        || changeset.description.is_some()
    {
        changeset.updated_at = Some(chrono::Utc::now().naive_utc());
        diesel::update(job_roles::table.find(job_role_id))
            .set(&changeset)
            .execute(&mut conn)?;
    }

    Ok(Json(load_entry(&mut conn, job_role_id)?))
}

pub async fn replace_competencies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(job_role_id): Path<Uuid>,
    Json(payload): Json<ReplaceCompetenciesRequest>,
) -> AppResult<Json<JobRoleEntry>> {
    user.require_any(&[Role::Hr])?;

    let mut seen = HashSet::new();
    for requirement in &payload.competencies {
        if !seen.insert(requirement.competency_id) {
            return Err(AppError::bad_request("competencies must not repeat"));
        }
        if !(0..=MAX_RATING).contains(&requirement.required_level) {
            return Err(AppError::bad_request(format!(
                "required_level must be between 0 and {MAX_RATING}"
            )));
        }
    }

    let mut conn = state.db()?;
    job_roles::table
        .find(job_role_id)
        .first::<JobRole>(&mut conn)?;

    let rows: Vec<JobRoleCompetency> = payload
        .competencies
        .iter()
        .map(|requirement| JobRoleCompetency {
            job_role_id,
            competency_id: requirement.competency_id,
            required_level: requirement.required_level,
        })
        .collect();

    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(
            job_role_competencies::table.filter(job_role_competencies::job_role_id.eq(job_role_id)),
        )
        .execute(conn)?;
        if !rows.is_empty() {
            diesel::insert_into(job_role_competencies::table)
                .values(&rows)
                .execute(conn)?;
        }
        Ok(())
    })?;

    Ok(Json(load_entry(&mut conn, job_role_id)?))
}

pub async fn delete_job_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(job_role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;

    let holders: i64 = employees::table
        .filter(employees::job_role_id.eq(job_role_id))
        .select(count_star())
        .first(&mut conn)?;
    if holders > 0 {
        return Err(AppError::bad_request(
            "cannot delete job role that is still assigned to employees",
        ));
    }

    let deleted = diesel::delete(job_roles::table.find(job_role_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
