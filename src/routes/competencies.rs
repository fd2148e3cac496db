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
use crate::models::{Competency, NewCompetency};
use crate::policy::Role;
use crate::schema::{competencies, employee_competency_ratings};
use crate::state::AppState;
use crate::utils::json::{optional_text, required_text, Patch};

use super::to_iso;

#[derive(Deserialize)]
pub struct CreateCompetencyRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = competencies)]
struct UpdateCompetencyChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
    category: Option<Option<String>>,
    updated_at: Option<chrono::NaiveDateTime>,
}

#[derive(Serialize)]
pub struct CompetencyEntry {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Competency> for CompetencyEntry {
    fn from(competency: Competency) -> Self {
        Self {
            id: competency.id,
            name: competency.name,
            description: competency.description,
            category: competency.category,
            created_at: to_iso(competency.created_at),
            updated_at: to_iso(competency.updated_at),
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn list_competencies(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<CompetencyEntry>>> {
    let mut conn = state.db()?;
    let rows: Vec<Competency> = competencies::table
        .order((competencies::category.asc(), competencies::name.asc()))
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(CompetencyEntry::from).collect()))
}

pub async fn create_competency(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCompetencyRequest>,
) -> AppResult<(StatusCode, Json<CompetencyEntry>)> {
    user.require_any(&[Role::Hr])?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;
    let new_competency = NewCompetency {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: trimmed(payload.description),
        category: trimmed(payload.category),
    };

    match diesel::insert_into(competencies::table)
        .values(&new_competency)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::conflict("competency name already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let competency: Competency = competencies::table
        .find(new_competency.id)
        .first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(competency.into())))
}

pub async fn update_competency(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(competency_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<CompetencyEntry>> {
    user.require_any(&[Role::Hr])?;

    let mut conn = state.db()?;
    let existing: Competency = competencies::table.find(competency_id).first(&mut conn)?;

    let name = required_text(&body, "name").map_err(AppError::bad_request)?;
    let description = optional_text(&body, "description").map_err(AppError::bad_request)?;
    let category = optional_text(&body, "category").map_err(AppError::bad_request)?;

    let mut changeset = UpdateCompetencyChangeset::default();
    if let Some(name) = name.filter(|name| *name != existing.name) {
        let duplicate = competencies::table
            .filter(competencies::name.eq(&name))
            .filter(competencies::id.ne(competency_id))
            .first::<Competency>(&mut conn)
            .optional()?;
        if duplicate.is_some() {
            return Err(AppError::conflict("competency name already exists"));
        }
        changeset.name = Some(name);
    }
    if !matches!(description, Patch::Omitted) {
        changeset.description = description.into_change();
    }
    if !matches!(category, Patch::Omitted) {
        changeset.category = category.into_change();
    }

    if changeset.name.is_none() && changeset.description.is_none() && changeset.category.is_none()
    {
        return Ok(Json(existing.into()));
    }

    changeset.updated_at = Some(chrono::Utc::now().naive_utc());
    diesel::update(competencies::table.find(competency_id))
        .set(&changeset)
        .execute(&mut conn)?;

    let updated: Competency = competencies::table.find(competency_id).first(&mut conn)?;
    Ok(Json(updated.into()))
}

pub async fn delete_competency(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(competency_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;

    let usage: i64 = employee_competency_ratings::table
        .filter(employee_competency_ratings::competency_id.eq(competency_id))
        .select(count_star())
        .first(&mut conn)?;

    if usage > 0 {
        return Err(AppError::bad_request(
            "cannot delete competency that has been rated in assessments",
        ));
    }

    let deleted = diesel::delete(competencies::table.find(competency_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
