use std::collections::{HashMap, HashSet};

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{dsl::max, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Assessment, CompetencyRating, Employee, NewAssessment, NewCompetencyRating};
use crate::policy::consensus::{
    overall, validate_assessor_rating, validate_self_rating, OverallRatings, RatingPair,
};
use crate::policy::{AssessmentStatus, Role, StatusActor};
use crate::schema::{competencies, employee_assessments, employee_competency_ratings, employees};
use crate::state::AppState;

use super::employees::{find_profile_for_user, is_assigned_assessor};
use super::to_iso;

#[derive(Deserialize)]
pub struct CreateAssessmentRequest {
    pub employee_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct RatingInput {
    pub competency_id: Uuid,
    pub rating: i16,
    pub comments: Option<String>,
}

#[derive(Deserialize)]
pub struct RatingsRequest {
    pub ratings: Vec<RatingInput>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct RatingResponse {
    pub competency_id: Uuid,
    pub competency_name: String,
    pub position: i32,
    pub self_rating: i16,
    pub self_comments: Option<String>,
    pub assessor_rating: Option<i16>,
    pub assessor_comments: Option<String>,
    pub consensus: f64,
}

#[derive(Serialize)]
pub struct AssessmentResponse {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub status: String,
    pub submitted_at: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub ratings: Vec<RatingResponse>,
    pub overall: OverallRatings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssessmentAccess {
    Owner,
    Reviewer,
}

/// Owner, an assigned assessor, or HR. HR and assigned assessors act as
/// reviewers even on their own profile.
pub(crate) fn resolve_access(
    state: &AppState,
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    employee: &Employee,
) -> AppResult<AssessmentAccess> {
    if user.has_role(Role::Hr) || is_assigned_assessor(conn, user, employee.id)? {
        return Ok(AssessmentAccess::Reviewer);
    }
    if state.edit_lock.is_owner(&user.actor(), &employee.lock()) {
        return Ok(AssessmentAccess::Owner);
    }
    Err(AppError::forbidden("you cannot access assessments for this employee"))
}

pub(crate) fn parse_status(assessment: &Assessment) -> AppResult<AssessmentStatus> {
    assessment
        .status
        .parse()
        .map_err(|err| AppError::internal(format!("corrupt assessment {}: {err}", assessment.id)))
}

pub(crate) fn load_ratings(
    conn: &mut PgConnection,
    assessment_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<(CompetencyRating, String)>>> {
    let rows: Vec<(CompetencyRating, String)> = employee_competency_ratings::table
        .inner_join(competencies::table)
        .filter(employee_competency_ratings::assessment_id.eq_any(assessment_ids))
        .order((
            employee_competency_ratings::position.asc(),
            competencies::name.asc(),
        ))
        .select((employee_competency_ratings::all_columns, competencies::name))
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<(CompetencyRating, String)>> = HashMap::new();
    for (rating, name) in rows {
        map.entry(rating.assessment_id).or_default().push((rating, name));
    }
    Ok(map)
}

pub(crate) fn rating_pair(rating: &CompetencyRating) -> RatingPair {
    RatingPair {
        self_rating: rating.self_rating,
        assessor_rating: rating.assessor_rating,
    }
}

fn to_response(
    assessment: Assessment,
    ratings: Vec<(CompetencyRating, String)>,
) -> AssessmentResponse {
    let pairs: Vec<RatingPair> = ratings.iter().map(|(rating, _)| rating_pair(rating)).collect();
    let overall = overall(&pairs);

    let ratings = ratings
        .into_iter()
        .zip(pairs.iter())
        .map(|((rating, competency_name), pair)| RatingResponse {
            competency_id: rating.competency_id,
            competency_name,
            position: rating.position,
            self_rating: rating.self_rating,
            self_comments: rating.self_comments,
            assessor_rating: rating.assessor_rating,
            assessor_comments: rating.assessor_comments,
            consensus: pair.consensus(),
        })
        .collect();

    AssessmentResponse {
        id: assessment.id,
        employee_id: assessment.employee_id,
        status: assessment.status,
        submitted_at: assessment.submitted_at.map(to_iso),
        reviewed_at: assessment.reviewed_at.map(to_iso),
        created_at: to_iso(assessment.created_at),
        updated_at: to_iso(assessment.updated_at),
        ratings,
        overall,
    }
}

fn load_response(conn: &mut PgConnection, assessment_id: Uuid) -> AppResult<AssessmentResponse> {
    let assessment: Assessment = employee_assessments::table
        .find(assessment_id)
        .first(conn)?;
    let mut ratings = load_ratings(conn, &[assessment_id])?;
    Ok(to_response(
        assessment,
        ratings.remove(&assessment_id).unwrap_or_default(),
    ))
}

fn load_with_employee(
    conn: &mut PgConnection,
    assessment_id: Uuid,
) -> AppResult<(Assessment, Employee)> {
    let assessment: Assessment = employee_assessments::table
        .find(assessment_id)
        .first(conn)?;
    let employee: Employee = employees::table.find(assessment.employee_id).first(conn)?;
    Ok((assessment, employee))
}

fn ensure_unique_competencies(ratings: &[RatingInput]) -> AppResult<()> {
    let mut seen = HashSet::new();
    if ratings.iter().all(|input| seen.insert(input.competency_id)) {
        Ok(())
    } else {
        Err(AppError::bad_request("competencies must not repeat"))
    }
}

fn clean_comments(comments: Option<String>) -> Option<String> {
    comments
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn list_for_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<Vec<AssessmentResponse>>> {
    let mut conn = state.db()?;
    let employee: Employee = employees::table.find(employee_id).first(&mut conn)?;
    resolve_access(&state, &mut conn, &user, &employee)?;

    let rows: Vec<Assessment> = employee_assessments::table
        .filter(employee_assessments::employee_id.eq(employee_id))
        .order(employee_assessments::created_at.desc())
        .load(&mut conn)?;
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let mut ratings = load_ratings(&mut conn, &ids)?;

    let response = rows
        .into_iter()
        .map(|row| {
            let row_ratings = ratings.remove(&row.id).unwrap_or_default();
            to_response(row, row_ratings)
        })
        .collect();
    Ok(Json(response))
}

pub async fn create_assessment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateAssessmentRequest>,
) -> AppResult<(StatusCode, Json<AssessmentResponse>)> {
    let mut conn = state.db()?;

    let employee: Employee = match payload.employee_id {
        Some(employee_id) => employees::table.find(employee_id).first(&mut conn)?,
        None => find_profile_for_user(&mut conn, &user)?
            .ok_or_else(|| AppError::bad_request("create your profile before an assessment"))?,
    };

    let is_owner = state.edit_lock.is_owner(&user.actor(), &employee.lock());
    if !is_owner && !user.has_role(Role::Hr) {
        return Err(AppError::forbidden(
            "only the employee or HR can start an assessment",
        ));
    }

    let open: Option<Uuid> = employee_assessments::table
        .filter(employee_assessments::employee_id.eq(employee.id))
        .filter(employee_assessments::status.ne(AssessmentStatus::Reviewed.as_str()))
        .select(employee_assessments::id)
        .first(&mut conn)
        .optional()?;
    if open.is_some() {
        return Err(AppError::conflict(
            "an assessment is already open for this employee",
        ));
    }

    let new_assessment = NewAssessment {
        id: Uuid::new_v4(),
        employee_id: employee.id,
        status: AssessmentStatus::NotStarted.as_str().to_string(),
    };
    // employee_assessments_one_open_idx backs the check above under concurrent creates.
    diesel::insert_into(employee_assessments::table)
        .values(&new_assessment)
        .execute(&mut conn)
        .map_err(|err| match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::conflict("an assessment is already open for this employee")
            }
            other => AppError::from(other),
        })?;

    info!(
        assessment_id = %new_assessment.id,
        employee_id = %employee.id,
        created_by = %user.user_id,
        "assessment created"
    );

    Ok((
        StatusCode::CREATED,
        Json(load_response(&mut conn, new_assessment.id)?),
    ))
}

pub async fn get_assessment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(assessment_id): Path<Uuid>,
) -> AppResult<Json<AssessmentResponse>> {
    let mut conn = state.db()?;
    let (_, employee) = load_with_employee(&mut conn, assessment_id)?;
    resolve_access(&state, &mut conn, &user, &employee)?;
    Ok(Json(load_response(&mut conn, assessment_id)?))
}

pub async fn put_self_ratings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(assessment_id): Path<Uuid>,
    Json(payload): Json<RatingsRequest>,
) -> AppResult<Json<AssessmentResponse>> {
    if payload.ratings.is_empty() {
        return Err(AppError::bad_request("at least one self rating is required"));
    }
    ensure_unique_competencies(&payload.ratings)?;
    for input in &payload.ratings {
        validate_self_rating(input.rating)?;
    }

    let mut conn = state.db()?;
    let (assessment, employee) = load_with_employee(&mut conn, assessment_id)?;
    if !state.edit_lock.is_owner(&user.actor(), &employee.lock()) {
        return Err(AppError::forbidden("only the employee can self-rate"));
    }

    let status = parse_status(&assessment)?;
    if !status.accepts_self_ratings() {
        return Err(AppError::bad_request(format!(
            "self ratings are closed once an assessment is {status}"
        )));
    }

    let now = Utc::now().naive_utc();
    conn.transaction::<_, AppError, _>(|conn| {
        let mut next_position = employee_competency_ratings::table
            .filter(employee_competency_ratings::assessment_id.eq(assessment_id))
            .select(max(employee_competency_ratings::position))
            .first::<Option<i32>>(conn)?
            .map_or(0, |position| position + 1);

        for input in payload.ratings {
            let comments = clean_comments(input.comments);
            let row = NewCompetencyRating {
                id: Uuid::new_v4(),
                assessment_id,
                competency_id: input.competency_id,
                position: next_position,
                self_rating: input.rating,
                self_comments: comments.clone(),
            };
            next_position += 1;

            diesel::insert_into(employee_competency_ratings::table)
                .values(&row)
                .on_conflict((
                    employee_competency_ratings::assessment_id,
                    employee_competency_ratings::competency_id,
                ))
                .do_update()
                .set((
                    employee_competency_ratings::self_rating.eq(input.rating),
                    employee_competency_ratings::self_comments.eq(comments),
                    employee_competency_ratings::updated_at.eq(now),
                ))
                .execute(conn)?;
        }

        let next_status = if status == AssessmentStatus::NotStarted {
            AssessmentStatus::InProgress
        } else {
            status
        };
        diesel::update(employee_assessments::table.find(assessment_id))
            .set((
                employee_assessments::status.eq(next_status.as_str()),
                employee_assessments::updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    Ok(Json(load_response(&mut conn, assessment_id)?))
}

pub async fn put_assessor_ratings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(assessment_id): Path<Uuid>,
    Json(payload): Json<RatingsRequest>,
) -> AppResult<Json<AssessmentResponse>> {
    ensure_unique_competencies(&payload.ratings)?;
    for input in &payload.ratings {
        validate_assessor_rating(input.rating)?;
    }

    let mut conn = state.db()?;
    let (assessment, employee) = load_with_employee(&mut conn, assessment_id)?;
    if resolve_access(&state, &mut conn, &user, &employee)? != AssessmentAccess::Reviewer {
        return Err(AppError::forbidden(
            "only an assigned assessor or HR can rate this assessment",
        ));
    }

    let status = parse_status(&assessment)?;
    if !status.accepts_assessor_ratings() {
        return Err(AppError::bad_request(format!(
            "assessor ratings are closed once an assessment is {status}"
        )));
    }

    let now = Utc::now().naive_utc();
    conn.transaction::<_, AppError, _>(|conn| {
        for input in payload.ratings {
            let updated = diesel::update(
                employee_competency_ratings::table
                    .filter(employee_competency_ratings::assessment_id.eq(assessment_id))
                    .filter(employee_competency_ratings::competency_id.eq(input.competency_id)),
            )
            .set((
                employee_competency_ratings::assessor_rating.eq(Some(input.rating)),
                employee_competency_ratings::assessor_comments.eq(clean_comments(input.comments)),
                employee_competency_ratings::updated_at.eq(now),
            ))
            .execute(conn)?;

            if updated == 0 {
                return Err(AppError::bad_request(format!(
                    "competency {} has not been self-rated in this assessment",
                    input.competency_id
                )));
            }
        }

        diesel::update(employee_assessments::table.find(assessment_id))
            .set(employee_assessments::updated_at.eq(now))
            .execute(conn)?;
        Ok(())
    })?;

    info!(%assessment_id, assessor = %user.user_id, "assessor ratings recorded");
    Ok(Json(load_response(&mut conn, assessment_id)?))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(assessment_id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<AssessmentResponse>> {
    let target: AssessmentStatus = payload.status.parse()?;

    let mut conn = state.db()?;
    let (assessment, employee) = load_with_employee(&mut conn, assessment_id)?;
    let actor = match resolve_access(&state, &mut conn, &user, &employee)? {
        AssessmentAccess::Owner => StatusActor::Owner,
        AssessmentAccess::Reviewer => StatusActor::Reviewer,
    };

    let current = parse_status(&assessment)?;
    let next = current.transition(target, actor)?;
    if next == current {
        return Ok(Json(load_response(&mut conn, assessment_id)?));
    }

    let now = Utc::now().naive_utc();
    let submitted_at = if next >= AssessmentStatus::Completed {
        assessment.submitted_at.or(Some(now))
    } else {
        assessment.submitted_at
    };
    let (reviewed_at, reviewed_by) = if next == AssessmentStatus::Reviewed {
        (Some(now), Some(user.user_id))
    } else {
        (assessment.reviewed_at, assessment.reviewed_by)
    };

    diesel::update(employee_assessments::table.find(assessment_id))
        .set((
            employee_assessments::status.eq(next.as_str()),
            employee_assessments::submitted_at.eq(submitted_at),
            employee_assessments::reviewed_at.eq(reviewed_at),
            employee_assessments::reviewed_by.eq(reviewed_by),
            employee_assessments::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    info!(
        %assessment_id,
        from = %current,
        to = %next,
        user_id = %user.user_id,
        "assessment status changed"
    );

    Ok(Json(load_response(&mut conn, assessment_id)?))
}
