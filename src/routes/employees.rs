use std::collections::{HashMap, HashSet};

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{NaiveDateTime, Utc};
use diesel::{dsl::count_star, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Department, Employee, NewEmployee, NewEmployeeDepartment};
use crate::policy::{EditDecision, Role};
use crate::schema::{
    departments, employee_assessor_assignments, employee_departments, employees, job_roles, users,
};
use crate::state::AppState;
use crate::storage::{profile_picture_key, public_url, put_then_commit};
use crate::utils::json::{classify, required_text, Patch};

use super::auth::normalize_email;
use super::to_iso;

const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Deserialize)]
pub struct CreateEmployeeRequest {
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub job_role_id: Option<Uuid>,
    #[serde(default)]
    pub department_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct ReplaceDepartmentsRequest {
    pub department_ids: Vec<Uuid>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = employees)]
struct UpdateEmployeeChangeset {
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    job_role_id: Option<Option<Uuid>>,
    edit_locked_until: Option<Option<NaiveDateTime>>,
    updated_at: Option<NaiveDateTime>,
}

#[derive(Serialize, Clone)]
pub struct DepartmentRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Serialize)]
pub struct EmployeeResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub job_role_id: Option<Uuid>,
    pub job_role_title: Option<String>,
    pub departments: Vec<DepartmentRef>,
    pub picture_url: Option<String>,
    pub edit_locked_until: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct EditStatus {
    pub editable: bool,
    pub reason: &'static str,
    pub banner: Option<String>,
    pub remaining_seconds: Option<i64>,
}

impl From<EditDecision> for EditStatus {
    fn from(decision: EditDecision) -> Self {
        let reason = match decision {
            EditDecision::Privileged => "privileged",
            EditDecision::OwnerWindow { .. } => "owner_window",
            EditDecision::Locked { .. } => "locked",
            EditDecision::NotOwner => "not_owner",
        };
        EditStatus {
            editable: decision.is_permitted(),
            reason,
            banner: decision.banner(),
            remaining_seconds: decision.remaining().map(|left| left.num_seconds()),
        }
    }
}

#[derive(Serialize)]
pub struct EmployeeDetailResponse {
    pub employee: EmployeeResponse,
    pub edit: EditStatus,
}

pub(crate) fn load_departments_for_employees(
    conn: &mut PgConnection,
    employee_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<DepartmentRef>>> {
    let rows: Vec<(Uuid, Department)> = employee_departments::table
        .inner_join(departments::table)
        .filter(employee_departments::employee_id.eq_any(employee_ids))
        .order(departments::name.asc())
        .select((employee_departments::employee_id, departments::all_columns))
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<DepartmentRef>> = HashMap::new();
    for (employee_id, department) in rows {
        map.entry(employee_id).or_default().push(DepartmentRef {
            id: department.id,
            name: department.name,
        });
    }
    Ok(map)
}

fn load_job_role_titles(
    conn: &mut PgConnection,
    job_role_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, String>> {
    let rows: Vec<(Uuid, String)> = job_roles::table
        .filter(job_roles::id.eq_any(job_role_ids))
        .select((job_roles::id, job_roles::title))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

pub(crate) fn to_employee_responses(
    state: &AppState,
    conn: &mut PgConnection,
    rows: Vec<Employee>,
) -> QueryResult<Vec<EmployeeResponse>> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let job_role_ids: Vec<Uuid> = rows.iter().filter_map(|row| row.job_role_id).collect();
    let mut departments = load_departments_for_employees(conn, &ids)?;
    let titles = load_job_role_titles(conn, &job_role_ids)?;

    Ok(rows
        .into_iter()
        .map(|employee| {
            let departments = departments.remove(&employee.id).unwrap_or_default();
            let job_role_title = employee
                .job_role_id
                .and_then(|id| titles.get(&id).cloned());
            to_employee_response(state, employee, departments, job_role_title)
        })
        .collect())
}

fn to_employee_response(
    state: &AppState,
    employee: Employee,
    departments: Vec<DepartmentRef>,
    job_role_title: Option<String>,
) -> EmployeeResponse {
    let deadline = state.edit_lock.deadline(&employee.lock());
    let picture_url = employee.picture_key.as_deref().map(|key| {
        public_url(
            &state.config.storage_public_base_url,
            key,
            employee.updated_at,
        )
    });
    let full_name = employee.full_name();

    EmployeeResponse {
        id: employee.id,
        user_id: employee.user_id,
        email: employee.email,
        first_name: employee.first_name,
        last_name: employee.last_name,
        full_name,
        job_role_id: employee.job_role_id,
        job_role_title,
        departments,
        picture_url,
        edit_locked_until: to_iso(deadline),
        created_at: to_iso(employee.created_at),
        updated_at: to_iso(employee.updated_at),
    }
}

fn detail_response(
    state: &AppState,
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    employee: Employee,
) -> AppResult<EmployeeDetailResponse> {
    let decision =
        state
            .edit_lock
            .can_edit_profile(&user.actor(), &employee.lock(), Utc::now().naive_utc());
    let mut responses = to_employee_responses(state, conn, vec![employee])?;
    let employee = responses.pop().ok_or_else(AppError::not_found)?;
    Ok(EmployeeDetailResponse {
        employee,
        edit: decision.into(),
    })
}

/// Profile owned by the actor: matched on account id first, then on email
/// for profiles that HR created before the account existed.
pub(crate) fn find_profile_for_user(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
) -> QueryResult<Option<Employee>> {
    if let Some(employee) = employees::table
        .filter(employees::user_id.eq(user.user_id))
        .first::<Employee>(conn)
        .optional()?
    {
        return Ok(Some(employee));
    }

    employees::table
        .filter(employees::user_id.is_null())
        .filter(employees::email.eq(normalize_email(&user.email)))
        .order(employees::created_at.asc())
        .first::<Employee>(conn)
        .optional()
}

pub(crate) fn is_assigned_assessor(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    employee_id: Uuid,
) -> QueryResult<bool> {
    if !user.has_role(Role::Assessor) {
        return Ok(false);
    }
    let Some(assessor) = employees::table
        .filter(employees::user_id.eq(user.user_id))
        .select(employees::id)
        .first::<Uuid>(conn)
        .optional()?
    else {
        return Ok(false);
    };

    let count: i64 = employee_assessor_assignments::table
        .filter(employee_assessor_assignments::employee_id.eq(employee_id))
        .filter(employee_assessor_assignments::assessor_employee_id.eq(assessor))
        .select(count_star())
        .first(conn)?;
    Ok(count > 0)
}

pub(crate) fn ensure_can_view(
    state: &AppState,
    user: &AuthenticatedUser,
    employee: &Employee,
) -> AppResult<()> {
    if user.can_access(&[Role::Assessor]) || state.edit_lock.is_owner(&user.actor(), &employee.lock())
    {
        return Ok(());
    }
    Err(AppError::forbidden("you cannot view this profile"))
}

/// Applies the edit lock and returns the deadline to persist with the write.
fn authorize_edit(
    state: &AppState,
    user: &AuthenticatedUser,
    employee: &Employee,
    now: NaiveDateTime,
) -> AppResult<NaiveDateTime> {
    let lock = employee.lock();
    let decision = state.edit_lock.can_edit_profile(&user.actor(), &lock, now);
    if !decision.is_permitted() {
        info!(
            user_id = %user.user_id,
            employee_id = %employee.id,
            ?decision,
            "profile edit denied"
        );
        let message = decision
            .banner()
            .unwrap_or_else(|| "profile is read-only".to_string());
        return Err(AppError::forbidden(message));
    }
    Ok(state.edit_lock.deadline_after_edit(&lock, now))
}

fn validate_departments(conn: &mut PgConnection, department_ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
    let unique: Vec<Uuid> = {
        let mut seen = HashSet::new();
        department_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    };
    if unique.is_empty() {
        return Ok(unique);
    }

    let found: i64 = departments::table
        .filter(departments::id.eq_any(&unique))
        .select(count_star())
        .first(conn)?;
    if found != unique.len() as i64 {
        return Err(AppError::bad_request("one or more departments do not exist"));
    }
    Ok(unique)
}

fn replace_department_links(
    conn: &mut PgConnection,
    employee_id: Uuid,
    department_ids: &[Uuid],
) -> QueryResult<()> {
    diesel::delete(
        employee_departments::table.filter(employee_departments::employee_id.eq(employee_id)),
    )
    .execute(conn)?;

    if !department_ids.is_empty() {
        let links: Vec<NewEmployeeDepartment> = department_ids
            .iter()
            .map(|department_id| NewEmployeeDepartment {
                employee_id,
                department_id: *department_id,
            })
            .collect();
        diesel::insert_into(employee_departments::table)
            .values(&links)
            .execute(conn)?;
    }
    Ok(())
}

pub async fn list_employees(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<EmployeeResponse>>> {
    user.require_any(&[Role::Assessor])?;
    let mut conn = state.db()?;

    let rows: Vec<Employee> = employees::table
        .order((employees::last_name.asc(), employees::first_name.asc()))
        .load(&mut conn)?;

    Ok(Json(to_employee_responses(&state, &mut conn, rows)?))
}

pub async fn create_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateEmployeeRequest>,
) -> AppResult<(StatusCode, Json<EmployeeDetailResponse>)> {
    let first_name = payload.first_name.trim();
    let last_name = payload.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(AppError::bad_request("first_name and last_name are required"));
    }

    let mut conn = state.db()?;
    let is_hr = user.has_role(Role::Hr);

    let (email, user_id) = if is_hr && payload.email.is_some() {
        let email = normalize_email(payload.email.as_deref().unwrap_or_default());
        if email.is_empty() {
            return Err(AppError::bad_request("email must not be empty"));
        }
        let linked: Option<Uuid> = users::table
            .filter(users::email.eq(&email))
            .select(users::id)
            .first(&mut conn)
            .optional()?;
        (email, linked)
    } else {
        if find_profile_for_user(&mut conn, &user)?.is_some() {
            return Err(AppError::conflict("a profile already exists for this account"));
        }
        (normalize_email(&user.email), Some(user.user_id))
    };

    if let Some(linked) = user_id {
        let existing: i64 = employees::table
            .filter(employees::user_id.eq(linked))
            .select(count_star())
            .first(&mut conn)?;
        if existing > 0 {
            return Err(AppError::conflict("a profile already exists for this account"));
        }
    }

    let department_ids = validate_departments(&mut conn, &payload.department_ids)?;
    let now = Utc::now().naive_utc();
    let new_employee = NewEmployee {
        id: Uuid::new_v4(),
        user_id,
        email,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        job_role_id: payload.job_role_id,
        edit_locked_until: Some(state.edit_lock.initial_deadline(now)),
        created_by: Some(user.user_id),
        created_at: now,
        updated_at: now,
    };

    let employee = conn.transaction::<Employee, AppError, _>(|conn| {
        diesel::insert_into(employees::table)
            .values(&new_employee)
            .execute(conn)?;
        replace_department_links(conn, new_employee.id, &department_ids)?;
        Ok(employees::table.find(new_employee.id).first(conn)?)
    })?;

    info!(
        employee_id = %employee.id,
        created_by = %user.user_id,
        self_service = employee.user_id == Some(user.user_id),
        "employee profile created"
    );

    let detail = detail_response(&state, &mut conn, &user, employee)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_my_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<EmployeeDetailResponse>> {
    let mut conn = state.db()?;
    let mut employee = find_profile_for_user(&mut conn, &user)?.ok_or_else(AppError::not_found)?;

    if employee.user_id.is_none() {
        diesel::update(employees::table.find(employee.id))
            .set(employees::user_id.eq(Some(user.user_id)))
            .execute(&mut conn)?;
        info!(employee_id = %employee.id, user_id = %user.user_id, "linked profile to account by email");
        employee.user_id = Some(user.user_id);
    }

    Ok(Json(detail_response(&state, &mut conn, &user, employee)?))
}

pub async fn get_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<EmployeeDetailResponse>> {
    let mut conn = state.db()?;
    let employee: Employee = employees::table.find(employee_id).first(&mut conn)?;
    ensure_can_view(&state, &user, &employee)?;
    Ok(Json(detail_response(&state, &mut conn, &user, employee)?))
}

pub async fn update_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<EmployeeDetailResponse>> {
    let mut conn = state.db()?;
    let existing: Employee = employees::table.find(employee_id).first(&mut conn)?;
    let now = Utc::now().naive_utc();
    let next_deadline = authorize_edit(&state, &user, &existing, now)?;

    let first_name = required_text(&body, "first_name").map_err(AppError::bad_request)?;
    let last_name = required_text(&body, "last_name").map_err(AppError::bad_request)?;
    let email = required_text(&body, "email").map_err(AppError::bad_request)?;
    let job_role = classify::<Uuid>(&body, "job_role_id").map_err(AppError::bad_request)?;

    let mut changeset = UpdateEmployeeChangeset {
        first_name,
        last_name,
        ..Default::default()
    };

    if let Some(email) = email.map(|value| normalize_email(&value)) {
        if email != existing.email {
            if !user.has_role(Role::Hr) {
                return Err(AppError::forbidden("only HR can change a profile email"));
            }
            changeset.email = Some(email);
        }
    }

    if let Patch::Value(job_role_id) = &job_role {
        job_roles::table
            .find(*job_role_id)
            .select(job_roles::id)
            .first::<Uuid>(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::bad_request("job role does not exist"))?;
    }
    changeset.job_role_id = job_role.into_change();

    changeset.edit_locked_until = Some(Some(next_deadline));
    changeset.updated_at = Some(now);

    diesel::update(employees::table.find(employee_id))
        .set(&changeset)
        .execute(&mut conn)?;

    info!(
        employee_id = %employee_id,
        user_id = %user.user_id,
        edit_locked_until = %to_iso(next_deadline),
        "employee profile updated"
    );

    let updated: Employee = employees::table.find(employee_id).first(&mut conn)?;
    Ok(Json(detail_response(&state, &mut conn, &user, updated)?))
}

pub async fn replace_departments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
    Json(payload): Json<ReplaceDepartmentsRequest>,
) -> AppResult<Json<EmployeeDetailResponse>> {
    let mut conn = state.db()?;
    let existing: Employee = employees::table.find(employee_id).first(&mut conn)?;
    let now = Utc::now().naive_utc();
    let next_deadline = authorize_edit(&state, &user, &existing, now)?;
    let department_ids = validate_departments(&mut conn, &payload.department_ids)?;

    conn.transaction::<_, AppError, _>(|conn| {
        replace_department_links(conn, employee_id, &department_ids)?;
        diesel::update(employees::table.find(employee_id))
            .set((
                employees::edit_locked_until.eq(Some(next_deadline)),
                employees::updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    })?;

    let updated: Employee = employees::table.find(employee_id).first(&mut conn)?;
    Ok(Json(detail_response(&state, &mut conn, &user, updated)?))
}

pub async fn upload_picture(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<EmployeeDetailResponse>> {
    let existing: Employee = {
        let mut conn = state.db()?;
        employees::table.find(employee_id).first(&mut conn)?
    };
    let now = Utc::now().naive_utc();
    let next_deadline = authorize_edit(&state, &user, &existing, now)?;

    let mut file_bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() == Some("file") {
            let data = field.bytes().await.map_err(|err| {
                error!(error = %err, "failed to read picture bytes");
                AppError::bad_request(format!("failed to read file bytes: {err}"))
            })?;
            file_bytes = Some(data.to_vec());
        }
    }

    let bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    if bytes.len() > MAX_PICTURE_BYTES {
        return Err(AppError::bad_request("profile picture must be at most 5 MiB"));
    }

    let extension = picture_extension(&bytes)
        .ok_or_else(|| AppError::bad_request("profile picture must be a PNG, JPEG or WebP image"))?;
    let content_type = mime_guess::from_ext(extension)
        .first_or_octet_stream()
        .to_string();
    let key = profile_picture_key(employee_id, extension);

    put_then_commit(
        state.storage.as_ref(),
        &key,
        bytes,
        Some(content_type),
        || -> AppResult<()> {
            let mut conn = state.db()?;
            let updated = diesel::update(employees::table.find(employee_id))
                .set((
                    employees::picture_key.eq(Some(key.as_str())),
                    employees::edit_locked_until.eq(Some(next_deadline)),
                    employees::updated_at.eq(now),
                ))
                .execute(&mut conn)?;
            if updated == 0 {
                return Err(AppError::not_found());
            }
            Ok(())
        },
    )
    .await?;

    if let Some(previous) = existing.picture_key.as_deref() {
        if let Err(err) = state.storage.delete_object(previous).await {
            warn!(error = ?err, key = %previous, "failed to remove replaced profile picture");
        }
    }

    info!(%employee_id, %key, "profile picture updated");

    let mut conn = state.db()?;
    let updated: Employee = employees::table.find(employee_id).first(&mut conn)?;
    Ok(Json(detail_response(&state, &mut conn, &user, updated)?))
}

pub async fn delete_picture(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let existing: Employee = employees::table.find(employee_id).first(&mut conn)?;
    let now = Utc::now().naive_utc();
    let next_deadline = authorize_edit(&state, &user, &existing, now)?;

    let Some(key) = existing.picture_key else {
        return Err(AppError::not_found());
    };

    diesel::update(employees::table.find(employee_id))
        .set((
            employees::picture_key.eq(None::<String>),
            employees::edit_locked_until.eq(Some(next_deadline)),
            employees::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    drop(conn);

    if let Err(err) = state.storage.delete_object(&key).await {
        warn!(error = ?err, %key, "failed to remove profile picture object");
    }

    Ok(StatusCode::NO_CONTENT)
}

fn picture_extension(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("png"),
        image::ImageFormat::Jpeg => Some("jpg"),
        image::ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}
