use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::policy::ProfileLock;
use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = roles)]
pub struct RoleRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_role_assignments)]
pub struct NewUserRoleAssignment {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = departments)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = departments)]
pub struct NewDepartment {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = job_roles)]
#[diesel(belongs_to(Department))]
pub struct JobRole {
    pub id: Uuid,
    pub title: String,
    pub department_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_roles)]
pub struct NewJobRole {
    pub id: Uuid,
    pub title: String,
    pub department_id: Option<Uuid>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = competencies)]
pub struct Competency {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = competencies)]
pub struct NewCompetency {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = job_role_competencies)]
pub struct JobRoleCompetency {
    pub job_role_id: Uuid,
    pub competency_id: Uuid,
    pub required_level: i16,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = employees)]
pub struct Employee {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub job_role_id: Option<Uuid>,
    pub picture_key: Option<String>,
    pub edit_locked_until: Option<NaiveDateTime>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn lock(&self) -> ProfileLock<'_> {
        ProfileLock {
            owner_id: self.user_id,
            owner_email: &self.email,
            created_at: self.created_at,
            edit_locked_until: self.edit_locked_until,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employees)]
pub struct NewEmployee {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub job_role_id: Option<Uuid>,
    pub edit_locked_until: Option<NaiveDateTime>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employee_departments)]
pub struct NewEmployeeDepartment {
    pub employee_id: Uuid,
    pub department_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = employee_assessor_assignments)]
pub struct AssessorAssignment {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub assessor_employee_id: Uuid,
    pub department_id: Option<Uuid>,
    pub job_role_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employee_assessor_assignments)]
pub struct NewAssessorAssignment {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub assessor_employee_id: Uuid,
    pub department_id: Option<Uuid>,
    pub job_role_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = employee_assessments)]
#[diesel(belongs_to(Employee))]
pub struct Assessment {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub status: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employee_assessments)]
pub struct NewAssessment {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = employee_competency_ratings)]
#[diesel(belongs_to(Assessment))]
pub struct CompetencyRating {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub competency_id: Uuid,
    pub position: i32,
    pub self_rating: i16,
    pub self_comments: Option<String>,
    pub assessor_rating: Option<i16>,
    pub assessor_comments: Option<String>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employee_competency_ratings)]
pub struct NewCompetencyRating {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub competency_id: Uuid,
    pub position: i32,
    pub self_rating: i16,
    pub self_comments: Option<String>,
}
