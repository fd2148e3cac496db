use std::collections::HashMap;

use axum::extract::{Json, Path, State};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{Assessment, CompetencyRating, Employee};
use crate::policy::consensus::{gap, mean, overall, OverallRatings, RatingPair};
use crate::policy::Role;
use crate::schema::{employee_assessments, employees};
use crate::state::AppState;

use super::assessments::{load_ratings, rating_pair, resolve_access};
use super::employees::load_departments_for_employees;
use super::job_roles::{load_requirements, RequiredCompetencyEntry};

#[derive(Debug, Clone, Serialize)]
pub struct GapRow {
    pub competency_id: Uuid,
    pub competency_name: String,
    pub required_level: i16,
    pub self_rating: Option<i16>,
    pub assessor_rating: Option<i16>,
    pub consensus: Option<f64>,
    pub gap: f64,
}

#[derive(Serialize)]
pub struct EmployeeGapResponse {
    pub employee_id: Uuid,
    pub assessment_id: Option<Uuid>,
    pub assessment_status: Option<String>,
    pub job_role_id: Option<Uuid>,
    pub competencies: Vec<GapRow>,
    pub overall: OverallRatings,
}

#[derive(Debug, Serialize)]
pub struct CompetencyGap {
    pub competency_id: Uuid,
    pub competency_name: String,
    pub employee_count: usize,
    pub average_consensus: Option<f64>,
    pub average_required: f64,
    pub average_gap: f64,
}

#[derive(Debug, Serialize)]
pub struct DepartmentGap {
    pub department_id: Option<Uuid>,
    pub department_name: Option<String>,
    pub employee_count: usize,
    pub competencies: Vec<CompetencyGap>,
}

#[derive(Serialize)]
pub struct OrganizationGapResponse {
    pub departments: Vec<DepartmentGap>,
}

/// Joins the job role requirements with the ratings of one assessment.
/// Unrated competencies count as zero consensus; unlisted ones require 0.
pub(crate) fn gap_rows(
    requirements: &[RequiredCompetencyEntry],
    ratings: &[(CompetencyRating, String)],
) -> Vec<GapRow> {
    let mut rows: Vec<GapRow> = Vec::with_capacity(requirements.len() + ratings.len());
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for requirement in requirements {
        index.insert(requirement.competency_id, rows.len());
        rows.push(GapRow {
            competency_id: requirement.competency_id,
            competency_name: requirement.name.clone(),
            required_level: requirement.required_level,
            self_rating: None,
            assessor_rating: None,
            consensus: None,
            gap: f64::from(requirement.required_level),
        });
    }

    for (rating, name) in ratings {
        let pair = rating_pair(rating);
        let position = match index.get(&rating.competency_id) {
            Some(position) => *position,
            None => {
                index.insert(rating.competency_id, rows.len());
                rows.push(GapRow {
                    competency_id: rating.competency_id,
                    competency_name: name.clone(),
                    required_level: 0,
                    self_rating: None,
                    assessor_rating: None,
                    consensus: None,
                    gap: 0.0,
                });
                rows.len() - 1
            }
        };
        let row = &mut rows[position];
        let consensus = pair.consensus();
        row.self_rating = Some(rating.self_rating);
        row.assessor_rating = rating.assessor_rating;
        row.consensus = Some(consensus);
        row.gap = gap(f64::from(row.required_level), consensus);
    }

    rows.sort_by(|a, b| a.competency_name.cmp(&b.competency_name));
    rows
}

#[derive(Default)]
struct CompetencyAccumulator {
    name: String,
    employees: usize,
    consensus: Vec<f64>,
    required: Vec<f64>,
    gaps: Vec<f64>,
}

#[derive(Default)]
struct DepartmentAccumulator {
    name: Option<String>,
    employees: usize,
    competencies: HashMap<Uuid, CompetencyAccumulator>,
}

/// Input for one employee: the departments they belong to and their gap rows.
pub(crate) struct EmployeeGapInput {
    pub departments: Vec<(Uuid, String)>,
    pub rows: Vec<GapRow>,
}

pub(crate) fn aggregate(inputs: Vec<EmployeeGapInput>) -> Vec<DepartmentGap> {
    let mut groups: HashMap<Option<Uuid>, DepartmentAccumulator> = HashMap::new();

    for input in inputs {
        let keys: Vec<(Option<Uuid>, Option<String>)> = if input.departments.is_empty() {
            vec![(None, None)]
        } else {
            input
                .departments
                .into_iter()
                .map(|(id, name)| (Some(id), Some(name)))
                .collect()
        };

        for (department_id, department_name) in keys {
            let group = groups.entry(department_id).or_default();
            group.name = department_name;
            group.employees += 1;

            for row in &input.rows {
                let entry = group.competencies.entry(row.competency_id).or_default();
                entry.name.clone_from(&row.competency_name);
                entry.employees += 1;
                entry.consensus.extend(row.consensus);
                entry.required.push(f64::from(row.required_level));
                entry.gaps.push(row.gap);
            }
        }
    }

    let mut departments: Vec<DepartmentGap> = groups
        .into_iter()
        .map(|(department_id, group)| {
            let mut competencies: Vec<CompetencyGap> = group
                .competencies
                .into_iter()
                .map(|(competency_id, acc)| CompetencyGap {
                    competency_id,
                    competency_name: acc.name,
                    employee_count: acc.employees,
                    average_consensus: mean(acc.consensus),
                    average_required: mean(acc.required).unwrap_or(0.0),
                    average_gap: mean(acc.gaps).unwrap_or(0.0),
                })
                .collect();
            competencies.sort_by(|a, b| a.competency_name.cmp(&b.competency_name));

            DepartmentGap {
                department_id,
                department_name: group.name,
                employee_count: group.employees,
                competencies,
            }
        })
        .collect();

    // Named departments alphabetically, the unassigned group last.
    departments.sort_by(|a, b| match (&a.department_name, &b.department_name) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    departments
}

fn latest_assessments(
    conn: &mut PgConnection,
    employee_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Assessment>> {
    let rows: Vec<Assessment> = employee_assessments::table
        .filter(employee_assessments::employee_id.eq_any(employee_ids))
        .order((
            employee_assessments::employee_id.asc(),
            employee_assessments::created_at.desc(),
        ))
        .load(conn)?;

    let mut latest = HashMap::new();
    for row in rows {
        latest.entry(row.employee_id).or_insert(row);
    }
    Ok(latest)
}

pub async fn employee_gap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<EmployeeGapResponse>> {
    let mut conn = state.db()?;
    let employee: Employee = employees::table.find(employee_id).first(&mut conn)?;
    resolve_access(&state, &mut conn, &user, &employee)?;

    let assessment = latest_assessments(&mut conn, &[employee_id])?.remove(&employee_id);
    let ratings = match &assessment {
        Some(assessment) => load_ratings(&mut conn, &[assessment.id])?
            .remove(&assessment.id)
            .unwrap_or_default(),
        None => Vec::new(),
    };
    let requirements = match employee.job_role_id {
        Some(job_role_id) => load_requirements(&mut conn, &[job_role_id])?
            .remove(&job_role_id)
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let pairs: Vec<RatingPair> = ratings.iter().map(|(rating, _)| rating_pair(rating)).collect();

    Ok(Json(EmployeeGapResponse {
        employee_id,
        assessment_id: assessment.as_ref().map(|row| row.id),
        assessment_status: assessment.map(|row| row.status),
        job_role_id: employee.job_role_id,
        competencies: gap_rows(&requirements, &ratings),
        overall: overall(&pairs),
    }))
}

pub async fn organization_gap(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<OrganizationGapResponse>> {
    user.require_any(&[Role::Hr])?;
    let mut conn = state.db()?;

    let staff: Vec<Employee> = employees::table.load(&mut conn)?;
    let ids: Vec<Uuid> = staff.iter().map(|employee| employee.id).collect();
    let job_role_ids: Vec<Uuid> = staff.iter().filter_map(|employee| employee.job_role_id).collect();

    let latest = latest_assessments(&mut conn, &ids)?;
    let assessment_ids: Vec<Uuid> = latest.values().map(|row| row.id).collect();
    let mut ratings = load_ratings(&mut conn, &assessment_ids)?;
    let requirements = load_requirements(&mut conn, &job_role_ids)?;
    let mut departments = load_departments_for_employees(&mut conn, &ids)?;

    let inputs = staff
        .into_iter()
        .map(|employee| {
            let employee_ratings = latest
                .get(&employee.id)
                .and_then(|assessment| ratings.remove(&assessment.id))
                .unwrap_or_default();
            let employee_requirements = employee
                .job_role_id
                .and_then(|id| requirements.get(&id))
                .map(Vec::as_slice)
                .unwrap_or_default();
            EmployeeGapInput {
                departments: departments
                    .remove(&employee.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|department| (department.id, department.name))
                    .collect(),
                rows: gap_rows(employee_requirements, &employee_ratings),
            }
        })
        .collect();

    Ok(Json(OrganizationGapResponse {
        departments: aggregate(inputs),
    }))
}
