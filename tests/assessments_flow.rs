mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, TestApp};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use hrm_backend::models::NewAssessment;
use hrm_backend::policy::Role;
use hrm_backend::schema::employee_assessments;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct IdOnly {
    id: Uuid,
}

#[derive(Deserialize)]
struct Detail {
    employee: IdOnly,
}

#[derive(Deserialize)]
struct Rating {
    competency_id: Uuid,
    self_rating: i16,
    assessor_rating: Option<i16>,
    consensus: f64,
}

#[derive(Deserialize)]
struct Overall {
    self_average: Option<f64>,
    assessor_average: Option<f64>,
    consensus: Option<f64>,
}

#[derive(Deserialize)]
struct Assessment {
    id: Uuid,
    status: String,
    submitted_at: Option<String>,
    reviewed_at: Option<String>,
    ratings: Vec<Rating>,
    overall: Overall,
}

#[derive(Deserialize)]
struct GapRow {
    competency_id: Uuid,
    required_level: i16,
    consensus: Option<f64>,
    gap: f64,
}

#[derive(Deserialize)]
struct EmployeeGap {
    competencies: Vec<GapRow>,
}

#[derive(Deserialize)]
struct CompetencyGap {
    employee_count: usize,
    average_consensus: Option<f64>,
    average_required: f64,
    average_gap: f64,
}

#[derive(Deserialize)]
struct DepartmentGap {
    department_id: Option<Uuid>,
    employee_count: usize,
    competencies: Vec<CompetencyGap>,
}

#[derive(Deserialize)]
struct OrganizationGap {
    departments: Vec<DepartmentGap>,
}

struct Fixture {
    hr: String,
    dana: String,
    ash: String,
    dana_id: Uuid,
    ash_id: Uuid,
    competency_id: Uuid,
    department_id: Uuid,
}

async fn create_profile(app: &TestApp, token: &str, first: &str, last: &str) -> Result<Uuid> {
    let response = app
        .post_json(
            "/api/employees",
            &json!({ "first_name": first, "last_name": last }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let detail: Detail = json_body(response).await?;
    Ok(detail.employee.id)
}

async fn setup(app: &TestApp) -> Result<Fixture> {
    let hr = app.user_token("grace@example.com", &[Role::Hr]).await?;
    let dana = app.user_token("dana@example.com", &[Role::Employee]).await?;
    let ash = app
        .user_token("ash@example.com", &[Role::Employee, Role::Assessor])
        .await?;

    let dana_id = create_profile(app, &dana, "Dana", "Scully").await?;
    let ash_id = create_profile(app, &ash, "Ash", "Ketchum").await?;

    let competency: IdOnly = json_body(
        app.post_json("/api/competencies", &json!({ "name": "Rust" }), Some(&hr))
            .await?,
    )
    .await?;
    let job_role: IdOnly = json_body(
        app.post_json("/api/job-roles", &json!({ "title": "Engineer" }), Some(&hr))
            .await?,
    )
    .await?;
    let response = app
        .put_json(
            &format!("/api/job-roles/{}/competencies", job_role.id),
            &json!({ "competencies": [{ "competency_id": competency.id, "required_level": 4 }] }),
            Some(&hr),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let department: IdOnly = json_body(
        app.post_json(
            "/api/departments",
            &json!({ "name": "Engineering" }),
            Some(&hr),
        )
        .await?,
    )
    .await?;

    let response = app
        .patch_json(
            &format!("/api/employees/{dana_id}"),
            &json!({ "job_role_id": job_role.id }),
            Some(&hr),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .put_json(
            &format!("/api/employees/{dana_id}/departments"),
            &json!({ "department_ids": [department.id] }),
            Some(&hr),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(Fixture {
        hr,
        dana,
        ash,
        dana_id,
        ash_id,
        competency_id: competency.id,
        department_id: department.id,
    })
}

#[tokio::test]
async fn assessment_moves_from_self_rating_to_review() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let fx = setup(&app).await?;

    let response = app
        .post_json("/api/assessments", &json!({}), Some(&fx.dana))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let assessment: Assessment = json_body(response).await?;
    assert_eq!(assessment.status, "not_started");
    assert!(assessment.ratings.is_empty());
    let base = format!("/api/assessments/{}", assessment.id);

    let duplicate = app
        .post_json("/api/assessments", &json!({}), Some(&fx.dana))
        .await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let out_of_range = app
        .put_json(
            &format!("{base}/self-ratings"),
            &json!({ "ratings": [{ "competency_id": fx.competency_id, "rating": 6 }] }),
            Some(&fx.dana),
        )
        .await?;
    assert_eq!(out_of_range.status(), StatusCode::BAD_REQUEST);

    let empty = app
        .put_json(
            &format!("{base}/self-ratings"),
            &json!({ "ratings": [] }),
            Some(&fx.dana),
        )
        .await?;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    let untouched: Assessment = json_body(app.get(&base, Some(&fx.dana)).await?).await?;
    assert_eq!(untouched.status, "not_started");

    let response = app
        .put_json(
            &format!("{base}/self-ratings"),
            &json!({ "ratings": [{ "competency_id": fx.competency_id, "rating": 3, "comments": "getting there" }] }),
            Some(&fx.dana),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rated: Assessment = json_body(response).await?;
    assert_eq!(rated.status, "in_progress");
    assert_eq!(rated.ratings.len(), 1);
    assert_eq!(rated.ratings[0].competency_id, fx.competency_id);
    assert_eq!(rated.ratings[0].self_rating, 3);
    assert_eq!(rated.ratings[0].consensus, 3.0);

    let unassigned = app
        .put_json(
            &format!("{base}/assessor-ratings"),
            &json!({ "ratings": [{ "competency_id": fx.competency_id, "rating": 5 }] }),
            Some(&fx.ash),
        )
        .await?;
    assert_eq!(unassigned.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/assessor-assignments",
            &json!({ "employee_id": fx.dana_id, "assessor_employee_id": fx.ash_id }),
            Some(&fx.hr),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let mine: Vec<IdOnly> =
        json_body(app.get("/api/assessor-assignments/mine", Some(&fx.ash)).await?).await?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, fx.dana_id);

    let response = app
        .put_json(
            &format!("{base}/assessor-ratings"),
            &json!({ "ratings": [{ "competency_id": fx.competency_id, "rating": 5 }] }),
            Some(&fx.ash),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let reviewed: Assessment = json_body(response).await?;
    assert_eq!(reviewed.ratings[0].assessor_rating, Some(5));
    assert_eq!(reviewed.ratings[0].consensus, 4.0);
    assert_eq!(reviewed.overall.self_average, Some(3.0));
    assert_eq!(reviewed.overall.assessor_average, Some(5.0));
    assert_eq!(reviewed.overall.consensus, Some(4.0));

    let owner_review = app
        .patch_json(&format!("{base}/status"), &json!({ "status": "reviewed" }), Some(&fx.dana))
        .await?;
    assert_eq!(owner_review.status(), StatusCode::FORBIDDEN);

    let response = app
        .patch_json(&format!("{base}/status"), &json!({ "status": "completed" }), Some(&fx.dana))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let completed: Assessment = json_body(response).await?;
    assert_eq!(completed.status, "completed");
    assert!(completed.submitted_at.is_some());

    let backwards = app
        .patch_json(&format!("{base}/status"), &json!({ "status": "in_progress" }), Some(&fx.dana))
        .await?;
    assert_eq!(backwards.status(), StatusCode::BAD_REQUEST);

    let closed = app
        .put_json(
            &format!("{base}/self-ratings"),
            &json!({ "ratings": [{ "competency_id": fx.competency_id, "rating": 4 }] }),
            Some(&fx.dana),
        )
        .await?;
    assert_eq!(closed.status(), StatusCode::BAD_REQUEST);

    let response = app
        .patch_json(&format!("{base}/status"), &json!({ "status": "reviewed" }), Some(&fx.ash))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let done: Assessment = json_body(response).await?;
    assert_eq!(done.status, "reviewed");
    assert!(done.reviewed_at.is_some());

    let listed: Vec<Assessment> = json_body(
        app.get(&format!("/api/employees/{}/assessments", fx.dana_id), Some(&fx.hr))
            .await?,
    )
    .await?;
    assert_eq!(listed.len(), 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn gap_reports_use_requirements_and_consensus() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let fx = setup(&app).await?;

    let assessment: Assessment = json_body(
        app.post_json("/api/assessments", &json!({}), Some(&fx.dana))
            .await?,
    )
    .await?;
    let response = app
        .put_json(
            &format!("/api/assessments/{}/self-ratings", assessment.id),
            &json!({ "ratings": [{ "competency_id": fx.competency_id, "rating": 2 }] }),
            Some(&fx.dana),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .get(&format!("/api/analytics/employees/{}/gap", fx.dana_id), Some(&fx.dana))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let report: EmployeeGap = json_body(response).await?;
    assert_eq!(report.competencies.len(), 1);
    let row = &report.competencies[0];
    assert_eq!(row.competency_id, fx.competency_id);
    assert_eq!(row.required_level, 4);
    assert_eq!(row.consensus, Some(2.0));
    assert_eq!(row.gap, 2.0);

    let denied = app
        .get("/api/analytics/organization/gap", Some(&fx.dana))
        .await?;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let response = app
        .get("/api/analytics/organization/gap", Some(&fx.hr))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let org: OrganizationGap = json_body(response).await?;
    assert_eq!(org.departments.len(), 2);

    let engineering = &org.departments[0];
    assert_eq!(engineering.department_id, Some(fx.department_id));
    assert_eq!(engineering.employee_count, 1);
    assert_eq!(engineering.competencies.len(), 1);
    let rust = &engineering.competencies[0];
    assert_eq!(rust.employee_count, 1);
    assert_eq!(rust.average_consensus, Some(2.0));
    assert_eq!(rust.average_required, 4.0);
    assert_eq!(rust.average_gap, 2.0);

    let unassigned = &org.departments[1];
    assert_eq!(unassigned.department_id, None);
    assert_eq!(unassigned.employee_count, 1);
    assert!(unassigned.competencies.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn database_allows_one_open_assessment_per_employee() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };
    let fx = setup(&app).await?;

    let response = app
        .post_json("/api/assessments", &json!({}), Some(&fx.dana))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let employee_id = fx.dana_id;
    let second_open = app
        .with_conn(move |conn| {
            let result = diesel::insert_into(employee_assessments::table)
                .values(&NewAssessment {
                    id: Uuid::new_v4(),
                    employee_id,
                    status: "in_progress".to_string(),
                })
                .execute(conn);
            Ok(result)
        })
        .await?;
    assert!(matches!(
        second_open,
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
    ));

    let reviewed = app
        .with_conn(move |conn| {
            let result = diesel::insert_into(employee_assessments::table)
                .values(&NewAssessment {
                    id: Uuid::new_v4(),
                    employee_id,
                    status: "reviewed".to_string(),
                })
                .execute(conn);
            Ok(result)
        })
        .await?;
    assert_eq!(reviewed.ok(), Some(1));

    app.cleanup().await?;
    Ok(())
}
