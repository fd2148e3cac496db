mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, json_body, png_bytes, TestApp};
use hrm_backend::policy::{LockRenewal, Role};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct Employee {
    id: Uuid,
    user_id: Option<Uuid>,
    first_name: String,
    last_name: String,
    picture_url: Option<String>,
    edit_locked_until: String,
}

#[derive(Deserialize)]
struct EditStatus {
    editable: bool,
    reason: String,
    banner: Option<String>,
}

#[derive(Deserialize)]
struct Detail {
    employee: Employee,
    edit: EditStatus,
}

#[tokio::test]
async fn owner_edits_until_the_lock_then_only_hr_can() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let dana = app.user_token("dana@example.com", &[Role::Employee]).await?;
    let hr = app.user_token("grace@example.com", &[Role::Hr]).await?;

    let response = app
        .post_json(
            "/api/employees",
            &json!({ "first_name": "Dana", "last_name": "Scully" }),
            Some(&dana),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Detail = json_body(response).await?;
    assert!(created.edit.editable);
    assert_eq!(created.edit.reason, "owner_window");
    assert!(created
        .edit
        .banner
        .as_deref()
        .is_some_and(|banner| banner.starts_with("locks in")));
    let employee_id = created.employee.id;
    let path = format!("/api/employees/{employee_id}");

    let again = app
        .post_json(
            "/api/employees",
            &json!({ "first_name": "Dana", "last_name": "Again" }),
            Some(&dana),
        )
        .await?;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let response = app
        .patch_json(&path, &json!({ "first_name": "Dee" }), Some(&dana))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Detail = json_body(response).await?;
    assert_eq!(updated.employee.first_name, "Dee");
    assert_eq!(
        updated.employee.edit_locked_until,
        created.employee.edit_locked_until
    );

    app.expire_edit_window(employee_id).await?;

    let locked = app
        .patch_json(&path, &json!({ "last_name": "Mulder" }), Some(&dana))
        .await?;
    assert_eq!(locked.status(), StatusCode::FORBIDDEN);

    let view: Detail = json_body(app.get(&path, Some(&dana)).await?).await?;
    assert!(!view.edit.editable);
    assert_eq!(view.edit.reason, "locked");

    let response = app
        .patch_json(&path, &json!({ "last_name": "Mulder" }), Some(&hr))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let by_hr: Detail = json_body(response).await?;
    assert_eq!(by_hr.employee.last_name, "Mulder");
    assert_eq!(by_hr.edit.reason, "privileged");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn renew_on_edit_moves_the_deadline() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::with_renewal(LockRenewal::RenewOnEdit).await? else {
        return Ok(());
    };

    let dana = app.user_token("dana@example.com", &[Role::Employee]).await?;
    let created: Detail = json_body(
        app.post_json(
            "/api/employees",
            &json!({ "first_name": "Dana", "last_name": "Scully" }),
            Some(&dana),
        )
        .await?,
    )
    .await?;

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let updated: Detail = json_body(
        app.patch_json(
            &format!("/api/employees/{}", created.employee.id),
            &json!({ "first_name": "Dee" }),
            Some(&dana),
        )
        .await?,
    )
    .await?;
    assert!(updated.employee.edit_locked_until > created.employee.edit_locked_until);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn profiles_are_private_to_owner_and_reviewers() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let dana = app.user_token("dana@example.com", &[Role::Employee]).await?;
    let erin = app.user_token("erin@example.com", &[Role::Employee]).await?;
    let assessor = app
        .user_token("ash@example.com", &[Role::Employee, Role::Assessor])
        .await?;

    let created: Detail = json_body(
        app.post_json(
            "/api/employees",
            &json!({ "first_name": "Dana", "last_name": "Scully" }),
            Some(&dana),
        )
        .await?,
    )
    .await?;
    let path = format!("/api/employees/{}", created.employee.id);

    assert_eq!(
        app.get(&path, Some(&erin)).await?.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.patch_json(&path, &json!({ "first_name": "Hacked" }), Some(&erin))
            .await?
            .status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.get(&path, Some(&assessor)).await?.status(), StatusCode::OK);
    assert_eq!(
        app.get("/api/employees", Some(&erin)).await?.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.get("/api/employees", Some(&assessor)).await?.status(),
        StatusCode::OK
    );

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn hr_created_profile_links_by_email() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let hr = app.user_token("grace@example.com", &[Role::Hr]).await?;
    let response = app
        .post_json(
            "/api/employees",
            &json!({
                "email": "Ivy@Example.com",
                "first_name": "Ivy",
                "last_name": "Lane"
            }),
            Some(&hr),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Detail = json_body(response).await?;
    assert_eq!(created.employee.user_id, None);

    let ivy = app.user_token("ivy@example.com", &[Role::Employee]).await?;
    let response = app.get("/api/employees/me", Some(&ivy)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let mine: Detail = json_body(response).await?;
    assert_eq!(mine.employee.id, created.employee.id);
    assert!(mine.employee.user_id.is_some());
    assert!(mine.edit.editable);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn picture_upload_replaces_and_deletes_objects() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let dana = app.user_token("dana@example.com", &[Role::Employee]).await?;
    let created: Detail = json_body(
        app.post_json(
            "/api/employees",
            &json!({ "first_name": "Dana", "last_name": "Scully" }),
            Some(&dana),
        )
        .await?,
    )
    .await?;
    let path = format!("/api/employees/{}/picture", created.employee.id);

    let rejected = app
        .upload_picture(&path, "notes.txt", "text/plain", b"just text", &dana)
        .await?;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.storage().object_count().await, 0);

    let response = app
        .upload_picture(&path, "me.png", "image/png", &png_bytes(), &dana)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let first: Detail = json_body(response).await?;
    let url = first.employee.picture_url.unwrap_or_default();
    assert!(url.contains("/profile-pictures/"));
    assert!(url.contains("?v="));
    assert_eq!(app.storage().object_count().await, 1);

    let response = app
        .upload_picture(&path, "me.png", "image/png", &png_bytes(), &dana)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.storage().object_count().await, 1);

    let response = app.delete(&path, Some(&dana)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.storage().object_count().await, 0);

    app.cleanup().await?;
    Ok(())
}
