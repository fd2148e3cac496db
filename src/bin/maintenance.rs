use std::collections::HashSet;
use std::env;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use diesel::prelude::*;

use hrm_backend::{
    config::AppConfig,
    db,
    policy::Role,
    routes::{
        auth::normalize_email,
        roles::{grant_role, load_roles},
    },
    s3,
    schema::{employees, users},
    storage::{orphaned_keys, ObjectStorage, S3Storage, PROFILE_PICTURE_PREFIX},
};

/// Uploads younger than this may still be waiting on their profile update.
const ORPHAN_GRACE_MINUTES: i64 = 60;

const USAGE: &str = "Usage: maintenance grant-role <email> <employee|assessor|hr>\n       maintenance purge-orphan-pictures";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("grant-role") => {
            let (Some(email), Some(role)) = (args.next(), args.next()) else {
                eprintln!("{USAGE}");
                std::process::exit(1);
            };
            grant(&email, &role)?;
        }
        Some("purge-orphan-pictures") => purge_orphan_pictures().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        "loaded backend configuration"
    );
    Ok(config)
}

fn grant(email: &str, role: &str) -> Result<()> {
    let role: Role = role.parse()?;
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let email = normalize_email(email);
    let user_id = users::table
        .filter(users::email.eq(&email))
        .select(users::id)
        .first::<uuid::Uuid>(&mut conn)
        .optional()
        .context("failed to look up account")?;
    let Some(user_id) = user_id else {
        bail!("no account registered for {email}");
    };

    grant_role(&mut conn, user_id, role).context("failed to grant role")?;
    let roles = load_roles(&mut conn, user_id).context("failed to reload roles")?;
    let names: Vec<&str> = roles.iter().map(|role| role.as_str()).collect();
    println!("{email} now holds: {}", names.join(", "));
    Ok(())
}

async fn purge_orphan_pictures() -> Result<()> {
    let config = load_config()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let s3_client = s3::build_client(&config).await?;
    let storage = S3Storage::new(s3_client, config.s3_bucket.clone());

    let referenced: HashSet<String> = {
        let mut conn = pool.get().context("failed to get database connection")?;
        employees::table
            .filter(employees::picture_key.is_not_null())
            .select(employees::picture_key)
            .load::<Option<String>>(&mut conn)
            .context("failed to load profile picture keys")?
            .into_iter()
            .flatten()
            .collect()
    };

    let stored = storage.list_objects(PROFILE_PICTURE_PREFIX).await?;
    let cutoff = Utc::now().naive_utc() - Duration::minutes(ORPHAN_GRACE_MINUTES);
    let orphans = orphaned_keys(&stored, &referenced, cutoff);

    if orphans.is_empty() {
        println!("No orphaned pictures found.");
        return Ok(());
    }

    println!("Deleting {} orphaned pictures…", orphans.len());
    for key in orphans {
        if let Err(err) = storage.delete_object(key).await {
            eprintln!("Failed to delete object {key} from storage: {err}");
        }
    }

    println!("Orphaned pictures deleted.");
    Ok(())
}
