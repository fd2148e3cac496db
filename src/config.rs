use std::env;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::policy::edit_lock::{EditLockPolicy, LockRenewal, DEFAULT_EDIT_WINDOW_HOURS};

const MAX_EDIT_WINDOW_HOURS: i64 = 24 * 365;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub refresh_cookie_secure: bool,
    pub refresh_cookie_domain: Option<String>,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub storage_public_base_url: String,
    pub profile_edit_window_hours: i64,
    pub profile_lock_renewal: LockRenewal,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "hrm".to_string());
        let jwt_audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "hrm-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let refresh_token_expiry_days = env::var("REFRESH_TOKEN_EXPIRY_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("REFRESH_TOKEN_EXPIRY_DAYS must be an integer")?;
        let refresh_cookie_secure = env::var("REFRESH_COOKIE_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let refresh_cookie_domain = env::var("REFRESH_COOKIE_DOMAIN").ok();
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let s3_bucket = env::var("S3_BUCKET").context("S3_BUCKET must be set")?;
        let storage_public_base_url = env::var("STORAGE_PUBLIC_BASE_URL").unwrap_or_else(|_| {
            default_public_base_url(aws_endpoint_url.as_deref(), &s3_bucket, &aws_region)
        });
        let profile_edit_window_hours =
            parse_edit_window_hours(env::var("PROFILE_EDIT_WINDOW_HOURS").ok().as_deref())?;
        let profile_lock_renewal = match env::var("PROFILE_LOCK_RENEWAL") {
            Ok(value) => value
                .parse::<LockRenewal>()
                .map_err(anyhow::Error::msg)
                .context("PROFILE_LOCK_RENEWAL must be `fixed` or `renew`")?,
            Err(_) => LockRenewal::default(),
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            refresh_token_expiry_days,
            refresh_cookie_secure,
            refresh_cookie_domain,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            storage_public_base_url,
            profile_edit_window_hours,
            profile_lock_renewal,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    pub fn edit_lock_policy(&self) -> EditLockPolicy {
        EditLockPolicy::new(
            chrono::Duration::hours(self.profile_edit_window_hours),
            self.profile_lock_renewal,
        )
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

/// Hours between profile creation and the owner's edit lock, capped at a year.
fn parse_edit_window_hours(raw: Option<&str>) -> Result<i64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_EDIT_WINDOW_HOURS);
    };
    let hours: i64 = raw
        .trim()
        .parse()
        .context("PROFILE_EDIT_WINDOW_HOURS must be an integer")?;
    anyhow::ensure!(
        (1..=MAX_EDIT_WINDOW_HOURS).contains(&hours),
        "PROFILE_EDIT_WINDOW_HOURS must be between 1 and {MAX_EDIT_WINDOW_HOURS}"
    );
    Ok(hours)
}

fn default_public_base_url(endpoint: Option<&str>, bucket: &str, region: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
    }
}
