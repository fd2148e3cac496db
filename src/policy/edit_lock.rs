//! Time-gated profile edit lock.
//!
//! A profile owner may edit their own record until the lock deadline; after
//! that only assessors and HR can change it. The deadline is
//! `created_at + window` unless the row carries an explicit
//! `edit_locked_until`.

use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use uuid::Uuid;

use super::roles::{is_privileged, Role};

pub const DEFAULT_EDIT_WINDOW_HOURS: i64 = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockRenewal {
    /// Deadline is set at creation and never moves.
    #[default]
    Fixed,
    /// Every permitted write re-arms the deadline to `now + window`.
    RenewOnEdit,
}

impl FromStr for LockRenewal {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(LockRenewal::Fixed),
            "renew" | "renew-on-edit" => Ok(LockRenewal::RenewOnEdit),
            other => Err(format!("unknown lock renewal mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub user_id: Uuid,
    pub email: &'a str,
    pub roles: &'a [Role],
}

#[derive(Debug, Clone, Copy)]
pub struct ProfileLock<'a> {
    pub owner_id: Option<Uuid>,
    pub owner_email: &'a str,
    pub created_at: NaiveDateTime,
    pub edit_locked_until: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditDecision {
    Privileged,
    OwnerWindow { remaining: Duration },
    Locked { deadline: NaiveDateTime },
    NotOwner,
}

impl EditDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(
            self,
            EditDecision::Privileged | EditDecision::OwnerWindow { .. }
        )
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            EditDecision::OwnerWindow { remaining } => Some(*remaining),
            _ => None,
        }
    }

    /// Message for the read-only banner, or the countdown while the owner
    /// window is open.
    pub fn banner(&self) -> Option<String> {
        match self {
            EditDecision::Privileged => None,
            EditDecision::OwnerWindow { remaining } => Some(format_remaining(*remaining)),
            EditDecision::Locked { .. } => Some(
                "This profile is locked. Ask an assessor or HR to make further changes."
                    .to_string(),
            ),
            EditDecision::NotOwner => {
                Some("You can only edit your own profile.".to_string())
            }
        }
    }
}

pub fn format_remaining(remaining: Duration) -> String {
    let minutes = remaining.num_minutes().max(0);
    format!("locks in {}h {}m", minutes / 60, minutes % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditLockPolicy {
    window: Duration,
    renewal: LockRenewal,
}

impl Default for EditLockPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_EDIT_WINDOW_HOURS), LockRenewal::Fixed)
    }
}

impl EditLockPolicy {
    pub fn new(window: Duration, renewal: LockRenewal) -> Self {
        Self { window, renewal }
    }

    pub fn initial_deadline(&self, created_at: NaiveDateTime) -> NaiveDateTime {
        created_at + self.window
    }

    pub fn deadline(&self, profile: &ProfileLock<'_>) -> NaiveDateTime {
        profile
            .edit_locked_until
            .unwrap_or_else(|| self.initial_deadline(profile.created_at))
    }

    pub fn is_owner(&self, actor: &Actor<'_>, profile: &ProfileLock<'_>) -> bool {
        match profile.owner_id {
            Some(owner_id) => owner_id == actor.user_id,
            None => {
                !profile.owner_email.is_empty()
                    && profile.owner_email.eq_ignore_ascii_case(actor.email)
            }
        }
    }

    pub fn can_edit_profile(
        &self,
        actor: &Actor<'_>,
        profile: &ProfileLock<'_>,
        now: NaiveDateTime,
    ) -> EditDecision {
        if is_privileged(actor.roles) {
            return EditDecision::Privileged;
        }

        if !self.is_owner(actor, profile) {
            return EditDecision::NotOwner;
        }

        let deadline = self.deadline(profile);
        if now < deadline {
            EditDecision::OwnerWindow {
                remaining: deadline - now,
            }
        } else {
            EditDecision::Locked { deadline }
        }
    }

    /// Value to store in `edit_locked_until` after a permitted write at `now`.
    pub fn deadline_after_edit(&self, profile: &ProfileLock<'_>, now: NaiveDateTime) -> NaiveDateTime {
        match self.renewal {
            LockRenewal::Fixed => self.deadline(profile),
            LockRenewal::RenewOnEdit => now + self.window,
        }
    }
}
