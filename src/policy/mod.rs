//! Authorization and rating rules shared by the HTTP handlers. Nothing in
//! here touches the database or the clock; callers pass `now` in.

pub mod consensus;
pub mod edit_lock;
pub mod navigation;
pub mod roles;
pub mod status;

pub use edit_lock::{Actor, EditDecision, EditLockPolicy, LockRenewal, ProfileLock};
pub use navigation::{check_path, RouteDecision};
pub use roles::{can_access, landing_route, Role};
pub use status::{AssessmentStatus, StatusActor};
