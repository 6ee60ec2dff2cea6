//! Users, sessions and route gating.
//!
//! Session state is never looked up ambiently: the gate middleware resolves a
//! [`SessionStatus`] once per request and hands it to handlers through request
//! extensions, where the [`Session`] extractor picks it up.

mod gate;
mod session;

pub use gate::{decide, gate_middleware, Gate, PROTECTED_PATHS, SESSION_STATUS_HEADER};
pub use session::{
    bearer_or_cookie_token, run_session_sweeper, sweep_expired_sessions, RequireUser, Session,
    SessionResolver, SESSION_COOKIE,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    User,
}

/// A signed-in user, identified by the identity provider's stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
}

/// The profile handed over by the OAuth identity provider on sign-in.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub discriminator: String,
}

impl User {
    /// Map a provider profile to a user. The configured owner id gets the `Owner` role.
    pub fn from_profile(profile: &Profile, owner_id: Option<&str>) -> Self {
        let role = if owner_id == Some(profile.id.as_str()) {
            Role::Owner
        } else {
            Role::User
        };

        Self {
            id: profile.id.clone(),
            name: format!("{}#{}", profile.username, profile.discriminator),
            role,
        }
    }
}

/// Where the session of the current request stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// The session store did not answer in time.
    Loading,
    Authenticated(User),
    Unauthenticated,
}

impl SessionStatus {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionStatus::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Loading => "loading",
            SessionStatus::Authenticated(_) => "authenticated",
            SessionStatus::Unauthenticated => "unauthenticated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.to_string(),
            username: "ferris".to_string(),
            discriminator: "0042".to_string(),
        }
    }

    #[test]
    fn test_from_profile_builds_display_name() {
        let user = User::from_profile(&profile("123"), None);
        assert_eq!(user.id, "123");
        assert_eq!(user.name, "ferris#0042");
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_from_profile_assigns_owner_role() {
        let user = User::from_profile(&profile("188903265931362304"), Some("188903265931362304"));
        assert_eq!(user.role, Role::Owner);

        let user = User::from_profile(&profile("1"), Some("188903265931362304"));
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_session_status_user() {
        let user = User::from_profile(&profile("1"), None);
        assert_eq!(
            SessionStatus::Authenticated(user.clone()).user(),
            Some(&user)
        );
        assert_eq!(SessionStatus::Loading.user(), None);
        assert_eq!(SessionStatus::Unauthenticated.user(), None);
    }
}
