use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Registration derives the role from the stated position: only the
    /// literal jabatan "ADMIN" (case and surrounding whitespace ignored)
    /// grants administrator access.
    pub fn from_jabatan(jabatan: &str) -> Self {
        if jabatan.trim().to_uppercase() == "ADMIN" {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn is_admin(&self) -> bool {
        *self == Role::Admin
    }
}
