use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "b0e7c8f2-1d2e-4f60-8c4b-2f1a9e0d7c55",
    "email": "budi@pkpcktr.medan.go.id",
    "name": "Budi Santoso",
    "nip": "198705122010011003",
    "pangkat": "Penata Muda / III-a",
    "jabatan": "Staf Teknis",
    "role": "User"
}))]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Employee number
    pub nip: String,
    /// Rank, optional
    pub pangkat: Option<String>,
    /// Position
    pub jabatan: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub nip: String,
    pub pangkat: Option<String>,
    pub jabatan: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub profile: UserProfile,
    pub password_hash: String,
}

/// Partial profile edit. `pangkat: Some("")` clears the rank.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub nip: Option<String>,
    pub pangkat: Option<String>,
    pub jabatan: Option<String>,
    pub role: Option<Role>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.nip.is_none()
            && self.pangkat.is_none()
            && self.jabatan.is_none()
            && self.role.is_none()
    }

    pub fn apply(&self, profile: &mut UserProfile) {
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(nip) = &self.nip {
            profile.nip = nip.clone();
        }
        if let Some(pangkat) = &self.pangkat {
            profile.pangkat = normalize_optional(pangkat);
        }
        if let Some(jabatan) = &self.jabatan {
            profile.jabatan = jabatan.clone();
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
    }
}

pub fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
