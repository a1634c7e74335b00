use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::role::Role;
use crate::model::user::UserProfile;

#[derive(Deserialize, ToSchema)]
#[schema(example = json!({
    "email": "budi@pkpcktr.medan.go.id",
    "password": "rahasia123",
    "name": "Budi Santoso",
    "nip": "198705122010011003",
    "pangkat": "Penata Muda / III-a",
    "jabatan": "Staf Teknis"
}))]
pub struct RegisterReq {
    pub email: String,
    pub password: String,
    pub name: String,
    pub nip: String,
    pub pangkat: Option<String>,
    pub jabatan: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    /// Email
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
