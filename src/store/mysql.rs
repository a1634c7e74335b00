use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySqlPool};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    EVENT_CAPACITY, RecordEvent, RecordFilter, RecordPatch, RecordStore, StoreError, UserStore,
};
use crate::model::overtime::{
    GeoLocation, NewOvertimeRecord, OvertimeRecord, PhotoValidation, RecordStatus,
    VerificationStatus,
};
use crate::model::role::Role;
use crate::model::user::{NewUser, UserCredentials, UserPatch, UserProfile, normalize_optional};
use crate::utils::db_utils::{SqlValue, build_update_sql, execute_update, like_contains};

const RECORD_COLUMNS: &str = r#"
    id, employee_id, employee_name, check_in_time, check_out_time,
    check_in_photo, check_out_photo,
    check_in_latitude, check_in_longitude, check_out_latitude, check_out_longitude,
    status, purpose, verification_status, verification_notes,
    check_in_validation, check_out_validation, created_at
"#;

fn is_duplicate_key(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        return db_err.code().as_deref() == Some("23000");
    }
    false
}

#[derive(FromRow)]
struct RecordRow {
    id: String,
    employee_id: String,
    employee_name: String,
    check_in_time: DateTime<Utc>,
    check_out_time: Option<DateTime<Utc>>,
    check_in_photo: Option<String>,
    check_out_photo: Option<String>,
    check_in_latitude: Option<f64>,
    check_in_longitude: Option<f64>,
    check_out_latitude: Option<f64>,
    check_out_longitude: Option<f64>,
    status: String,
    purpose: String,
    verification_status: String,
    verification_notes: Option<String>,
    check_in_validation: Option<String>,
    check_out_validation: Option<String>,
    created_at: DateTime<Utc>,
}

fn location(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoLocation> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoLocation {
            latitude,
            longitude,
        }),
        _ => None,
    }
}

fn decode_validation(raw: Option<String>) -> Result<Option<PhotoValidation>, StoreError> {
    raw.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| StoreError::Backend(format!("bad validation column: {}", e)))
}

fn encode_validation(validation: &PhotoValidation) -> Result<SqlValue, StoreError> {
    serde_json::to_string(validation)
        .map(SqlValue::Text)
        .map_err(|e| StoreError::Backend(e.to_string()))
}

impl TryFrom<RecordRow> for OvertimeRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = RecordStatus::from_str(&row.status)
            .map_err(|_| StoreError::Backend(format!("unknown status {:?}", row.status)))?;
        let verification_status = VerificationStatus::from_str(&row.verification_status)
            .map_err(|_| {
                StoreError::Backend(format!(
                    "unknown verification status {:?}",
                    row.verification_status
                ))
            })?;

        Ok(OvertimeRecord {
            id: row.id,
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            check_in_time: row.check_in_time,
            check_out_time: row.check_out_time,
            check_in_photo: row.check_in_photo,
            check_out_photo: row.check_out_photo,
            check_in_location: location(row.check_in_latitude, row.check_in_longitude),
            check_out_location: location(row.check_out_latitude, row.check_out_longitude),
            status,
            purpose: row.purpose,
            verification_status,
            verification_notes: row.verification_notes,
            check_in_validation: decode_validation(row.check_in_validation)?,
            check_out_validation: decode_validation(row.check_out_validation)?,
            created_at: row.created_at,
        })
    }
}

fn record_assignments(patch: &RecordPatch) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
    let mut set = Vec::new();
    if let Some(status) = patch.status {
        set.push(("status", SqlValue::Text(status.as_ref().to_string())));
    }
    if let Some(time) = patch.check_out_time {
        set.push(("check_out_time", SqlValue::Timestamp(time)));
    }
    if let Some(loc) = patch.check_out_location {
        set.push(("check_out_latitude", SqlValue::F64(loc.latitude)));
        set.push(("check_out_longitude", SqlValue::F64(loc.longitude)));
    }
    if let Some(url) = &patch.check_in_photo {
        set.push(("check_in_photo", SqlValue::Text(url.clone())));
    }
    if let Some(url) = &patch.check_out_photo {
        set.push(("check_out_photo", SqlValue::Text(url.clone())));
    }
    if let Some(v) = &patch.check_in_validation {
        set.push(("check_in_validation", encode_validation(v)?));
    }
    if let Some(v) = &patch.check_out_validation {
        set.push(("check_out_validation", encode_validation(v)?));
    }
    if let Some(status) = patch.verification_status {
        set.push((
            "verification_status",
            SqlValue::Text(status.as_ref().to_string()),
        ));
    }
    if let Some(notes) = &patch.verification_notes {
        set.push(("verification_notes", SqlValue::Text(notes.clone())));
    }
    Ok(set)
}

// Helper enum for typed SQLx binding
enum FilterValue {
    Text(String),
    Time(DateTime<Utc>),
}

fn where_clause(filter: &RecordFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    if let Some(employee_id) = &filter.employee_id {
        where_sql.push_str(" AND employee_id = ?");
        args.push(FilterValue::Text(employee_id.clone()));
    }
    if let Some(status) = filter.status {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Text(status.as_ref().to_string()));
    }
    if let Some(status) = filter.verification_status {
        where_sql.push_str(" AND verification_status = ?");
        args.push(FilterValue::Text(status.as_ref().to_string()));
    }
    if let Some(since) = filter.since {
        where_sql.push_str(" AND check_in_time >= ?");
        args.push(FilterValue::Time(since));
    }
    if let Some(until) = filter.until {
        where_sql.push_str(" AND check_in_time < ?");
        args.push(FilterValue::Time(until));
    }
    if let Some(needle) = &filter.purpose_contains {
        where_sql.push_str(" AND LOWER(purpose) LIKE ?");
        args.push(FilterValue::Text(like_contains(needle)));
    }

    (where_sql, args)
}

pub struct MySqlRecordStore {
    pool: MySqlPool,
    events: broadcast::Sender<RecordEvent>,
}

impl MySqlRecordStore {
    /// Change events are published by this process after each write; other
    /// server instances sharing the database do not see them.
    pub fn new(pool: MySqlPool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { pool, events }
    }

    fn publish(&self, event: RecordEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl RecordStore for MySqlRecordStore {
    async fn insert(&self, new: NewOvertimeRecord) -> Result<OvertimeRecord, StoreError> {
        let record = new.into_record(Uuid::new_v4().to_string());
        let validation = match &record.check_in_validation {
            Some(v) => Some(
                serde_json::to_string(v).map_err(|e| StoreError::Backend(e.to_string()))?,
            ),
            None => None,
        };
        let location = record.check_in_location;

        let result = sqlx::query(
            r#"
            INSERT INTO overtime_records
                (id, employee_id, employee_name, check_in_time,
                 check_in_latitude, check_in_longitude,
                 status, purpose, verification_status, check_in_validation, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.employee_id)
        .bind(&record.employee_name)
        .bind(record.check_in_time)
        .bind(location.map(|l| l.latitude))
        .bind(location.map(|l| l.longitude))
        .bind(record.status.as_ref())
        .bind(&record.purpose)
        .bind(record.verification_status.as_ref())
        .bind(validation)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                self.publish(RecordEvent::Created {
                    record: record.clone(),
                });
                Ok(record)
            }
            // uq_overtime_active
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict(format!(
                "employee {} already has an active record",
                record.employee_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<OvertimeRecord>, StoreError> {
        let sql = format!("SELECT {} FROM overtime_records WHERE id = ?", RECORD_COLUMNS);
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OvertimeRecord::try_from).transpose()
    }

    async fn update(&self, id: &str, patch: RecordPatch) -> Result<OvertimeRecord, StoreError> {
        let guard = patch
            .expected_status
            .map(|s| ("status", SqlValue::Text(s.as_ref().to_string())));
        let update = build_update_sql(
            "overtime_records",
            record_assignments(&patch)?,
            "id",
            id,
            guard,
        );

        let affected = match update {
            Some(update) => execute_update(&self.pool, update).await?.rows_affected(),
            None => 0,
        };

        let record = self.get(id).await?.ok_or(StoreError::NotFound)?;
        if affected == 0 {
            if let Some(expected) = patch.expected_status {
                if record.status != expected {
                    return Err(StoreError::Conflict(format!(
                        "record {} is {}, expected {}",
                        id, record.status, expected
                    )));
                }
            }
            // nothing changed
            return Ok(record);
        }

        self.publish(RecordEvent::Updated {
            record: record.clone(),
        });
        Ok(record)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let Some(record) = self.get(id).await? else {
            return Ok(false);
        };

        let result = sqlx::query("DELETE FROM overtime_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.publish(RecordEvent::Deleted {
            id: record.id,
            employee_id: record.employee_id,
        });
        Ok(true)
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<OvertimeRecord>, StoreError> {
        let (where_sql, args) = where_clause(filter);

        // MySQL needs a LIMIT before OFFSET
        let limit = filter.limit.unwrap_or(u64::MAX);
        let data_sql = format!(
            r#"
            SELECT {}
            FROM overtime_records
            {}
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            RECORD_COLUMNS, where_sql
        );

        let mut data_q = sqlx::query_as::<_, RecordRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::Text(v) => data_q.bind(v),
                FilterValue::Time(v) => data_q.bind(v),
            };
        }

        let rows = data_q
            .bind(limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(OvertimeRecord::try_from).collect()
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let (where_sql, args) = where_clause(filter);
        let count_sql = format!("SELECT COUNT(*) FROM overtime_records{}", where_sql);

        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in args {
            count_q = match arg {
                FilterValue::Text(v) => count_q.bind(v),
                FilterValue::Time(v) => count_q.bind(v),
            };
        }

        let total = count_q.fetch_one(&self.pool).await?;
        Ok(total.max(0) as u64)
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    name: String,
    nip: String,
    pangkat: Option<String>,
    jabatan: String,
    role: String,
}

impl UserRow {
    fn into_credentials(self) -> Result<UserCredentials, StoreError> {
        let role = Role::from_str(&self.role)
            .map_err(|_| StoreError::Backend(format!("unknown role {:?}", self.role)))?;
        Ok(UserCredentials {
            profile: UserProfile {
                id: self.id,
                email: self.email,
                name: self.name,
                nip: self.nip,
                pangkat: self.pangkat,
                jabatan: self.jabatan,
                role,
            },
            password_hash: self.password_hash,
        })
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, name, nip, pangkat, jabatan, role";

pub struct MySqlUserStore {
    pool: MySqlPool,
}

impl MySqlUserStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for MySqlUserStore {
    async fn create(&self, user: NewUser) -> Result<UserProfile, StoreError> {
        let profile = UserProfile {
            id: Uuid::new_v4().to_string(),
            email: user.email.to_lowercase(),
            name: user.name,
            nip: user.nip,
            pangkat: user.pangkat,
            jabatan: user.jabatan,
            role: user.role,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, nip, pangkat, jabatan, role)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&user.password_hash)
        .bind(&profile.name)
        .bind(&profile.nip)
        .bind(&profile.pangkat)
        .bind(&profile.jabatan)
        .bind(profile.role.as_ref())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(profile),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict(format!(
                "email {} already registered",
                profile.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRow::into_credentials).transpose()
    }

    async fn get(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(UserRow::into_credentials)
            .transpose()?
            .map(|c| c.profile))
    }

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        let sql = format!("SELECT {} FROM users ORDER BY name", USER_COLUMNS);
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| row.into_credentials().map(|c| c.profile))
            .collect()
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<UserProfile, StoreError> {
        let mut set = Vec::new();
        if let Some(name) = &patch.name {
            set.push(("name", SqlValue::Text(name.clone())));
        }
        if let Some(nip) = &patch.nip {
            set.push(("nip", SqlValue::Text(nip.clone())));
        }
        if let Some(pangkat) = &patch.pangkat {
            let value = normalize_optional(pangkat).map_or(SqlValue::Null, SqlValue::Text);
            set.push(("pangkat", value));
        }
        if let Some(jabatan) = &patch.jabatan {
            set.push(("jabatan", SqlValue::Text(jabatan.clone())));
        }
        if let Some(role) = patch.role {
            set.push(("role", SqlValue::Text(role.as_ref().to_string())));
        }

        if let Some(update) = build_update_sql("users", set, "id", id, None) {
            execute_update(&self.pool, update).await?;
        }

        self.get(id).await?.ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn store_refresh_token(
        &self,
        user_id: &str,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, jti, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = 1
            WHERE jti = ?
            AND revoked = 0
            AND expires_at > ?
            "#,
        )
        .bind(jti)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
