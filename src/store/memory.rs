use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use super::{
    EVENT_CAPACITY, RecordEvent, RecordFilter, RecordPatch, RecordStore, StoreError, UserStore,
};
use crate::model::overtime::{NewOvertimeRecord, OvertimeRecord};
use crate::model::user::{NewUser, UserCredentials, UserPatch, UserProfile};

/// Process-local record store. Every write happens under one lock, so the
/// one-active-record check and the insert are a single step.
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<String, OvertimeRecord>>,
    events: broadcast::Sender<RecordEvent>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, event: RecordEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, new: NewOvertimeRecord) -> Result<OvertimeRecord, StoreError> {
        let mut records = self.records.lock().await;
        if records
            .values()
            .any(|r| r.employee_id == new.employee_id && r.is_active())
        {
            return Err(StoreError::Conflict(format!(
                "employee {} already has an active record",
                new.employee_id
            )));
        }

        let record = new.into_record(Uuid::new_v4().to_string());
        records.insert(record.id.clone(), record.clone());
        drop(records);

        self.publish(RecordEvent::Created {
            record: record.clone(),
        });
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<OvertimeRecord>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn update(&self, id: &str, patch: RecordPatch) -> Result<OvertimeRecord, StoreError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;

        if let Some(expected) = patch.expected_status {
            if record.status != expected {
                return Err(StoreError::Conflict(format!(
                    "record {} is {}, expected {}",
                    id, record.status, expected
                )));
            }
        }

        patch.apply(record);
        let updated = record.clone();
        drop(records);

        self.publish(RecordEvent::Updated {
            record: updated.clone(),
        });
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.records.lock().await.remove(id);
        match removed {
            Some(record) => {
                self.publish(RecordEvent::Deleted {
                    id: record.id,
                    employee_id: record.employee_id,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<OvertimeRecord>, StoreError> {
        let records = self.records.lock().await;
        let mut matching: Vec<OvertimeRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        drop(records);

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = filter.offset as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, filter: &RecordFilter) -> Result<u64, StoreError> {
        let records = self.records.lock().await;
        Ok(records.values().filter(|r| filter.matches(r)).count() as u64)
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }
}

struct StoredUser {
    profile: UserProfile,
    password_hash: String,
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<String, StoredUser>>,
    /// jti -> (user id, expiry, revoked)
    refresh_tokens: Mutex<HashMap<String, (String, DateTime<Utc>, bool)>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<UserProfile, StoreError> {
        let mut users = self.users.lock().await;
        let email = user.email.to_lowercase();
        if users.values().any(|u| u.profile.email == email) {
            return Err(StoreError::Conflict(format!("email {} already registered", email)));
        }

        let profile = UserProfile {
            id: Uuid::new_v4().to_string(),
            email,
            name: user.name,
            nip: user.nip,
            pangkat: user.pangkat,
            jabatan: user.jabatan,
            role: user.role,
        };
        users.insert(
            profile.id.clone(),
            StoredUser {
                profile: profile.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(profile)
    }

    async fn credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let email = email.to_lowercase();
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| u.profile.email == email)
            .map(|u| UserCredentials {
                profile: u.profile.clone(),
                password_hash: u.password_hash.clone(),
            }))
    }

    async fn get(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.lock().await.get(id).map(|u| u.profile.clone()))
    }

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        let mut profiles: Vec<UserProfile> = self
            .users
            .lock()
            .await
            .values()
            .map(|u| u.profile.clone())
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(profiles)
    }

    async fn update(&self, id: &str, patch: UserPatch) -> Result<UserProfile, StoreError> {
        let mut users = self.users.lock().await;
        let stored = users.get_mut(id).ok_or(StoreError::NotFound)?;
        patch.apply(&mut stored.profile);
        Ok(stored.profile.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.users.lock().await.remove(id).is_some())
    }

    async fn store_refresh_token(
        &self,
        user_id: &str,
        jti: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.refresh_tokens
            .lock()
            .await
            .insert(jti.to_string(), (user_id.to_string(), expires_at, false));
        Ok(())
    }

    async fn revoke_refresh_token(&self, jti: &str) -> Result<bool, StoreError> {
        let mut tokens = self.refresh_tokens.lock().await;
        match tokens.get_mut(jti) {
            Some((_, expires_at, revoked)) if !*revoked => {
                *revoked = true;
                Ok(*expires_at > Utc::now())
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::overtime::{GeoLocation, PhotoKind, RecordStatus, VerificationStatus};
    use crate::model::role::Role;

    fn check_in(employee: &str, purpose: &str) -> NewOvertimeRecord {
        NewOvertimeRecord {
            employee_id: employee.to_string(),
            employee_name: employee.to_uppercase(),
            check_in_time: Utc::now(),
            check_in_location: GeoLocation {
                latitude: 3.59,
                longitude: 98.67,
            },
            purpose: purpose.to_string(),
            check_in_validation: None,
        }
    }

    #[tokio::test]
    async fn second_active_record_for_same_employee_conflicts() {
        let store = InMemoryRecordStore::new();
        store.insert(check_in("budi", "laporan")).await.unwrap();

        let err = store.insert(check_in("budi", "rapat")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // another employee is unaffected
        store.insert(check_in("citra", "rapat")).await.unwrap();
    }

    #[tokio::test]
    async fn conditional_update_rejects_wrong_status() {
        let store = InMemoryRecordStore::new();
        let record = store.insert(check_in("budi", "laporan")).await.unwrap();

        let patch = RecordPatch {
            expected_status: Some(RecordStatus::CheckedOut),
            verification_status: Some(VerificationStatus::Accepted),
            ..Default::default()
        };
        let err = store.update(&record.id, patch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let unchanged = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(unchanged.verification_status, VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn update_merges_only_given_fields() {
        let store = InMemoryRecordStore::new();
        let record = store.insert(check_in("budi", "laporan")).await.unwrap();

        let updated = store
            .update(&record.id, RecordPatch::photo(PhotoKind::CheckIn, "u1".into()))
            .await
            .unwrap();
        assert_eq!(updated.check_in_photo.as_deref(), Some("u1"));
        assert_eq!(updated.status, RecordStatus::CheckedIn);
        assert_eq!(updated.purpose, "laporan");

        let missing = store.update("nope", RecordPatch::default()).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound));
    }

    #[tokio::test]
    async fn query_filters_orders_and_pages() {
        let store = InMemoryRecordStore::new();
        let first = store.insert(check_in("budi", "Finish Report")).await.unwrap();
        store
            .update(
                &first.id,
                RecordPatch {
                    status: Some(RecordStatus::CheckedOut),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.insert(check_in("budi", "rapat")).await.unwrap();
        store.insert(check_in("citra", "report review")).await.unwrap();

        let own = store.query(&RecordFilter::for_employee("budi")).await.unwrap();
        assert_eq!(own.len(), 2);
        assert_eq!(own[0].id, second.id);

        let filter = RecordFilter {
            purpose_contains: Some("REPORT".into()),
            ..Default::default()
        };
        assert_eq!(store.count(&filter).await.unwrap(), 2);

        let paged = RecordFilter {
            limit: Some(1),
            offset: 1,
            ..Default::default()
        };
        assert_eq!(store.query(&paged).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn writes_are_broadcast() {
        let store = InMemoryRecordStore::new();
        let mut rx = store.subscribe();

        let record = store.insert(check_in("budi", "laporan")).await.unwrap();
        assert!(store.delete(&record.id).await.unwrap());
        assert!(!store.delete(&record.id).await.unwrap());

        assert!(matches!(rx.recv().await.unwrap(), RecordEvent::Created { .. }));
        match rx.recv().await.unwrap() {
            RecordEvent::Deleted { id, employee_id } => {
                assert_eq!(id, record.id);
                assert_eq!(employee_id, "budi");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_case_insensitive() {
        let users = InMemoryUserStore::new();
        let new_user = |email: &str| NewUser {
            email: email.into(),
            password_hash: "hash".into(),
            name: "Budi".into(),
            nip: "1987".into(),
            pangkat: None,
            jabatan: "Staf".into(),
            role: Role::User,
        };
        users.create(new_user("budi@medan.go.id")).await.unwrap();
        let err = users.create(new_user("BUDI@medan.go.id")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn refresh_token_revokes_once() {
        let users = InMemoryUserStore::new();
        let expires = Utc::now() + chrono::Duration::hours(1);
        users.store_refresh_token("u1", "jti-1", expires).await.unwrap();

        assert!(users.revoke_refresh_token("jti-1").await.unwrap());
        assert!(!users.revoke_refresh_token("jti-1").await.unwrap());
        assert!(!users.revoke_refresh_token("unknown").await.unwrap());
    }
}
