//! In-memory repositories, fake external clients and an HTTP test client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    assistant::{
        context::strip_context,
        runtime::{AgentEvent, AgentRuntime, AgentSession},
    },
    auth::{
        repo::{RefreshTokenRepo, UserRepo},
        repo_types::{NewRefreshToken, NewUser, RefreshTokenRecord, User},
    },
    db::{RepoError, RepoResult},
    identity::{ExternalIdentity, ExternalSession, IdentityError, IdentityProvider},
    pets::{
        repo::PetRepo,
        repo_types::{NewPet, Pet, PetPatch},
    },
    records::{
        repo::RecordRepo,
        repo_types::{ActivityRecord, NewRecord, RecordFilter, RecordPatch},
    },
    state::AppState,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    tokens: Vec<RefreshTokenRecord>,
    pets: Vec<Pet>,
    records: Vec<ActivityRecord>,
}

impl Tables {
    fn owns_pet(&self, owner: Uuid, pet_id: Uuid) -> bool {
        self.pets.iter().any(|p| p.id == pet_id && p.user_id == owner)
    }

    fn owned_pet_ids(&self, owner: Uuid) -> Vec<Uuid> {
        self.pets
            .iter()
            .filter(|p| p.user_id == owner)
            .map(|p| p.id)
            .collect()
    }
}

/// All four repositories over one lock, so cascades behave like the database.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store poisoned")
    }

    pub fn refresh_tokens(&self) -> Vec<RefreshTokenRecord> {
        self.lock().tokens.clone()
    }

    pub fn put_refresh_token(&self, rec: RefreshTokenRecord) {
        self.lock().tokens.push(rec);
    }

    pub fn pets(&self) -> Vec<Pet> {
        self.lock().pets.clone()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        self.lock().records.clone()
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> RepoResult<User> {
        let mut t = self.lock();
        if t.users.iter().any(|u| u.email == new.email) {
            return Err(RepoError::Conflict("Email"));
        }
        if new.external_id.is_some()
            && t.users.iter().any(|u| u.external_id == new.external_id)
        {
            return Err(RepoError::Conflict("External identity"));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            external_id: new.external_id,
            email_verified: new.email_verified,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn link_external_id(
        &self,
        id: Uuid,
        external_id: &str,
        email_verified: bool,
    ) -> RepoResult<User> {
        let mut t = self.lock();
        if t
            .users
            .iter()
            .any(|u| u.id != id && u.external_id.as_deref() == Some(external_id))
        {
            return Err(RepoError::Conflict("External identity"));
        }
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::Database(sqlx::Error::RowNotFound))?;
        user.external_id = Some(external_id.to_string());
        user.email_verified = email_verified;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn set_email_verified(&self, id: Uuid, verified: bool) -> RepoResult<()> {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.id == id) {
            u.email_verified = verified;
        }
        Ok(())
    }

    async fn change_password(&self, id: Uuid, password_hash: &str) -> RepoResult<u64> {
        let mut t = self.lock();
        if let Some(u) = t.users.iter_mut().find(|u| u.id == id) {
            u.password_hash = Some(password_hash.to_string());
            u.updated_at = OffsetDateTime::now_utc();
        }
        let mut revoked = 0;
        for r in t.tokens.iter_mut().filter(|r| r.user_id == id && r.is_valid) {
            r.is_valid = false;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        let pet_ids = t.owned_pet_ids(id);
        t.records.retain(|r| !pet_ids.contains(&r.pet_id));
        t.pets.retain(|p| p.user_id != id);
        t.tokens.retain(|r| r.user_id != id);
        let before = t.users.len();
        t.users.retain(|u| u.id != id);
        Ok(t.users.len() < before)
    }
}

#[async_trait]
impl RefreshTokenRepo for MemoryStore {
    async fn insert(&self, new: NewRefreshToken) -> RepoResult<RefreshTokenRecord> {
        let rec = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            token_hash: new.token_hash,
            expires_at: new.expires_at,
            is_valid: true,
            device_id: new.device_id,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().tokens.push(rec.clone());
        Ok(rec)
    }

    async fn find_active(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> RepoResult<Option<RefreshTokenRecord>> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .find(|r| r.token_hash == token_hash && r.is_usable(now))
            .cloned())
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        expires_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> RepoResult<Option<RefreshTokenRecord>> {
        let mut t = self.lock();
        let Some(old) = t
            .tokens
            .iter_mut()
            .find(|r| r.token_hash == old_hash && r.is_usable(now))
        else {
            return Ok(None);
        };
        old.is_valid = false;
        let rec = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: old.user_id,
            token_hash: new_hash.to_string(),
            expires_at,
            is_valid: true,
            device_id: old.device_id.clone(),
            created_at: now,
        };
        t.tokens.push(rec.clone());
        Ok(Some(rec))
    }

    async fn revoke(&self, token_hash: &str) -> RepoResult<bool> {
        let mut hit = false;
        for r in self.lock().tokens.iter_mut().filter(|r| r.token_hash == token_hash) {
            r.is_valid = false;
            hit = true;
        }
        Ok(hit)
    }

    async fn revoke_all(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut n = 0;
        for r in self
            .lock()
            .tokens
            .iter_mut()
            .filter(|r| r.user_id == user_id && r.is_valid)
        {
            r.is_valid = false;
            n += 1;
        }
        Ok(n)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> RepoResult<u64> {
        let mut t = self.lock();
        let before = t.tokens.len();
        t.tokens.retain(|r| r.expires_at > now);
        Ok((before - t.tokens.len()) as u64)
    }

    async fn count_active(&self, user_id: Uuid, now: OffsetDateTime) -> RepoResult<i64> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .filter(|r| r.user_id == user_id && r.is_usable(now))
            .count() as i64)
    }
}

#[async_trait]
impl PetRepo for MemoryStore {
    async fn list(&self, owner: Uuid) -> RepoResult<Vec<Pet>> {
        Ok(self
            .lock()
            .pets
            .iter()
            .filter(|p| p.user_id == owner)
            .cloned()
            .collect())
    }

    async fn get(&self, owner: Uuid, id: Uuid) -> RepoResult<Option<Pet>> {
        Ok(self
            .lock()
            .pets
            .iter()
            .find(|p| p.id == id && p.user_id == owner)
            .cloned())
    }

    async fn create(&self, owner: Uuid, new: NewPet) -> RepoResult<Pet> {
        let now = OffsetDateTime::now_utc();
        let pet = Pet {
            id: Uuid::new_v4(),
            user_id: owner,
            name: new.name,
            species: new.species,
            breed: new.breed,
            gender: new.gender,
            birthdate: new.birthdate,
            weight: new.weight,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        self.lock().pets.push(pet.clone());
        Ok(pet)
    }

    async fn update(&self, owner: Uuid, id: Uuid, patch: PetPatch) -> RepoResult<Option<Pet>> {
        let mut t = self.lock();
        let Some(pet) = t
            .pets
            .iter_mut()
            .find(|p| p.id == id && p.user_id == owner)
        else {
            return Ok(None);
        };
        patch.apply(pet);
        pet.updated_at = OffsetDateTime::now_utc();
        Ok(Some(pet.clone()))
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        if !t.owns_pet(owner, id) {
            return Ok(false);
        }
        t.records.retain(|r| r.pet_id != id);
        t.pets.retain(|p| p.id != id);
        Ok(true)
    }
}

#[async_trait]
impl RecordRepo for MemoryStore {
    async fn create(&self, owner: Uuid, new: NewRecord) -> RepoResult<Option<ActivityRecord>> {
        let mut t = self.lock();
        if !t.owns_pet(owner, new.pet_id) {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        let rec = ActivityRecord {
            id: Uuid::new_v4(),
            pet_id: new.pet_id,
            category: new.category,
            title: new.title,
            date: new.date,
            time: new.time,
            repeat_type: new.repeat_type,
            repeat_interval: new.repeat_interval,
            repeat_end_date: new.repeat_end_date,
            repeat_count: new.repeat_count,
            notify: new.notify,
            notes: new.notes,
            food_type: new.food_type,
            quantity: new.quantity,
            duration: new.duration,
            created_at: now,
            updated_at: now,
        };
        t.records.push(rec.clone());
        Ok(Some(rec))
    }

    async fn list(&self, owner: Uuid, filter: &RecordFilter) -> RepoResult<Vec<ActivityRecord>> {
        let t = self.lock();
        let pets = t.owned_pet_ids(owner);
        let mut rows: Vec<ActivityRecord> = t
            .records
            .iter()
            .filter(|r| pets.contains(&r.pet_id) && filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.date, a.time, a.id).cmp(&(b.date, b.time, b.id)));
        Ok(rows
            .into_iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn pet_owned(&self, owner: Uuid, pet_id: Uuid) -> RepoResult<bool> {
        Ok(self.lock().owns_pet(owner, pet_id))
    }

    async fn get(&self, owner: Uuid, id: Uuid) -> RepoResult<Option<ActivityRecord>> {
        let t = self.lock();
        Ok(t
            .records
            .iter()
            .find(|r| r.id == id && t.owns_pet(owner, r.pet_id))
            .cloned())
    }

    async fn update(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: RecordPatch,
    ) -> RepoResult<Option<ActivityRecord>> {
        let mut t = self.lock();
        let pets = t.owned_pet_ids(owner);
        let Some(rec) = t
            .records
            .iter_mut()
            .find(|r| r.id == id && pets.contains(&r.pet_id))
        else {
            return Ok(None);
        };
        patch.apply(rec);
        rec.updated_at = OffsetDateTime::now_utc();
        Ok(Some(rec.clone()))
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> RepoResult<bool> {
        let mut t = self.lock();
        let pets = t.owned_pet_ids(owner);
        let before = t.records.len();
        t.records.retain(|r| !(r.id == id && pets.contains(&r.pet_id)));
        Ok(t.records.len() < before)
    }

    async fn disable_notifications(&self, owner: Uuid) -> RepoResult<u64> {
        let mut t = self.lock();
        let pets = t.owned_pet_ids(owner);
        let mut n = 0;
        for r in t
            .records
            .iter_mut()
            .filter(|r| pets.contains(&r.pet_id) && r.notify)
        {
            r.notify = false;
            n += 1;
        }
        Ok(n)
    }
}

#[derive(Debug, Clone)]
struct FakeAccount {
    uid: String,
    email: String,
    password: Option<String>,
    verified: bool,
    display_name: Option<String>,
}

#[derive(Default)]
struct IdentityInner {
    accounts: Vec<FakeAccount>,
    verification_emails: usize,
}

/// Identity provider where an account's ID token is its uid.
#[derive(Clone, Default)]
pub struct FakeIdentity {
    inner: Arc<Mutex<IdentityInner>>,
}

impl FakeIdentity {
    pub fn empty() -> Self {
        Self::default()
    }

    fn with_account(uid: &str, email: &str, verified: bool) -> Self {
        let fake = Self::default();
        fake.lock().accounts.push(FakeAccount {
            uid: uid.into(),
            email: email.into(),
            password: None,
            verified,
            display_name: None,
        });
        fake
    }

    pub fn verified(uid: &str, email: &str) -> Self {
        Self::with_account(uid, email, true)
    }

    pub fn unverified(uid: &str, email: &str) -> Self {
        Self::with_account(uid, email, false)
    }

    pub fn verification_emails(&self) -> usize {
        self.lock().verification_emails
    }

    fn lock(&self) -> MutexGuard<'_, IdentityInner> {
        self.inner.lock().expect("fake identity poisoned")
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn verify_id_token(&self, id_token: &str) -> Result<ExternalIdentity, IdentityError> {
        let inner = self.lock();
        let acct = inner
            .accounts
            .iter()
            .find(|a| a.uid == id_token)
            .ok_or(IdentityError::InvalidToken)?;
        Ok(ExternalIdentity {
            uid: acct.uid.clone(),
            email: acct.email.clone(),
            email_verified: acct.verified,
            display_name: acct.display_name.clone(),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ExternalSession, IdentityError> {
        let inner = self.lock();
        let acct = inner
            .accounts
            .iter()
            .find(|a| a.email == email && a.password.as_deref() == Some(password))
            .ok_or(IdentityError::InvalidCredentials)?;
        Ok(ExternalSession {
            uid: acct.uid.clone(),
            id_token: acct.uid.clone(),
        })
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<ExternalSession, IdentityError> {
        let mut inner = self.lock();
        if inner.accounts.iter().any(|a| a.email == email) {
            return Err(IdentityError::EmailExists);
        }
        let uid = format!("uid-{}", inner.accounts.len() + 1);
        inner.accounts.push(FakeAccount {
            uid: uid.clone(),
            email: email.into(),
            password: Some(password.into()),
            verified: false,
            display_name: display_name.map(Into::into),
        });
        Ok(ExternalSession {
            id_token: uid.clone(),
            uid,
        })
    }

    async fn send_email_verification(&self, id_token: &str) -> Result<(), IdentityError> {
        let mut inner = self.lock();
        if !inner.accounts.iter().any(|a| a.uid == id_token) {
            return Err(IdentityError::InvalidToken);
        }
        inner.verification_emails += 1;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        if !self.lock().accounts.iter().any(|a| a.email == email) {
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(())
    }

    async fn update_password(&self, id_token: &str, new_password: &str) -> Result<(), IdentityError> {
        let mut inner = self.lock();
        let acct = inner
            .accounts
            .iter_mut()
            .find(|a| a.uid == id_token)
            .ok_or(IdentityError::InvalidToken)?;
        acct.password = Some(new_password.into());
        Ok(())
    }

    async fn delete_account(&self, id_token: &str) -> Result<(), IdentityError> {
        let mut inner = self.lock();
        let before = inner.accounts.len();
        inner.accounts.retain(|a| a.uid != id_token);
        if inner.accounts.len() == before {
            return Err(IdentityError::InvalidToken);
        }
        Ok(())
    }
}

#[derive(Default)]
struct AgentInner {
    sessions: HashMap<(String, String), AgentSession>,
    created: usize,
    last_prompt: Option<String>,
    silent: bool,
}

/// Agent runtime that echoes the user's message without its context block.
#[derive(Default)]
pub struct FakeAgent {
    inner: Mutex<AgentInner>,
}

impl FakeAgent {
    fn lock(&self) -> MutexGuard<'_, AgentInner> {
        self.inner.lock().expect("fake agent poisoned")
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.lock().last_prompt.clone()
    }

    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }
}

#[async_trait]
impl AgentRuntime for FakeAgent {
    async fn create_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        state: Value,
    ) -> anyhow::Result<AgentSession> {
        let mut inner = self.lock();
        inner.created += 1;
        let id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("session-{}", inner.created));
        let key = (user_id.to_string(), id.clone());
        anyhow::ensure!(!inner.sessions.contains_key(&key), "session {} exists", id);
        let session = AgentSession {
            id,
            state: if state.is_null() { json!({}) } else { state },
            create_time: Some(0.0),
            update_time: Some(0.0),
            events: Vec::new(),
        };
        inner.sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> anyhow::Result<Option<AgentSession>> {
        let key = (user_id.to_string(), session_id.to_string());
        Ok(self.lock().sessions.get(&key).cloned())
    }

    async fn list_sessions(&self, user_id: &str) -> anyhow::Result<Vec<AgentSession>> {
        let mut sessions: Vec<AgentSession> = self
            .lock()
            .sessions
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, s)| s.clone())
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> anyhow::Result<()> {
        let key = (user_id.to_string(), session_id.to_string());
        self.lock().sessions.remove(&key);
        Ok(())
    }

    async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> anyhow::Result<Option<String>> {
        let mut inner = self.lock();
        inner.last_prompt = Some(message.to_string());
        let silent = inner.silent;
        let key = (user_id.to_string(), session_id.to_string());
        let session = inner
            .sessions
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("session {} not found", session_id))?;

        let n = session.events.len();
        session.events.push(AgentEvent {
            id: format!("e{}", n + 1),
            author: Some("user".into()),
            text: Some(message.to_string()),
            timestamp: Some(n as f64),
        });
        if silent {
            return Ok(None);
        }
        let reply = format!("echo: {}", strip_context(message));
        session.events.push(AgentEvent {
            id: format!("e{}", n + 2),
            author: Some("pet_assistant".into()),
            text: Some(reply.clone()),
            timestamp: Some((n + 1) as f64),
        });
        Ok(Some(reply))
    }
}

/// Drives the full router in-process.
pub struct TestClient {
    app: Router,
    pub store: Arc<MemoryStore>,
    pub agent: Arc<FakeAgent>,
}

impl TestClient {
    pub const PASSWORD: &'static str = "correct-horse";

    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_identity(identity: FakeIdentity) -> Self {
        Self::build(Some(identity))
    }

    fn build(identity: Option<FakeIdentity>) -> Self {
        let store = Arc::new(MemoryStore::default());
        let (mut state, agent) = AppState::fake_with(store.clone());
        if let Some(identity) = identity {
            state = state.with_identity(identity);
        }
        Self {
            app: build_app(state),
            store,
            agent,
        }
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header("authorization", format!("Bearer {}", t));
        }
        let req = if body.is_null() {
            req.body(Body::empty())
        } else {
            req.header("content-type", "application/json")
                .body(Body::from(body.to_string()))
        }
        .expect("request");

        let res = self.app.clone().oneshot(req).await.expect("response");
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send("GET", uri, token, Value::Null).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, token, body).await
    }

    /// Register `email` with [`Self::PASSWORD`] and return an access token.
    pub async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({ "username": "tester", "email": email, "password": Self::PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }
}
