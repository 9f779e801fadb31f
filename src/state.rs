use crate::assistant::{AdkClient, AgentRuntime};
use crate::auth::{
    repo::{PgRefreshTokenRepo, PgUserRepo, RefreshTokenRepo, UserRepo},
    session::SessionIssuer,
};
use crate::config::AppConfig;
use crate::identity::{FirebaseIdentity, IdentityProvider};
use crate::pets::repo::{PetRepo, PgPetRepo};
use crate::records::repo::{PgRecordRepo, RecordRepo};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub pets: Arc<dyn PetRepo>,
    pub records: Arc<dyn RecordRepo>,
    pub session: Arc<SessionIssuer>,
    /// `None` when no identity provider is configured.
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub agent: Arc<dyn AgentRuntime>,
}

impl AppState {
    pub fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build http client")?;

        let tokens = Arc::new(PgRefreshTokenRepo::new(db.clone())) as Arc<dyn RefreshTokenRepo>;
        let session = Arc::new(SessionIssuer::new(&config.jwt, tokens)?);

        let identity = config.identity.as_ref().map(|cfg| {
            Arc::new(FirebaseIdentity::new(http.clone(), cfg)) as Arc<dyn IdentityProvider>
        });
        if identity.is_none() {
            tracing::warn!("FIREBASE_API_KEY not set; identity provider endpoints disabled");
        }

        let agent = Arc::new(AdkClient::new(http, &config.agent)?) as Arc<dyn AgentRuntime>;

        Ok(Self {
            users: Arc::new(PgUserRepo::new(db.clone())),
            pets: Arc::new(PgPetRepo::new(db.clone())),
            records: Arc::new(PgRecordRepo::new(db)),
            session,
            identity,
            agent,
        })
    }
}

#[cfg(test)]
impl AppState {
    /// State backed by one in-memory store and fake external clients.
    pub fn fake() -> Self {
        let store = Arc::new(crate::testing::MemoryStore::default());
        Self::fake_with(store).0
    }

    pub fn fake_with(
        store: Arc<crate::testing::MemoryStore>,
    ) -> (Self, Arc<crate::testing::FakeAgent>) {
        let config = AppConfig::for_tests();
        let session = SessionIssuer::new(&config.jwt, store.clone())
            .expect("session issuer for tests");
        let agent = Arc::new(crate::testing::FakeAgent::default());
        let state = Self {
            users: store.clone(),
            pets: store.clone(),
            records: store,
            session: Arc::new(session),
            identity: None,
            agent: agent.clone(),
        };
        (state, agent)
    }

    pub fn with_identity<P: IdentityProvider + 'static>(mut self, provider: P) -> Self {
        self.identity = Some(Arc::new(provider));
        self
    }
}
