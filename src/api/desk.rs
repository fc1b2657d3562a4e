//! Ticket Desk
//!
//! Per-domain queries and mutations. Each query only picks its cache key,
//! TTL and fetcher; caching itself lives in [`CachedQuery`].

use serde_json::Value;
use tracing::info;

use crate::api::ApiClient;
use crate::cache::{self, Cache};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::models::{
    Complaint, ComplaintFilters, Credentials, DepartmentSummary, LoginResponse, NewComplaint,
    ReportParams, StatusUpdate, User,
};
use crate::query::{CachedQuery, QueryOptions};

// == Cache Namespaces ==
pub const USERS: &str = "users";
pub const COMPLAINTS: &str = "complaints";
pub const ANALYTICS: &str = "analytics";
pub const REPORTS: &str = "reports";

// == TTLs ==
pub const USER_TTL_MS: u64 = 5 * 60_000;
pub const ANALYTICS_TTL_MS: u64 = 2 * 60_000;
pub const REPORTS_TTL_MS: u64 = 5 * 60_000;

// == Ticket Desk ==
/// Entry point for the application: owns the API client and the shared cache.
#[derive(Debug, Clone)]
pub struct TicketDesk {
    client: ApiClient,
    cache: Cache,
    /// TTL for complaint lists and details
    default_ttl_ms: u64,
}

impl TicketDesk {
    pub fn new(client: ApiClient, cache: Cache, default_ttl_ms: u64) -> Self {
        Self {
            client,
            cache,
            default_ttl_ms,
        }
    }

    /// Builds a desk with a fresh cache from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ApiClient::from_config(config)?;
        Ok(Self::new(client, Cache::new(), config.default_ttl_ms))
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    // == Session ==
    /// Signs in, stores the token and primes the `users:me` entry.
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        if let Some(error_msg) = credentials.validate() {
            return Err(ClientError::InvalidRequest(error_msg));
        }

        let response: LoginResponse = self.client.post_public("/auth/login", credentials).await?;
        self.client.set_token(response.token);
        self.cache
            .set(cache::key(USERS, "me"), &response.user, USER_TTL_MS);

        info!(user_id = response.user.id, "logged in");
        Ok(response.user)
    }

    /// Drops the token and every cached entry so nothing from this session
    /// is visible to the next one.
    pub fn logout(&self) {
        self.client.clear_token();
        self.cache.clear();
        info!("logged out");
    }

    // == Queries ==
    /// `users:me`
    pub fn me(&self) -> CachedQuery<User> {
        let client = self.client.clone();
        CachedQuery::new(
            self.cache.clone(),
            cache::key(USERS, "me"),
            move || {
                let client = client.clone();
                async move { client.get_json::<User>("/users/me").await }
            },
            QueryOptions::new().ttl_ms(USER_TTL_MS),
        )
    }

    /// `complaints:list:{filters}`
    pub fn complaints(&self, filters: &ComplaintFilters) -> CachedQuery<Vec<Complaint>> {
        let client = self.client.clone();
        let query_filters = filters.clone();
        CachedQuery::new(
            self.cache.clone(),
            cache::key_with_params(COMPLAINTS, "list", filters),
            move || {
                let client = client.clone();
                let filters = query_filters.clone();
                async move {
                    client
                        .get_json_with_query::<Vec<Complaint>, _>("/complaints", &filters)
                        .await
                }
            },
            QueryOptions::new().ttl_ms(self.default_ttl_ms),
        )
    }

    /// `complaints:detail:{id}`; stays idle until an id is known.
    pub fn complaint(&self, id: Option<u64>) -> CachedQuery<Complaint> {
        let client = self.client.clone();
        CachedQuery::new(
            self.cache.clone(),
            complaint_key(id),
            move || fetch_complaint(client.clone(), id),
            QueryOptions::new()
                .ttl_ms(self.default_ttl_ms)
                .enabled(id.is_some()),
        )
    }

    /// Points an existing detail query at another complaint.
    ///
    /// The fetcher is swapped first so the re-run uses the new id.
    pub async fn select_complaint(&self, query: &CachedQuery<Complaint>, id: Option<u64>) -> bool {
        let client = self.client.clone();
        query.set_fetcher(move || fetch_complaint(client.clone(), id));
        query.update(complaint_key(id), id.is_some()).await
    }

    /// `analytics:dept:summary`
    pub fn department_summary(&self) -> CachedQuery<DepartmentSummary> {
        let client = self.client.clone();
        CachedQuery::new(
            self.cache.clone(),
            cache::key(ANALYTICS, "dept:summary"),
            move || {
                let client = client.clone();
                async move {
                    client
                        .get_json::<DepartmentSummary>("/analytics/department/summary")
                        .await
                }
            },
            QueryOptions::new().ttl_ms(ANALYTICS_TTL_MS),
        )
    }

    /// `reports:list:{params}`
    pub fn reports(&self, params: &ReportParams) -> CachedQuery<Vec<Value>> {
        let client = self.client.clone();
        let query_params = params.clone();
        CachedQuery::new(
            self.cache.clone(),
            cache::key_with_params(REPORTS, "list", params),
            move || {
                let client = client.clone();
                let params = query_params.clone();
                async move {
                    client
                        .get_json_with_query::<Vec<Value>, _>("/reports", &params)
                        .await
                }
            },
            QueryOptions::new().ttl_ms(REPORTS_TTL_MS),
        )
    }

    // == Mutations ==
    /// Submits a complaint and drops every cached read it could affect.
    pub async fn create_complaint(&self, complaint: &NewComplaint) -> Result<Complaint> {
        if let Some(error_msg) = complaint.validate() {
            return Err(ClientError::InvalidRequest(error_msg));
        }

        let created: Complaint = self.client.post_json("/complaints", complaint).await?;
        self.invalidate_complaints();
        info!(complaint_id = created.id, "complaint created");
        Ok(created)
    }

    /// Changes a complaint's status and drops every cached read it could affect.
    pub async fn update_complaint_status(
        &self,
        id: u64,
        update: &StatusUpdate,
    ) -> Result<Complaint> {
        let updated: Complaint = self
            .client
            .patch_json(&format!("/complaints/{}/status", id), update)
            .await?;
        self.invalidate_complaints();
        info!(complaint_id = id, status = ?updated.status, "complaint status updated");
        Ok(updated)
    }

    fn invalidate_complaints(&self) {
        // Summaries are derived from complaints
        self.cache
            .invalidate([cache::pattern(COMPLAINTS), cache::pattern(ANALYTICS)]);
    }
}

async fn fetch_complaint(client: ApiClient, id: Option<u64>) -> Result<Complaint> {
    let id = id.ok_or_else(|| {
        ClientError::InvalidRequest("complaint id is not known yet".to_string())
    })?;
    client.get_json(&format!("/complaints/{}", id)).await
}

fn complaint_key(id: Option<u64>) -> String {
    match id {
        Some(id) => cache::key_with_params(COMPLAINTS, "detail", &id),
        None => cache::key(COMPLAINTS, "detail:null"),
    }
}
