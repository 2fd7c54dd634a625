//! Database module for Hedera Health ID
//!
//! This module handles database connections and the record store used by
//! every route handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::models::{
    ConsultationFilter, ConsultationStatus, ConsultationView, DatabaseCounts, Doctor, DoctorPermission,
    DoctorView, Hospital, HospitalAdmin, NewConsultation, NewDoctor, NewHospital, NewHospitalAdmin,
    NewPatient, Patient, PatientSummary, PatientUpdate, SnapshotPeriod, StatisticsSnapshot,
};

pub mod memory;
pub mod queries;

pub use memory::MemoryStore;
pub use queries::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for hospitals, staff, patients, consultations and grants.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn list_hospitals(&self) -> StoreResult<Vec<Hospital>>;
    async fn get_hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>>;
    async fn find_hospital_by_code(&self, code: &str) -> StoreResult<Option<Hospital>>;
    async fn create_hospital(&self, hospital: NewHospital) -> StoreResult<Hospital>;

    async fn list_doctors(&self, hospital_id: Option<Uuid>) -> StoreResult<Vec<DoctorView>>;
    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<DoctorView>>;
    async fn find_doctor_by_doctor_id(&self, doctor_id: &str) -> StoreResult<Option<Doctor>>;
    async fn find_doctor_for_login(&self, email: &str, hospital_code: &str) -> StoreResult<Option<DoctorView>>;
    async fn create_doctor(&self, doctor: NewDoctor) -> StoreResult<DoctorView>;
    async fn touch_doctor_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn list_patients(&self) -> StoreResult<Vec<PatientSummary>>;
    async fn find_patient(&self, patient_id: &str) -> StoreResult<Option<Patient>>;
    async fn create_patient(&self, patient: NewPatient) -> StoreResult<Patient>;
    async fn update_patient(&self, patient_id: &str, update: PatientUpdate) -> StoreResult<Patient>;
    async fn set_patient_password(&self, patient_id: &str, password_hash: &str) -> StoreResult<()>;
    async fn touch_patient_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn find_admin(&self, admin_id: &str) -> StoreResult<Option<HospitalAdmin>>;
    async fn create_admin(&self, admin: NewHospitalAdmin) -> StoreResult<HospitalAdmin>;
    async fn set_admin_password(&self, admin_id: &str, password_hash: &str) -> StoreResult<()>;
    async fn touch_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn list_consultations(&self, filter: ConsultationFilter) -> StoreResult<Vec<ConsultationView>>;
    async fn get_consultation(&self, consultation_id: &str) -> StoreResult<Option<ConsultationView>>;
    async fn create_consultation(&self, consultation: NewConsultation) -> StoreResult<ConsultationView>;
    async fn update_consultation_status(
        &self,
        consultation_id: &str,
        status: ConsultationStatus,
    ) -> StoreResult<ConsultationView>;

    /// Grants access, or refreshes the expiry of the existing active grant.
    async fn grant_permission(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<DoctorPermission>;
    async fn revoke_permission(&self, doctor_id: Uuid, patient_id: Uuid) -> StoreResult<()>;
    async fn list_permissions(&self, patient_id: Uuid) -> StoreResult<Vec<DoctorPermission>>;
    async fn has_permission(&self, doctor_id: Uuid, patient_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn counts(&self) -> StoreResult<DatabaseCounts>;
    async fn count_consultations_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<i64>;
    async fn count_patients_registered_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<i64>;
    async fn count_active_patients(&self) -> StoreResult<i64>;
    async fn count_active_doctors(&self) -> StoreResult<i64>;
    async fn recent_patients(&self, limit: i64) -> StoreResult<Vec<PatientSummary>>;
    async fn save_snapshot(&self, period: SnapshotPeriod, payload: serde_json::Value) -> StoreResult<StatisticsSnapshot>;
}

/// Database connection pool
pub struct Database {
    pool: Arc<PgPool>,
}

impl Database {
    /// Create a new database connection
    pub async fn connect(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self { pool: Arc::new(pool) })
    }

    /// Connect with a fixed number of attempts and a flat delay between them.
    pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let attempts = config.connect_attempts.max(1);
        let delay = Duration::from_secs(config.retry_delay_secs);
        let mut attempt = 1;
        loop {
            match Self::connect(&config.url, config.max_connections).await {
                Ok(db) => {
                    info!(attempt, "database connected");
                    return Ok(db);
                }
                Err(e) if attempt < attempts => {
                    warn!(attempt, remaining = attempts - attempt, error = %e, "database connection failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Open the configured store. The postgres backend also returns the pool
/// handle so the caller can close it on shutdown.
pub async fn open_store(config: &DatabaseConfig) -> anyhow::Result<(Arc<dyn Store>, Option<Database>)> {
    match config.backend {
        StoreBackend::Postgres => {
            let database = Database::connect_with_retry(config).await?;
            database.run_migrations().await?;
            info!("database migrations applied");
            let store: Arc<dyn Store> = Arc::new(PgStore::new(database.pool()));
            Ok((store, Some(database)))
        }
        StoreBackend::Memory => {
            warn!("using the in-memory store; data is lost on restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }
    }
}
