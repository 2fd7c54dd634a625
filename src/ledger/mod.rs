//! Blockchain facade.
//!
//! Patient identities, access grants and consultation records are mirrored
//! to a Hedera-style ledger. Personal data is encrypted before it leaves the
//! service; only hashes of medical metadata are written.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::models::{ConsultationView, Patient};

pub mod cipher;

pub use cipher::{sha256_hex, DataCipher};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("no ledger entry for patient address {0}")]
    UnknownPatient(String),

    #[error("patient address {0} is already registered")]
    AlreadyRegistered(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRegistration {
    pub personal_data: Value,
    pub patient_address: String,
    /// Hash of the medical metadata. When absent the hash of the encrypted
    /// blob is stored instead; personal data is never hashed in the clear.
    pub metadata_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub transaction_id: String,
    /// Ledger-side patient sequence the transaction touched.
    pub sequence: u64,
    pub status: String,
    pub consensus_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    pub metadata_hash: String,
    pub transaction_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub sequence: u64,
    pub patient_address: String,
    pub encrypted_personal_data: String,
    pub metadata_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub transaction_id: String,
    pub authorized_doctors: Vec<String>,
    pub records: Vec<RecordEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    pub patient_identity: String,
    pub access_control: String,
    pub medical_records: String,
    pub network: String,
    pub operator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatus {
    pub network: String,
    pub operator: String,
    pub mode: String,
    pub mirroring: bool,
    pub entries: usize,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn register_patient(&self, registration: PatientRegistration) -> LedgerResult<LedgerReceipt>;
    async fn update_patient(
        &self,
        patient_address: String,
        personal_data: Value,
        metadata_hash: String,
    ) -> LedgerResult<LedgerReceipt>;
    async fn record_consultation(&self, patient_address: String, record: Value) -> LedgerResult<LedgerReceipt>;
    async fn grant_access(&self, patient_address: String, doctor_address: String) -> LedgerResult<LedgerReceipt>;
    async fn revoke_access(&self, patient_address: String, doctor_address: String) -> LedgerResult<LedgerReceipt>;
    async fn patient_entry(&self, sequence: u64) -> LedgerResult<Option<LedgerEntry>>;
    fn status(&self) -> LedgerStatus;
    fn contracts(&self) -> ContractInfo;
}

/// In-process ledger with Hedera-shaped transaction ids.
pub struct SimulatedLedger {
    config: LedgerConfig,
    cipher: DataCipher,
    sequence: AtomicU64,
    entries: DashMap<u64, LedgerEntry>,
    by_address: DashMap<String, u64>,
}

impl SimulatedLedger {
    pub fn new(config: LedgerConfig) -> Self {
        let cipher = DataCipher::from_passphrase(&config.encryption_key);
        Self {
            config,
            cipher,
            sequence: AtomicU64::new(0),
            entries: DashMap::new(),
            by_address: DashMap::new(),
        }
    }

    fn transaction_id(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}@{}.{:09}",
            self.config.operator_id,
            at.timestamp(),
            at.timestamp_subsec_nanos()
        )
    }

    fn receipt(&self, sequence: u64, at: DateTime<Utc>) -> LedgerReceipt {
        LedgerReceipt {
            transaction_id: self.transaction_id(at),
            sequence,
            status: "SUCCESS".to_string(),
            consensus_at: at,
        }
    }

    fn with_entry<F>(&self, patient_address: &str, f: F) -> LedgerResult<LedgerReceipt>
    where
        F: FnOnce(&mut LedgerEntry, &LedgerReceipt) -> LedgerResult<()>,
    {
        let sequence = *self
            .by_address
            .get(patient_address)
            .ok_or_else(|| LedgerError::UnknownPatient(patient_address.to_string()))?;
        let mut entry = self
            .entries
            .get_mut(&sequence)
            .ok_or_else(|| LedgerError::UnknownPatient(patient_address.to_string()))?;
        let receipt = self.receipt(sequence, Utc::now());
        f(&mut entry, &receipt)?;
        Ok(receipt)
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn register_patient(&self, registration: PatientRegistration) -> LedgerResult<LedgerReceipt> {
        let plaintext = serde_json::to_vec(&registration.personal_data)?;
        let encrypted = self.cipher.encrypt(&plaintext)?;
        let metadata_hash = registration
            .metadata_hash
            .unwrap_or_else(|| sha256_hex(encrypted.as_bytes()));

        let address = registration.patient_address;
        // The vacant slot stays locked until the entry is in place.
        let slot = match self.by_address.entry(address.clone()) {
            Entry::Occupied(_) => return Err(LedgerError::AlreadyRegistered(address)),
            Entry::Vacant(slot) => slot,
        };
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let receipt = self.receipt(sequence, now);
        self.entries.insert(
            sequence,
            LedgerEntry {
                sequence,
                patient_address: address,
                encrypted_personal_data: encrypted,
                metadata_hash,
                is_active: true,
                created_at: now,
                transaction_id: receipt.transaction_id.clone(),
                authorized_doctors: Vec::new(),
                records: Vec::new(),
            },
        );
        slot.insert(sequence);
        info!(sequence, transaction_id = %receipt.transaction_id, "patient identity registered on ledger");
        Ok(receipt)
    }

    async fn update_patient(
        &self,
        patient_address: String,
        personal_data: Value,
        metadata_hash: String,
    ) -> LedgerResult<LedgerReceipt> {
        let plaintext = serde_json::to_vec(&personal_data)?;
        let encrypted = self.cipher.encrypt(&plaintext)?;
        self.with_entry(&patient_address, |entry, _| {
            entry.encrypted_personal_data = encrypted;
            entry.metadata_hash = metadata_hash;
            Ok(())
        })
    }

    async fn record_consultation(&self, patient_address: String, record: Value) -> LedgerResult<LedgerReceipt> {
        let metadata_hash = sha256_hex(&serde_json::to_vec(&record)?);
        self.with_entry(&patient_address, |entry, receipt| {
            entry.records.push(RecordEntry {
                metadata_hash,
                transaction_id: receipt.transaction_id.clone(),
                recorded_at: receipt.consensus_at,
            });
            Ok(())
        })
    }

    async fn grant_access(&self, patient_address: String, doctor_address: String) -> LedgerResult<LedgerReceipt> {
        self.with_entry(&patient_address, |entry, _| {
            if !entry.authorized_doctors.contains(&doctor_address) {
                entry.authorized_doctors.push(doctor_address);
            }
            Ok(())
        })
    }

    async fn revoke_access(&self, patient_address: String, doctor_address: String) -> LedgerResult<LedgerReceipt> {
        self.with_entry(&patient_address, |entry, _| {
            entry.authorized_doctors.retain(|d| d != &doctor_address);
            Ok(())
        })
    }

    async fn patient_entry(&self, sequence: u64) -> LedgerResult<Option<LedgerEntry>> {
        Ok(self.entries.get(&sequence).map(|e| e.clone()))
    }

    fn status(&self) -> LedgerStatus {
        LedgerStatus {
            network: self.config.network.clone(),
            operator: self.config.operator_id.clone(),
            mode: "simulated".to_string(),
            mirroring: self.config.enabled,
            entries: self.entries.len(),
        }
    }

    fn contracts(&self) -> ContractInfo {
        ContractInfo {
            patient_identity: self.config.contracts.patient_identity.clone(),
            access_control: self.config.contracts.access_control.clone(),
            medical_records: self.config.contracts.medical_records.clone(),
            network: self.config.network.clone(),
            operator: self.config.operator_id.clone(),
        }
    }
}

/// Personal fields that are only ever written encrypted.
pub fn personal_data(patient: &Patient) -> Value {
    json!({
        "lastName": patient.last_name,
        "firstName": patient.first_name,
        "dateOfBirth": patient.date_of_birth,
        "phone": patient.phone,
        "email": patient.email,
    })
}

/// Medical summary whose hash is published with the identity.
fn medical_metadata(patient: &Patient) -> Value {
    json!({
        "patientId": patient.patient_id,
        "bloodGroup": patient.blood_group,
        "allergies": patient.allergies,
        "chronicConditions": patient.chronic_conditions,
        "primaryHospital": patient.primary_hospital,
    })
}

fn consultation_record(view: &ConsultationView) -> Value {
    json!({
        "consultationId": view.consultation.consultation_id,
        "consultedAt": view.consultation.consulted_at,
        "type": view.consultation.kind,
        "diagnosis": view.consultation.diagnosis,
        "prescription": view.consultation.prescription,
        "hospital": view.hospital.code,
        "status": view.consultation.status,
    })
}

/// Fire-and-forget mirroring of store writes onto the ledger.
///
/// Failures are logged and never reach the client. Each call returns the
/// spawned task so callers that care (tests) can wait for it.
#[derive(Clone)]
pub struct LedgerMirror {
    ledger: Arc<dyn Ledger>,
    enabled: bool,
}

impl LedgerMirror {
    pub fn new(ledger: Arc<dyn Ledger>, enabled: bool) -> Self {
        Self { ledger, enabled }
    }

    fn spawn<F, Fut>(&self, action: &'static str, subject: String, call: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Arc<dyn Ledger>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = LedgerResult<LedgerReceipt>> + Send + 'static,
    {
        if !self.enabled {
            return None;
        }
        let ledger = Arc::clone(&self.ledger);
        Some(tokio::spawn(async move {
            match call(ledger).await {
                Ok(receipt) => debug!(action, %subject, transaction_id = %receipt.transaction_id, "ledger write"),
                Err(e) => warn!(action, %subject, error = %e, "ledger write failed"),
            }
        }))
    }

    pub fn patient_registered(&self, patient: &Patient) -> Option<JoinHandle<()>> {
        let personal = personal_data(patient);
        let address = patient.patient_id.clone();
        let metadata = medical_metadata(patient);
        self.spawn("register_patient", address.clone(), move |ledger| async move {
            let registration = PatientRegistration {
                personal_data: personal,
                patient_address: address,
                metadata_hash: Some(sha256_hex(&serde_json::to_vec(&metadata)?)),
            };
            ledger.register_patient(registration).await
        })
    }

    pub fn patient_updated(&self, patient: &Patient) -> Option<JoinHandle<()>> {
        let address = patient.patient_id.clone();
        let personal = personal_data(patient);
        let metadata = medical_metadata(patient);
        self.spawn("update_patient", address.clone(), move |ledger| async move {
            let metadata_hash = sha256_hex(&serde_json::to_vec(&metadata)?);
            ledger.update_patient(address, personal, metadata_hash).await
        })
    }

    pub fn consultation_recorded(&self, view: &ConsultationView) -> Option<JoinHandle<()>> {
        let address = view.patient.patient_id.clone();
        let record = consultation_record(view);
        self.spawn("record_consultation", view.consultation.consultation_id.clone(), move |ledger| async move {
            ledger.record_consultation(address, record).await
        })
    }

    pub fn access_granted(&self, patient_id: &str, doctor_id: &str) -> Option<JoinHandle<()>> {
        let (patient, doctor) = (patient_id.to_string(), doctor_id.to_string());
        self.spawn("grant_access", patient.clone(), move |ledger| async move {
            ledger.grant_access(patient, doctor).await
        })
    }

    pub fn access_revoked(&self, patient_id: &str, doctor_id: &str) -> Option<JoinHandle<()>> {
        let (patient, doctor) = (patient_id.to_string(), doctor_id.to_string());
        self.spawn("revoke_access", patient.clone(), move |ledger| async move {
            ledger.revoke_access(patient, doctor).await
        })
    }
}
