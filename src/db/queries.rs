//! PostgreSQL implementation of [`Store`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    AdminRole, Consultation, ConsultationFilter, ConsultationStatus, ConsultationView, DatabaseCounts, Doctor,
    DoctorPermission, DoctorRef, DoctorView, Hospital, HospitalAdmin, HospitalRef, NewConsultation, NewDoctor,
    NewHospital, NewHospitalAdmin, NewPatient, Patient, PatientRef, PatientSummary, PatientUpdate,
    SnapshotPeriod, StatisticsSnapshot, Vitals,
};

const DOCTOR_VIEW_SELECT: &str = "
    SELECT d.id, d.doctor_id, d.first_name, d.last_name, d.email, d.phone, d.specialty,
           d.department, d.hospital_id, d.password_hash, d.is_active, d.last_login, d.created_at,
           h.code AS hospital_code, h.name AS hospital_name, h.city AS hospital_city
    FROM doctors d
    JOIN hospitals h ON h.id = d.hospital_id";

const CONSULTATION_VIEW_SELECT: &str = "
    SELECT c.id, c.consultation_id, c.patient_id, c.doctor_id, c.hospital_id, c.consulted_at,
           c.kind, c.reason, c.diagnosis, c.prescription, c.prescribed_exams,
           c.weight_kg, c.height_cm, c.blood_pressure, c.temperature_c, c.pulse,
           c.status, c.notes, c.created_at,
           p.patient_id AS patient_ref, p.last_name AS patient_last_name, p.first_name AS patient_first_name,
           d.first_name AS doctor_first_name, d.last_name AS doctor_last_name, d.specialty AS doctor_specialty,
           h.code AS hospital_code, h.name AS hospital_name, h.city AS hospital_city
    FROM consultations c
    JOIN patients p ON p.id = c.patient_id
    JOIN doctors d ON d.id = c.doctor_id
    JOIN hospitals h ON h.id = c.hospital_id";

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps constraint violations onto store errors; everything else stays a database error.
fn classify(err: sqlx::Error, conflict: &str, missing: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(conflict.to_string()),
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::NotFound(missing.to_string()),
            _ => {}
        }
    }
    StoreError::Database(err)
}

#[derive(sqlx::FromRow)]
struct DoctorViewRow {
    id: Uuid,
    doctor_id: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    specialty: String,
    department: Option<String>,
    hospital_id: Uuid,
    password_hash: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    hospital_code: String,
    hospital_name: String,
    hospital_city: String,
}

impl From<DoctorViewRow> for DoctorView {
    fn from(row: DoctorViewRow) -> Self {
        DoctorView {
            hospital: HospitalRef {
                id: row.hospital_id,
                code: row.hospital_code,
                name: row.hospital_name,
                city: row.hospital_city,
            },
            doctor: Doctor {
                id: row.id,
                doctor_id: row.doctor_id,
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                phone: row.phone,
                specialty: row.specialty,
                department: row.department,
                hospital_id: row.hospital_id,
                password_hash: row.password_hash,
                is_active: row.is_active,
                last_login: row.last_login,
                created_at: row.created_at,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConsultationViewRow {
    id: Uuid,
    consultation_id: String,
    patient_id: Uuid,
    doctor_id: Uuid,
    hospital_id: Uuid,
    consulted_at: DateTime<Utc>,
    kind: String,
    reason: Option<String>,
    diagnosis: Option<String>,
    prescription: Option<String>,
    prescribed_exams: Vec<String>,
    weight_kg: Option<f64>,
    height_cm: Option<f64>,
    blood_pressure: Option<String>,
    temperature_c: Option<f64>,
    pulse: Option<i32>,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    patient_ref: String,
    patient_last_name: String,
    patient_first_name: String,
    doctor_first_name: String,
    doctor_last_name: String,
    doctor_specialty: String,
    hospital_code: String,
    hospital_name: String,
    hospital_city: String,
}

impl TryFrom<ConsultationViewRow> for ConsultationView {
    type Error = StoreError;

    fn try_from(row: ConsultationViewRow) -> Result<Self, Self::Error> {
        let status: ConsultationStatus = row.status.parse().map_err(StoreError::Corrupt)?;
        Ok(ConsultationView {
            patient: PatientRef {
                patient_id: row.patient_ref,
                last_name: row.patient_last_name,
                first_name: row.patient_first_name,
            },
            doctor: DoctorRef {
                first_name: row.doctor_first_name,
                last_name: row.doctor_last_name,
                specialty: row.doctor_specialty,
            },
            hospital: HospitalRef {
                id: row.hospital_id,
                code: row.hospital_code,
                name: row.hospital_name,
                city: row.hospital_city,
            },
            consultation: Consultation {
                id: row.id,
                consultation_id: row.consultation_id,
                patient_id: row.patient_id,
                doctor_id: row.doctor_id,
                hospital_id: row.hospital_id,
                consulted_at: row.consulted_at,
                kind: row.kind,
                reason: row.reason,
                diagnosis: row.diagnosis,
                prescription: row.prescription,
                prescribed_exams: row.prescribed_exams,
                vitals: Vitals {
                    weight_kg: row.weight_kg,
                    height_cm: row.height_cm,
                    blood_pressure: row.blood_pressure,
                    temperature_c: row.temperature_c,
                    pulse: row.pulse,
                },
                status,
                notes: row.notes,
                created_at: row.created_at,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: Uuid,
    admin_id: String,
    last_name: String,
    first_name: String,
    email: String,
    phone: Option<String>,
    hospital_id: Uuid,
    role: String,
    password_hash: String,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AdminRow> for HospitalAdmin {
    type Error = StoreError;

    fn try_from(row: AdminRow) -> Result<Self, Self::Error> {
        let role: AdminRole = row.role.parse().map_err(StoreError::Corrupt)?;
        Ok(HospitalAdmin {
            id: row.id,
            admin_id: row.admin_id,
            last_name: row.last_name,
            first_name: row.first_name,
            email: row.email,
            phone: row.phone,
            hospital_id: row.hospital_id,
            role,
            password_hash: row.password_hash,
            is_active: row.is_active,
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CountsRow {
    hospitals: i64,
    doctors: i64,
    patients: i64,
    consultations: i64,
    permissions: i64,
}

pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    async fn consultation_views(&self, filter: ConsultationFilter) -> StoreResult<Vec<ConsultationView>> {
        let sql = format!(
            "{} WHERE ($1::uuid IS NULL OR c.patient_id = $1)
                AND ($2::uuid IS NULL OR c.doctor_id = $2)
                AND ($3::uuid IS NULL OR c.hospital_id = $3)
              ORDER BY c.consulted_at DESC
              LIMIT $4",
            CONSULTATION_VIEW_SELECT
        );
        sqlx::query_as::<_, ConsultationViewRow>(&sql)
            .bind(filter.patient_id)
            .bind(filter.doctor_id)
            .bind(filter.hospital_id)
            .bind(filter.limit)
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(ConsultationView::try_from)
            .collect()
    }

    async fn consultation_view_by_id(&self, consultation_id: &str) -> StoreResult<Option<ConsultationView>> {
        let sql = format!("{} WHERE c.consultation_id = $1", CONSULTATION_VIEW_SELECT);
        sqlx::query_as::<_, ConsultationViewRow>(&sql)
            .bind(consultation_id)
            .fetch_optional(self.pool())
            .await?
            .map(ConsultationView::try_from)
            .transpose()
    }

    async fn count(&self, sql: &str) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(sql).fetch_one(self.pool()).await?;
        Ok(count)
    }

    async fn count_between(&self, sql: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(sql).bind(from).bind(to).fetch_one(self.pool()).await?;
        Ok(count)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    // ===== Hospitals =====

    #[instrument(skip(self))]
    async fn list_hospitals(&self) -> StoreResult<Vec<Hospital>> {
        let hospitals = sqlx::query_as::<_, Hospital>("SELECT * FROM hospitals ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(hospitals)
    }

    async fn get_hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>> {
        let hospital = sqlx::query_as::<_, Hospital>("SELECT * FROM hospitals WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(hospital)
    }

    async fn find_hospital_by_code(&self, code: &str) -> StoreResult<Option<Hospital>> {
        let hospital = sqlx::query_as::<_, Hospital>("SELECT * FROM hospitals WHERE code = UPPER($1)")
            .bind(code)
            .fetch_optional(self.pool())
            .await?;
        Ok(hospital)
    }

    #[instrument(skip(self, hospital), fields(code = %hospital.code))]
    async fn create_hospital(&self, hospital: NewHospital) -> StoreResult<Hospital> {
        let hospital = hospital.normalized();
        sqlx::query_as::<_, Hospital>(
            "INSERT INTO hospitals (id, code, name, city, address, phone, email, director, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, NOW())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&hospital.code)
        .bind(&hospital.name)
        .bind(&hospital.city)
        .bind(&hospital.address)
        .bind(&hospital.phone)
        .bind(&hospital.email)
        .bind(&hospital.director)
        .fetch_one(self.pool())
        .await
        .map_err(|e| classify(e, &format!("hospital {} already exists", hospital.code), "hospital"))
    }

    // ===== Doctors =====

    #[instrument(skip(self))]
    async fn list_doctors(&self, hospital_id: Option<Uuid>) -> StoreResult<Vec<DoctorView>> {
        let sql = format!(
            "{} WHERE ($1::uuid IS NULL OR d.hospital_id = $1) ORDER BY d.created_at DESC",
            DOCTOR_VIEW_SELECT
        );
        let rows = sqlx::query_as::<_, DoctorViewRow>(&sql)
            .bind(hospital_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(DoctorView::from).collect())
    }

    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<DoctorView>> {
        let sql = format!("{} WHERE d.id = $1", DOCTOR_VIEW_SELECT);
        let row = sqlx::query_as::<_, DoctorViewRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(DoctorView::from))
    }

    async fn find_doctor_by_doctor_id(&self, doctor_id: &str) -> StoreResult<Option<Doctor>> {
        let doctor = sqlx::query_as::<_, Doctor>("SELECT * FROM doctors WHERE doctor_id = $1")
            .bind(doctor_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(doctor)
    }

    #[instrument(skip(self))]
    async fn find_doctor_for_login(&self, email: &str, hospital_code: &str) -> StoreResult<Option<DoctorView>> {
        let sql = format!(
            "{} WHERE d.email = LOWER($1) AND h.code = UPPER($2) AND d.is_active",
            DOCTOR_VIEW_SELECT
        );
        let row = sqlx::query_as::<_, DoctorViewRow>(&sql)
            .bind(email)
            .bind(hospital_code)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(DoctorView::from))
    }

    #[instrument(skip(self, doctor), fields(doctor_id = %doctor.doctor_id))]
    async fn create_doctor(&self, doctor: NewDoctor) -> StoreResult<DoctorView> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO doctors (
                id, doctor_id, first_name, last_name, email, phone, specialty,
                department, hospital_id, password_hash, is_active, created_at
            ) VALUES ($1, $2, $3, $4, LOWER($5), $6, $7, $8, $9, $10, TRUE, NOW())",
        )
        .bind(id)
        .bind(&doctor.doctor_id)
        .bind(&doctor.first_name)
        .bind(&doctor.last_name)
        .bind(&doctor.email)
        .bind(&doctor.phone)
        .bind(&doctor.specialty)
        .bind(&doctor.department)
        .bind(doctor.hospital_id)
        .bind(&doctor.password_hash)
        .execute(self.pool())
        .await
        .map_err(|e| classify(e, "a doctor with this identifier or email already exists", "hospital"))?;

        self.get_doctor(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("doctor {}", doctor.doctor_id)))
    }

    async fn touch_doctor_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE doctors SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // ===== Patients =====

    #[instrument(skip(self))]
    async fn list_patients(&self) -> StoreResult<Vec<PatientSummary>> {
        let patients = sqlx::query_as::<_, PatientSummary>(
            "SELECT id, patient_id, last_name, first_name, phone, city, primary_hospital, is_active, created_at
             FROM patients
             ORDER BY created_at DESC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(patients)
    }

    #[instrument(skip(self))]
    async fn find_patient(&self, patient_id: &str) -> StoreResult<Option<Patient>> {
        let patient = sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE patient_id = $1")
            .bind(patient_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(patient)
    }

    #[instrument(skip(self, patient), fields(patient_id = %patient.patient_id))]
    async fn create_patient(&self, patient: NewPatient) -> StoreResult<Patient> {
        let created = sqlx::query_as::<_, Patient>(
            "INSERT INTO patients (
                id, patient_id, last_name, first_name, date_of_birth, phone, email, city,
                primary_hospital, blood_group, allergies, chronic_conditions, emergency_contact,
                password_hash, is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, TRUE, NOW())
            RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&patient.patient_id)
        .bind(&patient.last_name)
        .bind(&patient.first_name)
        .bind(patient.date_of_birth)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(&patient.city)
        .bind(&patient.primary_hospital)
        .bind(&patient.blood_group)
        .bind(&patient.allergies)
        .bind(&patient.chronic_conditions)
        .bind(&patient.emergency_contact)
        .bind(&patient.password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(|e| classify(e, &format!("patient {} already exists", patient.patient_id), "patient"))?;

        debug!(id = %created.id, "patient inserted");
        Ok(created)
    }

    #[instrument(skip(self, update))]
    async fn update_patient(&self, patient_id: &str, update: PatientUpdate) -> StoreResult<Patient> {
        let mut tx = self.pool().begin().await?;

        let mut patient = sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE patient_id = $1 FOR UPDATE")
            .bind(patient_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", patient_id)))?;

        update.apply(&mut patient);

        let updated = sqlx::query_as::<_, Patient>(
            "UPDATE patients
             SET phone = $2, email = $3, city = $4, primary_hospital = $5, blood_group = $6,
                 allergies = $7, chronic_conditions = $8, emergency_contact = $9
             WHERE id = $1
             RETURNING *",
        )
        .bind(patient.id)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(&patient.city)
        .bind(&patient.primary_hospital)
        .bind(&patient.blood_group)
        .bind(&patient.allergies)
        .bind(&patient.chronic_conditions)
        .bind(&patient.emergency_contact)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn set_patient_password(&self, patient_id: &str, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE patients SET password_hash = $1 WHERE patient_id = $2")
            .bind(password_hash)
            .bind(patient_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("patient {}", patient_id)));
        }
        Ok(())
    }

    async fn touch_patient_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE patients SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // ===== Hospital administrators =====

    async fn find_admin(&self, admin_id: &str) -> StoreResult<Option<HospitalAdmin>> {
        sqlx::query_as::<_, AdminRow>("SELECT * FROM hospital_admins WHERE admin_id = $1")
            .bind(admin_id)
            .fetch_optional(self.pool())
            .await?
            .map(HospitalAdmin::try_from)
            .transpose()
    }

    #[instrument(skip(self, admin), fields(admin_id = %admin.admin_id))]
    async fn create_admin(&self, admin: NewHospitalAdmin) -> StoreResult<HospitalAdmin> {
        let row = sqlx::query_as::<_, AdminRow>(
            "INSERT INTO hospital_admins (
                id, admin_id, last_name, first_name, email, phone, hospital_id, role,
                password_hash, is_active, created_at
            ) VALUES ($1, $2, $3, $4, LOWER($5), $6, $7, $8, $9, TRUE, NOW())
            RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&admin.admin_id)
        .bind(&admin.last_name)
        .bind(&admin.first_name)
        .bind(&admin.email)
        .bind(&admin.phone)
        .bind(admin.hospital_id)
        .bind(admin.role.as_str())
        .bind(&admin.password_hash)
        .fetch_one(self.pool())
        .await
        .map_err(|e| classify(e, &format!("administrator {} already exists", admin.admin_id), "hospital"))?;
        HospitalAdmin::try_from(row)
    }

    async fn set_admin_password(&self, admin_id: &str, password_hash: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE hospital_admins SET password_hash = $1 WHERE admin_id = $2")
            .bind(password_hash)
            .bind(admin_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("administrator {}", admin_id)));
        }
        Ok(())
    }

    async fn touch_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE hospital_admins SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    // ===== Consultations =====

    #[instrument(skip(self))]
    async fn list_consultations(&self, filter: ConsultationFilter) -> StoreResult<Vec<ConsultationView>> {
        self.consultation_views(filter).await
    }

    #[instrument(skip(self))]
    async fn get_consultation(&self, consultation_id: &str) -> StoreResult<Option<ConsultationView>> {
        self.consultation_view_by_id(consultation_id).await
    }

    #[instrument(skip(self, consultation), fields(consultation_id = %consultation.consultation_id))]
    async fn create_consultation(&self, consultation: NewConsultation) -> StoreResult<ConsultationView> {
        sqlx::query(
            "INSERT INTO consultations (
                id, consultation_id, patient_id, doctor_id, hospital_id, consulted_at, kind,
                reason, diagnosis, prescription, prescribed_exams, weight_kg, height_cm,
                blood_pressure, temperature_c, pulse, status, notes, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(&consultation.consultation_id)
        .bind(consultation.patient_id)
        .bind(consultation.doctor_id)
        .bind(consultation.hospital_id)
        .bind(consultation.consulted_at)
        .bind(&consultation.kind)
        .bind(&consultation.reason)
        .bind(&consultation.diagnosis)
        .bind(&consultation.prescription)
        .bind(&consultation.prescribed_exams)
        .bind(consultation.vitals.weight_kg)
        .bind(consultation.vitals.height_cm)
        .bind(&consultation.vitals.blood_pressure)
        .bind(consultation.vitals.temperature_c)
        .bind(consultation.vitals.pulse)
        .bind(consultation.status.as_str())
        .bind(&consultation.notes)
        .execute(self.pool())
        .await
        .map_err(|e| {
            classify(
                e,
                &format!("consultation {} already exists", consultation.consultation_id),
                "patient, doctor or hospital",
            )
        })?;

        self.consultation_view_by_id(&consultation.consultation_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("consultation {}", consultation.consultation_id)))
    }

    async fn update_consultation_status(
        &self,
        consultation_id: &str,
        status: ConsultationStatus,
    ) -> StoreResult<ConsultationView> {
        let result = sqlx::query("UPDATE consultations SET status = $1 WHERE consultation_id = $2")
            .bind(status.as_str())
            .bind(consultation_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("consultation {}", consultation_id)));
        }
        self.consultation_view_by_id(consultation_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("consultation {}", consultation_id)))
    }

    // ===== Permissions =====

    #[instrument(skip(self))]
    async fn grant_permission(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<DoctorPermission> {
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query_as::<_, DoctorPermission>(
            "UPDATE doctor_permissions SET expires_at = $3
             WHERE doctor_id = $1 AND patient_id = $2 AND is_active
             RETURNING *",
        )
        .bind(doctor_id)
        .bind(patient_id)
        .bind(expires_at)
        .fetch_optional(&mut *tx)
        .await?;

        let permission = match existing {
            Some(permission) => permission,
            None => sqlx::query_as::<_, DoctorPermission>(
                "INSERT INTO doctor_permissions (id, doctor_id, patient_id, granted_at, expires_at, is_active)
                 VALUES ($1, $2, $3, NOW(), $4, TRUE)
                 RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(doctor_id)
            .bind(patient_id)
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(e, "permission already granted", "doctor or patient"))?,
        };

        tx.commit().await?;
        Ok(permission)
    }

    async fn revoke_permission(&self, doctor_id: Uuid, patient_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE doctor_permissions SET is_active = FALSE
             WHERE doctor_id = $1 AND patient_id = $2 AND is_active",
        )
        .bind(doctor_id)
        .bind(patient_id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("active permission".to_string()));
        }
        Ok(())
    }

    async fn list_permissions(&self, patient_id: Uuid) -> StoreResult<Vec<DoctorPermission>> {
        let permissions = sqlx::query_as::<_, DoctorPermission>(
            "SELECT * FROM doctor_permissions WHERE patient_id = $1 ORDER BY granted_at DESC",
        )
        .bind(patient_id)
        .fetch_all(self.pool())
        .await?;
        Ok(permissions)
    }

    async fn has_permission(&self, doctor_id: Uuid, patient_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let (granted,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM doctor_permissions
                WHERE doctor_id = $1 AND patient_id = $2 AND is_active
                  AND (expires_at IS NULL OR expires_at > $3)
            )",
        )
        .bind(doctor_id)
        .bind(patient_id)
        .bind(now)
        .fetch_one(self.pool())
        .await?;
        Ok(granted)
    }

    // ===== Statistics =====

    #[instrument(skip(self))]
    async fn counts(&self) -> StoreResult<DatabaseCounts> {
        let row = sqlx::query_as::<_, CountsRow>(
            "SELECT
                (SELECT COUNT(*) FROM hospitals) AS hospitals,
                (SELECT COUNT(*) FROM doctors) AS doctors,
                (SELECT COUNT(*) FROM patients) AS patients,
                (SELECT COUNT(*) FROM consultations) AS consultations,
                (SELECT COUNT(*) FROM doctor_permissions WHERE is_active) AS permissions",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(DatabaseCounts {
            hospitals: row.hospitals,
            doctors: row.doctors,
            patients: row.patients,
            consultations: row.consultations,
            permissions: row.permissions,
        })
    }

    async fn count_consultations_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<i64> {
        self.count_between(
            "SELECT COUNT(*) FROM consultations WHERE consulted_at >= $1 AND consulted_at < $2",
            from,
            to,
        )
        .await
    }

    async fn count_patients_registered_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<i64> {
        self.count_between(
            "SELECT COUNT(*) FROM patients WHERE created_at >= $1 AND created_at < $2",
            from,
            to,
        )
        .await
    }

    async fn count_active_patients(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM patients WHERE is_active").await
    }

    async fn count_active_doctors(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM doctors WHERE is_active").await
    }

    async fn recent_patients(&self, limit: i64) -> StoreResult<Vec<PatientSummary>> {
        let patients = sqlx::query_as::<_, PatientSummary>(
            "SELECT id, patient_id, last_name, first_name, phone, city, primary_hospital, is_active, created_at
             FROM patients
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(patients)
    }

    #[instrument(skip(self, payload))]
    async fn save_snapshot(&self, period: SnapshotPeriod, payload: serde_json::Value) -> StoreResult<StatisticsSnapshot> {
        let id = Uuid::new_v4();
        let (created_at,): (DateTime<Utc>,) = sqlx::query_as(
            "INSERT INTO statistics_snapshots (id, period, payload, created_at)
             VALUES ($1, $2, $3, NOW())
             RETURNING created_at",
        )
        .bind(id)
        .bind(period.as_str())
        .bind(Json(&payload))
        .fetch_one(self.pool())
        .await?;
        Ok(StatisticsSnapshot {
            id,
            period,
            payload,
            created_at,
        })
    }
}
