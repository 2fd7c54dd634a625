//! In-process [`Store`] used by tests and by `database.backend = "memory"`.
//!
//! Enforces the same uniqueness rules as the SQL schema so handlers see
//! identical conflict behaviour on both backends.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    Consultation, ConsultationFilter, ConsultationStatus, ConsultationView, DatabaseCounts, Doctor,
    DoctorPermission, DoctorRef, DoctorView, Hospital, HospitalAdmin, HospitalRef, NewConsultation, NewDoctor,
    NewHospital, NewHospitalAdmin, NewPatient, Patient, PatientRef, PatientSummary, PatientUpdate,
    SnapshotPeriod, StatisticsSnapshot,
};

#[derive(Default)]
struct State {
    hospitals: HashMap<Uuid, Hospital>,
    doctors: HashMap<Uuid, Doctor>,
    patients: HashMap<Uuid, Patient>,
    admins: HashMap<Uuid, HospitalAdmin>,
    consultations: HashMap<Uuid, Consultation>,
    permissions: Vec<DoctorPermission>,
    snapshots: Vec<StatisticsSnapshot>,
}

impl State {
    fn hospital_ref(&self, id: Uuid) -> StoreResult<HospitalRef> {
        self.hospitals
            .get(&id)
            .map(HospitalRef::from)
            .ok_or_else(|| StoreError::NotFound(format!("hospital {}", id)))
    }

    fn doctor_view(&self, doctor: &Doctor) -> StoreResult<DoctorView> {
        Ok(DoctorView {
            hospital: self.hospital_ref(doctor.hospital_id)?,
            doctor: doctor.clone(),
        })
    }

    fn consultation_view(&self, consultation: &Consultation) -> StoreResult<ConsultationView> {
        let patient = self
            .patients
            .get(&consultation.patient_id)
            .ok_or_else(|| StoreError::NotFound("patient".to_string()))?;
        let doctor = self
            .doctors
            .get(&consultation.doctor_id)
            .ok_or_else(|| StoreError::NotFound("doctor".to_string()))?;
        Ok(ConsultationView {
            patient: PatientRef::from(patient),
            doctor: DoctorRef::from(doctor),
            hospital: self.hospital_ref(consultation.hospital_id)?,
            consultation: consultation.clone(),
        })
    }

    fn find_consultation(&self, consultation_id: &str) -> Option<&Consultation> {
        self.consultations
            .values()
            .find(|c| c.consultation_id == consultation_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_range(at: DateTime<Utc>, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    at >= from && at < to
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn list_hospitals(&self) -> StoreResult<Vec<Hospital>> {
        let state = self.state.read().await;
        let mut hospitals: Vec<Hospital> = state.hospitals.values().cloned().collect();
        hospitals.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hospitals)
    }

    async fn get_hospital(&self, id: Uuid) -> StoreResult<Option<Hospital>> {
        Ok(self.state.read().await.hospitals.get(&id).cloned())
    }

    async fn find_hospital_by_code(&self, code: &str) -> StoreResult<Option<Hospital>> {
        let code = code.to_uppercase();
        let state = self.state.read().await;
        Ok(state.hospitals.values().find(|h| h.code == code).cloned())
    }

    async fn create_hospital(&self, hospital: NewHospital) -> StoreResult<Hospital> {
        let hospital = hospital.normalized();
        let mut state = self.state.write().await;
        if state.hospitals.values().any(|h| h.code == hospital.code) {
            return Err(StoreError::Conflict(format!("hospital {} already exists", hospital.code)));
        }
        let created = Hospital {
            id: Uuid::new_v4(),
            code: hospital.code,
            name: hospital.name,
            city: hospital.city,
            address: hospital.address,
            phone: hospital.phone,
            email: hospital.email,
            director: hospital.director,
            is_active: true,
            created_at: Utc::now(),
        };
        state.hospitals.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_doctors(&self, hospital_id: Option<Uuid>) -> StoreResult<Vec<DoctorView>> {
        let state = self.state.read().await;
        let mut doctors: Vec<&Doctor> = state
            .doctors
            .values()
            .filter(|d| hospital_id.map_or(true, |h| d.hospital_id == h))
            .collect();
        doctors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        doctors.into_iter().map(|d| state.doctor_view(d)).collect()
    }

    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<DoctorView>> {
        let state = self.state.read().await;
        state.doctors.get(&id).map(|d| state.doctor_view(d)).transpose()
    }

    async fn find_doctor_by_doctor_id(&self, doctor_id: &str) -> StoreResult<Option<Doctor>> {
        let state = self.state.read().await;
        Ok(state.doctors.values().find(|d| d.doctor_id == doctor_id).cloned())
    }

    async fn find_doctor_for_login(&self, email: &str, hospital_code: &str) -> StoreResult<Option<DoctorView>> {
        let email = email.to_lowercase();
        let code = hospital_code.to_uppercase();
        let state = self.state.read().await;
        let Some(hospital) = state.hospitals.values().find(|h| h.code == code) else {
            return Ok(None);
        };
        state
            .doctors
            .values()
            .find(|d| d.is_active && d.email == email && d.hospital_id == hospital.id)
            .map(|d| state.doctor_view(d))
            .transpose()
    }

    async fn create_doctor(&self, doctor: NewDoctor) -> StoreResult<DoctorView> {
        let mut state = self.state.write().await;
        if !state.hospitals.contains_key(&doctor.hospital_id) {
            return Err(StoreError::NotFound("hospital".to_string()));
        }
        let email = doctor.email.to_lowercase();
        let duplicate = state.doctors.values().any(|d| {
            d.doctor_id == doctor.doctor_id || (d.hospital_id == doctor.hospital_id && d.email == email)
        });
        if duplicate {
            return Err(StoreError::Conflict(
                "a doctor with this identifier or email already exists".to_string(),
            ));
        }
        let created = Doctor {
            id: Uuid::new_v4(),
            doctor_id: doctor.doctor_id,
            first_name: doctor.first_name,
            last_name: doctor.last_name,
            email,
            phone: doctor.phone,
            specialty: doctor.specialty,
            department: doctor.department,
            hospital_id: doctor.hospital_id,
            password_hash: doctor.password_hash,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        };
        state.doctors.insert(created.id, created.clone());
        state.doctor_view(&created)
    }

    async fn touch_doctor_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(doctor) = self.state.write().await.doctors.get_mut(&id) {
            doctor.last_login = Some(at);
        }
        Ok(())
    }

    async fn list_patients(&self) -> StoreResult<Vec<PatientSummary>> {
        self.recent_patients(i64::MAX).await
    }

    async fn find_patient(&self, patient_id: &str) -> StoreResult<Option<Patient>> {
        let state = self.state.read().await;
        Ok(state.patients.values().find(|p| p.patient_id == patient_id).cloned())
    }

    async fn create_patient(&self, patient: NewPatient) -> StoreResult<Patient> {
        let mut state = self.state.write().await;
        if state.patients.values().any(|p| p.patient_id == patient.patient_id) {
            return Err(StoreError::Conflict(format!("patient {} already exists", patient.patient_id)));
        }
        let created = Patient {
            id: Uuid::new_v4(),
            patient_id: patient.patient_id,
            last_name: patient.last_name,
            first_name: patient.first_name,
            date_of_birth: patient.date_of_birth,
            phone: patient.phone,
            email: patient.email,
            city: patient.city,
            primary_hospital: patient.primary_hospital,
            blood_group: patient.blood_group,
            allergies: patient.allergies,
            chronic_conditions: patient.chronic_conditions,
            emergency_contact: patient.emergency_contact,
            password_hash: patient.password_hash,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        state.patients.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_patient(&self, patient_id: &str, update: PatientUpdate) -> StoreResult<Patient> {
        let mut state = self.state.write().await;
        let patient = state
            .patients
            .values_mut()
            .find(|p| p.patient_id == patient_id)
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", patient_id)))?;
        update.apply(patient);
        Ok(patient.clone())
    }

    async fn set_patient_password(&self, patient_id: &str, password_hash: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let patient = state
            .patients
            .values_mut()
            .find(|p| p.patient_id == patient_id)
            .ok_or_else(|| StoreError::NotFound(format!("patient {}", patient_id)))?;
        patient.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn touch_patient_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(patient) = self.state.write().await.patients.get_mut(&id) {
            patient.last_login = Some(at);
        }
        Ok(())
    }

    async fn find_admin(&self, admin_id: &str) -> StoreResult<Option<HospitalAdmin>> {
        let state = self.state.read().await;
        Ok(state.admins.values().find(|a| a.admin_id == admin_id).cloned())
    }

    async fn create_admin(&self, admin: NewHospitalAdmin) -> StoreResult<HospitalAdmin> {
        let mut state = self.state.write().await;
        if !state.hospitals.contains_key(&admin.hospital_id) {
            return Err(StoreError::NotFound("hospital".to_string()));
        }
        if state.admins.values().any(|a| a.admin_id == admin.admin_id) {
            return Err(StoreError::Conflict(format!("administrator {} already exists", admin.admin_id)));
        }
        let created = HospitalAdmin {
            id: Uuid::new_v4(),
            admin_id: admin.admin_id,
            last_name: admin.last_name,
            first_name: admin.first_name,
            email: admin.email.to_lowercase(),
            phone: admin.phone,
            hospital_id: admin.hospital_id,
            role: admin.role,
            password_hash: admin.password_hash,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        };
        state.admins.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_admin_password(&self, admin_id: &str, password_hash: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let admin = state
            .admins
            .values_mut()
            .find(|a| a.admin_id == admin_id)
            .ok_or_else(|| StoreError::NotFound(format!("administrator {}", admin_id)))?;
        admin.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn touch_admin_login(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(admin) = self.state.write().await.admins.get_mut(&id) {
            admin.last_login = Some(at);
        }
        Ok(())
    }

    async fn list_consultations(&self, filter: ConsultationFilter) -> StoreResult<Vec<ConsultationView>> {
        let state = self.state.read().await;
        let mut matching: Vec<&Consultation> = state
            .consultations
            .values()
            .filter(|c| filter.patient_id.map_or(true, |id| c.patient_id == id))
            .filter(|c| filter.doctor_id.map_or(true, |id| c.doctor_id == id))
            .filter(|c| filter.hospital_id.map_or(true, |id| c.hospital_id == id))
            .collect();
        matching.sort_by(|a, b| b.consulted_at.cmp(&a.consulted_at));
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        matching
            .into_iter()
            .take(limit)
            .map(|c| state.consultation_view(c))
            .collect()
    }

    async fn get_consultation(&self, consultation_id: &str) -> StoreResult<Option<ConsultationView>> {
        let state = self.state.read().await;
        state
            .find_consultation(consultation_id)
            .map(|c| state.consultation_view(c))
            .transpose()
    }

    async fn create_consultation(&self, consultation: NewConsultation) -> StoreResult<ConsultationView> {
        let mut state = self.state.write().await;
        if !state.patients.contains_key(&consultation.patient_id)
            || !state.doctors.contains_key(&consultation.doctor_id)
            || !state.hospitals.contains_key(&consultation.hospital_id)
        {
            return Err(StoreError::NotFound("patient, doctor or hospital".to_string()));
        }
        if state.find_consultation(&consultation.consultation_id).is_some() {
            return Err(StoreError::Conflict(format!(
                "consultation {} already exists",
                consultation.consultation_id
            )));
        }
        let created = Consultation {
            id: Uuid::new_v4(),
            consultation_id: consultation.consultation_id,
            patient_id: consultation.patient_id,
            doctor_id: consultation.doctor_id,
            hospital_id: consultation.hospital_id,
            consulted_at: consultation.consulted_at,
            kind: consultation.kind,
            reason: consultation.reason,
            diagnosis: consultation.diagnosis,
            prescription: consultation.prescription,
            prescribed_exams: consultation.prescribed_exams,
            vitals: consultation.vitals,
            status: consultation.status,
            notes: consultation.notes,
            created_at: Utc::now(),
        };
        state.consultations.insert(created.id, created.clone());
        state.consultation_view(&created)
    }

    async fn update_consultation_status(
        &self,
        consultation_id: &str,
        status: ConsultationStatus,
    ) -> StoreResult<ConsultationView> {
        let mut state = self.state.write().await;
        let consultation = state
            .consultations
            .values_mut()
            .find(|c| c.consultation_id == consultation_id)
            .ok_or_else(|| StoreError::NotFound(format!("consultation {}", consultation_id)))?;
        consultation.status = status;
        let updated = consultation.clone();
        state.consultation_view(&updated)
    }

    async fn grant_permission(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<DoctorPermission> {
        let mut state = self.state.write().await;
        if !state.doctors.contains_key(&doctor_id) || !state.patients.contains_key(&patient_id) {
            return Err(StoreError::NotFound("doctor or patient".to_string()));
        }
        if let Some(existing) = state
            .permissions
            .iter_mut()
            .find(|p| p.is_active && p.doctor_id == doctor_id && p.patient_id == patient_id)
        {
            existing.expires_at = expires_at;
            return Ok(existing.clone());
        }
        let permission = DoctorPermission {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            granted_at: Utc::now(),
            expires_at,
            is_active: true,
        };
        state.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn revoke_permission(&self, doctor_id: Uuid, patient_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let permission = state
            .permissions
            .iter_mut()
            .find(|p| p.is_active && p.doctor_id == doctor_id && p.patient_id == patient_id)
            .ok_or_else(|| StoreError::NotFound("active permission".to_string()))?;
        permission.is_active = false;
        Ok(())
    }

    async fn list_permissions(&self, patient_id: Uuid) -> StoreResult<Vec<DoctorPermission>> {
        let state = self.state.read().await;
        let mut permissions: Vec<DoctorPermission> = state
            .permissions
            .iter()
            .filter(|p| p.patient_id == patient_id)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| b.granted_at.cmp(&a.granted_at));
        Ok(permissions)
    }

    async fn has_permission(&self, doctor_id: Uuid, patient_id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .iter()
            .any(|p| p.doctor_id == doctor_id && p.patient_id == patient_id && p.is_effective(now)))
    }

    async fn counts(&self) -> StoreResult<DatabaseCounts> {
        let state = self.state.read().await;
        Ok(DatabaseCounts {
            hospitals: state.hospitals.len() as i64,
            doctors: state.doctors.len() as i64,
            patients: state.patients.len() as i64,
            consultations: state.consultations.len() as i64,
            permissions: state.permissions.iter().filter(|p| p.is_active).count() as i64,
        })
    }

    async fn count_consultations_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .consultations
            .values()
            .filter(|c| in_range(c.consulted_at, from, to))
            .count() as i64)
    }

    async fn count_patients_registered_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .patients
            .values()
            .filter(|p| in_range(p.created_at, from, to))
            .count() as i64)
    }

    async fn count_active_patients(&self) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state.patients.values().filter(|p| p.is_active).count() as i64)
    }

    async fn count_active_doctors(&self) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state.doctors.values().filter(|d| d.is_active).count() as i64)
    }

    async fn recent_patients(&self, limit: i64) -> StoreResult<Vec<PatientSummary>> {
        let state = self.state.read().await;
        let mut patients: Vec<Patient> = state.patients.values().cloned().collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients
            .into_iter()
            .take(limit.max(0) as usize)
            .map(PatientSummary::from)
            .collect())
    }

    async fn save_snapshot(&self, period: SnapshotPeriod, payload: serde_json::Value) -> StoreResult<StatisticsSnapshot> {
        let snapshot = StatisticsSnapshot {
            id: Uuid::new_v4(),
            period,
            payload,
            created_at: Utc::now(),
        };
        self.state.write().await.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }
}
