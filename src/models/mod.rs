//! Record types shared by the store, the HTTP layer and the ledger facade.

pub mod admin;
pub mod consultation;
pub mod doctor;
pub mod hospital;
pub mod patient;
pub mod permission;
pub mod statistics;

pub use admin::{AdminRole, HospitalAdmin, NewHospitalAdmin};
pub use consultation::{
    Consultation, ConsultationFilter, ConsultationStatus, ConsultationView, CreateConsultationRequest,
    NewConsultation, UpdateStatusRequest, Vitals,
};
pub use doctor::{CreateDoctorRequest, Doctor, DoctorRef, DoctorView, NewDoctor};
pub use hospital::{Hospital, HospitalRef, NewHospital};
pub use patient::{NewPatient, Patient, PatientRef, PatientSummary, PatientUpdate, RegisterPatientRequest};
pub use permission::{DoctorPermission, GrantPermissionRequest};
pub use statistics::{Activity, ActivityKind, DatabaseCounts, MonthlyStatistics, SnapshotPeriod, StatisticsSnapshot};
