//! End-to-end flows through the HTTP layer on the in-memory store.

use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use fake::faker::name::en::{FirstName, LastName};
use chrono::{Duration, NaiveDate, Utc};
use fake::Fake;
use serde_json::{json, Value};

use healthid::auth::{hash_password, Role};
use healthid::config::{Settings, StoreBackend};
use healthid::db::{MemoryStore, Store};
use healthid::models::{AdminRole, DoctorView, Hospital, NewDoctor, NewHospital, NewHospitalAdmin, NewPatient, Patient};
use healthid::{api, AppState};

const ADMIN_PASSWORD: &str = "admin-password-1";
const DOCTOR_PASSWORD: &str = "doctor-password-1";
const PATIENT_PASSWORD: &str = "patient-pass";

fn state() -> web::Data<AppState> {
    let mut settings = Settings::defaults().unwrap();
    settings.database.backend = StoreBackend::Memory;
    web::Data::new(AppState::new(settings, Arc::new(MemoryStore::new())))
}

/// Sends a request and returns the status with the JSON body.
macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

async fn seed_hospital(state: &AppState, code: &str) -> Hospital {
    state
        .store
        .create_hospital(NewHospital {
            code: code.into(),
            name: format!("Hôpital {}", code),
            city: "Cotonou".into(),
            address: None,
            phone: None,
            email: None,
            director: None,
        })
        .await
        .unwrap()
}

fn admin_token(state: &AppState, hospital: &Hospital) -> String {
    let admin_id = format!("ADM-{}-01", hospital.code);
    state
        .tokens
        .issue(uuid::Uuid::new_v4(), Role::Admin, &admin_id, Some(hospital.id))
        .unwrap()
        .token
}

fn super_admin_token(state: &AppState) -> String {
    state
        .tokens
        .issue(uuid::Uuid::new_v4(), Role::SuperAdmin, "ADM-ROOT", None)
        .unwrap()
        .token
}

async fn seed_doctor(state: &AppState, hospital: &Hospital, doctor_id: &str) -> (DoctorView, String) {
    let view = state
        .store
        .create_doctor(NewDoctor {
            doctor_id: doctor_id.into(),
            first_name: FirstName().fake(),
            last_name: LastName().fake(),
            email: format!("{}@hospital.bj", doctor_id.to_lowercase()),
            phone: None,
            specialty: "General medicine".into(),
            department: None,
            hospital_id: hospital.id,
            password_hash: "unused".into(),
        })
        .await
        .unwrap();
    let token = state
        .tokens
        .issue(view.doctor.id, Role::Doctor, doctor_id, Some(hospital.id))
        .unwrap()
        .token;
    (view, token)
}

async fn seed_patient(state: &AppState, patient_id: &str) -> (Patient, String) {
    let patient = state
        .store
        .create_patient(NewPatient {
            patient_id: patient_id.into(),
            last_name: LastName().fake(),
            first_name: FirstName().fake(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 3, 15).unwrap(),
            phone: "+22997111111".into(),
            email: None,
            city: None,
            primary_hospital: None,
            blood_group: Some("O+".into()),
            allergies: vec![],
            chronic_conditions: vec![],
            emergency_contact: None,
            password_hash: hash_password(PATIENT_PASSWORD).unwrap(),
        })
        .await
        .unwrap();
    let token = state
        .tokens
        .issue(patient.id, Role::Patient, patient_id, None)
        .unwrap()
        .token;
    (patient, token)
}

async fn seed_hospital_admin(state: &AppState) {
    let hospital = seed_hospital(state, "chu-mel").await;
    state
        .store
        .create_admin(NewHospitalAdmin {
            admin_id: "ADM-CHU-MEL-01".into(),
            last_name: LastName().fake(),
            first_name: FirstName().fake(),
            email: "admin@chu-mel.bj".into(),
            phone: None,
            hospital_id: hospital.id,
            role: AdminRole::Admin,
            password_hash: hash_password(ADMIN_PASSWORD).unwrap(),
        })
        .await
        .unwrap();
}

fn registration(first_name: &str, last_name: &str) -> Value {
    json!({
        "firstName": first_name,
        "lastName": last_name,
        "dateOfBirth": "1990-03-15",
        "phone": "+22997111111",
        "bloodGroup": "O+",
        "allergies": ["Penicillin"],
        "password": PATIENT_PASSWORD,
    })
}

#[actix_rt::test]
async fn health_reports_connected_store() {
    let app = test::init_service(App::new().configure(api::app_config(state()))).await;

    let (status, body) = send!(app, test::TestRequest::get().uri("/health"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["database"], "Connected");

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/v1/test"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["databaseStats"]["patients"], 0);
}

#[actix_rt::test]
async fn unknown_routes_get_a_json_404() {
    let app = test::init_service(App::new().configure(api::app_config(state()))).await;

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/v1/nowhere"));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");
    assert_eq!(body["path"], "/api/v1/nowhere");
}

#[actix_rt::test]
async fn protected_routes_require_a_token() {
    let app = test::init_service(App::new().configure(api::app_config(state()))).await;

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/v1/patients"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/patients")
            .insert_header(bearer("not-a-jwt"))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn patient_registers_logs_in_and_reads_own_record() {
    let app = test::init_service(App::new().configure(api::app_config(state()))).await;
    let first: String = FirstName().fake();
    let last: String = LastName().fake();

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/patients")
            .set_json(registration(&first, &last))
    );
    assert_eq!(status, StatusCode::CREATED);
    let patient_id = body["data"]["patientId"].as_str().unwrap().to_string();
    assert!(patient_id.starts_with("BJ"));
    assert!(body["data"].get("passwordHash").is_none());
    assert_eq!(body["card"]["ussdCode"], format!("*789*{}#", patient_id));

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/auth/patient")
            .set_json(json!({ "patientId": patient_id, "password": "wrong-password" }))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/auth/patient")
            .set_json(json!({ "patientId": patient_id, "password": PATIENT_PASSWORD }))
    );
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/patients/{}", patient_id))
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["firstName"], first.as_str());
    assert!(body["data"]["age"].as_u64().unwrap() >= 35);

    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/patients/BJ20990001")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/patients")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn login_rejects_missing_fields() {
    let app = test::init_service(App::new().configure(api::app_config(state()))).await;

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/auth/doctor")
            .set_json(json!({ "email": "someone@example.com" }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("hospitalCode"));
}

#[actix_rt::test]
async fn duplicate_patient_id_is_a_conflict() {
    let app = test::init_service(App::new().configure(api::app_config(state()))).await;
    let mut body = registration("Adjoa", "KOSSOU");
    body["patientId"] = json!("BJ20250001");

    let (status, _) = send!(
        app,
        test::TestRequest::post().uri("/api/v1/patients").set_json(body.clone())
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send!(app, test::TestRequest::post().uri("/api/v1/patients").set_json(body));
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");
}

#[actix_rt::test]
async fn malformed_registration_is_rejected() {
    let app = test::init_service(App::new().configure(api::app_config(state()))).await;
    let mut body = registration("Adjoa", "KOSSOU");
    body["password"] = json!("123");

    let (status, body) = send!(app, test::TestRequest::post().uri("/api/v1/patients").set_json(body));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/patients")
            .insert_header(header::ContentType::json())
            .set_payload("{not json")
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn doctor_history_access_follows_patient_grants() {
    let state = state();
    seed_hospital_admin(&state).await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;

    // Administrator creates a doctor for their hospital.
    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/auth/hospital")
            .set_json(json!({ "adminId": "ADM-CHU-MEL-01", "password": ADMIN_PASSWORD }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hospital"]["code"], "CHU-MEL");
    let admin_token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/doctors")
            .insert_header(bearer(&admin_token))
            .set_json(json!({
                "firstName": "Koffi",
                "lastName": "AHOUNOU",
                "email": "K.Ahounou@chu-mel.bj",
                "specialty": "General medicine",
                "password": DOCTOR_PASSWORD,
            }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["doctorId"], "MED-CHU-MEL-0001");

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/auth/doctor")
            .set_json(json!({
                "email": "k.ahounou@chu-mel.bj",
                "password": DOCTOR_PASSWORD,
                "hospitalCode": "chu-mel",
            }))
    );
    assert_eq!(status, StatusCode::OK);
    let doctor_token = body["data"]["token"].as_str().unwrap().to_string();

    // Patient registers and logs in.
    let (_, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/patients")
            .set_json(registration("Adjoa", "KOSSOU"))
    );
    let patient_id = body["data"]["patientId"].as_str().unwrap().to_string();
    let (_, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/auth/patient")
            .set_json(json!({ "patientId": patient_id, "password": PATIENT_PASSWORD }))
    );
    let patient_token = body["data"]["token"].as_str().unwrap().to_string();

    // The doctor records a consultation; abnormal vitals come back as warnings.
    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/consultations")
            .insert_header(bearer(&doctor_token))
            .set_json(json!({
                "patientId": patient_id,
                "type": "General",
                "diagnosis": "Malaria",
                "prescription": "Artemether 80mg",
                "vitals": { "pulse": 130, "weightKg": 70.0, "heightCm": 175.0 },
            }))
    );
    assert_eq!(status, StatusCode::CREATED);
    let consultation_id = body["data"]["consultationId"].as_str().unwrap().to_string();
    let warnings = body["warnings"].as_array().unwrap();
    assert!(warnings.iter().any(|w| w.as_str().unwrap().starts_with("High heart rate")));
    assert!(body["bmi"].as_f64().is_some());

    // Patients cannot record consultations.
    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/consultations")
            .insert_header(bearer(&patient_token))
            .set_json(json!({ "patientId": patient_id, "type": "General" }))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Without a grant the doctor cannot read the full history.
    let history_uri = format!("/api/v1/patients/{}/consultations", patient_id);
    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri(&history_uri)
            .insert_header(bearer(&doctor_token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/v1/patients/{}/permissions", patient_id))
            .insert_header(bearer(&patient_token))
            .set_json(json!({ "doctorId": "MED-CHU-MEL-0001" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["isActive"], true);

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri(&history_uri)
            .insert_header(bearer(&doctor_token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["consultationId"], consultation_id.as_str());

    let (status, _) = send!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/v1/patients/{}/permissions/MED-CHU-MEL-0001", patient_id))
            .insert_header(bearer(&patient_token))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri(&history_uri)
            .insert_header(bearer(&doctor_token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The patient always sees their own history, and the author can move the status on.
    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri(&history_uri)
            .insert_header(bearer(&patient_token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send!(
        app,
        test::TestRequest::patch()
            .uri(&format!("/api/v1/consultations/{}/status", consultation_id))
            .insert_header(bearer(&doctor_token))
            .set_json(json!({ "status": "COMPLETED" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");

    // Admin dashboard sees the hospital's activity.
    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/dashboard")
            .insert_header(bearer(&admin_token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["statistics"]["counts"]["consultations"], 1);

    // The USSD menu reads the same record.
    let service_code = format!("*789*{}#", patient_id);
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/ussd")
            .set_form([
                ("sessionId", "ATUid_42"),
                ("serviceCode", service_code.as_str()),
                ("phoneNumber", "+22997111111"),
                ("text", "2"),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(text.starts_with("END "));
    assert!(text.contains("Artemether"));
}

#[actix_rt::test]
async fn ledger_routes_register_and_read_back() {
    let state = state();
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/hedera/health"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["network"], "testnet");

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/hedera/contracts"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["patientIdentity"], "0.0.6853950");

    let token = state
        .tokens
        .issue(uuid::Uuid::new_v4(), healthid::auth::Role::Doctor, "MED-TEST-0001", None)
        .unwrap()
        .token;
    let registration = json!({
        "patientAddress": "ledger-only-address",
        "personalData": { "firstName": "Adjoa", "bloodGroup": "O+" },
    });

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/hedera/create-patient")
            .insert_header(bearer(&token))
            .set_json(registration.clone())
    );
    assert_eq!(status, StatusCode::CREATED);
    let sequence = body["data"]["sequence"].as_u64().unwrap();

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/hedera/create-patient")
            .insert_header(bearer(&token))
            .set_json(registration)
    );
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri(&format!("/api/hedera/patient/{}", sequence))
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["patientAddress"], "ledger-only-address");
    assert!(!body["data"]["encryptedPersonalData"]
        .as_str()
        .unwrap()
        .contains("Adjoa"));
}

#[actix_rt::test]
async fn patient_ids_are_case_insensitive_and_records_can_be_updated() {
    let state = state();
    let (_, _) = seed_patient(&state, "BJ20250007").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/auth/patient")
            .set_json(json!({ "patientId": " bj20250007 ", "password": PATIENT_PASSWORD }))
    );
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/patients/bj20250007")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["patientId"], "BJ20250007");

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/patients/bj20250007/card")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ussdCode"], "*789*BJ20250007#");
    assert!(body["data"]["qrPayload"].as_str().unwrap().contains("BJ20250007"));

    let (status, body) = send!(
        app,
        test::TestRequest::put()
            .uri("/api/v1/patients/BJ20250007")
            .insert_header(bearer(&token))
            .set_json(json!({}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send!(
        app,
        test::TestRequest::put()
            .uri("/api/v1/patients/bj20250007")
            .insert_header(bearer(&token))
            .set_json(json!({ "city": "Parakou", "allergies": ["Latex"] }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["city"], "Parakou");
    assert_eq!(body["data"]["allergies"], json!(["Latex"]));

    // Another patient's token cannot update this record.
    let (_, other_token) = seed_patient(&state, "BJ20250008").await;
    let (status, _) = send!(
        app,
        test::TestRequest::put()
            .uri("/api/v1/patients/BJ20250007")
            .insert_header(bearer(&other_token))
            .set_json(json!({ "city": "Porto-Novo" }))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn hospitals_are_registered_by_super_admins_only() {
    let state = state();
    let existing = seed_hospital(&state, "chu-mel").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;
    let hospital = json!({ "code": "  cnhu ", "name": "CNHU Hubert Maga", "city": "Cotonou" });

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/hospitals")
            .insert_header(bearer(&admin_token(&state, &existing)))
            .set_json(hospital.clone())
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let root = super_admin_token(&state);
    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/hospitals")
            .insert_header(bearer(&root))
            .set_json(hospital)
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["code"], "CNHU");

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/hospitals")
            .insert_header(bearer(&root))
            .set_json(json!({ "code": "cnhu", "name": "Duplicate", "city": "Cotonou" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");

    // Whitespace alone does not satisfy the required fields.
    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/hospitals")
            .insert_header(bearer(&root))
            .set_json(json!({ "code": " x ", "name": "   ", "city": "Cotonou" }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = send!(app, test::TestRequest::get().uri("/api/v1/hospitals/cnhu"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "CNHU Hubert Maga");
}

#[actix_rt::test]
async fn generated_doctor_ids_skip_numbers_already_taken() {
    let state = state();
    let hospital = seed_hospital(&state, "chu-mel").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;
    let admin = admin_token(&state, &hospital);
    let doctor = |email: &str, doctor_id: Option<&str>| {
        json!({
            "doctorId": doctor_id,
            "firstName": "Koffi",
            "lastName": "AHOUNOU",
            "email": email,
            "specialty": "Pediatrics",
            "password": DOCTOR_PASSWORD,
        })
    };

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/doctors")
            .insert_header(bearer(&admin))
            .set_json(doctor("first@chu-mel.bj", Some("MED-CHU-MEL-0002")))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["doctorId"], "MED-CHU-MEL-0002");

    for (email, expected) in [("second@chu-mel.bj", "MED-CHU-MEL-0003"), ("third@chu-mel.bj", "MED-CHU-MEL-0004")] {
        let (status, body) = send!(
            app,
            test::TestRequest::post()
                .uri("/api/v1/doctors")
                .insert_header(bearer(&admin))
                .set_json(doctor(email, None))
        );
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["doctorId"], expected);
    }

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/doctors")
            .insert_header(bearer(&admin))
            .set_json(doctor("second@chu-mel.bj", None))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[actix_rt::test]
async fn doctor_profiles_are_visible_to_self_and_own_hospital() {
    let state = state();
    let mel = seed_hospital(&state, "chu-mel").await;
    let cnhu = seed_hospital(&state, "cnhu").await;
    let (doctor, doctor_token) = seed_doctor(&state, &mel, "MED-CHU-MEL-0001").await;
    let (_, colleague_token) = seed_doctor(&state, &mel, "MED-CHU-MEL-0002").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;
    let uri = format!("/api/v1/doctors/{}", doctor.doctor.id);

    let (status, body) = send!(app, test::TestRequest::get().uri(&uri).insert_header(bearer(&doctor_token)));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["doctorId"], "MED-CHU-MEL-0001");
    assert_eq!(body["data"]["hospital"]["code"], "CHU-MEL");
    assert!(body["data"].get("passwordHash").is_none());

    let (status, _) = send!(app, test::TestRequest::get().uri(&uri).insert_header(bearer(&colleague_token)));
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send!(
        app,
        test::TestRequest::get().uri(&uri).insert_header(bearer(&admin_token(&state, &mel)))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send!(
        app,
        test::TestRequest::get().uri(&uri).insert_header(bearer(&admin_token(&state, &cnhu)))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send!(
        app,
        test::TestRequest::get().uri(&uri).insert_header(bearer(&super_admin_token(&state)))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], doctor.doctor.id.to_string());

    // A malformed id still answers with the JSON error envelope.
    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/doctors/not-a-uuid")
            .insert_header(bearer(&doctor_token))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[actix_rt::test]
async fn grants_open_consultations_until_they_expire() {
    let state = state();
    let mel = seed_hospital(&state, "chu-mel").await;
    let (_, author_token) = seed_doctor(&state, &mel, "MED-CHU-MEL-0001").await;
    let (reader, reader_token) = seed_doctor(&state, &mel, "MED-CHU-MEL-0002").await;
    let (patient, patient_token) = seed_patient(&state, "BJ20250001").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/consultations")
            .insert_header(bearer(&author_token))
            .set_json(json!({ "patientId": "bj20250001", "type": "General", "diagnosis": "Otitis" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    let consultation_uri = format!("/api/v1/consultations/{}", body["data"]["consultationId"].as_str().unwrap());

    let (status, _) = send!(
        app,
        test::TestRequest::get().uri(&consultation_uri).insert_header(bearer(&reader_token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/patients/BJ20250001/permissions")
            .insert_header(bearer(&patient_token))
            .set_json(json!({
                "doctorId": "MED-CHU-MEL-0002",
                "expiresAt": (Utc::now() - Duration::hours(1)).to_rfc3339(),
            }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/patients/BJ20250001/permissions")
            .insert_header(bearer(&patient_token))
            .set_json(json!({
                "doctorId": "MED-CHU-MEL-0002",
                "expiresAt": (Utc::now() + Duration::days(7)).to_rfc3339(),
            }))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send!(
        app,
        test::TestRequest::get().uri(&consultation_uri).insert_header(bearer(&reader_token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["diagnosis"], "Otitis");
    assert_eq!(body["data"]["patient"]["patientId"], "BJ20250001");

    // The grant lapses: refresh it to an expiry that has already passed.
    state
        .store
        .grant_permission(reader.doctor.id, patient.id, Some(Utc::now() - Duration::minutes(1)))
        .await
        .unwrap();

    let (status, _) = send!(
        app,
        test::TestRequest::get().uri(&consultation_uri).insert_header(bearer(&reader_token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/patients/BJ20250001/consultations")
            .insert_header(bearer(&reader_token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn hospital_admins_only_see_their_own_hospital() {
    let state = state();
    let mel = seed_hospital(&state, "chu-mel").await;
    let cnhu = seed_hospital(&state, "cnhu").await;
    let (_, doctor_token) = seed_doctor(&state, &mel, "MED-CHU-MEL-0001").await;
    seed_patient(&state, "BJ20250001").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/consultations")
            .insert_header(bearer(&doctor_token))
            .set_json(json!({ "patientId": "BJ20250001", "type": "General", "diagnosis": "Malaria" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    let consultation_id = body["data"]["consultationId"].as_str().unwrap().to_string();

    let own = admin_token(&state, &mel);
    let foreign = admin_token(&state, &cnhu);
    let history = "/api/v1/patients/BJ20250001/consultations";

    let (status, body) = send!(app, test::TestRequest::get().uri(history).insert_header(bearer(&own)));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send!(app, test::TestRequest::get().uri(history).insert_header(bearer(&foreign)));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/consultations/{}", consultation_id))
            .insert_header(bearer(&foreign))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/activity")
            .insert_header(bearer(&foreign))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/dashboard")
            .insert_header(bearer(&foreign))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recentActivity"], json!([]));

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/activity")
            .insert_header(bearer(&own))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["reference"], consultation_id.as_str());

    // Super administrators see every hospital plus new registrations.
    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/activity")
            .insert_header(bearer(&super_admin_token(&state)))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
}

#[actix_rt::test]
async fn statistics_routes_report_and_snapshot() {
    let state = state();
    let mel = seed_hospital(&state, "chu-mel").await;
    let (_, patient_token) = seed_patient(&state, "BJ20250001").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;
    let admin = admin_token(&state, &mel);

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/monthly")
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hospitals"], 1);
    assert_eq!(body["data"]["patients"]["total"], 1);

    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/monthly")
            .insert_header(bearer(&patient_token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/api/v1/statistics/activity?limit=abc")
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/statistics/snapshots")
            .insert_header(bearer(&admin))
            .set_json(json!({ "period": "weekly" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["period"], "weekly");
    assert_eq!(body["data"]["payload"]["patients"]["total"], 1);

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/api/v1/statistics/snapshots")
            .insert_header(bearer(&admin))
            .set_json(json!({ "period": "hourly" }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("hourly"));
}

#[actix_rt::test]
async fn ussd_requires_the_registered_handset() {
    let state = state();
    seed_patient(&state, "BJ20250001").await;
    let app = test::init_service(App::new().configure(api::app_config(state.clone()))).await;

    for (phone, allowed) in [("+229 97 11 11 11", true), ("+22990000000", false), ("", false)] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/ussd")
                .set_form([
                    ("sessionId", "ATUid_7"),
                    ("serviceCode", "*789*BJ20250001#"),
                    ("phoneNumber", phone),
                    ("text", "3"),
                ])
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let text = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(text.starts_with("END "), "{}", text);
        assert_eq!(text.contains("Blood: O+"), allowed, "{}: {}", phone, text);
    }
}
