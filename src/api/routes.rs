use actix_web::web;

use super::handlers::{
    auth, consultations, doctors, health, hospitals, ledger, patients, permissions, statistics, ussd,
};

/// Mount every route; the caller adds middleware, state and the JSON config.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        .service(
            web::scope("/api/v1")
                .route("/test", web::get().to(health::api_test))
                .service(
                    web::scope("/auth")
                        .route("/patient", web::post().to(auth::patient_login))
                        .route("/hospital", web::post().to(auth::hospital_login))
                        .route("/doctor", web::post().to(auth::doctor_login)),
                )
                .service(
                    web::scope("/hospitals")
                        .route("", web::get().to(hospitals::list_hospitals))
                        .route("", web::post().to(hospitals::create_hospital))
                        .route("/{code}", web::get().to(hospitals::get_hospital)),
                )
                .service(
                    web::scope("/doctors")
                        .route("", web::get().to(doctors::list_doctors))
                        .route("", web::post().to(doctors::create_doctor))
                        .route("/{id}", web::get().to(doctors::get_doctor)),
                )
                .service(
                    web::scope("/patients")
                        .route("", web::get().to(patients::list_patients))
                        .route("", web::post().to(patients::register_patient))
                        .route("/{patient_id}", web::get().to(patients::get_patient))
                        .route("/{patient_id}", web::put().to(patients::update_patient))
                        .route("/{patient_id}/card", web::get().to(patients::patient_card))
                        .route(
                            "/{patient_id}/consultations",
                            web::get().to(consultations::patient_consultations),
                        )
                        .route("/{patient_id}/permissions", web::get().to(permissions::list_permissions))
                        .route("/{patient_id}/permissions", web::post().to(permissions::grant_permission))
                        .route(
                            "/{patient_id}/permissions/{doctor_id}",
                            web::delete().to(permissions::revoke_permission),
                        ),
                )
                .service(
                    web::scope("/consultations")
                        .route("", web::get().to(consultations::list_consultations))
                        .route("", web::post().to(consultations::create_consultation))
                        .route("/{consultation_id}", web::get().to(consultations::get_consultation))
                        .route("/{consultation_id}/status", web::patch().to(consultations::update_status)),
                )
                .service(
                    web::scope("/statistics")
                        .route("/dashboard", web::get().to(statistics::dashboard))
                        .route("/monthly", web::get().to(statistics::monthly))
                        .route("/activity", web::get().to(statistics::activity))
                        .route("/snapshots", web::post().to(statistics::create_snapshot)),
                )
                .route("/ussd", web::post().to(ussd::callback)),
        )
        .service(
            web::scope("/api/hedera")
                .route("/health", web::get().to(ledger::health))
                .route("/contracts", web::get().to(ledger::contracts))
                .route("/create-patient", web::post().to(ledger::create_patient))
                .route("/patient/{sequence}", web::get().to(ledger::patient_entry)),
        );
}
