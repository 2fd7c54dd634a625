//! Request handlers, one module per resource.

pub mod auth;
pub mod consultations;
pub mod doctors;
pub mod health;
pub mod hospitals;
pub mod ledger;
pub mod patients;
pub mod permissions;
pub mod statistics;
pub mod ussd;
