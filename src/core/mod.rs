//! Domain logic that sits between the HTTP handlers and the store.

pub mod identity;
pub mod statistics;
pub mod ussd;
pub mod vitals;
