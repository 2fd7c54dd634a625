//! Dashboard figures computed on demand from the store.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{Store, StoreResult};
use crate::models::{
    Activity, ActivityKind, ConsultationFilter, DatabaseCounts, MonthlyStatistics, SnapshotPeriod,
    StatisticsSnapshot,
};
use crate::models::statistics::{ConsultationStatistics, DoctorStatistics, PatientStatistics};

pub const DEFAULT_ACTIVITY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub counts: DatabaseCounts,
    pub generated_at: DateTime<Utc>,
}

/// Percentage change rounded to one decimal. Growth from zero is 100%.
pub fn growth_percent(current: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    let change = (current - previous) as f64 / previous as f64 * 100.0;
    (change * 10.0).round() / 10.0
}

/// First instant of the calendar month containing `now`, and of the month before it.
pub fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    let (prev_year, prev_month) = if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    };
    let previous = Utc
        .with_ymd_and_hms(prev_year, prev_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(start - Duration::days(30));
    (start, previous)
}

pub async fn dashboard(store: &dyn Store, now: DateTime<Utc>) -> StoreResult<Dashboard> {
    Ok(Dashboard {
        counts: store.counts().await?,
        generated_at: now,
    })
}

pub async fn monthly(store: &dyn Store, now: DateTime<Utc>) -> StoreResult<MonthlyStatistics> {
    let (month_start, previous_start) = month_bounds(now);

    let (counts, this_month, previous_month, new_patients, previous_patients, active_patients, active_doctors) = tokio::try_join!(
        store.counts(),
        store.count_consultations_between(month_start, now),
        store.count_consultations_between(previous_start, month_start),
        store.count_patients_registered_between(month_start, now),
        store.count_patients_registered_between(previous_start, month_start),
        store.count_active_patients(),
        store.count_active_doctors(),
    )?;

    Ok(MonthlyStatistics {
        month_start,
        consultations: ConsultationStatistics {
            total: counts.consultations,
            this_month,
            previous_month,
            growth_percent: growth_percent(this_month, previous_month),
        },
        patients: PatientStatistics {
            total: counts.patients,
            active: active_patients,
            new_this_month: new_patients,
            new_previous_month: previous_patients,
            growth_percent: growth_percent(new_patients, previous_patients),
        },
        doctors: DoctorStatistics {
            total: counts.doctors,
            active: active_doctors,
        },
        hospitals: counts.hospitals,
        generated_at: now,
    })
}

/// Latest consultations and registrations, newest first.
///
/// With a `hospital` scope only that hospital's consultations are listed.
/// Registrations are not tied to a hospital, so a scoped feed leaves them out.
pub async fn recent_activity(store: &dyn Store, hospital: Option<Uuid>, limit: usize) -> StoreResult<Vec<Activity>> {
    let fetch = limit as i64;
    let registrations = async {
        match hospital {
            Some(_) => Ok(Vec::new()),
            None => store.recent_patients(fetch).await,
        }
    };
    let (consultations, patients) = tokio::try_join!(
        store.list_consultations(ConsultationFilter {
            hospital_id: hospital,
            limit: Some(fetch),
            ..Default::default()
        }),
        registrations,
    )?;

    let mut feed: Vec<Activity> = consultations
        .into_iter()
        .map(|view| Activity {
            kind: ActivityKind::ConsultationRecorded,
            reference: view.consultation.consultation_id.clone(),
            description: format!(
                "{} consultation for {} {} by Dr. {}",
                view.consultation.kind, view.patient.first_name, view.patient.last_name, view.doctor.last_name
            ),
            occurred_at: view.consultation.consulted_at,
        })
        .chain(patients.into_iter().map(|patient| Activity {
            kind: ActivityKind::PatientRegistered,
            reference: patient.patient_id.clone(),
            description: format!("New patient {} {}", patient.first_name, patient.last_name),
            occurred_at: patient.created_at,
        }))
        .collect();

    feed.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
    feed.truncate(limit);
    Ok(feed)
}

pub async fn save_snapshot(
    store: &dyn Store,
    period: SnapshotPeriod,
    now: DateTime<Utc>,
) -> StoreResult<StatisticsSnapshot> {
    let stats = monthly(store, now).await?;
    let payload = serde_json::to_value(&stats).map_err(|e| crate::db::StoreError::Corrupt(e.to_string()))?;
    store.save_snapshot(period, payload).await
}
