//! Administration commands run against the configured store.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use validator::Validate;

use healthid::auth::hash_password;
use healthid::config::{self, StoreBackend};
use healthid::db::{self, StoreError};
use healthid::models::{AdminRole, NewHospital, NewHospitalAdmin};
use healthid::telemetry;

#[derive(Parser)]
#[command(name = "healthid-admin", version, about = "Hedera Health ID administration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a hospital
    CreateHospital {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        director: Option<String>,
    },
    /// Create a hospital administrator, or reset the password of an existing one
    CreateAdmin {
        #[arg(long)]
        admin_id: String,
        #[arg(long)]
        hospital_code: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "HEALTHID_ADMIN_PASSWORD")]
        password: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, value_parser = parse_role, default_value = "admin")]
        role: AdminRole,
    },
    /// Replace a patient's password
    ResetPatientPassword {
        #[arg(long)]
        patient_id: String,
        #[arg(long, env = "HEALTHID_PATIENT_PASSWORD")]
        password: String,
    },
    /// Check connectivity and print record counts
    Check,
}

fn parse_role(raw: &str) -> Result<AdminRole, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let settings = config::load_config().context("failed to load configuration")?;
    telemetry::init(&settings.logging);
    if settings.database.backend == StoreBackend::Memory {
        bail!("administration commands need the postgres backend");
    }
    let (store, database) = db::open_store(&settings.database).await?;

    match cli.command {
        Command::CreateHospital {
            code,
            name,
            city,
            address,
            phone,
            email,
            director,
        } => {
            let hospital = NewHospital {
                code,
                name,
                city,
                address,
                phone,
                email,
                director,
            }
            .normalized();
            hospital.validate().context("invalid hospital")?;
            let hospital = store.create_hospital(hospital).await?;
            println!("created hospital {} ({})", hospital.code, hospital.id);
        }
        Command::CreateAdmin {
            admin_id,
            hospital_code,
            first_name,
            last_name,
            email,
            password,
            phone,
            role,
        } => {
            if password.len() < 8 {
                bail!("password must be at least 8 characters");
            }
            let password_hash = hash_password(&password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            if store.find_admin(&admin_id).await?.is_some() {
                store.set_admin_password(&admin_id, &password_hash).await?;
                println!("administrator {} exists; password updated", admin_id);
            } else {
                let hospital = store
                    .find_hospital_by_code(&hospital_code)
                    .await?
                    .with_context(|| format!("hospital {} not found", hospital_code))?;
                let admin = store
                    .create_admin(NewHospitalAdmin {
                        admin_id,
                        last_name,
                        first_name,
                        email,
                        phone,
                        hospital_id: hospital.id,
                        role,
                        password_hash,
                    })
                    .await?;
                println!("created {} {} for {}", admin.role, admin.admin_id, hospital.code);
            }
        }
        Command::ResetPatientPassword { patient_id, password } => {
            if password.len() < 6 {
                bail!("password must be at least 6 characters");
            }
            let password_hash = hash_password(&password).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            match store.set_patient_password(&patient_id, &password_hash).await {
                Ok(()) => println!("password updated for {}", patient_id),
                Err(StoreError::NotFound(_)) => bail!("patient {} not found", patient_id),
                Err(e) => return Err(e.into()),
            }
        }
        Command::Check => {
            store.ping().await?;
            let counts = store.counts().await?;
            println!("database reachable");
            println!("  hospitals:     {}", counts.hospitals);
            println!("  doctors:       {}", counts.doctors);
            println!("  patients:      {}", counts.patients);
            println!("  consultations: {}", counts.consultations);
            println!("  permissions:   {}", counts.permissions);
        }
    }

    if let Some(database) = database {
        database.close().await;
    }
    info!("done");
    Ok(())
}
