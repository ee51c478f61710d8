//! FieldForge CLI
//!
//! Operator commands for a FieldForge deployment:
//! - Generate a config file
//! - Create or upgrade the database
//! - Mint bearer tokens for testing
//! - Run the Hourglass worker outside the server
//! - Run an arc flash calculation

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fieldforge::field::arc_flash::{self, ArcFlashInputs, ArcFlashResult, Enclosure};
use fieldforge::{telemetry, AppState, AuthKeys, AuthUser, Config, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fieldforge-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator tools for the FieldForge server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations plus FIELDFORGE_* overrides)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Open the database and apply the schema
    Migrate,

    /// Mint a bearer token signed with the configured secret
    Token {
        /// Subject user id
        #[arg(short, long)]
        user: String,
        /// Company id for field routes
        #[arg(long)]
        company: Option<String>,
        /// Company role (admin, manager, foreman, worker)
        #[arg(long, default_value = "worker")]
        role: String,
        /// Optional email claim
        #[arg(long)]
        email: Option<String>,
        /// Lifetime in seconds (default: auth.token_ttl_secs)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Run the turn expiry worker
    Hourglass {
        /// Run a single pass and print its report
        #[arg(long)]
        once: bool,
    },

    /// Calculate incident energy and PPE category
    ArcFlash {
        /// System voltage, kV
        #[arg(long)]
        voltage: f64,
        /// Bolted fault current, kA
        #[arg(long)]
        fault_current: f64,
        /// Protective device clearing time, seconds
        #[arg(long)]
        clearing_time: f64,
        /// Working distance, inches
        #[arg(long, default_value = "18")]
        distance: f64,
        /// Conductor gap, mm
        #[arg(long, default_value = "32")]
        gap: f64,
        /// Enclosure type (open, box)
        #[arg(long, default_value = "box", value_parser = parse_enclosure)]
        enclosure: Enclosure,
    },
}

fn parse_enclosure(s: &str) -> Result<Enclosure, String> {
    Enclosure::parse(&s.to_lowercase())
        .ok_or_else(|| format!("unknown enclosure '{}' (expected open or box)", s))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };
    config.validate()?;
    Ok(config)
}

fn open_store(config: &Config) -> anyhow::Result<Arc<Store>> {
    let path = config.storage.database_path();
    let store = Store::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.format.as_str(), "table" | "json") {
        bail!("unknown format '{}' (expected table or json)", cli.format);
    }

    match cli.command {
        Commands::Config { output } => {
            let config = fieldforge::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }

        Commands::Migrate => {
            let config = load_config(cli.config.as_deref())?;
            let store = open_store(&config)?;
            if !store.ping() {
                bail!("database did not respond after migration");
            }
            println!("Database ready at {:?}", config.storage.database_path());
        }

        Commands::Token {
            user,
            company,
            role,
            email,
            ttl,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let keys = AuthKeys::from_secret(&config.auth.jwt_secret);

            let mut auth_user = AuthUser::new(user);
            if let Some(company) = company {
                auth_user = auth_user.with_company(company, role);
            }
            auth_user.email = email;

            let ttl = ttl.unwrap_or(config.auth.token_ttl_secs);
            let (token, expires_at) = keys.issue(&auth_user, ttl)?;

            if cli.format == "json" {
                let out = serde_json::json!({ "token": token, "expiresAt": expires_at });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", token);
            }
        }

        Commands::Hourglass { once } => {
            let config = load_config(cli.config.as_deref())?;
            telemetry::init(&config.logging);

            let store = open_store(&config)?;
            let hourglass = Arc::new(AppState::new(store, config).hourglass());

            if once {
                let report = hourglass.run_once().await?;
                if cli.format == "json" {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("{:<18} {}", "Scanned", report.scanned);
                    println!("{:<18} {}", "Expirations set", report.expirations_set);
                    println!("{:<18} {}", "Notified", report.notified);
                    println!("{:<18} {}", "Warned", report.warned);
                    println!("{:<18} {}", "Timed out", report.timed_out);
                    println!("{:<18} {}", "Auto-filled", report.auto_filled);
                }
            } else {
                let worker = Arc::clone(&hourglass).start();
                fieldforge::api::shutdown_signal().await;
                hourglass.stop().await;
                worker.abort();
            }
        }

        Commands::ArcFlash {
            voltage,
            fault_current,
            clearing_time,
            distance,
            gap,
            enclosure,
        } => {
            let inputs = ArcFlashInputs {
                voltage_kv: voltage,
                fault_current_ka: fault_current,
                clearing_time_s: clearing_time,
                working_distance_in: distance,
                gap_mm: gap,
                enclosure,
            };
            let result = arc_flash::calculate(&inputs)?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_arc_flash(&inputs, &result);
            }
        }
    }

    Ok(())
}

fn print_arc_flash(inputs: &ArcFlashInputs, result: &ArcFlashResult) {
    println!(
        "{} kV, {} kA bolted, {} s clearing, {} enclosure",
        inputs.voltage_kv, inputs.fault_current_ka, inputs.clearing_time_s, inputs.enclosure
    );
    println!("{}", "-".repeat(48));
    println!("{:<28} {:>10.2} kA", "Arcing current", result.arc_current_ka);
    println!(
        "{:<28} {:>10.2} cal/cm²",
        "Incident energy", result.incident_energy
    );
    println!(
        "{:<28} {:>10.1} in",
        "Arc flash boundary", result.arc_flash_boundary_in
    );
    println!(
        "{:<28} {:>10.1} in",
        "Working distance", result.working_distance_in
    );
    println!("{:<28} {:>10}", "PPE category", result.ppe_category);
    println!("{:<28} {}", "PPE", result.ppe_label);
    if let Some(rating) = result.min_arc_rating {
        println!("{:<28} {:>10} cal/cm²", "Minimum arc rating", rating);
    }
    println!(
        "{:<28} {:>10.1} ft",
        "Limited approach", result.limited_approach_ft
    );
    println!(
        "{:<28} {:>10.1} ft",
        "Restricted approach", result.restricted_approach_ft
    );
    println!(
        "{:<28} {:>10.1} ft",
        "Prohibited approach", result.prohibited_approach_ft
    );

    if !result.required_ppe.is_empty() {
        println!();
        println!("Required PPE:");
        for item in &result.required_ppe {
            println!("  - {}", item);
        }
    }
}
