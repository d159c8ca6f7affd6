//! # Seed Data Generator
//!
//! Populates a development database with demo users, transactions and
//! redemptions.
//!
//! ## Usage
//! ```bash
//! # Seed ./rewards_dev.db with every category at 1x
//! cargo run -p reward-ledger --bin seed
//!
//! # Use a multiplier file and a custom database
//! cargo run -p reward-ledger --bin seed -- --db ./data/rewards.db --multipliers ./multipliers.json
//! ```
//!
//! Every transaction goes through `TransactionRecorder`, so the seeded
//! balances and history obey the same rules as live traffic. A share of
//! the spends is backdated past one year so the expiration scheduler has
//! work on its first tick.

use chrono::{Duration, Utc};
use std::env;
use std::path::PathBuf;

use reward_core::{Money, MultiplierTable, NewTransaction};
use reward_db::{Database, DbConfig};
use reward_ledger::{load_multiplier_file, Ledger, LedgerConfig};

/// Demo users as (username, email).
const USERS: &[(&str, &str)] = &[
    ("alice", "alice@example.com"),
    ("bashir", "bashir@example.com"),
    ("chen", "chen@example.com"),
    ("dana", "dana@example.com"),
];

/// Spend templates as (category, product code, amount in cents).
const SPENDS: &[(&str, &str, i64)] = &[
    ("grocery", "MILK-1L", 349),
    ("grocery", "BREAD-WHT", 275),
    ("grocery", "WEEKLY-SHOP", 12_480),
    ("electronics", "USB-C-CABLE", 1_999),
    ("electronics", "HEADPHONES", 8_950),
    ("fuel", "UNLEADED", 6_020),
    ("dining", "LUNCH-SET", 1_450),
    ("books", "PAPERBACK", 1_299),
];

/// Ages in days applied round-robin to the spends. Anything over 365
/// expires on the first scheduler tick.
const AGES_DAYS: &[i64] = &[1, 12, 45, 90, 200, 330, 400, 520];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./rewards_dev.db");
    let mut multipliers_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--multipliers" | "-m" => {
                if i + 1 < args.len() {
                    multipliers_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Reward Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>            Database file path (default: ./rewards_dev.db)");
                println!("  -m, --multipliers <PATH>   JSON multiplier file (default: all categories 1x)");
                println!("  -h, --help                 Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Reward Ledger Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!();

    let multipliers = match &multipliers_path {
        Some(path) => load_multiplier_file(path)?,
        None => MultiplierTable::new(),
    };
    println!("✓ Loaded {} multiplier categories", multipliers.len());

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.users().list().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} users", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut config = LedgerConfig::new();
    config.database.path = PathBuf::from(&db_path);
    let ledger = Ledger::new(db, multipliers, config)?;

    println!();
    println!("Recording transactions...");

    let now = Utc::now();
    let start = std::time::Instant::now();
    let mut recorded = 0;

    for (user_idx, (username, email)) in USERS.iter().enumerate() {
        let user = ledger.database().users().create(username, email).await?;

        for (spend_idx, (category, product_code, cents)) in SPENDS.iter().enumerate() {
            let age = AGES_DAYS[(user_idx + spend_idx) % AGES_DAYS.len()];
            let amount = Money::from_cents(cents + (user_idx as i64) * 100);
            let txn = NewTransaction::new(user.id, amount, *category, *product_code)
                .dated(now - Duration::days(age));

            if let Err(e) = ledger.record(txn).await {
                eprintln!("Failed to record {} for {}: {}", product_code, username, e);
                continue;
            }
            recorded += 1;
        }

        let available = ledger.balances().available_points(user.id).await?;
        let redeem = available / 4;
        if redeem > 0 {
            ledger.redeem(user.id, redeem).await?;
        }

        println!(
            "  {:<8} available {:>6}  redeemed {:>6}",
            username, available, redeem
        );
    }

    println!();
    println!("✓ Recorded {} transactions in {:?}", recorded, start.elapsed());

    println!();
    println!("Auditing balances...");
    let reports = ledger.audit_all().await?;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    if reports.iter().all(|r| r.consistent) {
        println!();
        println!("✓ Seed complete!");
    } else {
        eprintln!("✗ Balance/history mismatch after seeding");
    }

    Ok(())
}
