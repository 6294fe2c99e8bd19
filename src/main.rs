use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

use subtrack::{
    calendar::{self, parse_calendar_date, CalendarDate},
    cadence::BillingCadence,
    config::{init_tracing, Config},
    dashboard::{classify_all, payment_forecast, spend_totals, StatusCounts},
    db::{get_all_subscriptions, insert_subscriptions, mark_reminded, set_cancelled, setup_database, verify_count},
    importer::load_csv,
    projector::{upcoming_renewals, SubscriptionAnchor},
    reminders::{normalize_days_before, plan_reminders},
};

#[derive(Parser)]
#[command(name = "subtrack", version, about = "Track subscriptions and their renewal dates")]
struct Cli {
    /// SQLite file (overrides SUBS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Evaluate as of this date instead of the local calendar day
    #[arg(long, global = true)]
    today: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import tracked subscriptions from a CSV export
    Import { csv: PathBuf },

    /// List subscriptions with their effective renewal and status
    List,

    /// Monthly / yearly spend per currency
    Totals,

    /// Payments due within the next N days
    Forecast {
        #[arg(long)]
        days: Option<u32>,
    },

    /// Reminders due today (1, 3 or 7 days ahead)
    Reminders {
        #[arg(long)]
        days: Option<u32>,

        /// Record reminders as sent
        #[arg(long)]
        mark: bool,
    },

    /// Mark a subscription cancelled
    Cancel { id: String },

    /// Undo a cancellation
    Reactivate { id: String },

    /// Preview renewal dates for an anchor date and cadence
    Preview {
        date: String,
        cadence: String,

        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(db) = &cli.db {
        config.db_path = db.to_string_lossy().into_owned();
    }
    init_tracing(&config)?;

    let today = match &cli.today {
        Some(raw) => parse_calendar_date(raw).with_context(|| format!("Invalid --today value '{raw}'"))?,
        None => calendar::today(),
    };

    match cli.command {
        Command::Import { csv } => run_import(&config, &csv),
        Command::List => run_list(&config, today),
        Command::Totals => run_totals(&config, today),
        Command::Forecast { days } => run_forecast(&config, today, days.unwrap_or(config.forecast_days)),
        Command::Reminders { days, mark } => {
            let days_before = normalize_days_before(days.unwrap_or(config.reminder_days_before));
            run_reminders(&config, today, days_before, mark)
        }
        Command::Cancel { id } => run_set_cancelled(&config, today, &id, true),
        Command::Reactivate { id } => run_set_cancelled(&config, today, &id, false),
        Command::Preview { date, cadence, count } => run_preview(today, &date, &cadence, count),
    }
}

fn open_db(config: &Config) -> Result<Connection> {
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_import(config: &Config, csv_path: &std::path::Path) -> Result<()> {
    println!("🗄️  Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load + validate CSV
    println!("\n📂 Loading CSV...");
    let report = load_csv(csv_path)?;
    println!("✓ Accepted {} rows", report.subscriptions.len());

    for rejected in &report.rejected {
        println!("  ✗ line {}: {}", rejected.line, rejected.reason);
    }
    if !report.unrecognized_cycles.is_empty() {
        println!(
            "  ⚠️  unrecognized billing cycle on lines {:?} (treated as monthly)",
            report.unrecognized_cycles
        );
    }

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = open_db(config)?;
    println!("✓ Database ready at {}", config.db_path);

    // 3. Insert
    println!("\n💾 Inserting subscriptions...");
    let inserted = insert_subscriptions(&conn, &report.subscriptions)?;
    let count = verify_count(&conn)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ New subscriptions: {}", inserted);
    println!("✓ Duplicates skipped: {}", report.subscriptions.len() - inserted);
    println!("✓ Database contains {} subscriptions", count);

    Ok(())
}

fn run_list(config: &Config, today: CalendarDate) -> Result<()> {
    let conn = open_db(config)?;
    let subs = get_all_subscriptions(&conn)?;
    let views = classify_all(&subs, today, i64::from(config.renews_soon_days));

    println!("📋 Subscriptions as of {}", today);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for view in &views {
        let renewal = view
            .effective_renewal
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let days = view.days_until.map(|d| format!("{d:+}d")).unwrap_or_default();

        println!(
            "{:<24} {:>10} {:<4} {:<16} {:<11} {:>6}  {:<12} {}",
            view.subscription.merchant_name,
            view.subscription.amount.round_dp(2),
            view.subscription.currency,
            view.cadence.label(),
            renewal,
            days,
            view.status.as_str(),
            view.subscription.id,
        );
    }

    let counts = StatusCounts::from_views(&views);
    println!(
        "\n{} total: {} active, {} renewing soon, {} cancelled, {} expired, {} invalid, {} need review",
        counts.total(),
        counts.active,
        counts.renews_soon,
        counts.cancelled,
        counts.expired,
        counts.invalid,
        counts.needs_review
    );

    Ok(())
}

fn run_totals(config: &Config, today: CalendarDate) -> Result<()> {
    let conn = open_db(config)?;
    let subs = get_all_subscriptions(&conn)?;
    let totals = spend_totals(&subs).rounded();

    println!("💰 Spend totals as of {}", today);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if totals.by_currency.is_empty() {
        println!("No active subscriptions.");
    }

    for (currency, spend) in &totals.by_currency {
        println!(
            "{}  monthly {:>12}  yearly {:>12}  ({} subscriptions)",
            currency, spend.monthly, spend.yearly, spend.subscriptions
        );
    }

    if totals.skipped > 0 {
        println!("⚠️  {} subscriptions skipped (zero or negative amount)", totals.skipped);
    }

    Ok(())
}

fn run_forecast(config: &Config, today: CalendarDate, days: u32) -> Result<()> {
    let conn = open_db(config)?;
    let subs = get_all_subscriptions(&conn)?;
    let forecast = payment_forecast(&subs, today, days)?;

    println!("📅 Payments {} → {}", forecast.from, forecast.until);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for entry in &forecast.entries {
        println!(
            "{}  {:<24} {:>10} {}",
            entry.date,
            entry.merchant_name,
            entry.amount.round_dp(2),
            entry.currency
        );
    }

    println!();
    for (currency, total) in &forecast.totals {
        println!("Total {}: {}", currency, total.round_dp(2));
    }

    for id in &forecast.needs_review {
        println!("⚠️  {} needs review (renewal projection out of range)", id);
    }

    Ok(())
}

fn run_reminders(config: &Config, today: CalendarDate, days_before: u32, mark: bool) -> Result<()> {
    let conn = open_db(config)?;
    let subs = get_all_subscriptions(&conn)?;
    let plan = plan_reminders(&subs, today, days_before);

    println!("⏰ Reminders for renewals within {} days", plan.window_days);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for due in &plan.due {
        println!("{}  ({} {})", due.subject, due.amount.round_dp(2), due.currency);

        if mark {
            mark_reminded(&conn, &due.subscription_id, due.renewal_date, "cli")?;
        }
    }

    println!(
        "\n{} due, {} already reminded, {} invalid dates, {} need review",
        plan.due.len(),
        plan.skipped_already_reminded,
        plan.skipped_invalid,
        plan.needs_review.len()
    );
    if mark && !plan.due.is_empty() {
        println!("✓ Marked {} reminders as sent", plan.due.len());
    }

    Ok(())
}

fn run_set_cancelled(config: &Config, today: CalendarDate, id: &str, cancelled: bool) -> Result<()> {
    let conn = open_db(config)?;

    let Some(updated) = set_cancelled(&conn, id, cancelled, Utc::now(), "cli")? else {
        bail!("No subscription with id {id}");
    };

    let verb = if cancelled { "Cancelled" } else { "Reactivated" };
    println!("✓ {} {}", verb, updated.merchant_name);

    match updated.effective_renewal(today) {
        Ok(Some(date)) => println!("  renewal date: {}", date),
        Ok(None) => println!("  renewal date unknown"),
        Err(e) => println!("  ⚠️  {}", e),
    }

    Ok(())
}

fn run_preview(today: CalendarDate, date: &str, cadence: &str, count: usize) -> Result<()> {
    let anchor_date = parse_calendar_date(date)?;
    let cadence: BillingCadence = cadence.parse()?;

    let anchor = SubscriptionAnchor::new(anchor_date, cadence);
    let dates = upcoming_renewals(&anchor, today, count)?;

    println!("🔮 {} from {} (as of {})", cadence.label(), anchor_date, today);
    for (i, d) in dates.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, d);
    }

    Ok(())
}
