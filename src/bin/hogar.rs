use clap::{Parser, Subcommand};
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use hogar_sync::prelude::*;
use hogar_sync::seed::{DefaultSeeder, Seeder};
use hogar_sync::views::{completions_by_user, routines_by_urgency};

#[derive(Parser)]
#[clap(name = "hogar", version, about = "Household tasks, bills, routines and groceries")]
struct Cli {
    /// Account email
    #[clap(long, env = "HOGAR_EMAIL")]
    email: String,

    /// Account password
    #[clap(long, env = "HOGAR_PASSWORD", hide_env_values = true)]
    password: String,

    /// Hours east of UTC used for "today" and "this month"
    #[clap(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset: i32,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync once and print the dashboard
    Summary,
    /// Keep syncing and print the dashboard after each refresh
    Watch {
        /// Seconds between refreshes
        #[clap(long, default_value_t = 60)]
        every: u64,
    },
    /// Fill an empty household with the default data
    Seed,
}

fn print_dashboard(household: &Household) {
    let now = household.now();
    let state = household.state().snapshot();
    let dashboard = Dashboard::build(&state, household.options(), now);

    println!("Hola, {}", dashboard.user_name);
    println!(
        "{} completadas esta semana · {} por comprar · cuentas {}/{}",
        dashboard.completed_this_week,
        dashboard.grocery_needed,
        dashboard.bills_paid,
        dashboard.bills_total
    );
    if dashboard.budget_total > 0.0 {
        println!("Presupuesto pendiente: ${:.0}", dashboard.budget_total);
    }

    println!("\nHoy:");
    for task in &dashboard.today {
        println!("  [{}] {}", task.priority.as_str(), task.title);
    }
    if dashboard.has_urgent() {
        println!("\nUrgente:");
        for bill in &dashboard.urgent_bills {
            println!("  💰 {} (día {})", bill.name, bill.due_day);
        }
        for routine in &dashboard.overdue_routines {
            println!("  🧹 {}", routine.name);
        }
    }

    println!("\nRutinas:");
    for (routine, progress) in routines_by_urgency(&state, now).into_iter().take(5) {
        println!("  {:>3}% {}", progress, routine.name);
    }

    let by_user = completions_by_user(&state);
    if !by_user.is_empty() {
        println!("\nCompletadas:");
        for (name, count) in by_user {
            println!("  {}: {}", name, count);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let offset = chrono::FixedOffset::east_opt(cli.utc_offset * 3600)
        .ok_or_else(|| Error::config(format!("bad UTC offset {}", cli.utc_offset)))?;
    let options = SyncOptions::default().with_utc_offset(offset);

    let hogar = Hogar::new(HogarConfig::from_env()?);
    hogar
        .auth()
        .sign_in_with_password(&cli.email, &cli.password)
        .await?;
    info!("Signed in as {}", cli.email);

    match cli.command {
        Command::Summary => {
            let household = hogar.household_with(options);
            household.load().await?;
            print_dashboard(&household);
        }
        Command::Watch { every } => {
            let household = Arc::new(
                hogar.household_with(options.with_refresh_interval(Duration::from_secs(every))),
            );
            household.load().await?;
            print_dashboard(&household);

            let period = household.options().refresh_interval;
            let _scheduler = PollingScheduler::new(period).start(household.clone());
            let mut ticker = tokio::time::interval(household.options().refresh_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        println!();
                        print_dashboard(&household);
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Stopping");
                        break;
                    }
                }
            }
        }
        Command::Seed => {
            let household = hogar.household_with(options);
            let user_id = household.user_id().await?;
            let seeded = DefaultSeeder::default()
                .seed(household.repositories(), &user_id)
                .await?;
            if seeded {
                println!("Datos iniciales creados");
            } else {
                println!("El hogar ya tiene datos");
            }
        }
    }

    hogar.auth().sign_out().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
