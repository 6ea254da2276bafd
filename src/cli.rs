use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use orderdesk_backend::{Order, PaymentStatus};
use std::io::{BufRead, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::alert::TerminalBell;
use crate::dashboard::Dashboard;
use crate::env::Env;
use crate::filter::OrderFilter;
use crate::journal;
use crate::poller::OrderPoller;
use crate::slots::generate_time_slots;
use crate::transition::{OrderAction, available_actions};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("No order matches {key}")]
    UnknownOrder { key: String },
}

#[derive(Debug, Parser)]
#[command(name = "orderdesk-cli")]
#[command(about = "Operator console for campus food orders")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub env: Env,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SoundSetting {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List orders, newest first
    List {
        /// Order number, customer email or vendor name fragment
        #[arg(short = 's', long)]
        search: Option<String>,
        /// all, pending, confirmed, preparing, ready, completed or cancelled
        #[arg(long)]
        status: Option<String>,
        /// all, upcoming, past or a slot start such as 12:30
        #[arg(long)]
        time: Option<String>,
    },
    /// Show one order with its items
    Show {
        /// Order id or order number
        key: String,
    },
    /// Move an order to its next status
    Advance { key: String },
    /// Cancel a pending or confirmed order
    Cancel {
        key: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Set an order's payment status
    Payment {
        key: String,
        /// pending, paid, failed or refunded
        status: PaymentStatus,
    },
    /// List pickup time slots
    Slots,
    /// Show dashboard statistics
    Stats,
    /// Turn new-order alerts on or off
    Sound {
        #[arg(value_enum)]
        setting: SoundSetting,
    },
    /// Show recent order mutations
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },
    /// Keep polling and ring the bell on new pending orders until Ctrl-C
    Watch,
}

impl Commands {
    const fn needs_orders(&self) -> bool {
        !matches!(
            self,
            Self::Slots | Self::Sound { .. } | Self::History { .. } | Self::Watch
        )
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let dashboard = Dashboard::connect(&cli.env, Arc::new(TerminalBell)).await?;
    let stdin = std::io::stdin();

    run_command_with_io(
        &cli.env,
        &dashboard,
        cli.command,
        &mut stdin.lock(),
        &mut std::io::stdout(),
    )
    .await
}

pub async fn run_command_with_io<R: BufRead, W: Write>(
    env: &Env,
    dashboard: &Dashboard,
    command: Commands,
    stdin: &mut R,
    stdout: &mut W,
) -> anyhow::Result<()> {
    if command.needs_orders() {
        dashboard.refresher.refresh_now().await?;
    }

    match command {
        Commands::List {
            search,
            status,
            time,
        } => {
            let filter =
                OrderFilter::parse(search.as_deref(), status.as_deref(), time.as_deref())?;
            let orders = dashboard.list(&filter).await;

            if orders.is_empty() {
                writeln!(stdout, "No orders match")?;
            }
            for order in &orders {
                writeln!(stdout, "{}", order_line(order, dashboard.timezone))?;
            }
        }
        Commands::Show { key } => {
            let order = dashboard
                .open(&key)
                .await
                .ok_or_else(|| CliError::UnknownOrder { key: key.clone() })?;
            write_order_detail(&order, dashboard.timezone, stdout)?;
        }
        Commands::Advance { key } => {
            let outcome = dashboard
                .lifecycle
                .apply_action(&key, OrderAction::Advance, false)
                .await?;
            writeln!(stdout, "✅ {}", outcome.message)?;
        }
        Commands::Cancel { key, yes } => {
            if !yes && !confirm(&format!("Cancel order {key}?"), stdin, stdout)? {
                writeln!(stdout, "Aborted")?;
                return Ok(());
            }
            let outcome = dashboard
                .lifecycle
                .apply_action(&key, OrderAction::Cancel, true)
                .await?;
            writeln!(stdout, "✅ {}", outcome.message)?;
        }
        Commands::Payment { key, status } => {
            let outcome = dashboard.lifecycle.set_payment_status(&key, status).await?;
            writeln!(stdout, "✅ {}", outcome.message)?;
        }
        Commands::Slots => {
            for slot in generate_time_slots() {
                writeln!(stdout, "{slot}")?;
            }
        }
        Commands::Stats => {
            let stats = dashboard.stats().await;
            writeln!(stdout, "Orders:          {}", stats.total_orders)?;
            for (status, count) in &stats.by_status {
                writeln!(stdout, "  {status:<14} {count}")?;
            }
            writeln!(stdout, "Active:          {}", stats.active_orders)?;
            writeln!(stdout, "Revenue:         ${}", stats.revenue)?;
            writeln!(stdout, "Average order:   ${}", stats.average_order_value)?;
            writeln!(stdout, "Completion rate: {}%", stats.completion_rate)?;
        }
        Commands::Sound { setting } => {
            let enabled = setting == SoundSetting::On;
            dashboard.preferences.set_sound_enabled(enabled).await?;
            writeln!(
                stdout,
                "Sound alerts {}",
                if enabled { "on" } else { "off" }
            )?;
        }
        Commands::History { limit } => {
            let entries = journal::recent(&dashboard.pool, limit).await?;
            if entries.is_empty() {
                writeln!(stdout, "No mutations recorded")?;
            }
            for entry in entries {
                writeln!(
                    stdout,
                    "{}  #{:<8} {:<14} {} -> {}  {}{}",
                    entry
                        .recorded_at
                        .with_timezone(&dashboard.timezone)
                        .format("%Y-%m-%d %H:%M:%S"),
                    entry.order_number,
                    entry.field.as_str(),
                    entry.from_value,
                    entry.to_value,
                    entry.outcome.as_str(),
                    entry.error.map(|e| format!(" ({e})")).unwrap_or_default(),
                )?;
            }
        }
        Commands::Watch => {
            let config = env.get_poller_config()?;
            writeln!(
                stdout,
                "Watching orders every {:?}. Press Ctrl-C to stop.",
                config.interval
            )?;
            stdout.flush()?;

            let handle = OrderPoller::spawn(dashboard.refresher.clone(), config);
            tokio::signal::ctrl_c().await?;
            handle.shutdown().await;
        }
    }

    info!("CLI operation completed successfully");
    Ok(())
}

fn confirm<R: BufRead, W: Write>(
    question: &str,
    stdin: &mut R,
    stdout: &mut W,
) -> std::io::Result<bool> {
    write!(stdout, "{question} [y/N] ")?;
    stdout.flush()?;

    let mut answer = String::new();
    stdin.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn pickup_label(order: &Order, tz: Tz) -> String {
    order.scheduled_pickup_time.map_or_else(
        || "no pickup time".to_string(),
        |pickup| pickup.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
    )
}

fn order_line(order: &Order, tz: Tz) -> String {
    format!(
        "#{:<8} {:<10} {:<9} ${:>8}  {}  {}  {}",
        order.order_number,
        order.status.as_str(),
        order.payment_status.as_str(),
        order.total.to_string(),
        pickup_label(order, tz),
        order.customer_email().unwrap_or("-"),
        order.vendor_name().unwrap_or("-"),
    )
}

fn write_order_detail<W: Write>(order: &Order, tz: Tz, stdout: &mut W) -> std::io::Result<()> {
    writeln!(stdout, "Order #{} ({})", order.order_number, order.id)?;
    writeln!(stdout, "Status:   {}", order.status)?;
    writeln!(stdout, "Payment:  {}", order.payment_status)?;
    writeln!(stdout, "Pickup:   {}", pickup_label(order, tz))?;
    writeln!(
        stdout,
        "Customer: {}",
        order
            .customer
            .full_name
            .as_deref()
            .or(order.customer_email())
            .unwrap_or(&order.customer.id)
    )?;
    writeln!(
        stdout,
        "Vendor:   {}",
        order.vendor_name().unwrap_or(&order.vendor.id)
    )?;
    if let Some(instructions) = &order.special_instructions {
        writeln!(stdout, "Notes:    {instructions}")?;
    }

    writeln!(stdout, "Items:")?;
    for item in &order.items {
        writeln!(
            stdout,
            "  {} x {} @ ${} = ${}",
            item.quantity, item.menu_item.name, item.unit_price, item.subtotal
        )?;
        if let Some(instructions) = &item.special_instructions {
            writeln!(stdout, "    {instructions}")?;
        }
    }

    writeln!(stdout, "Subtotal: ${}", order.subtotal)?;
    writeln!(stdout, "Tax:      ${}", order.tax)?;
    writeln!(stdout, "Total:    ${}", order.total)?;

    let actions = available_actions(order.status);
    if !actions.is_empty() {
        let names = actions.iter().map(|action| action.as_str()).join(", ");
        writeln!(stdout, "Actions:  {names}")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::tests::create_test_env;
    use crate::preferences::Preferences;
    use crate::test_utils::{RecordingAlerter, setup_test_db};
    use orderdesk_backend::test::order_fixture;
    use orderdesk_backend::{OrderId, OrderScope, OrderStatus, TestBackend};
    use std::io::Cursor;

    async fn dashboard_with(backend: &TestBackend) -> Dashboard {
        let pool = setup_test_db().await;
        Dashboard::from_parts(
            Arc::new(backend.clone()),
            OrderScope::All,
            pool.clone(),
            Arc::new(Preferences::load(&pool).await.unwrap()),
            Arc::new(RecordingAlerter::default()),
            Tz::UTC,
        )
    }

    async fn run_with_input(
        dashboard: &Dashboard,
        command: Commands,
        input: &str,
    ) -> (anyhow::Result<()>, String) {
        let mut stdin = Cursor::new(input.as_bytes().to_vec());
        let mut stdout = Vec::new();
        let result =
            run_command_with_io(&create_test_env(), dashboard, command, &mut stdin, &mut stdout)
                .await;
        (result, String::from_utf8(stdout).unwrap())
    }

    fn backend_with_orders() -> TestBackend {
        let mut a1 = order_fixture("o-1", "A1", OrderStatus::Pending);
        a1.customer.email = Some("alice@x.com".into());
        let b2 = order_fixture("o-2", "B2", OrderStatus::Ready);
        TestBackend::with_orders([a1, b2])
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_payment_command() {
        let cli = Cli::try_parse_from(["orderdesk-cli", "--dry-run", "payment", "A1", "paid"])
            .unwrap();
        assert!(cli.env.dry_run);
        assert!(matches!(
            cli.command,
            Commands::Payment {
                status: PaymentStatus::Paid,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["orderdesk-cli", "payment", "A1", "free"]).is_err());
    }

    #[tokio::test]
    async fn test_list_with_search() {
        let dashboard = dashboard_with(&backend_with_orders()).await;

        let (result, output) = run_with_input(
            &dashboard,
            Commands::List {
                search: Some("alice".into()),
                status: None,
                time: None,
            },
            "",
        )
        .await;

        result.unwrap();
        assert!(output.contains("#A1"));
        assert!(!output.contains("#B2"));
        assert!(output.contains("alice@x.com"));
    }

    #[tokio::test]
    async fn test_list_with_invalid_filter() {
        let dashboard = dashboard_with(&backend_with_orders()).await;

        let (result, _) = run_with_input(
            &dashboard,
            Commands::List {
                search: None,
                status: Some("lost".into()),
                time: None,
            },
            "",
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "Invalid status filter: lost");
    }

    #[tokio::test]
    async fn test_show_order() {
        let dashboard = dashboard_with(&backend_with_orders()).await;

        let (result, output) =
            run_with_input(&dashboard, Commands::Show { key: "a1".into() }, "").await;

        result.unwrap();
        assert!(output.contains("Order #A1 (o-1)"));
        assert!(output.contains("2 x Grilled Cheese @ $5.00 = $10.00"));
        assert!(output.contains("Total:    $10.80"));
        assert!(output.contains("Actions:  advance, cancel"));

        let (result, _) = run_with_input(&dashboard, Commands::Show { key: "Q7".into() }, "").await;
        assert_eq!(result.unwrap_err().to_string(), "No order matches Q7");
    }

    #[tokio::test]
    async fn test_advance_prints_message() {
        let backend = backend_with_orders();
        let dashboard = dashboard_with(&backend).await;

        let (result, output) =
            run_with_input(&dashboard, Commands::Advance { key: "A1".into() }, "").await;

        result.unwrap();
        assert_eq!(output.trim(), "✅ Order #A1 marked as confirmed");
        assert_eq!(
            backend.order(&OrderId::new("o-1")).unwrap().status,
            OrderStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_cancel_prompt_declined() {
        let backend = backend_with_orders();
        let dashboard = dashboard_with(&backend).await;

        let (result, output) = run_with_input(
            &dashboard,
            Commands::Cancel {
                key: "A1".into(),
                yes: false,
            },
            "n\n",
        )
        .await;

        result.unwrap();
        assert!(output.contains("Cancel order A1? [y/N]"));
        assert!(output.contains("Aborted"));
        assert_eq!(backend.update_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_prompt_accepted() {
        let backend = backend_with_orders();
        let dashboard = dashboard_with(&backend).await;

        let (result, output) = run_with_input(
            &dashboard,
            Commands::Cancel {
                key: "A1".into(),
                yes: false,
            },
            "yes\n",
        )
        .await;

        result.unwrap();
        assert!(output.contains("Order #A1 marked as cancelled"));
        assert_eq!(
            backend.order(&OrderId::new("o-1")).unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_cancel_ready_order_fails() {
        let backend = backend_with_orders();
        let dashboard = dashboard_with(&backend).await;

        let (result, _) = run_with_input(
            &dashboard,
            Commands::Cancel {
                key: "B2".into(),
                yes: true,
            },
            "",
        )
        .await;

        assert_eq!(
            result.unwrap_err().to_string(),
            "Cannot cancel an order that is ready"
        );
        assert_eq!(backend.update_count(), 0);
    }

    #[tokio::test]
    async fn test_payment_failure_is_reported() {
        let backend = backend_with_orders();
        backend.set_fail_updates(true);
        let dashboard = dashboard_with(&backend).await;

        let (result, _) = run_with_input(
            &dashboard,
            Commands::Payment {
                key: "B2".into(),
                status: PaymentStatus::Paid,
            },
            "",
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("injected update failure"));
    }

    #[tokio::test]
    async fn test_sound_and_history() {
        let backend = backend_with_orders();
        let dashboard = dashboard_with(&backend).await;

        let (result, output) = run_with_input(
            &dashboard,
            Commands::Sound {
                setting: SoundSetting::Off,
            },
            "",
        )
        .await;
        result.unwrap();
        assert_eq!(output.trim(), "Sound alerts off");
        assert!(!dashboard.preferences.sound_enabled());

        let (_, output) = run_with_input(&dashboard, Commands::History { limit: 5 }, "").await;
        assert_eq!(output.trim(), "No mutations recorded");

        run_with_input(&dashboard, Commands::Advance { key: "B2".into() }, "")
            .await
            .0
            .unwrap();
        let (_, output) = run_with_input(&dashboard, Commands::History { limit: 5 }, "").await;
        assert!(output.contains("#B2"));
        assert!(output.contains("ready -> completed"));
        assert!(output.contains("committed"));
    }

    #[tokio::test]
    async fn test_slots_and_stats() {
        let dashboard = dashboard_with(&backend_with_orders()).await;

        let (_, output) = run_with_input(&dashboard, Commands::Slots, "").await;
        assert_eq!(output.lines().count(), 36);
        assert_eq!(output.lines().next(), Some("06:00-06:30"));

        let (_, output) = run_with_input(&dashboard, Commands::Stats, "").await;
        assert!(output.contains("Orders:          2"));
        assert!(output.contains("Active:          1"));
    }
}
