// SubTrack - subscription tracker
// Entry point and command dispatch

use anyhow::{anyhow, bail, Context};
use std::path::{Path, PathBuf};
use subtrack::app::{self, AppState};
use subtrack::commands;
use subtrack::database::{NewSubscription, SubscriptionPatch};
use subtrack::dates::{days_remaining, format_display_date, parse_date};
use subtrack::services::dashboard::remaining_label;
use subtrack::services::SubscriptionQuery;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DATA_DIR_ENV: &str = "SUBTRACK_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "subtrack-data";

const USAGE: &str = "\
Usage: subtrack <command> [args]

Commands:
  list                                      List subscriptions by end date
  add <person> <service> <category> <start> <duration>
                                            Add a subscription (duration: month, 3months, 6months, year)
  update <id> [--person P] [--service S] [--category C] [--start D] [--duration D]
  delete <id>
  renewals [<date> | <start> <end>]         Subscriptions ending on a day or in a range
  notices                                   Subscriptions about to expire
  dashboard [--status S] [--category C] [--search Q]
  share <id>                                Print shareable text
  import <file>                             Import a JSON array of subscriptions
  export [file]                             Export subscriptions as JSON
  migrate                                   Copy local-only records to the remote store
  watch                                     Stream changes and renewal alerts until Ctrl+C
  info

Data directory: $SUBTRACK_DATA_DIR or ./subtrack-data";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "subtrack=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    if matches!(command.as_str(), "help" | "-h" | "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let data_dir = std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    tracing::info!("Starting SubTrack");
    let state = app::setup(&data_dir)
        .await
        .context("failed to initialize application")?;

    run(&state, command, rest).await
}

async fn run(state: &AppState, command: &str, args: &[String]) -> anyhow::Result<()> {
    match command {
        "list" => {
            let subs = commands::list_subscriptions(state).await?;
            print_table(state, &subs);
        }
        "add" => {
            let [person, service, category, start, duration] = args else {
                bail!("add needs <person> <service> <category> <start> <duration>");
            };
            let new = NewSubscription {
                person_name: person.clone(),
                subscription_name: service.clone(),
                category: category.clone(),
                start_date: date_arg(start)?,
                duration: duration.parse().map_err(|e: String| anyhow!(e))?,
            };
            let sub = commands::add_subscription(state, new).await?;
            println!("Added {} (ends {})", sub.id, format_display_date(sub.end_date));
        }
        "update" => {
            let (id, flags) = args
                .split_first()
                .ok_or_else(|| anyhow!("update needs <id>"))?;
            let patch = parse_patch(flags)?;
            let sub = commands::update_subscription(state, id.clone(), patch).await?;
            println!("Updated {} (ends {})", sub.id, format_display_date(sub.end_date));
        }
        "delete" => {
            let [id] = args else {
                bail!("delete needs <id>");
            };
            commands::delete_subscription(state, id.clone()).await?;
            println!("Deleted {}", id);
        }
        "renewals" => {
            let subs = match args {
                [] => commands::list_renewals(state, None, None).await?,
                [date] => commands::list_renewals(state, Some(date.clone()), None).await?,
                [start, end] => {
                    commands::list_renewals(state, None, Some((start.clone(), end.clone()))).await?
                }
                _ => bail!("renewals takes a date or a start and end date"),
            };
            print_table(state, &subs);
        }
        "notices" => {
            let notices = commands::list_renewal_notices(state).await?;
            if notices.is_empty() {
                println!("No renewals due");
            }
            for notice in notices {
                println!("{}", notice.message);
            }
        }
        "dashboard" => {
            let view = commands::get_dashboard(state, parse_query(args)?).await?;
            println!(
                "Total: {}  Active: {}  Expiring soon: {}  Expired: {}",
                view.summary.total,
                view.summary.active,
                view.summary.expiring_soon,
                view.summary.expired
            );
            println!("Categories: {}", view.categories.join(", "));
            for (duration, subs) in view.groups {
                println!("\n[{}] {} subscription(s)", duration, subs.len());
                print_table(state, &subs);
            }
        }
        "share" => {
            let [id] = args else {
                bail!("share needs <id>");
            };
            println!("{}", commands::share_subscription(state, id.clone()).await?);
        }
        "import" => {
            let [path] = args else {
                bail!("import needs <file>");
            };
            let report = commands::import_subscriptions(state, Path::new(path)).await?;
            println!(
                "Imported {}, skipped {}",
                report.imported.len(),
                report.skipped.len()
            );
            for reason in report.skipped {
                println!("  {}", reason);
            }
        }
        "export" => match args {
            [] => println!("{}", commands::export_subscriptions(state, None).await?),
            [path] => {
                commands::export_subscriptions(state, Some(Path::new(path))).await?;
                println!("Exported to {}", path);
            }
            _ => bail!("export takes at most one file"),
        },
        "migrate" => {
            if commands::migrate_subscriptions(state).await? {
                println!("Migration copied local subscriptions to the remote store");
            } else {
                println!("Nothing to migrate");
            }
        }
        "watch" => watch(state).await?,
        "info" => {
            let info = commands::get_app_info(state).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(())
}

async fn watch(state: &AppState) -> anyhow::Result<()> {
    let monitor = state.renewal_monitor().start();
    let mut handle = state.sync_service.watch().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            snapshot = handle.next() => match snapshot {
                Some(subs) => {
                    println!("--- {} subscription(s)", subs.len());
                    print_table(state, &subs);
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    handle.unsubscribe();
    monitor.stop();
    Ok(())
}

fn print_table(state: &AppState, subs: &[subtrack::database::Subscription]) {
    let today = state.today();
    for sub in subs {
        println!(
            "{:<38} {:<16} {:<16} {:<12} {:<8} {:>10} {:>4}%  {}",
            sub.id,
            sub.person_name,
            sub.subscription_name,
            sub.category,
            sub.duration,
            format_display_date(sub.end_date),
            sub.progress_percent(today),
            remaining_label(days_remaining(sub.end_date, today))
        );
    }
}

fn date_arg(raw: &str) -> anyhow::Result<chrono::NaiveDate> {
    parse_date(raw).ok_or_else(|| anyhow!("invalid date '{}', expected YYYY-MM-DD", raw))
}

fn flag_pairs(flags: &[String]) -> anyhow::Result<Vec<(&str, &str)>> {
    if flags.len() % 2 != 0 {
        bail!("every flag needs a value");
    }

    Ok(flags
        .chunks(2)
        .map(|pair| (pair[0].as_str(), pair[1].as_str()))
        .collect())
}

fn parse_patch(flags: &[String]) -> anyhow::Result<SubscriptionPatch> {
    let mut patch = SubscriptionPatch::default();

    for (flag, value) in flag_pairs(flags)? {
        match flag {
            "--person" => patch.person_name = Some(value.to_string()),
            "--service" => patch.subscription_name = Some(value.to_string()),
            "--category" => patch.category = Some(value.to_string()),
            "--start" => patch.start_date = Some(date_arg(value)?),
            "--duration" => {
                patch.duration = Some(value.parse().map_err(|e: String| anyhow!(e))?)
            }
            other => bail!("unknown flag '{}'", other),
        }
    }

    Ok(patch)
}

fn parse_query(flags: &[String]) -> anyhow::Result<SubscriptionQuery> {
    let mut query = SubscriptionQuery::default();

    for (flag, value) in flag_pairs(flags)? {
        match flag {
            "--status" => query.status = value.parse().map_err(|e: String| anyhow!(e))?,
            "--category" => query.category = Some(value.to_string()),
            "--search" => query.search = Some(value.to_string()),
            other => bail!("unknown flag '{}'", other),
        }
    }

    Ok(query)
}
