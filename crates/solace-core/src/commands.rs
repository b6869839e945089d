use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{Local, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::cli::Invocation;
use crate::config::Config;
use crate::error::SyncError;
use crate::habits::{HabitService, NewHabit};
use crate::item::CheckIn;
use crate::journals::JournalService;
use crate::render::Renderer;
use crate::streak;
use crate::sync::{ItemStore, MutationController};

const DEFAULT_HABIT_TARGET: u32 = 21;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "checkins",
        "complete",
        "activate",
        "remove",
        "habits",
        "addhabit",
        "habitdone",
        "journals",
        "journal",
        "streak",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Completed,
    Active,
}

#[instrument(skip(cfg, renderer, inv))]
pub async fn dispatch(cfg: &Config, renderer: &Renderer, inv: Invocation) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();
    debug!(command, ?args, "dispatching command");

    match command {
        "checkins" => cmd_checkins(cfg, renderer).await,
        "complete" => cmd_toggle(cfg, renderer, args, Toggle::Completed).await,
        "activate" => cmd_toggle(cfg, renderer, args, Toggle::Active).await,
        "remove" => cmd_remove(cfg, renderer, args).await,
        "habits" => cmd_habits(cfg, renderer).await,
        "addhabit" => cmd_add_habit(cfg, renderer, args).await,
        "habitdone" => cmd_habit_done(cfg, renderer, args).await,
        "journals" => cmd_journals(cfg, renderer).await,
        "journal" => cmd_journal(cfg, renderer, args).await,
        "streak" => cmd_streak(renderer, args),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn api_client(cfg: &Config) -> anyhow::Result<Arc<ApiClient>> {
    let client = ApiClient::new(&cfg.backend_url(), cfg.timeout()?, cfg.token_provider())
        .context("failed to set up backend client")?;
    debug!(base = %client.base_url(), "backend client ready");
    Ok(Arc::new(client))
}

/// Mounts a check-in view: an empty store plus its controller, filled
/// from the backend.
async fn mount_checkins(
    cfg: &Config,
) -> anyhow::Result<(ItemStore<CheckIn>, MutationController<CheckIn, Arc<ApiClient>>)> {
    let store = ItemStore::new();
    let controller = MutationController::new(&store, api_client(cfg)?, cfg.conflict_policy()?);
    controller
        .load()
        .await
        .context("failed to load check-ins")?;
    Ok((store, controller))
}

/// Shows the user-facing notice for `err` and converts it for the
/// caller.
fn report(renderer: &Renderer, err: SyncError) -> anyhow::Error {
    renderer.notice(err.notice());
    anyhow::Error::new(err)
}

fn parse_id(args: &[String], usage: &str) -> anyhow::Result<i64> {
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("usage: solace {usage}"))?;
    raw.parse::<i64>()
        .map_err(|_| anyhow!("invalid id: {raw}"))
}

#[instrument(skip(cfg, renderer))]
async fn cmd_checkins(cfg: &Config, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command checkins");
    let (store, _controller) = mount_checkins(cfg).await?;
    let snapshot = store.snapshot();
    renderer.print_checkins(&snapshot.items, snapshot.version)
}

#[instrument(skip(cfg, renderer, args))]
async fn cmd_toggle(
    cfg: &Config,
    renderer: &Renderer,
    args: &[String],
    toggle: Toggle,
) -> anyhow::Result<()> {
    let usage = match toggle {
        Toggle::Completed => "complete <id>",
        Toggle::Active => "activate <id>",
    };
    let id = parse_id(args, usage)?;
    let (store, controller) = mount_checkins(cfg).await?;

    let result = match toggle {
        Toggle::Completed => controller.toggle_completed(id).await,
        Toggle::Active => controller.toggle_active(id).await,
    };

    let snapshot = store.snapshot();
    match result {
        Ok(item) => {
            info!(id, completed = item.completed, active = item.active, "check-in updated");
            renderer.print_checkins(&snapshot.items, snapshot.version)
        }
        Err(err) => {
            warn!(id, error = %err, "check-in update failed");
            renderer.print_checkins(&snapshot.items, snapshot.version)?;
            Err(report(renderer, err))
        }
    }
}

#[instrument(skip(cfg, renderer, args))]
async fn cmd_remove(cfg: &Config, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    let id = parse_id(args, "remove <id>")?;
    let (store, controller) = mount_checkins(cfg).await?;

    match controller.delete_item(&id).await {
        Ok(removed) => {
            println!("Removed check-in {} '{}'.", removed.id, removed.title);
            let snapshot = store.snapshot();
            renderer.print_checkins(&snapshot.items, snapshot.version)
        }
        Err(err) => Err(report(renderer, err)),
    }
}

fn habit_service(cfg: &Config) -> anyhow::Result<HabitService<Arc<ApiClient>>> {
    Ok(HabitService::new(api_client(cfg)?, cfg.user_id()?))
}

#[instrument(skip(cfg, renderer))]
async fn cmd_habits(cfg: &Config, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command habits");
    let views = habit_service(cfg)?
        .overview()
        .await
        .map_err(|err| report(renderer, err))?;
    renderer.print_habits(&views, Local::now().date_naive())
}

#[instrument(skip(cfg, renderer, args))]
async fn cmd_add_habit(cfg: &Config, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    let new_habit = parse_new_habit(args)?;
    let created = habit_service(cfg)?
        .add(new_habit)
        .await
        .map_err(|err| report(renderer, err))?;
    println!("Created habit {} '{}'.", created.id, created.name);
    Ok(())
}

/// `addhabit <name words...> [target:N] [desc:TEXT]`
fn parse_new_habit(args: &[String]) -> anyhow::Result<NewHabit> {
    let mut name_words = Vec::new();
    let mut description = None;
    let mut target = DEFAULT_HABIT_TARGET;

    for arg in args {
        if let Some(raw) = arg.strip_prefix("target:") {
            target = raw
                .parse::<u32>()
                .map_err(|_| anyhow!("invalid target: {raw}"))?;
        } else if let Some(raw) = arg.strip_prefix("desc:") {
            description = Some(raw.to_string());
        } else {
            name_words.push(arg.as_str());
        }
    }

    if name_words.is_empty() {
        return Err(anyhow!(
            "usage: solace addhabit <name> [target:N] [desc:TEXT]"
        ));
    }
    let name = name_words.join(" ");

    Ok(NewHabit {
        description: description.unwrap_or_else(|| name.clone()),
        name,
        target,
    })
}

#[instrument(skip(cfg, renderer, args))]
async fn cmd_habit_done(cfg: &Config, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    let id = parse_id(args, "habitdone <id> [YYYY-MM-DD]")?;
    let date = args
        .get(1)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| anyhow!("invalid date: {raw}"))
        })
        .transpose()?;

    habit_service(cfg)?
        .complete(id, date)
        .await
        .map_err(|err| report(renderer, err))?;
    println!("Habit {id} marked done.");
    Ok(())
}

fn journal_service(cfg: &Config) -> anyhow::Result<JournalService<Arc<ApiClient>>> {
    Ok(JournalService::new(api_client(cfg)?, cfg.user_id()?))
}

#[instrument(skip(cfg, renderer))]
async fn cmd_journals(cfg: &Config, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command journals");
    let entries = journal_service(cfg)?
        .history()
        .await
        .map_err(|err| report(renderer, err))?;
    renderer.print_journals(&entries)
}

#[instrument(skip(cfg, renderer, args))]
async fn cmd_journal(cfg: &Config, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    let content = args.join(" ");
    let saved = journal_service(cfg)?
        .add(&content)
        .await
        .map_err(|err| report(renderer, err))?;
    println!("Journal entry {} saved.", saved.id);
    Ok(())
}

/// Offline streak calculator over a compact or comma-separated flag
/// list, oldest day first.
fn cmd_streak(renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    let raw = args.join("");
    let flags = streak::parse_flags(&raw)
        .ok_or_else(|| anyhow!("usage: solace streak <flags>, e.g. 1011111 or y,n,y"))?;
    let days = streak::normalize(&flags);
    renderer.print_streak(&days, Local::now().date_naive())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<(&String, &String)> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={}", shown_value(key, value));
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

/// Credential settings (`auth.*`) are masked.
fn shown_value(key: &str, value: &str) -> String {
    if key.starts_with("auth.") && !value.trim().is_empty() {
        "********".to_string()
    } else {
        value.to_string()
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "solace [options] [command] [args]\n\n\
         commands:\n  \
         checkins                          list check-ins\n  \
         complete <id>                     toggle a check-in's completed flag\n  \
         activate <id>                     toggle a check-in's active flag\n  \
         remove <id>                       delete a check-in\n  \
         habits                            habits with the last 7 days and streak\n  \
         addhabit <name> [target:N] [desc:TEXT]\n  \
         habitdone <id> [YYYY-MM-DD]       mark a habit done (today by default)\n  \
         journals                          journal history, newest first\n  \
         journal <text>                    write a journal entry\n  \
         streak <flags>                    streak of a 7-day flag list (oldest first)\n  \
         _show                             effective configuration\n  \
         version\n\n\
         options:\n  \
         -v / -q                           more / less logging\n  \
         --rc KEY=VALUE, rc.KEY=VALUE      override a configuration key\n  \
         --solacerc PATH                   configuration file"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn abbreviations_expand_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("journals", &known), Some("journals"));
        assert_eq!(expand_command_abbrev("journal", &known), Some("journal"));
        assert_eq!(expand_command_abbrev("st", &known), Some("streak"));
        assert_eq!(expand_command_abbrev("c", &known), None);
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn new_habit_args_are_split_into_fields() {
        let habit = parse_new_habit(&args(&["Morning", "walk", "target:30", "desc:around the block"]))
            .expect("parse");
        assert_eq!(habit.name, "Morning walk");
        assert_eq!(habit.description, "around the block");
        assert_eq!(habit.target, 30);

        let defaulted = parse_new_habit(&args(&["Stretch"])).expect("parse");
        assert_eq!(defaulted.description, "Stretch");
        assert_eq!(defaulted.target, DEFAULT_HABIT_TARGET);

        assert!(parse_new_habit(&args(&["target:5"])).is_err());
        assert!(parse_new_habit(&args(&["Read", "target:many"])).is_err());
    }

    #[test]
    fn auth_settings_are_masked_in_show() {
        assert_eq!(shown_value("auth.token_command", "pass show solace"), "********");
        assert_eq!(shown_value("auth.token_env", "SOLACE_TOKEN"), "********");
        assert_eq!(shown_value("auth.token_command", ""), "");
        assert_eq!(shown_value("backend.url", "http://localhost:8000"), "http://localhost:8000");
    }

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id(&args(&["42"]), "remove <id>").expect("id"), 42);
        assert!(parse_id(&args(&["abc"]), "remove <id>").is_err());
        assert!(parse_id(&[], "remove <id>").is_err());
    }
}
