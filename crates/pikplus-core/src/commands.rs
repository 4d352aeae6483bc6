use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::{KeyValueStorage, LocalStore};
use crate::filter::WordListPolicy;
use crate::pagination::{PaginationState, PaginationVariant, generate_page_numbers};
use crate::record::{LocalShare, LocalTask, RawTaskRecord, TaskId, ingest};
use crate::render::Renderer;
use crate::store::Keyed;
use crate::validate::{split_magnet_links, validate_magnet_link};
use crate::view::reconcile;

pub fn known_command_names() -> Vec<&'static str> {
    vec!["tasks", "shares", "pages", "view", "help", "version"]
}

pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch<S: KeyValueStorage>(
    store: &mut LocalStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    debug!(command = %inv.command, args = ?inv.command_args, "dispatching command");

    match inv.command.as_str() {
        "tasks" => cmd_tasks(store, renderer, &inv.command_args),
        "shares" => cmd_shares(store, renderer, &inv.command_args),
        "pages" => cmd_pages(cfg, renderer, &inv.command_args),
        "view" => cmd_view(store, cfg, renderer, &inv.command_args),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Splits `key:value` modifiers from plain words.
fn split_modifiers<'a>(
    args: &'a [String],
    keys: &[&str],
) -> (Vec<(&'a str, &'a str)>, Vec<&'a str>) {
    let mut mods = Vec::new();
    let mut words = Vec::new();

    for arg in args {
        match arg.split_once(':') {
            Some((key, value)) if keys.contains(&key) => mods.push((key, value)),
            _ => words.push(arg.as_str()),
        }
    }

    (mods, words)
}

fn modifier<'a>(mods: &[(&str, &'a str)], key: &str) -> Option<&'a str> {
    mods.iter()
        .rev()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

#[instrument(skip(store, renderer, args))]
fn cmd_tasks<S: KeyValueStorage>(
    store: &mut LocalStore<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let (sub, rest) = match args.split_first() {
        Some((sub, rest)) => (sub.as_str(), rest),
        None => ("list", &[][..]),
    };

    match sub {
        "list" => renderer.print_local_tasks(store.tasks()),
        "add" => {
            let (mods, words) =
                split_modifiers(rest, &["id", "name", "status", "size", "type"]);
            let links: Vec<String> = words
                .iter()
                .flat_map(|word| split_magnet_links(word))
                .collect();
            if links.is_empty() {
                return Err(anyhow!("tasks add requires at least one magnet link"));
            }
            if links.len() > 1 && modifier(&mods, "id").is_some() {
                return Err(anyhow!("id: can only be given with a single link"));
            }

            let mut validated = Vec::with_capacity(links.len());
            for link in &links {
                validated.push(validate_magnet_link(link)?);
            }

            let now = Utc::now();
            for url in validated {
                let id = modifier(&mods, "id")
                    .map(TaskId::parse)
                    .unwrap_or_else(|| TaskId::Text(Uuid::new_v4().to_string()));
                let mut task = LocalTask::new(id, url, now);
                if let Some(status) = modifier(&mods, "status") {
                    task.status = status.to_string();
                }
                task.name = modifier(&mods, "name").map(str::to_string);
                task.file_type = modifier(&mods, "type").map(str::to_string);
                task.file_size = modifier(&mods, "size")
                    .map(|raw| {
                        raw.parse::<u64>()
                            .with_context(|| format!("invalid size: {raw}"))
                    })
                    .transpose()?;

                let id = task.id.clone();
                info!(id = %id, "recording local task");
                store.add_task(task)?;
                println!("Added task {id}.");
            }
            Ok(())
        }
        "delete" => {
            if rest.is_empty() {
                return Err(anyhow!("tasks delete requires at least one id"));
            }
            let mut deleted = 0;
            for raw in rest {
                for id in matching_ids(store.tasks(), raw) {
                    store.delete_task(&id)?;
                    deleted += 1;
                }
            }
            println!("Deleted {deleted} task(s).");
            Ok(())
        }
        "clear" => {
            let count = store.tasks().len();
            store.clear_tasks()?;
            println!("Cleared {count} task(s).");
            Ok(())
        }
        other => Err(anyhow!("unknown tasks subcommand: {other}")),
    }
}

#[instrument(skip(store, renderer, args))]
fn cmd_shares<S: KeyValueStorage>(
    store: &mut LocalStore<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let (sub, rest) = match args.split_first() {
        Some((sub, rest)) => (sub.as_str(), rest),
        None => ("list", &[][..]),
    };

    match sub {
        "list" => renderer.print_shares(store.shares()),
        "add" => {
            let (mods, words) =
                split_modifiers(rest, &["id", "file_id", "name", "url", "code"]);
            if !words.is_empty() {
                warn!(ignored = ?words, "ignoring unrecognized share arguments");
            }

            let file_id = modifier(&mods, "file_id")
                .ok_or_else(|| anyhow!("shares add requires file_id:<id>"))?;
            let share_url = modifier(&mods, "url")
                .ok_or_else(|| anyhow!("shares add requires url:<share url>"))?;

            let share = LocalShare {
                id: modifier(&mods, "id")
                    .map(TaskId::parse)
                    .unwrap_or_else(|| TaskId::Text(Uuid::new_v4().to_string())),
                file_name: modifier(&mods, "name").unwrap_or(file_id).to_string(),
                share_url: share_url.to_string(),
                pass_code: modifier(&mods, "code").map(str::to_string),
                timestamp: Utc::now(),
                file_id: file_id.to_string(),
            };

            if store.add_share(share)? {
                println!("Recorded share for file {file_id}.");
            } else {
                println!("A share for file {file_id} already exists.");
            }
            Ok(())
        }
        "delete" => {
            if rest.is_empty() {
                return Err(anyhow!("shares delete requires at least one id"));
            }
            let mut deleted = 0;
            for raw in rest {
                for id in matching_ids(store.shares(), raw) {
                    store.delete_share(&id)?;
                    deleted += 1;
                }
            }
            println!("Deleted {deleted} share(s).");
            Ok(())
        }
        "clear" => {
            let count = store.shares().len();
            store.clear_shares()?;
            println!("Cleared {count} share(s).");
            Ok(())
        }
        other => Err(anyhow!("unknown shares subcommand: {other}")),
    }
}

#[instrument(skip(cfg, renderer, args))]
fn cmd_pages(cfg: &Config, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    let (mods, words) = split_modifiers(args, &["max"]);
    let [current, total] = words.as_slice() else {
        return Err(anyhow!("usage: pages <current> <total> [max:<n>]"));
    };

    let current: u32 = current
        .parse()
        .with_context(|| format!("invalid current page: {current}"))?;
    let total: u32 = total
        .parse()
        .with_context(|| format!("invalid total pages: {total}"))?;
    let max_visible = match modifier(&mods, "max") {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid max: {raw}"))?,
        None => cfg.view_options()?.max_visible,
    };

    let items = generate_page_numbers(current, total, max_visible);
    renderer.print_page_strip(&items, current)
}

#[instrument(skip(store, cfg, renderer, args))]
fn cmd_view<S: KeyValueStorage>(
    store: &mut LocalStore<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let (mods, words) = split_modifiers(args, &["page", "size", "mine", "safe", "variant"]);
    let [path] = words.as_slice() else {
        return Err(anyhow!(
            "usage: view <tasks.json> [page:<n>] [size:<n>] [mine:on] [safe:on]"
        ));
    };

    let mut options = cfg.view_options()?;
    if let Some(raw) = modifier(&mods, "mine") {
        options.show_mine_only = parse_switch(raw)?;
    }
    if let Some(raw) = modifier(&mods, "safe") {
        options.content_filter = parse_switch(raw)?;
    }
    if let Some(raw) = modifier(&mods, "variant") {
        options.variant = Some(raw.parse::<PaginationVariant>()?);
    }

    let page_size = match modifier(&mods, "size") {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("invalid size: {raw}"))?,
        None => cfg.page_size()?,
    };
    let mut pagination = PaginationState::new(cfg.page_size()?, 0).with_choices(cfg.page_sizes()?);
    pagination.set_page_size(page_size)?;

    let tasks = load_task_page(Path::new(path))?;
    pagination.set_total_items(u32::try_from(tasks.len()).unwrap_or(u32::MAX));
    if let Some(raw) = modifier(&mods, "page") {
        let page: u32 = raw
            .parse()
            .with_context(|| format!("invalid page: {raw}"))?;
        if !pagination.go_to(page) {
            warn!(page, total = pagination.total_pages, "page out of range; showing page 1");
        }
    }

    let policy = match cfg.wordlist_path() {
        Some(path) => WordListPolicy::load(&path)?,
        None => {
            if options.content_filter {
                warn!("content filter enabled but filter.wordlist is not set");
            }
            WordListPolicy::empty()
        }
    };

    let view = reconcile(&tasks, &store.local_urls(), &policy, options, pagination);
    renderer.print_task_view(&view)
}

/// Accepts a bare JSON array or an object wrapping it under `data` or
/// `tasks`, the two shapes the backend list endpoints return.
#[instrument]
fn load_task_page(path: &Path) -> anyhow::Result<Vec<crate::record::TaskRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;

    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove("data")
            .filter(Value::is_array)
            .or_else(|| map.remove("tasks").filter(Value::is_array))
            .ok_or_else(|| anyhow!("{} has no task array", path.display()))?,
        _ => return Err(anyhow!("{} is not a task list", path.display())),
    };

    let records: Vec<RawTaskRecord> = serde_json::from_value(list)
        .with_context(|| format!("failed decoding tasks in {}", path.display()))?;
    debug!(count = records.len(), "loaded server task page");
    Ok(ingest(records))
}

/// Stored ids whose text form equals `raw`. Backend ids may be numeric
/// strings, so `"123"` has to find both `Num(123)` and `Text("123")`.
fn matching_ids<T: Keyed>(items: &[T], raw: &str) -> Vec<TaskId> {
    let wanted = raw.trim();
    let ids: Vec<TaskId> = items
        .iter()
        .map(|item| item.key())
        .filter(|id| id.to_string() == wanted)
        .cloned()
        .collect();
    if ids.is_empty() {
        warn!(id = wanted, "no stored entry with this id");
    }
    ids
}

fn parse_switch(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" | "" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("expected on/off, got: {other}")),
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!("Usage: pikplus [--rc-file FILE] [--data DIR] [rc.KEY=VALUE...] <command> [args]");
    println!();
    println!("Commands:");
    println!("  tasks [list|add <magnet>... [name:N] [status:S] [id:I]|delete <id>...|clear]");
    println!("  shares [list|add file_id:F url:U [name:N] [code:C]|delete <id>...|clear]");
    println!("  pages <current> <total> [max:<n>]");
    println!("  view <tasks.json> [page:<n>] [size:<n>] [mine:on] [safe:on] [variant:compact|full]");
    println!("  help");
    println!("  version");
    Ok(())
}
