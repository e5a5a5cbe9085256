//! Command handlers: one store call per command, then rendering.

use super::args::{
    CloseArgs, CommentArgs, CreateArgs, DeleteArgs, DepAction, DepArgs, InitArgs, ListArgs,
    NextChildArgs, ReopenArgs, ShowArgs, UpdateArgs,
};
use super::{Cli, Commands};
use crate::commands::init;
use crate::config::{find_beads_root, BEADS_DIR_NAME};
use crate::domain::{IssueFilter, NewIssue};
use crate::error::{ConfigError, Error, Result};
use crate::output;
use crate::store::Store;
use serde_json::json;
use std::env;

/// Retries for the child-create race: another process can claim the
/// returned child ID before our exclusive-create lands.
const CHILD_CREATE_RETRIES: usize = 5;

pub(super) fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Init(args) => cmd_init(&args, json),
        Commands::Create(args) => cmd_create(&open_store()?, args, json),
        Commands::Show(args) => cmd_show(&open_store()?, &args, json),
        Commands::List(args) => cmd_list(&open_store()?, args, json),
        Commands::Update(args) => cmd_update(&open_store()?, args, json),
        Commands::Close(args) => cmd_close(&open_store()?, &args, json),
        Commands::Reopen(args) => cmd_reopen(&open_store()?, &args, json),
        Commands::Delete(args) => cmd_delete(&open_store()?, &args, json),
        Commands::Dep(action) => cmd_dep(&open_store()?, &action, json),
        Commands::Comment(args) => cmd_comment(&open_store()?, &args, json),
        Commands::ChildId(args) => cmd_child_id(&open_store()?, &args, json),
        Commands::Doctor { fix } => cmd_doctor(&open_store()?, fix, json),
    }
}

/// Locate and open the store for the current working directory.
fn open_store() -> Result<Store> {
    let cwd = env::current_dir()?;
    let root = find_beads_root(&cwd).ok_or(ConfigError::NotInitialized)?;
    Store::open(&root.join(BEADS_DIR_NAME))
}

/// Resolve a possibly-abbreviated ID to a full one.
///
/// The store accepts only full IDs; prefix matching is a CLI convenience.
/// An exact match always wins; otherwise the prefix must select exactly one
/// issue.
fn resolve_id(store: &Store, input: &str) -> Result<String> {
    let ids = store.ids()?;
    if ids.iter().any(|id| id == input) {
        return Ok(input.to_string());
    }

    let matches: Vec<&String> = ids.iter().filter(|id| id.starts_with(input)).collect();
    match matches.as_slice() {
        [] => Err(Error::NotFound(input.to_string())),
        [only] => Ok((*only).clone()),
        many => Err(Error::Validation(format!(
            "ambiguous id prefix '{input}' matches {}",
            many.iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn cmd_init(args: &InitArgs, json: bool) -> Result<()> {
    let cwd = env::current_dir()?;
    let result = init::init(&cwd, args.prefix.as_deref())?;

    if json {
        output::print_json(&json!({
            "beads_dir": result.beads_dir,
            "prefix": result.prefix,
        }))?;
    } else {
        println!(
            "Initialized beads store in {} (prefix '{}')",
            result.beads_dir.display(),
            result.prefix
        );
    }
    Ok(())
}

fn cmd_create(store: &Store, args: CreateArgs, json: bool) -> Result<()> {
    let new_issue = NewIssue {
        id: args.id.clone(),
        title: args.title,
        description: args.description,
        status: None,
        priority: args.priority,
        issue_type: args.issue_type,
        mol_type: args.mol_type,
        labels: args.labels,
        assignee: args.assignee,
        created_by: args.created_by,
        owner: args.owner,
        ephemeral: args.ephemeral,
    };

    let issue = match args.parent {
        Some(parent) => {
            let parent_id = resolve_id(store, &parent)?;
            create_child(store, &parent_id, new_issue)?
        }
        None => store.create(new_issue)?,
    };

    if json {
        output::print_json(&issue)?;
    } else {
        println!("Created {}", issue.id);
    }
    Ok(())
}

/// Allocate the next child ID and create under it, retrying when another
/// writer wins the exclusive-create race.
fn create_child(store: &Store, parent_id: &str, new_issue: NewIssue) -> Result<crate::domain::Issue> {
    for _ in 0..CHILD_CREATE_RETRIES {
        let child_id = store.next_child_id(parent_id)?;
        let mut attempt = new_issue.clone();
        attempt.id = Some(child_id);
        match store.create(attempt) {
            Ok(issue) => return Ok(issue),
            Err(Error::AlreadyExists(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::AlreadyExists(format!("children of {parent_id}")))
}

fn cmd_show(store: &Store, args: &ShowArgs, json: bool) -> Result<()> {
    let issue_id = resolve_id(store, &args.id)?;
    let issue = store.get(&issue_id)?;

    if json {
        output::print_json(&issue)?;
    } else {
        output::print_issue_detail(&issue);
    }
    Ok(())
}

fn cmd_list(store: &Store, args: ListArgs, json: bool) -> Result<()> {
    let parent = if args.roots {
        Some(String::new())
    } else {
        args.parent
            .as_deref()
            .map(|p| resolve_id(store, p))
            .transpose()?
    };

    let filter = IssueFilter {
        status: args.status,
        priority: args.priority,
        issue_type: args.issue_type,
        parent,
        assignee: args.assignee,
        labels: args.labels,
        mol_type: args.mol_type,
    };
    let issues = store.list(&filter)?;

    if json {
        output::print_json(&issues)?;
    } else {
        output::print_issue_table(&issues);
    }
    Ok(())
}

fn cmd_update(store: &Store, args: UpdateArgs, json: bool) -> Result<()> {
    let issue_id = resolve_id(store, &args.id)?;

    let issue = store.modify(&issue_id, |issue| {
        if let Some(title) = args.title {
            issue.title = title;
        }
        if let Some(description) = args.description {
            issue.description = description;
        }
        if let Some(status) = args.status {
            issue.status = status;
        }
        if let Some(priority) = args.priority {
            issue.priority = priority;
        }
        if let Some(issue_type) = args.issue_type {
            issue.issue_type = issue_type;
        }
        if let Some(assignee) = args.assignee {
            issue.assignee = assignee;
        }
        if let Some(owner) = args.owner {
            issue.owner = owner;
        }
        if let Some(ephemeral) = args.ephemeral {
            issue.ephemeral = ephemeral;
        }
        for label in args.add_label {
            issue.labels.push(label);
        }
        issue.labels.retain(|l| !args.remove_label.contains(l));
    })?;

    if json {
        output::print_json(&issue)?;
    } else {
        println!("Updated {}", issue.id);
    }
    Ok(())
}

fn cmd_close(store: &Store, args: &CloseArgs, json: bool) -> Result<()> {
    let issue_id = resolve_id(store, &args.id)?;
    let issue = store.close(&issue_id, args.reason.as_deref())?;

    if json {
        output::print_json(&issue)?;
    } else {
        println!("Closed {}", issue.id);
    }
    Ok(())
}

fn cmd_reopen(store: &Store, args: &ReopenArgs, json: bool) -> Result<()> {
    let issue_id = resolve_id(store, &args.id)?;
    let issue = store.reopen(&issue_id)?;

    if json {
        output::print_json(&issue)?;
    } else {
        println!("Reopened {}", issue.id);
    }
    Ok(())
}

fn cmd_delete(store: &Store, args: &DeleteArgs, json: bool) -> Result<()> {
    let issue_id = resolve_id(store, &args.id)?;

    if args.hard {
        store.delete(&issue_id)?;
        if json {
            output::print_json(&json!({ "deleted": issue_id }))?;
        } else {
            println!("Deleted {issue_id}");
        }
    } else {
        let issue = store.create_tombstone(&issue_id, &args.actor, &args.reason)?;
        if json {
            output::print_json(&issue)?;
        } else {
            println!("Tombstoned {}", issue.id);
        }
    }
    Ok(())
}

fn cmd_dep(store: &Store, action: &DepAction, json: bool) -> Result<()> {
    let (args, adding) = match action {
        DepAction::Add(args) => (args, true),
        DepAction::Remove(args) => (args, false),
    };
    let from = resolve_id(store, &args.from)?;
    let to = resolve_id(store, &args.to)?;

    if adding {
        store.add_dependency(&from, &to, args.dep_type)?;
    } else {
        store.remove_dependency(&from, &to)?;
    }

    if json {
        output::print_json(&json!({
            "from": from,
            "to": to,
            "action": if adding { "added" } else { "removed" },
        }))?;
    } else if adding {
        println!("{from} now depends on {to} ({})", args.dep_type);
    } else {
        println!("Removed dependency {from} -> {to}");
    }
    Ok(())
}

fn cmd_comment(store: &Store, args: &CommentArgs, json: bool) -> Result<()> {
    let issue_id = resolve_id(store, &args.id)?;
    let comment = store.add_comment(&issue_id, &args.author, &args.text)?;

    if json {
        output::print_json(&comment)?;
    } else {
        println!("Added comment #{} to {issue_id}", comment.id);
    }
    Ok(())
}

fn cmd_child_id(store: &Store, args: &NextChildArgs, json: bool) -> Result<()> {
    let parent_id = resolve_id(store, &args.parent)?;
    let child_id = store.next_child_id(&parent_id)?;

    if json {
        output::print_json(&json!({ "id": child_id }))?;
    } else {
        println!("{child_id}");
    }
    Ok(())
}

fn cmd_doctor(store: &Store, fix: bool, json: bool) -> Result<()> {
    let problems = store.doctor(fix)?;

    if json {
        output::print_json(&problems)?;
    } else {
        output::print_problems(&problems);
    }
    Ok(())
}
