use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use tracing::info;

use khist_codec::{decode, encode, to_json_string_pretty, Format};
use khist_merge::{merge, MergeConfiguration};
use khist_node::{Node, Reader};
use khist_timeline::{
    diff_manifests, diff_revisions, read_audit_path, replay_log, DiffLine, HistoryStore,
    InMemoryHistoryStore, ManifestRevision, ReplayConfig, ReplayReport, ResourceKey,
};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = Format::from(cli.format);
    match cli.command {
        Command::Replay(args) => cmd_replay(args, format),
        Command::Merge(args) => cmd_merge(args, format),
        Command::Get(args) => cmd_get(args, format),
        Command::Diff(args) => cmd_diff(args),
    }
}

fn cmd_replay(args: ReplayArgs, format: Format) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    let (report, store) = replay(&args.path, &config, args.resource.as_deref())?;

    for key in &report.timelines {
        let revisions = store.timeline(key)?;
        let verbs: Vec<&str> = revisions.iter().map(|r| r.verb.as_str()).collect();
        let last = match revisions.last() {
            Some(r) if r.is_deletion() => "deleted".red().to_string(),
            Some(r) => short_digest(&r.digest).yellow().to_string(),
            None => "-".dimmed().to_string(),
        };
        println!(
            "{}  {} revisions [{}]  {}",
            key.to_string().bold(),
            revisions.len(),
            verbs.join(", ").cyan(),
            last
        );
        if args.show {
            for revision in &revisions {
                print_revision(revision, format)?;
            }
        }
    }

    for failure in &report.failures {
        println!(
            "{} {} {}: {}",
            "skipped".yellow().bold(),
            failure.audit_id.dimmed(),
            failure.resource,
            failure.message
        );
    }
    println!(
        "{} {} timelines, {} revisions, {} skipped",
        "✓".green().bold(),
        report.timelines.len(),
        report.applied,
        report.skipped
    );
    Ok(())
}

fn cmd_merge(args: MergeArgs, format: Format) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let merge_config = MergeConfiguration::new(config.resolver()?)
        .with_null_removes_field(config.null_removes_field);

    let prev = read_node(&args.prev)?;
    let patch = read_node(&args.patch)?;
    let merged = merge(Some(&prev), Some(&patch), &merge_config)
        .with_context(|| format!("merging {} into {}", args.patch.display(), args.prev.display()))?;
    print!("{}", render(&merged.unwrap_or_else(Node::null), format)?);
    Ok(())
}

fn cmd_get(args: GetArgs, format: Format) -> anyhow::Result<()> {
    let node = read_node(&args.file)?;
    let value = Reader::new(&node)
        .get(&args.path)
        .with_context(|| format!("reading `{}` from {}", args.path, args.file.display()))?;
    print!("{}", render(value, format)?);
    Ok(())
}

fn cmd_diff(args: DiffArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let (report, store) = replay(&args.path, &config, None)?;
    let key = select_key(&report.timelines, &args.resource)?;
    let revisions = store.timeline(&key)?;

    println!("{} ({} revisions)", key.to_string().bold(), revisions.len());
    let mut previous: Option<&ManifestRevision> = None;
    for revision in &revisions {
        println!(
            "\n{} {} {} by {}",
            format!("#{}", revision.seq).yellow().bold(),
            revision.verb.cyan(),
            revision.audit_id.dimmed(),
            revision.user.as_deref().unwrap_or("unknown")
        );
        let diff = match previous {
            Some(prev) => diff_revisions(prev, revision)?,
            None => diff_manifests(None, revision.manifest.as_ref())?,
        };
        if diff.is_empty() {
            println!("  {}", "no changes".dimmed());
        }
        for hunk in &diff.hunks {
            println!("{}", hunk.header().cyan());
            for line in &hunk.lines {
                match line {
                    DiffLine::Context(text) => println!(" {text}"),
                    DiffLine::Added(text) => println!("{}", format!("+{text}").green()),
                    DiffLine::Removed(text) => println!("{}", format!("-{text}").red()),
                }
            }
        }
        previous = Some(revision);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ReplayConfig> {
    match path {
        Some(path) => ReplayConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ReplayConfig::default()),
    }
}

/// Read the log at `path` and replay it into a fresh store, keeping only
/// resources that match `filter`.
fn replay(
    path: &Path,
    config: &ReplayConfig,
    filter: Option<&str>,
) -> anyhow::Result<(ReplayReport, Arc<InMemoryHistoryStore>)> {
    let mut events = read_audit_path(path)?;
    if let Some(filter) = filter {
        events.retain(|event| {
            ResourceKey::from_event(event).is_some_and(|key| key.matches(filter))
        });
    }
    info!(events = events.len(), path = %path.display(), "loaded audit events");

    let store = Arc::new(InMemoryHistoryStore::new());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let report = runtime.block_on(replay_log(events, config, store.clone()))?;
    Ok((report, store))
}

/// An exact key match wins; otherwise the substring must match one key.
fn select_key(keys: &[ResourceKey], needle: &str) -> anyhow::Result<ResourceKey> {
    if let Some(key) = keys.iter().find(|k| k.to_string() == needle) {
        return Ok(key.clone());
    }
    let matches: Vec<&ResourceKey> = keys.iter().filter(|k| k.matches(needle)).collect();
    match matches.as_slice() {
        [key] => Ok((*key).clone()),
        [] => bail!("no resource matches `{needle}`"),
        many => {
            let names: Vec<String> = many.iter().map(|k| k.to_string()).collect();
            bail!("`{needle}` matches {} resources: {}", many.len(), names.join(", "))
        }
    }
}

fn read_node(path: &Path) -> anyhow::Result<Node> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let format = Format::from_path(path).unwrap_or_else(|| Format::sniff(&text));
    decode(&text, format).with_context(|| format!("decoding {}", path.display()))
}

fn render(node: &Node, format: Format) -> anyhow::Result<String> {
    Ok(match format {
        Format::Json => to_json_string_pretty(node)? + "\n",
        Format::Yaml => encode(node, format)?,
    })
}

fn print_revision(revision: &ManifestRevision, format: Format) -> anyhow::Result<()> {
    let when = revision
        .timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".into());
    println!(
        "  {} {} {} {}",
        format!("#{}", revision.seq).yellow(),
        revision.verb.cyan(),
        when.dimmed(),
        revision.subresource.as_deref().unwrap_or("")
    );
    match &revision.manifest {
        Some(manifest) => {
            for line in render(manifest, format)?.lines() {
                println!("    {line}");
            }
        }
        None => println!("    {}", "(deleted)".red()),
    }
    Ok(())
}

fn short_digest(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}
