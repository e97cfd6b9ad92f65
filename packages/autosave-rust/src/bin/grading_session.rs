//! `grading-session`: apply grade edits to a persisted grading session.
//!
//! Loads the draft for a teacher + exam from a data directory (a file fast
//! cache plus a redb durable store), applies `--set` edits, saves, and
//! prints the resulting status and buffer as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gradesave_autosave::logging::{init_tracing, DEFAULT_FILTER};
use gradesave_autosave::{
    AutoSaveEngine, FileFastCache, FileFastCacheConfig, RedbDurableStore, StorageCoordinator,
};
use gradesave_core::{AutoSaveConfig, FieldValue, GradePatch, SessionKey};

#[derive(Parser)]
#[command(name = "grading-session")]
#[command(about = "Edit and persist an in-progress grading session")]
struct Args {
    /// Teacher identifier
    #[arg(long, env = "GRADESAVE_TEACHER")]
    teacher: String,

    /// Exam identifier
    #[arg(long, env = "GRADESAVE_EXAM")]
    exam: String,

    /// Directory holding the fast cache and the durable store
    #[arg(long, env = "GRADESAVE_DATA_DIR", default_value = ".gradesave")]
    data_dir: PathBuf,

    /// JSON file with autosave options (debounceMs, retryAttempts, ...)
    #[arg(long, env = "GRADESAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Grade edit as STUDENT.FIELD=VALUE, repeatable
    #[arg(long = "set", value_name = "STUDENT.FIELD=VALUE")]
    edits: Vec<String>,

    /// Delete the saved draft before applying edits
    #[arg(long)]
    clear: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "GRADESAVE_JSON_LOGS")]
    json_logs: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = DEFAULT_FILTER)]
    log_filter: String,
}

/// One parsed `--set` argument.
#[derive(Debug, PartialEq)]
struct Edit {
    student: String,
    field: String,
    value: FieldValue,
}

fn parse_edit(raw: &str) -> Result<Edit> {
    let Some((target, value)) = raw.split_once('=') else {
        bail!("edit `{raw}` is missing `=`");
    };
    let Some((student, field)) = target.split_once('.') else {
        bail!("edit target `{target}` must be STUDENT.FIELD");
    };
    if student.is_empty() || field.is_empty() {
        bail!("edit target `{target}` must be STUDENT.FIELD");
    }
    Ok(Edit {
        student: student.to_string(),
        field: field.to_string(),
        value: FieldValue::parse(value),
    })
}

async fn load_config(path: Option<&PathBuf>) -> Result<AutoSaveConfig> {
    let Some(path) = path else {
        return Ok(AutoSaveConfig::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    AutoSaveConfig::from_json_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_filter, args.json_logs)?;

    let config = load_config(args.config.as_ref()).await?;
    let key = SessionKey::new(args.teacher, args.exam)?;
    let edits = args
        .edits
        .iter()
        .map(|raw| parse_edit(raw))
        .collect::<Result<Vec<_>>>()?;

    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .with_context(|| format!("creating {}", args.data_dir.display()))?;
    let fast = FileFastCache::open(FileFastCacheConfig::new(args.data_dir.join("cache")))?;
    let durable = RedbDurableStore::new(args.data_dir.join("drafts.redb"));
    let coordinator = Arc::new(StorageCoordinator::new(Arc::new(fast), Arc::new(durable)));

    let engine = AutoSaveEngine::start(key, config, coordinator).await?;
    tracing::debug!(
        key = %engine.key(),
        debounce_ms = engine.config().debounce_ms,
        retry_attempts = engine.config().retry_attempts,
        "session started"
    );
    if args.clear {
        engine.clear_saved_data().await;
    }
    for edit in edits {
        engine.update_record(&edit.student, &GradePatch::new().field(edit.field, edit.value));
    }

    tokio::select! {
        () = engine.force_save() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("listening for ctrl-c")?;
            tracing::warn!("interrupted, flushing to fast cache");
            engine.flush_on_teardown();
        }
    }

    let report = serde_json::json!({
        "key": engine.key().record_id(),
        "status": engine.status(),
        "data": engine.data(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
