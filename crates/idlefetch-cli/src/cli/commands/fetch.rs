//! `idlefetch fetch`: run a prefetch manager until every request finishes.

use anyhow::{bail, Result};
use idlefetch_core::admission::{self, AdmissionFlags};
use idlefetch_core::config::PrefetchConfig;
use idlefetch_core::{
    ManagedRequest, NetworkInfo, PrefetchContext, PrefetchManager, PrefetchRequest, TaskStatus,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::cli::FetchArgs;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Callback output forwarded to the printing loop.
enum Update {
    Status {
        key: String,
        status: TaskStatus,
        terminal: bool,
        error: Option<String>,
    },
    Progress {
        key: String,
        done: u64,
        total: Option<u64>,
    },
}

/// Reject argument combinations the manager cannot report back on.
fn check_args(args: &FetchArgs) -> Result<()> {
    if args.urls.len() > 1 && (args.key.is_some() || args.sha256.is_some()) {
        bail!("--key and --sha256 apply to a single URL");
    }
    if let Some(pos) = args.urls.iter().position(|u| u.trim().is_empty()) {
        bail!("URL argument {} is empty", pos + 1);
    }
    Ok(())
}

pub async fn run_fetch(cfg: &PrefetchConfig, args: FetchArgs) -> Result<()> {
    check_args(&args)?;

    let flags = AdmissionFlags {
        allow_on_cellular: args.allow_cellular || cfg.network.allow_on_cellular,
        ..AdmissionFlags::from(&cfg.network)
    };
    // Configured network conditions never change during a run.
    if let Err(rejection) = admission::admit(&NetworkInfo::from_config(&cfg.network), &flags) {
        bail!("not prefetching: {rejection}");
    }

    let ctx = PrefetchContext::from_config(cfg)?;
    let storage = ctx.storage.clone();
    let jobs = args.jobs.unwrap_or(cfg.max_concurrent);
    let manager = PrefetchManager::with_max_concurrent(ctx, jobs)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut requests = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let mut req = PrefetchRequest::new(url.as_str())
            .with_admission(flags)
            .with_store(args.store.unwrap_or(cfg.store));
        if let Some(key) = &args.key {
            req = req.with_cache_key(key.as_str());
        }
        if let Some(hex) = &args.sha256 {
            req = req.with_sha256(hex.as_str());
        }
        if let Some(bytes) = args.chunk_size {
            req = req.with_chunk_size(bytes);
        }
        if let Some(ms) = args.min_idle_ms {
            req = req.with_min_idle(Duration::from_millis(ms));
        }
        let key = req.resolved_cache_key();

        let status_tx = tx.clone();
        let status_key = key.clone();
        let progress_tx = tx.clone();
        let req = req
            .on_status(move |e| {
                let _ = status_tx.send(Update::Status {
                    key: status_key.clone(),
                    status: e.status,
                    terminal: e.terminal,
                    error: e.error.as_ref().map(|err| err.to_string()),
                });
            })
            .on_progress(move |done, total| {
                let _ = progress_tx.send(Update::Progress {
                    key: key.clone(),
                    done,
                    total,
                });
            });
        requests.push(ManagedRequest::new(req).with_priority(args.priority));
    }
    drop(tx);

    let ids = manager.add_batch(requests);
    tracing::info!(count = ids.len(), jobs, "prefetch queued");

    let mut remaining = ids.len();
    let mut failed = 0usize;
    let mut last_print: HashMap<String, Instant> = HashMap::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while remaining > 0 {
        let update = tokio::select! {
            u = rx.recv() => match u {
                Some(u) => u,
                None => break,
            },
            _ = &mut ctrl_c => {
                manager.pause(None);
                manager.stop(None);
                println!("Interrupted; stored content is kept for the next run.");
                return Ok(());
            }
        };
        match update {
            Update::Progress { key, done, total } => {
                let now = Instant::now();
                let due = last_print
                    .get(&key)
                    .map_or(true, |t| now.duration_since(*t) >= PROGRESS_INTERVAL);
                if due || total == Some(done) {
                    println!("  {}: {}", key, format_progress(done, total));
                    last_print.insert(key, now);
                }
            }
            Update::Status {
                key,
                status,
                terminal,
                error,
            } => {
                match (&error, terminal) {
                    (Some(e), false) => println!("{key}: retrying after error: {e}"),
                    (Some(e), true) => println!("{key}: failed: {e}"),
                    (None, _) => println!("{key}: {status}"),
                }
                if terminal {
                    remaining -= 1;
                    if status != TaskStatus::Completed {
                        failed += 1;
                    } else if let Ok(Some(path)) = storage.locate(&key, None).await {
                        println!("  stored at {}", path.display());
                    }
                }
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} prefetches did not complete", failed, ids.len());
    }
    Ok(())
}

fn format_progress(done: u64, total: Option<u64>) -> String {
    let done_mib = done as f64 / 1_048_576.0;
    match total {
        Some(total) if total > 0 => format!(
            "{:.1} / {:.1} MiB ({:.1}%)",
            done_mib,
            total as f64 / 1_048_576.0,
            done as f64 * 100.0 / total as f64
        ),
        _ => format!("{:.1} MiB", done_mib),
    }
}
