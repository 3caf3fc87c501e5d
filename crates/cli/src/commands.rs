//! Cache inspection commands
//!
//! Each command writes its report to the given writer; `main` passes a locked
//! stdout.

use miette::{IntoDiagnostic, Result};
use std::io::Write;
use std::path::Path;
use tessera_engine::logs::is_logs_key;
use tessera_engine::{CacheStore, Hash, TesseraConfig};

/// List scopes with their number of stored results
pub fn scopes(store: &CacheStore, out: &mut impl Write) -> Result<()> {
    let scopes = store.scopes()?;
    if scopes.is_empty() {
        tracing::info!("Cache is empty");
    }
    for scope in scopes {
        let results = store
            .keys(&scope)?
            .iter()
            .filter(|k| !is_logs_key(k))
            .count();
        writeln!(out, "{scope}\t{results}").into_diagnostic()?;
    }
    Ok(())
}

/// List stored results of `scope` with their creation time
pub fn entries(store: &CacheStore, scope: &str, out: &mut impl Write) -> Result<()> {
    let handle = store.open(scope)?;
    for key in store.keys(scope)? {
        if is_logs_key(&key) {
            continue;
        }
        let hash = match Hash::parse(key.as_str()) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(scope, key = %key, error = %e, "Skipping foreign cache file");
                continue;
            }
        };
        let entry = match handle.get(&hash) {
            Ok(entry) => entry,
            Err(e) if e.is_storage() => {
                tracing::warn!(scope, key = %hash, error = %e, "Unreadable cache entry");
                None
            }
            Err(e) => return Err(e.into()),
        };
        let created = entry
            .and_then(|entry| entry.created_at)
            .map_or_else(|| "-".to_string(), |ts| ts.to_rfc3339());
        writeln!(out, "{hash}\t{created}").into_diagnostic()?;
    }
    handle.close()?;
    Ok(())
}

/// Pretty-print one stored result followed by its captured logs
pub fn show(store: &CacheStore, scope: &str, hash: &str, out: &mut impl Write) -> Result<()> {
    let hash = Hash::parse(hash)?;
    let handle = store.open(scope)?;
    let Some(entry) = handle.get(&hash)? else {
        return Err(miette::miette!(
            help = "List stored hashes with `tessera entries <scope>`",
            "No entry {hash} in scope '{scope}'"
        ));
    };
    let logs = handle.get_logs(&hash)?.unwrap_or_default();
    handle.close()?;

    let json = serde_json::to_string_pretty(&entry).into_diagnostic()?;
    writeln!(out, "{json}").into_diagnostic()?;
    for record in logs {
        writeln!(
            out,
            "{:>5} {}",
            format!("{:?}", record.level).to_uppercase(),
            record.cached_message()
        )
        .into_diagnostic()?;
    }
    Ok(())
}

/// Print the configuration with every value resolved
pub fn config(config: &TesseraConfig, root: &Path, out: &mut impl Write) -> Result<()> {
    let mode = config.effective_mode();
    let resolved = TesseraConfig {
        cache_enabled: Some(mode.reads() || mode.writes()),
        cache_mode: Some(mode),
        cache_dir: Some(root.to_path_buf()),
        replay_logs: Some(config.replay_logs()),
    };
    let text = toml::to_string(&resolved).into_diagnostic()?;
    write!(out, "{text}").into_diagnostic()?;
    Ok(())
}
