//! Output rendering
//!
//! Plain rows for humans, structured JSON with --json. All rendering
//! lives here; command handlers return data.

use urpm_store::{CatalogPackage, FileHit};
use urpm_types::{Capability, HistoryEntry};

/// Renderer carrying the output mode
#[derive(Clone, Copy)]
pub struct Renderer {
    pub json: bool,
}

impl Renderer {
    pub fn packages(self, packages: &[CatalogPackage]) {
        if self.json {
            let rows: Vec<serde_json::Value> = packages
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "nevra": p.meta.nevra.to_string(),
                        "summary": p.meta.summary,
                        "group": p.meta.group,
                        "size": p.meta.size,
                    })
                })
                .collect();
            println!("{}", serde_json::json!({ "packages": rows }));
            return;
        }
        for p in packages {
            println!("{:<50} {}", p.meta.nevra.to_string(), p.meta.summary);
        }
    }

    pub fn package_details(self, p: &CatalogPackage) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&p.meta).unwrap_or_default()
            );
            return;
        }
        println!("Name     : {}", p.meta.nevra.name);
        println!("Version  : {}", p.meta.nevra.evr());
        println!("Arch     : {}", p.meta.nevra.arch);
        println!("Group    : {}", p.meta.group);
        println!("Size     : {}", human_size(p.meta.size));
        println!("Summary  : {}", p.meta.summary);
        if let Some(url) = &p.meta.url {
            println!("URL      : {url}");
        }
        if let Some(license) = &p.meta.license {
            println!("License  : {license}");
        }
        if let Some(description) = &p.meta.description {
            println!("\n{description}");
        }
    }

    pub fn capabilities(self, caps: &[Capability]) {
        if self.json {
            let rows: Vec<String> = caps.iter().map(ToString::to_string).collect();
            println!("{}", serde_json::json!({ "capabilities": rows }));
            return;
        }
        for cap in caps {
            println!("{cap}");
        }
    }

    pub fn file_hits(self, hits: &[FileHit]) {
        if self.json {
            let rows: Vec<serde_json::Value> = hits
                .iter()
                .map(|h| {
                    serde_json::json!({
                        "path": join_path(h),
                        "nevra": h.nevra,
                    })
                })
                .collect();
            println!("{}", serde_json::json!({ "files": rows }));
            return;
        }
        for hit in hits {
            println!("{:<60} {}", join_path(hit), hit.nevra);
        }
    }

    pub fn history(self, entries: &[HistoryEntry]) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(entries).unwrap_or_default()
            );
            return;
        }
        for entry in entries {
            let when = chrono::DateTime::from_timestamp(entry.timestamp, 0)
                .map_or_else(|| entry.timestamp.to_string(), |t| t.to_rfc3339());
            println!(
                "{:>5}  {:<12} {:<12} {:>3} pkgs  {}  {}",
                entry.id,
                entry.action.as_str(),
                entry.status.as_str(),
                entry.packages.len(),
                when,
                entry.command_line,
            );
        }
    }

    pub fn transaction(self, tx: &urpm_resolver::Transaction) {
        if self.json {
            println!("{}", serde_json::to_string_pretty(tx).unwrap_or_default());
            return;
        }
        if !tx.to_install.is_empty() {
            println!("Installing:");
            for item in &tx.to_install {
                println!("  {}", item.nevra);
            }
        }
        if !tx.to_upgrade.is_empty() {
            println!("Upgrading:");
            for item in &tx.to_upgrade {
                println!("  {}", item.nevra);
            }
        }
        if !tx.to_erase.is_empty() {
            println!("Removing:");
            for nevra in &tx.to_erase {
                println!("  {nevra}");
            }
        }
        for (name, reason) in &tx.skipped {
            println!("Skipping {name}: {reason}");
        }
        let download: u64 = tx.artifacts().filter_map(|i| i.file_size).sum();
        if download > 0 {
            println!("Download size: {}", human_size(download));
        }
    }

    pub fn message(self, text: &str) {
        if self.json {
            println!("{}", serde_json::json!({ "message": text }));
        } else {
            println!("{text}");
        }
    }
}

fn join_path(hit: &FileHit) -> String {
    if hit.dir == "/" {
        format!("/{}", hit.basename)
    } else {
        format!("{}/{}", hit.dir, hit.basename)
    }
}

/// 1234567 -> "1.2 MB"
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_humanize() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(10_500), "10.5 kB");
        assert_eq!(human_size(2_000_000), "2.0 MB");
    }
}
