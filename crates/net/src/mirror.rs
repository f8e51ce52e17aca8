//! Mirror selection and failover
//!
//! Servers are tried by priority, then by recent success rate. Outcomes
//! feed back into the selector so a flapping mirror sinks in the order
//! without operator action.

use std::collections::HashMap;
use std::sync::Mutex;
use urpm_types::ServerInfo;

/// Sliding success score per server
#[derive(Debug, Default, Clone, Copy)]
struct ServerScore {
    successes: u32,
    failures: u32,
}

impl ServerScore {
    fn rate(self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            // Unproven servers rank as neutral
            0.5
        } else {
            f64::from(self.successes) / f64::from(total)
        }
    }
}

/// Orders a media's enabled servers for download attempts
#[derive(Debug, Default)]
pub struct MirrorSelector {
    scores: Mutex<HashMap<i64, ServerScore>>,
}

impl MirrorSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt order: priority descending, recent success rate breaking
    /// ties.
    #[must_use]
    pub fn order(&self, servers: &[ServerInfo]) -> Vec<ServerInfo> {
        let scores = self.scores.lock().expect("selector lock poisoned");
        let mut ordered: Vec<ServerInfo> = servers.to_vec();
        ordered.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then_with(|| {
                let ra = scores.get(&a.id).copied().unwrap_or_default().rate();
                let rb = scores.get(&b.id).copied().unwrap_or_default().rate();
                rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        ordered
    }

    /// Record a completed request against a server
    pub fn record(&self, server_id: i64, success: bool) {
        let mut scores = self.scores.lock().expect("selector lock poisoned");
        let entry = scores.entry(server_id).or_default();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    /// Build the URL of a file below a server for a media path
    #[must_use]
    pub fn file_url(server: &ServerInfo, relative_path: &str, file_name: &str) -> String {
        let base = server.base_url.trim_end_matches('/');
        let rel = relative_path.trim_matches('/');
        if rel.is_empty() {
            format!("{base}/{file_name}")
        } else {
            format!("{base}/{rel}/{file_name}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urpm_types::IpMode;

    fn server(id: i64, priority: i64) -> ServerInfo {
        ServerInfo {
            id,
            name: format!("mirror{id}"),
            base_url: format!("https://mirror{id}.example/mageia"),
            enabled: true,
            priority,
            ip_mode: IpMode::Auto,
            last_test_ok: None,
            last_test_at: None,
        }
    }

    #[test]
    fn priority_dominates() {
        let selector = MirrorSelector::new();
        let ordered = selector.order(&[server(1, 10), server(2, 90)]);
        assert_eq!(ordered[0].id, 2);
    }

    #[test]
    fn success_rate_breaks_ties() {
        let selector = MirrorSelector::new();
        selector.record(1, false);
        selector.record(1, false);
        selector.record(2, true);
        let ordered = selector.order(&[server(1, 50), server(2, 50)]);
        assert_eq!(ordered[0].id, 2);
    }

    #[test]
    fn file_url_joins_cleanly() {
        let s = server(1, 50);
        assert_eq!(
            MirrorSelector::file_url(&s, "/media/core/release/", "x.rpm"),
            "https://mirror1.example/mageia/media/core/release/x.rpm"
        );
        assert_eq!(
            MirrorSelector::file_url(&s, "", "synthesis.hdlist.cz"),
            "https://mirror1.example/mageia/synthesis.hdlist.cz"
        );
    }
}
