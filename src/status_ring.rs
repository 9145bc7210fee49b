//! The status ring (SR): a bounded circular log of timestamped status
//! strings for one repository watcher, rendered to an operator HTML page
//! (spec.md §3, §4.8).
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::sync::Mutex;

const CAPACITY: usize = 50;

/// `(status string, timestamp)` — one Status Ring slot.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: String,
    pub at: DateTime<Utc>,
}

/// A fixed-capacity ring buffer of `StatusEntry`, oldest entries
/// overwritten, read/written under a single mutex (spec.md §5).
pub struct StatusRing {
    inner: Mutex<RingState>,
}

struct RingState {
    slots: [Option<StatusEntry>; CAPACITY],
    cursor: usize,
}

impl Default for StatusRing {
    fn default() -> Self {
        StatusRing {
            inner: Mutex::new(RingState {
                slots: std::array::from_fn(|_| None),
                cursor: 0,
            }),
        }
    }
}

impl StatusRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `status` at the current time, overwriting the oldest slot
    /// once the ring is full.
    pub fn push(&self, status: impl Into<String>) {
        let mut state = self.inner.lock().expect("status ring lock poisoned");
        let cursor = state.cursor;
        state.slots[cursor] = Some(StatusEntry {
            status: status.into(),
            at: Utc::now(),
        });
        state.cursor = (cursor + 1) % CAPACITY;
    }

    /// Entries newest-first, stopping at the first unpopulated slot.
    pub fn entries_newest_first(&self) -> Vec<StatusEntry> {
        let state = self.inner.lock().expect("status ring lock poisoned");
        let mut out = Vec::with_capacity(CAPACITY);
        for offset in 0..CAPACITY {
            let idx = (state.cursor + CAPACITY - 1 - offset) % CAPACITY;
            match &state.slots[idx] {
                Some(entry) => out.push(entry.clone()),
                None => break,
            }
        }
        out
    }

    /// Renders the ring as an HTML fragment for `/debug/watcher/<repoName>`:
    /// newest-first, UTC timestamps plus a human-readable relative age.
    pub fn render_html(&self, repo_name: &str) -> String {
        let entries = self.entries_newest_first();
        let mut out = String::new();
        let _ = writeln!(out, "<html><head><title>watcher: {repo_name}</title></head><body>");
        let _ = writeln!(out, "<h1>watcher status: {repo_name}</h1>");
        let _ = writeln!(out, "<ul>");
        let now = Utc::now();
        for entry in &entries {
            let _ = writeln!(
                out,
                "<li>{} ({}) &mdash; {}</li>",
                entry.at.format("%Y-%m-%d %H:%M:%S UTC"),
                relative_age(now, entry.at),
                html_escape(&entry.status),
            );
        }
        let _ = writeln!(out, "</ul></body></html>");
        out
    }
}

/// Formats `ago` relative to `now` as a `timeago`-style string (e.g. "3m ago").
fn relative_age(now: DateTime<Utc>, at: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86400)
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_holds_more_than_capacity_entries() {
        let ring = StatusRing::new();
        for i in 0..(CAPACITY * 2) {
            ring.push(format!("step {i}"));
        }
        let entries = ring.entries_newest_first();
        assert_eq!(entries.len(), CAPACITY);
    }

    #[test]
    fn iterates_newest_first_with_decreasing_timestamps() {
        let ring = StatusRing::new();
        ring.push("first");
        ring.push("second");
        ring.push("third");
        let entries = ring.entries_newest_first();
        assert_eq!(entries[0].status, "third");
        assert_eq!(entries[2].status, "first");
        assert!(entries[0].at >= entries[1].at);
        assert!(entries[1].at >= entries[2].at);
    }

    #[test]
    fn wraps_around_overwriting_oldest() {
        let ring = StatusRing::new();
        for i in 0..(CAPACITY + 3) {
            ring.push(format!("step {i}"));
        }
        let entries = ring.entries_newest_first();
        assert_eq!(entries[0].status, format!("step {}", CAPACITY + 2));
        assert_eq!(entries.last().unwrap().status, "step 3");
    }

    #[test]
    fn renders_html_with_repo_name_and_entries() {
        let ring = StatusRing::new();
        ring.push("fetching");
        let html = ring.render_html("crypto/bcrypt");
        assert!(html.contains("crypto/bcrypt"));
        assert!(html.contains("fetching"));
        assert!(html.contains("ago"));
    }
}
