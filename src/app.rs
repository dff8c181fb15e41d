use std::{
    fmt::Write as _,
    io, thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    aggregate::{AggregationEngine, Badge, Connector, PassMode, PassObserver},
    domain::{CategoryPrs, PullRequest},
    storage::{AUTH_KEY, KeyValueStore, SETTINGS_KEY},
};

pub const APP_NAME: &str = "prwatch";

// -----------------------------------------------------------------------------
// Console presentation
// -----------------------------------------------------------------------------

/// Prints every published view model and badge. The badge that accompanies
/// a cache paint is skipped; only the settled one is printed.
pub struct ConsoleReporter<W: io::Write = io::Stdout> {
    out: W,
    filter: SearchFilter,
    timestamped: bool,
    painted: bool,
}

impl ConsoleReporter {
    pub fn new(filter: &str, timestamped: bool) -> Self {
        Self::with_writer(io::stdout(), filter, timestamped)
    }
}

impl<W: io::Write> ConsoleReporter<W> {
    pub fn with_writer(out: W, filter: &str, timestamped: bool) -> Self {
        Self {
            out,
            filter: SearchFilter::new(filter),
            timestamped,
            painted: false,
        }
    }
}

impl<W: io::Write> PassObserver for ConsoleReporter<W> {
    fn on_paint(&mut self, categories: &[CategoryPrs]) {
        debug!(categories = categories.len(), "painted cached pull requests");
        self.painted = true;
    }

    fn on_publish(&mut self, categories: &[CategoryPrs]) {
        if self.timestamped {
            let _ = writeln!(self.out, "-- {} UTC", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        }
        let _ = write!(self.out, "{}", render_categories(categories, &self.filter));
        self.painted = false;
    }

    fn on_badge(&mut self, badge: &Badge) {
        if self.painted {
            return;
        }
        let _ = writeln!(self.out, "{}", render_badge(badge));
    }
}

pub fn render_badge(badge: &Badge) -> String {
    match badge {
        Badge::Unknown => "Badge: cleared (signed out)".to_owned(),
        Badge::Empty => format!("Badge: empty ({})", badge.color().unwrap_or_default()),
        Badge::Count(_) => format!(
            "Badge: {} ({})",
            badge.text(),
            badge.color().unwrap_or_default()
        ),
    }
}

pub fn render_categories(categories: &[CategoryPrs], filter: &SearchFilter) -> String {
    let mut out = String::new();
    if categories.is_empty() {
        out.push_str("Sign in to start tracking pull requests.\n");
        return out;
    }

    for category in categories {
        let _ = writeln!(out, "{} ({})", category.label, category.prs.len());
        if let Some(error) = &category.error {
            let _ = writeln!(out, "  ! {error}");
        }

        let rows: Vec<&PullRequest> = category
            .prs
            .iter()
            .filter(|pr| {
                filter.matches_any(&[
                    pr.repo_name().as_str(),
                    pr.title.as_str(),
                    pr.user.login.as_str(),
                    pr.html_url.as_str(),
                ])
            })
            .collect();
        if rows.is_empty() {
            let _ = writeln!(
                out,
                "  {}",
                if category.prs.is_empty() {
                    "No open pull requests."
                } else {
                    "No matches for current search."
                }
            );
            continue;
        }

        for pr in rows {
            let _ = writeln!(
                out,
                "  {}#{} [{}]{} {} (by {}, updated {})",
                pr.repo_name(),
                pr.number,
                pr.check_status.label(),
                if pr.draft { " [draft]" } else { "" },
                pr.title,
                pr.user.login,
                pr.updated_at.format("%Y-%m-%d %H:%M"),
            );
        }
    }
    out
}

// -----------------------------------------------------------------------------
// Watch loop
// -----------------------------------------------------------------------------

pub struct WatchOptions {
    pub poll: Duration,
    /// Stop after this many poll iterations; `None` runs until interrupted.
    pub ticks: Option<u64>,
}

/// Paints once, then re-runs the pass on the refresh interval, and whenever
/// the stored accounts or settings change.
pub fn watch<C: Connector>(
    engine: &AggregationEngine<C>,
    kv: &dyn KeyValueStore,
    options: WatchOptions,
    observer: &mut dyn PassObserver,
) {
    let mut accounts = BlobWatcher::new(kv, AUTH_KEY);
    let mut settings = BlobWatcher::new(kv, SETTINGS_KEY);
    let mut scheduler = RefreshScheduler::new(refresh_interval(engine));

    engine.run(PassMode::Initial, observer);
    scheduler.mark_triggered();

    let mut tick = 0;
    while options.ticks.is_none_or(|limit| tick < limit) {
        thread::sleep(options.poll);
        tick += 1;

        let accounts_changed = accounts.changed(kv);
        let settings_changed = settings.changed(kv);
        if settings_changed {
            scheduler.set_interval(refresh_interval(engine));
        }

        if accounts_changed || settings_changed {
            info!(accounts_changed, settings_changed, "stored state changed; re-running pass");
        } else if !scheduler.should_trigger() {
            continue;
        }

        engine.run(PassMode::Background, observer);
        scheduler.mark_triggered();
    }
}

fn refresh_interval<C: Connector>(engine: &AggregationEngine<C>) -> Duration {
    let minutes = engine.settings().get_settings().refresh_interval_minutes;
    Duration::from_secs(u64::from(minutes) * 60)
}

// -----------------------------------------------------------------------------
// Supporting structs
// -----------------------------------------------------------------------------

struct RefreshScheduler {
    interval: Duration,
    last_run: Option<Instant>,
}

impl RefreshScheduler {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    fn should_trigger(&self) -> bool {
        match self.last_run {
            None => true,
            Some(instant) => instant.elapsed() >= self.interval,
        }
    }

    fn mark_triggered(&mut self) {
        self.last_run = Some(Instant::now());
    }
}

/// Detects writes to one stored blob between polls.
struct BlobWatcher {
    key: &'static str,
    last: Option<Value>,
}

impl BlobWatcher {
    fn new(kv: &dyn KeyValueStore, key: &'static str) -> Self {
        Self {
            key,
            last: kv.get(key).ok().flatten(),
        }
    }

    fn changed(&mut self, kv: &dyn KeyValueStore) -> bool {
        let current = kv.get(self.key).ok().flatten();
        if current == self.last {
            return false;
        }
        self.last = current;
        true
    }
}

// -----------------------------------------------------------------------------
// Search filtering
// -----------------------------------------------------------------------------

pub struct SearchFilter {
    needle: Option<String>,
}

impl SearchFilter {
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let needle = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        };
        Self { needle }
    }

    fn matches_any(&self, fields: &[&str]) -> bool {
        match &self.needle {
            None => true,
            Some(needle) => fields
                .iter()
                .any(|field| field.to_lowercase().contains(needle)),
        }
    }
}
