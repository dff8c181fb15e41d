//! The aggregation pass: decides which categories need a network round
//! trip, reconciles results with the cache, and derives the badge.

use std::{sync::Arc, thread};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    domain::{Account, Category, CategoryConfig, CategoryPrs, PullRequest, UserId},
    github::{FetchError, GitHubClient, ReqwestTransport, Transport},
    storage::{
        AccountStore, KeyValueStore, PrCache, SettingsStore, StoreError,
        cache::{CachedCategoryData, is_cache_expired_at},
    },
};

const BADGE_HAS_ITEMS: &str = "#238636";
const BADGE_EMPTY: &str = "#6e7681";

/// What a pass needs from the upstream client of one account.
pub trait PullRequestSource: Sync {
    fn fetch_category(
        &self,
        username: &str,
        category: Category,
    ) -> Result<Vec<PullRequest>, FetchError>;

    fn count_open_authored(&self, username: &str) -> Result<u64, FetchError>;
}

impl<T: Transport> PullRequestSource for GitHubClient<T> {
    fn fetch_category(
        &self,
        username: &str,
        category: Category,
    ) -> Result<Vec<PullRequest>, FetchError> {
        self.get_prs_by_category(username, category)
    }

    fn count_open_authored(&self, username: &str) -> Result<u64, FetchError> {
        GitHubClient::count_open_authored(self, username)
    }
}

/// Builds an upstream client scoped to one account.
pub trait Connector {
    type Source: PullRequestSource;

    fn connect(&self, account: &Account) -> Result<Self::Source, FetchError>;
}

pub struct GitHubConnector {
    api_base: String,
}

impl GitHubConnector {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Connector for GitHubConnector {
    type Source = GitHubClient<ReqwestTransport>;

    fn connect(&self, account: &Account) -> Result<Self::Source, FetchError> {
        GitHubClient::connect(&self.api_base, &account.access_token)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassMode {
    /// Paint cached data first, then fetch whatever is stale.
    Initial,
    /// Explicit user refresh: fetch every enabled category.
    Refresh,
    /// Timer or settings change: fetch stale categories, no paint.
    Background,
}

impl PassMode {
    fn forces_fetch(self) -> bool {
        matches!(self, PassMode::Refresh)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Badge {
    /// No active account.
    Unknown,
    Empty,
    Count(usize),
}

impl Badge {
    pub fn from_count(count: usize) -> Self {
        if count == 0 {
            Badge::Empty
        } else {
            Badge::Count(count)
        }
    }

    pub fn for_categories(categories: &[CategoryPrs]) -> Self {
        Self::from_count(categories.iter().map(|category| category.prs.len()).sum())
    }

    pub fn text(&self) -> String {
        match self {
            Badge::Count(count) => count.to_string(),
            Badge::Unknown | Badge::Empty => String::new(),
        }
    }

    /// `None` clears the badge background.
    pub fn color(&self) -> Option<&'static str> {
        match self {
            Badge::Count(_) => Some(BADGE_HAS_ITEMS),
            Badge::Empty => Some(BADGE_EMPTY),
            Badge::Unknown => None,
        }
    }
}

/// Receives the view model as a pass progresses.
pub trait PassObserver {
    fn on_paint(&mut self, _categories: &[CategoryPrs]) {}

    fn on_publish(&mut self, _categories: &[CategoryPrs]) {}

    fn on_badge(&mut self, _badge: &Badge) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassOutcome {
    pub categories: Vec<CategoryPrs>,
    pub badge: Badge,
    /// Categories that were fetched successfully this pass.
    pub fetched: Vec<Category>,
}

impl PassOutcome {
    fn signed_out() -> Self {
        Self {
            categories: Vec::new(),
            badge: Badge::Unknown,
            fetched: Vec::new(),
        }
    }
}

pub struct AggregationEngine<C: Connector> {
    accounts: AccountStore,
    settings: SettingsStore,
    cache: PrCache,
    connector: C,
}

impl<C: Connector> AggregationEngine<C> {
    pub fn new(kv: Arc<dyn KeyValueStore>, connector: C) -> Self {
        Self {
            accounts: AccountStore::new(kv.clone()),
            settings: SettingsStore::new(kv.clone()),
            cache: PrCache::new(kv),
            connector,
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    #[cfg(test)]
    pub fn cache(&self) -> &PrCache {
        &self.cache
    }

    pub fn run(&self, mode: PassMode, observer: &mut dyn PassObserver) -> PassOutcome {
        let Some(account) = self.accounts.get_active_account() else {
            debug!("no active account; clearing view");
            observer.on_publish(&[]);
            observer.on_badge(&Badge::Unknown);
            return PassOutcome::signed_out();
        };

        let settings = self.settings.get_settings();
        let interval = settings.refresh_interval_minutes;
        let account_id = account.id();
        let now = Utc::now();

        let cached: Vec<(Category, Option<CachedCategoryData>)> = settings
            .enabled_categories()
            .into_iter()
            .map(|category| (category, self.cache.get_cached_prs(account_id, category)))
            .collect();

        let due: Vec<Category> = cached
            .iter()
            .filter(|(_, entry)| {
                mode.forces_fetch()
                    || entry
                        .as_ref()
                        .is_none_or(|entry| is_cache_expired_at(entry.fetched_at, interval, now))
            })
            .map(|(category, _)| *category)
            .collect();

        let has_cache = cached.iter().any(|(_, entry)| entry.is_some());
        let mut categories: Vec<CategoryPrs> = cached
            .into_iter()
            .map(|(category, entry)| CategoryPrs {
                category,
                label: label_for(&settings.categories, category),
                prs: entry.map(|entry| entry.prs).unwrap_or_default(),
                is_loading: due.contains(&category),
                error: None,
            })
            .collect();

        if mode == PassMode::Initial && has_cache {
            observer.on_paint(&categories);
            observer.on_badge(&Badge::for_categories(&categories));
        }

        let mut fetched = Vec::new();
        if due.is_empty() {
            debug!(account_id, "cache is fresh; skipping fetch");
        } else {
            info!(account_id, categories = ?due, ?mode, "fetching pull requests");
            let results = match self.fetch_all(&account, &due) {
                Ok(results) => results,
                Err(err) => {
                    warn!(error = %err, "could not build upstream client");
                    let message = err.display_message();
                    due.iter()
                        .map(|&category| (category, Err(message.clone())))
                        .collect()
                }
            };

            for (category, result) in results {
                let Some(view) = categories
                    .iter_mut()
                    .find(|view| view.category == category)
                else {
                    continue;
                };
                view.is_loading = false;
                match result {
                    Ok(prs) => {
                        if let Err(err) =
                            self.cache.set_cached_prs(account_id, category, prs.clone())
                        {
                            warn!(%category, error = %err, "failed to cache pull requests");
                        }
                        view.prs = prs;
                        view.error = None;
                        fetched.push(category);
                    }
                    Err(message) => {
                        // Expired entries still beat an empty list.
                        view.prs = self
                            .cache
                            .get_cached_prs(account_id, category)
                            .map(|entry| entry.prs)
                            .unwrap_or_default();
                        view.error = Some(message);
                    }
                }
            }
        }

        let badge = Badge::for_categories(&categories);
        observer.on_publish(&categories);
        observer.on_badge(&badge);
        PassOutcome {
            categories,
            badge,
            fetched,
        }
    }

    /// Fans out one fetch per category and joins them. Failures are logged
    /// in full and reduced to their display message.
    fn fetch_all(
        &self,
        account: &Account,
        due: &[Category],
    ) -> Result<Vec<(Category, Result<Vec<PullRequest>, String>)>, FetchError> {
        let source = self.connector.connect(account)?;
        let source = &source;
        let login = account.user.login.as_str();

        let results = thread::scope(|scope| {
            let handles: Vec<_> = due
                .iter()
                .map(|&category| {
                    (
                        category,
                        scope.spawn(move || source.fetch_category(login, category)),
                    )
                })
                .collect();
            handles
                .into_iter()
                .map(|(category, handle)| {
                    (
                        category,
                        handle.join().unwrap_or(Err(FetchError::WorkerGone)),
                    )
                })
                .collect::<Vec<_>>()
        });

        Ok(results
            .into_iter()
            .map(|(category, result)| {
                let result = result.map_err(|err| {
                    warn!(%category, error = %err, "category fetch failed; showing cached data");
                    err.display_message()
                });
                (category, result)
            })
            .collect())
    }

    /// Forgets one account and drops its cached pull requests. Returns
    /// `false` when the id was unknown.
    pub fn remove_account(&self, user_id: UserId) -> Result<bool, StoreError> {
        let known = self
            .accounts
            .load_auth_state()?
            .accounts
            .iter()
            .any(|account| account.id() == user_id);
        if !known {
            return Ok(false);
        }
        self.accounts.remove_account(user_id)?;
        self.cache.clear_user_cache(user_id)?;
        info!(user_id, "account removed");
        Ok(true)
    }

    /// Signs the active account out.
    pub fn logout(&self) -> Result<Option<Account>, StoreError> {
        let Some(account) = self.accounts.get_active_account() else {
            return Ok(None);
        };
        self.remove_account(account.id())?;
        Ok(Some(account))
    }

    /// Forgets every account along with their cached pull requests.
    pub fn clear_accounts(&self) -> Result<usize, StoreError> {
        let state = self.accounts.load_auth_state()?;
        for account in &state.accounts {
            self.cache.clear_user_cache(account.id())?;
        }
        self.accounts.clear_auth_state()?;
        info!(removed = state.accounts.len(), "all accounts cleared");
        Ok(state.accounts.len())
    }

    /// Minimal badge path: only the count of open pull requests the active
    /// account authored, without enrichment or caching.
    pub fn quick_badge(&self) -> Result<Badge, FetchError> {
        let Some(account) = self.accounts.get_active_account() else {
            return Ok(Badge::Unknown);
        };
        let source = self.connector.connect(&account)?;
        let count = source.count_open_authored(&account.user.login)?;
        Ok(Badge::from_count(usize::try_from(count).unwrap_or(usize::MAX)))
    }
}

fn label_for(configs: &[CategoryConfig], category: Category) -> String {
    configs
        .iter()
        .find(|config| config.id == category)
        .map(|config| config.label.clone())
        .unwrap_or_else(|| category.label().to_owned())
}
