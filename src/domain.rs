use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Domain data structures shared across modules.

pub type UserId = u64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: UserId,
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One signed-in identity. The token never leaves the local store except as
/// a bearer credential on upstream calls.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub access_token: String,
    pub user: GitHubUser,
}

impl Account {
    pub fn id(&self) -> UserId {
        self.user.id
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("access_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub accounts: Vec<Account>,
    pub active_account_id: Option<UserId>,
}

/// The closed set of relationships between a user and a pull request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Created,
    ReviewRequested,
    Assigned,
    Mentioned,
}

impl Category {
    /// Canonical ordering used by settings and the published view model.
    pub const ALL: [Category; 4] = [
        Category::Created,
        Category::ReviewRequested,
        Category::Assigned,
        Category::Mentioned,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Category::Created => "created",
            Category::ReviewRequested => "review_requested",
            Category::Assigned => "assigned",
            Category::Mentioned => "mentioned",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Created => "Opened by me",
            Category::ReviewRequested => "Review requested",
            Category::Assigned => "Assigned",
            Category::Mentioned => "Mentioned",
        }
    }

    pub fn enabled_by_default(self) -> bool {
        match self {
            Category::Created | Category::ReviewRequested | Category::Assigned => true,
            Category::Mentioned => false,
        }
    }

    /// Search qualifier naming the user's relationship to the pull request.
    pub fn qualifier(self) -> &'static str {
        match self {
            Category::Created => "author",
            Category::ReviewRequested => "review-requested",
            Category::Assigned => "assignee",
            Category::Mentioned => "mentions",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub id: Category,
    pub label: String,
    pub enabled: bool,
}

impl CategoryConfig {
    pub fn default_for(category: Category) -> Self {
        Self {
            id: category,
            label: category.label().to_owned(),
            enabled: category.enabled_by_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub categories: Vec<CategoryConfig>,
    #[serde(rename = "refreshInterval")]
    pub refresh_interval_minutes: u32,
}

impl Settings {
    pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u32 = 5;

    pub fn enabled_categories(&self) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|config| config.enabled)
            .map(|config| config.id)
            .collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            categories: Category::ALL
                .into_iter()
                .map(CategoryConfig::default_for)
                .collect(),
            refresh_interval_minutes: Self::DEFAULT_REFRESH_INTERVAL_MINUTES,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pending,
    Success,
    Failure,
    #[default]
    Neutral,
}

impl CheckStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Pending => "pending",
            CheckStatus::Success => "success",
            CheckStatus::Failure => "failure",
            CheckStatus::Neutral => "neutral",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: PrState,
    #[serde(default)]
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub user: GitHubUser,
    pub repository_url: String,
    /// Unresolved when enrichment was degraded.
    #[serde(default)]
    pub repository: Option<Repository>,
    #[serde(default)]
    pub check_status: CheckStatus,
}

impl PullRequest {
    /// `owner/repo` taken from the resolved repository, falling back to the
    /// API repository reference.
    pub fn repo_name(&self) -> String {
        match &self.repository {
            Some(repository) => repository.full_name.clone(),
            None => self
                .repository_url
                .rsplitn(3, '/')
                .take(2)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("/"),
        }
    }
}

/// Per-category view model, recomputed every aggregation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryPrs {
    pub category: Category,
    pub label: String,
    pub prs: Vec<PullRequest>,
    pub is_loading: bool,
    pub error: Option<String>,
}
