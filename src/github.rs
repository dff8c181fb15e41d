use std::{sync::LazyLock, thread};

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{
    blocking::Client,
    header::{ACCEPT, HeaderValue},
};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

use crate::domain::{Category, CheckStatus, GitHubUser, Label, PrState, PullRequest, Repository};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT_HEADER: &str = concat!("prwatch/", env!("CARGO_PKG_VERSION"));
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const SEARCH_PAGE_SIZE: &str = "50";
const MAX_USERNAME_LEN: usize = 39;

static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:-?[A-Za-z0-9])*$").expect("username pattern compiles")
});

/// Issues authenticated GETs against the REST surface and returns the raw
/// body of 2xx responses.
pub trait Transport: Send + Sync {
    fn get(&self, path_and_query: &str) -> Result<String, FetchError>;
}

pub fn build_client() -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT_HEADER)
        .build()
        .map_err(FetchError::Http)
}

pub struct ReqwestTransport {
    client: Client,
    api_base: String,
    token: String,
}

impl ReqwestTransport {
    pub fn new(api_base: &str, token: &str) -> Result<Self, FetchError> {
        if token.is_empty() {
            return Err(FetchError::MissingToken);
        }
        Ok(Self {
            client: build_client()?,
            api_base: api_base.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, path_and_query: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(format!("{}{path_and_query}", self.api_base))
            .header(ACCEPT, "application/vnd.github+json")
            .header(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION))
            .bearer_auth(&self.token)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Client scoped to one account's credential.
pub struct GitHubClient<T: Transport> {
    transport: T,
}

impl GitHubClient<ReqwestTransport> {
    pub fn connect(api_base: &str, token: &str) -> Result<Self, FetchError> {
        Ok(Self::new(ReqwestTransport::new(api_base, token)?))
    }
}

impl<T: Transport> GitHubClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn get_current_user(&self) -> Result<GitHubUser, FetchError> {
        self.get_json("/user")
    }

    /// Open pull requests related to `username` through `category`, most
    /// recently updated first, each annotated with its CI status.
    pub fn get_prs_by_category(
        &self,
        username: &str,
        category: Category,
    ) -> Result<Vec<PullRequest>, FetchError> {
        let query = build_query(username, category)?;
        let path = search_path(&[
            ("q", query.as_str()),
            ("sort", "updated"),
            ("order", "desc"),
            ("per_page", SEARCH_PAGE_SIZE),
        ]);
        let response: SearchResponse = self.get_json(&path)?;
        debug!(%category, count = response.items.len(), "search returned pull requests");

        let enrichments: Vec<Enrichment> = thread::scope(|scope| {
            let handles: Vec<_> = response
                .items
                .iter()
                .map(|item| scope.spawn(move || self.enrich(item)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| Enrichment::Degraded {
                        reason: "enrichment worker panicked".to_owned(),
                    })
                })
                .collect()
        });

        Ok(response
            .items
            .into_iter()
            .zip(enrichments)
            .map(|(item, enrichment)| item.into_pull_request(enrichment))
            .collect())
    }

    /// Lightweight count used by the background badge path; skips enrichment.
    pub fn count_open_authored(&self, username: &str) -> Result<u64, FetchError> {
        let query = build_query(username, Category::Created)?;
        let path = search_path(&[("q", query.as_str()), ("per_page", "1")]);
        let response: SearchCount = self.get_json(&path)?;
        Ok(response.total_count)
    }

    pub fn enrich(&self, item: &SearchItem) -> Enrichment {
        let Some((owner, repo)) = split_repository_url(&item.repository_url) else {
            debug!(pr = item.id, url = %item.repository_url, "pull request enrichment degraded");
            return Enrichment::Degraded {
                reason: format!("unrecognized repository url {}", item.repository_url),
            };
        };

        let detail: PullDetail =
            match self.get_json(&format!("/repos/{owner}/{repo}/pulls/{}", item.number)) {
                Ok(detail) => detail,
                Err(err) => {
                    debug!(pr = item.id, error = %err, "pull request enrichment degraded");
                    return Enrichment::Degraded {
                        reason: err.to_string(),
                    };
                }
            };

        let check = self.check_status(owner, repo, &detail.head.sha);
        Enrichment::Resolved {
            repository: Repository {
                owner: owner.to_owned(),
                name: repo.to_owned(),
                full_name: format!("{owner}/{repo}"),
                html_url: format!("https://github.com/{owner}/{repo}"),
            },
            check,
        }
    }

    /// Check runs first; the legacy combined status only when no runs exist.
    pub fn check_status(&self, owner: &str, repo: &str, git_ref: &str) -> CheckOutcome {
        let outcome = (|| -> Result<CheckStatus, FetchError> {
            let runs: CheckRunsResponse =
                self.get_json(&format!("/repos/{owner}/{repo}/commits/{git_ref}/check-runs"))?;
            if runs.total_count > 0 {
                return Ok(derive_from_check_runs(&runs.check_runs));
            }
            let combined: CombinedStatusResponse =
                self.get_json(&format!("/repos/{owner}/{repo}/commits/{git_ref}/status"))?;
            Ok(derive_from_combined_status(&combined))
        })();

        match outcome {
            Ok(status) => CheckOutcome::Derived(status),
            Err(err) => {
                debug!(owner, repo, git_ref, error = %err, "check status unavailable");
                CheckOutcome::Absorbed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, FetchError> {
        let body = self.transport.get(path)?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Rejects anything outside the platform's handle grammar so user input can
/// never smuggle extra qualifiers into a search query.
pub fn validate_username(username: &str) -> Result<&str, FetchError> {
    if username.len() > MAX_USERNAME_LEN || !USERNAME_PATTERN.is_match(username) {
        return Err(FetchError::InvalidUsername(username.to_owned()));
    }
    Ok(username)
}

pub fn build_query(username: &str, category: Category) -> Result<String, FetchError> {
    let username = validate_username(username)?;
    Ok(format!("type:pr is:open {}:{username}", category.qualifier()))
}

fn search_path(params: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("/search/issues?{query}")
}

fn split_repository_url(api_url: &str) -> Option<(&str, &str)> {
    let mut segments = api_url.trim_end_matches('/').rsplit('/');
    let repo = segments.next().filter(|segment| !segment.is_empty())?;
    let owner = segments.next().filter(|segment| !segment.is_empty())?;
    Some((owner, repo))
}

pub fn derive_from_check_runs(runs: &[CheckRun]) -> CheckStatus {
    let has_failure = runs.iter().any(|run| {
        matches!(
            run.conclusion.as_deref(),
            Some("failure") | Some("timed_out")
        )
    });
    let has_pending = runs
        .iter()
        .any(|run| matches!(run.status.as_str(), "queued" | "in_progress"));
    let all_passing = runs.iter().all(|run| {
        matches!(
            run.conclusion.as_deref(),
            Some("success") | Some("neutral") | Some("skipped")
        )
    });

    if has_failure {
        CheckStatus::Failure
    } else if has_pending {
        CheckStatus::Pending
    } else if all_passing {
        CheckStatus::Success
    } else {
        CheckStatus::Neutral
    }
}

pub fn derive_from_combined_status(combined: &CombinedStatusResponse) -> CheckStatus {
    if combined.total_count == 0 {
        return CheckStatus::Neutral;
    }
    match combined.state.as_str() {
        "success" => CheckStatus::Success,
        "pending" => CheckStatus::Pending,
        _ => CheckStatus::Failure,
    }
}

/// Result of annotating one search hit. `Degraded` still yields the pull
/// request, just without repository or CI detail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Enrichment {
    Resolved {
        repository: Repository,
        check: CheckOutcome,
    },
    Degraded {
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Derived(CheckStatus),
    Absorbed { reason: String },
}

impl CheckOutcome {
    pub fn status(&self) -> CheckStatus {
        match self {
            CheckOutcome::Derived(status) => *status,
            CheckOutcome::Absorbed { .. } => CheckStatus::Neutral,
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GitHub API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub API error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected GitHub API response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid username format: {0:?}")]
    InvalidUsername(String),
    #[error("Account token is missing")]
    MissingToken,
    #[error("Background worker disconnected before returning a result")]
    WorkerGone,
}

impl FetchError {
    /// Short line for display; the full error goes to the log.
    pub fn display_message(&self) -> String {
        match self {
            FetchError::Http(_) => "Could not reach GitHub".to_owned(),
            FetchError::Status { status: 401, .. } => "GitHub rejected the token (401)".to_owned(),
            FetchError::Status { status: 403, .. } => "GitHub denied the request (403)".to_owned(),
            FetchError::Status { status: 429, .. } => "GitHub rate limit reached (429)".to_owned(),
            FetchError::Status { status, .. } => format!("GitHub API error ({status})"),
            FetchError::Decode(_) => "Unexpected response from GitHub".to_owned(),
            FetchError::InvalidUsername(_) => "Invalid username format".to_owned(),
            FetchError::MissingToken => "Account token is missing".to_owned(),
            FetchError::WorkerGone => "Fetch was interrupted".to_owned(),
        }
    }
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchCount {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct SearchItem {
    id: u64,
    number: u64,
    title: String,
    html_url: String,
    state: PrState,
    #[serde(default)]
    draft: Option<bool>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<Label>,
    user: GitHubUser,
    repository_url: String,
}

impl SearchItem {
    fn into_pull_request(self, enrichment: Enrichment) -> PullRequest {
        let (repository, check_status) = match enrichment {
            Enrichment::Resolved { repository, check } => (Some(repository), check.status()),
            Enrichment::Degraded { .. } => (None, CheckStatus::Neutral),
        };
        PullRequest {
            id: self.id,
            number: self.number,
            title: self.title,
            html_url: self.html_url,
            state: self.state,
            draft: self.draft.unwrap_or(false),
            created_at: self.created_at,
            updated_at: self.updated_at,
            labels: self.labels,
            user: self.user,
            repository_url: self.repository_url,
            repository,
            check_status,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PullDetail {
    head: PullHead,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CheckRunsResponse {
    total_count: u64,
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

#[derive(Debug, Deserialize)]
pub struct CheckRun {
    pub status: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CombinedStatusResponse {
    pub state: String,
    pub total_count: u64,
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        time::{Duration, Instant},
    };

    use parking_lot::{Condvar, Mutex};
    use serde_json::json;

    use super::*;

    /// Holds each caller until `expected` callers are waiting at once.
    /// Sequential callers give up after a few seconds instead of hanging.
    pub(crate) struct Rendezvous {
        expected: usize,
        arrived: Mutex<usize>,
        all_here: Condvar,
    }

    impl Rendezvous {
        pub(crate) fn new(expected: usize) -> Self {
            Self {
                expected,
                arrived: Mutex::new(0),
                all_here: Condvar::new(),
            }
        }

        /// `true` when every expected caller was in flight together.
        pub(crate) fn arrive(&self) -> bool {
            let deadline = Instant::now() + Duration::from_secs(5);
            let mut arrived = self.arrived.lock();
            *arrived += 1;
            self.all_here.notify_all();
            while *arrived < self.expected {
                if self.all_here.wait_until(&mut arrived, deadline).timed_out() {
                    return *arrived >= self.expected;
                }
            }
            true
        }
    }

    /// Routes pull-detail lookups through a [`Rendezvous`].
    struct GatedTransport {
        inner: StubTransport,
        gate: Rendezvous,
        met: Mutex<Vec<bool>>,
    }

    impl Transport for GatedTransport {
        fn get(&self, path_and_query: &str) -> Result<String, FetchError> {
            if path_and_query.contains("/pulls/") {
                let met = self.gate.arrive();
                self.met.lock().push(met);
            }
            self.inner.get(path_and_query)
        }
    }

    /// Canned responses keyed by path (query string ignored).
    #[derive(Default)]
    pub(crate) struct StubTransport {
        routes: HashMap<String, Result<String, u16>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl StubTransport {
        pub(crate) fn ok(mut self, path: &str, body: serde_json::Value) -> Self {
            self.routes.insert(path.to_owned(), Ok(body.to_string()));
            self
        }

        pub(crate) fn fail(mut self, path: &str, status: u16) -> Self {
            self.routes.insert(path.to_owned(), Err(status));
            self
        }
    }

    impl Transport for StubTransport {
        fn get(&self, path_and_query: &str) -> Result<String, FetchError> {
            self.calls.lock().push(path_and_query.to_owned());
            let path = path_and_query.split('?').next().unwrap_or_default();
            match self.routes.get(path) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status {
                    status: *status,
                    body: "stubbed failure".into(),
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    body: format!("no route for {path}"),
                }),
            }
        }
    }

    pub(crate) fn search_item(id: u64, repo: &str) -> serde_json::Value {
        json!({
            "id": id,
            "number": id,
            "title": format!("Change {id}"),
            "html_url": format!("https://github.com/{repo}/pull/{id}"),
            "state": "open",
            "draft": false,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-02T10:00:00Z",
            "labels": [{"id": 9, "name": "bug", "color": "d73a4a"}],
            "user": {"id": 1, "login": "alice", "avatar_url": "a", "html_url": "h"},
            "repository_url": format!("https://api.github.com/repos/{repo}")
        })
    }

    fn runs(entries: &[(&str, Option<&str>)]) -> Vec<CheckRun> {
        entries
            .iter()
            .map(|(status, conclusion)| CheckRun {
                status: (*status).to_owned(),
                conclusion: conclusion.map(str::to_owned),
            })
            .collect()
    }

    #[test]
    fn query_builder_maps_each_category() {
        assert_eq!(
            build_query("alice", Category::ReviewRequested).expect("valid"),
            "type:pr is:open review-requested:alice"
        );
        assert_eq!(
            build_query("alice", Category::Created).expect("valid"),
            "type:pr is:open author:alice"
        );
        assert_eq!(
            build_query("a-b", Category::Assigned).expect("valid"),
            "type:pr is:open assignee:a-b"
        );
        assert_eq!(
            build_query("x", Category::Mentioned).expect("valid"),
            "type:pr is:open mentions:x"
        );
    }

    #[test]
    fn invalid_usernames_are_rejected() {
        let too_long = "a".repeat(40);
        for name in ["-alice", "alice-", "", "al--ice", "alice bob", "alice:x", too_long.as_str()] {
            assert!(
                matches!(
                    build_query(name, Category::Created),
                    Err(FetchError::InvalidUsername(_))
                ),
                "{name:?} should be rejected"
            );
        }
        assert!(validate_username(&"a".repeat(39)).is_ok());
    }

    #[test]
    fn invalid_username_makes_no_network_call() {
        let client = GitHubClient::new(StubTransport::default());
        let result = client.get_prs_by_category("bad user", Category::Created);

        assert!(matches!(result, Err(FetchError::InvalidUsername(_))));
        assert!(client.transport.calls.lock().is_empty());
    }

    #[test]
    fn split_repository_url_takes_last_two_segments() {
        assert_eq!(
            split_repository_url("https://api.github.com/repos/acme/widgets"),
            Some(("acme", "widgets"))
        );
        assert_eq!(split_repository_url("widgets"), None);
    }

    #[test]
    fn any_failed_run_wins() {
        let status = derive_from_check_runs(&runs(&[
            ("completed", Some("success")),
            ("completed", Some("failure")),
            ("in_progress", None),
        ]));
        assert_eq!(status, CheckStatus::Failure);

        let status = derive_from_check_runs(&runs(&[("completed", Some("timed_out"))]));
        assert_eq!(status, CheckStatus::Failure);
    }

    #[test]
    fn run_states_resolve_in_priority_order() {
        assert_eq!(
            derive_from_check_runs(&runs(&[("completed", Some("success")), ("queued", None)])),
            CheckStatus::Pending
        );
        assert_eq!(
            derive_from_check_runs(&runs(&[
                ("completed", Some("success")),
                ("completed", Some("skipped")),
                ("completed", Some("neutral")),
            ])),
            CheckStatus::Success
        );
        assert_eq!(
            derive_from_check_runs(&runs(&[
                ("completed", Some("success")),
                ("completed", Some("cancelled")),
            ])),
            CheckStatus::Neutral
        );
    }

    #[test]
    fn combined_status_fallback() {
        let status = |state: &str, total_count| CombinedStatusResponse {
            state: state.to_owned(),
            total_count,
        };
        assert_eq!(derive_from_combined_status(&status("pending", 0)), CheckStatus::Neutral);
        assert_eq!(derive_from_combined_status(&status("success", 2)), CheckStatus::Success);
        assert_eq!(derive_from_combined_status(&status("pending", 1)), CheckStatus::Pending);
        assert_eq!(derive_from_combined_status(&status("error", 1)), CheckStatus::Failure);
    }

    #[test]
    fn check_status_prefers_runs_then_falls_back() {
        let client = GitHubClient::new(
            StubTransport::default()
                .ok(
                    "/repos/acme/widgets/commits/abc/check-runs",
                    json!({"total_count": 1, "check_runs": [{"status": "completed", "conclusion": "failure"}]}),
                )
                .ok(
                    "/repos/acme/widgets/commits/def/check-runs",
                    json!({"total_count": 0, "check_runs": []}),
                )
                .ok(
                    "/repos/acme/widgets/commits/def/status",
                    json!({"state": "pending", "total_count": 1}),
                )
                .ok(
                    "/repos/acme/widgets/commits/fed/check-runs",
                    json!({"total_count": 0, "check_runs": []}),
                )
                .ok(
                    "/repos/acme/widgets/commits/fed/status",
                    json!({"state": "pending", "total_count": 0}),
                ),
        );

        assert_eq!(
            client.check_status("acme", "widgets", "abc"),
            CheckOutcome::Derived(CheckStatus::Failure)
        );
        assert_eq!(
            client.check_status("acme", "widgets", "def"),
            CheckOutcome::Derived(CheckStatus::Pending)
        );
        assert_eq!(
            client.check_status("acme", "widgets", "fed"),
            CheckOutcome::Derived(CheckStatus::Neutral)
        );
    }

    #[test]
    fn check_status_errors_are_absorbed_as_neutral() {
        let client = GitHubClient::new(
            StubTransport::default().fail("/repos/acme/widgets/commits/abc/check-runs", 500),
        );

        let outcome = client.check_status("acme", "widgets", "abc");
        assert!(matches!(outcome, CheckOutcome::Absorbed { .. }));
        assert_eq!(outcome.status(), CheckStatus::Neutral);
    }

    #[test]
    fn category_fetch_isolates_enrichment_failures() {
        let client = GitHubClient::new(
            StubTransport::default()
                .ok(
                    "/search/issues",
                    json!({"total_count": 2, "items": [search_item(1, "acme/widgets"), search_item(2, "acme/gears")]}),
                )
                .ok("/repos/acme/widgets/pulls/1", json!({"head": {"sha": "abc"}}))
                .ok(
                    "/repos/acme/widgets/commits/abc/check-runs",
                    json!({"total_count": 1, "check_runs": [{"status": "completed", "conclusion": "success"}]}),
                )
                .fail("/repos/acme/gears/pulls/2", 502),
        );

        let prs = client
            .get_prs_by_category("alice", Category::ReviewRequested)
            .expect("category fetch succeeds");

        assert_eq!(prs.len(), 2);
        assert_eq!(prs[0].id, 1);
        assert_eq!(prs[0].check_status, CheckStatus::Success);
        assert_eq!(
            prs[0].repository.as_ref().map(|repo| repo.full_name.as_str()),
            Some("acme/widgets")
        );
        assert_eq!(prs[0].labels[0].name, "bug");
        assert_eq!(prs[1].id, 2);
        assert_eq!(prs[1].check_status, CheckStatus::Neutral);
        assert!(prs[1].repository.is_none());
        assert_eq!(prs[1].repo_name(), "acme/gears");

        let calls = client.transport.calls.lock();
        let search = calls
            .iter()
            .find(|call| call.starts_with("/search/issues"))
            .expect("search issued");
        assert_eq!(
            search,
            "/search/issues?q=type%3Apr+is%3Aopen+review-requested%3Aalice&sort=updated&order=desc&per_page=50"
        );
    }

    #[test]
    fn search_hits_are_enriched_concurrently() {
        let ids = [1, 2, 3];
        let mut stub = StubTransport::default().ok(
            "/search/issues",
            json!({"total_count": 3, "items": ids.map(|id| search_item(id, "acme/widgets"))}),
        );
        for id in ids {
            stub = stub.ok(
                &format!("/repos/acme/widgets/pulls/{id}"),
                json!({"head": {"sha": format!("sha{id}")}}),
            );
        }
        let client = GitHubClient::new(GatedTransport {
            inner: stub,
            gate: Rendezvous::new(ids.len()),
            met: Mutex::new(Vec::new()),
        });

        let prs = client
            .get_prs_by_category("alice", Category::Created)
            .expect("category fetch succeeds");

        assert_eq!(prs.iter().map(|pr| pr.id).collect::<Vec<_>>(), ids.to_vec());
        assert_eq!(*client.transport.met.lock(), vec![true; ids.len()]);
    }

    #[test]
    fn unparseable_repository_url_degrades_without_requests() {
        let client = GitHubClient::new(StubTransport::default());
        let mut fixture = search_item(8, "acme/widgets");
        fixture["repository_url"] = json!("");
        let item: SearchItem = serde_json::from_value(fixture).expect("fixture");

        assert!(matches!(client.enrich(&item), Enrichment::Degraded { .. }));
        assert!(client.transport.calls.lock().is_empty());
    }

    #[test]
    fn enrichment_reports_degraded_path() {
        let client =
            GitHubClient::new(StubTransport::default().fail("/repos/acme/widgets/pulls/7", 500));
        let item: SearchItem =
            serde_json::from_value(search_item(7, "acme/widgets")).expect("fixture");

        assert!(matches!(client.enrich(&item), Enrichment::Degraded { .. }));
    }

    #[test]
    fn search_failure_surfaces_status() {
        let client = GitHubClient::new(StubTransport::default().fail("/search/issues", 401));
        let err = client
            .get_prs_by_category("alice", Category::Created)
            .expect_err("search fails");

        assert!(matches!(err, FetchError::Status { status: 401, .. }));
        assert_eq!(err.display_message(), "GitHub rejected the token (401)");
    }

    #[test]
    fn authored_count_reads_total_only() {
        let client = GitHubClient::new(
            StubTransport::default().ok("/search/issues", json!({"total_count": 12, "items": []})),
        );

        assert_eq!(client.count_open_authored("alice").expect("count"), 12);
        let calls = client.transport.calls.lock();
        assert!(calls[0].ends_with("per_page=1"));
        assert!(calls[0].contains("author%3Aalice"));
    }

    #[test]
    fn current_user_is_decoded() {
        let client = GitHubClient::new(StubTransport::default().ok(
            "/user",
            json!({"id": 5, "login": "octo", "avatar_url": "a", "html_url": "h", "name": "Octo Cat"}),
        ));

        let user = client.get_current_user().expect("user");
        assert_eq!(user.id, 5);
        assert_eq!(user.name.as_deref(), Some("Octo Cat"));
    }

    #[test]
    fn transport_requires_token() {
        assert!(matches!(
            ReqwestTransport::new(DEFAULT_API_BASE, ""),
            Err(FetchError::MissingToken)
        ));
    }
}
