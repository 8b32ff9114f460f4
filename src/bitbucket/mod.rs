use crate::config::BitbucketConfig;
use crate::{PullRequest, Review};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

const API_URL: &str = "https://api.bitbucket.org/2.0/";

const PR_FIELDS: &[&str] = &[
    "next",
    "values.id",
    "values.title",
    "values.updated_on",
    "values.comment_count",
    "values.author.display_name",
    "values.author.account_id",
    "values.source.commit.hash",
    "values.source.branch.name",
    "values.destination.branch.name",
    "values.links.html.href",
    "values.participants.role",
    "values.participants.state",
    "values.participants.user.account_id",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Bitbucket API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetching pull requests of {repo} failed: {source}")]
    Repository {
        repo: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid repository identifier: {0} (expected owner/name)")]
    InvalidRepository(String),
}

/// Anything that can produce the current batch of relevant open pull requests.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Open pull requests across all configured repositories, unsorted.
    ///
    /// Fails as a whole if any repository fails.
    async fn fetch_open_pull_requests(&self) -> Result<Vec<PullRequest>, FetchError>;
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    #[serde(default)]
    values: Vec<RawPullRequest>,
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUser {
    display_name: String,
    account_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBranch {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCommit {
    hash: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEndpoint {
    branch: RawBranch,
    commit: RawCommit,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLink {
    href: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLinks {
    html: RawLink,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParticipant {
    user: RawUser,
    role: String,
    state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPullRequest {
    id: u64,
    title: String,
    updated_on: String,
    comment_count: u32,
    author: RawUser,
    source: RawEndpoint,
    destination: RawEndpoint,
    links: RawLinks,
    participants: Vec<RawParticipant>,
}

/// Parse a Bitbucket timestamp such as `2024-03-01T10:15:30.123456+00:00`.
///
/// Unparsable input yields the Unix epoch rather than an error.
pub fn parse_timestamp(value: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .unwrap_or_default()
}

/// Turn one API record into a snapshot, or `None` when it does not concern `my_account_id`.
fn convert(raw: RawPullRequest, repo: &str, my_account_id: &str) -> Option<PullRequest> {
    let mut pr = PullRequest {
        id: raw.id,
        repo: repo.to_string(),
        title: raw.title,
        is_mine: raw.author.account_id == my_account_id,
        author: raw.author.display_name,
        last_commit: raw.source.commit.hash,
        source_branch: raw.source.branch.name,
        target_branch: raw.destination.branch.name,
        comments_count: raw.comment_count,
        reviewers_count: 0,
        approved_count: 0,
        changes_requested_count: 0,
        my_review: Review::None,
        updated_on: parse_timestamp(&raw.updated_on),
        url: raw.links.html.href,
        am_i_participating: false,
    };

    for participant in raw.participants.iter().filter(|p| p.role == "REVIEWER") {
        pr.reviewers_count += 1;

        let review = match participant.state.as_deref() {
            Some("approved") => Review::Approved,
            Some("changes_requested") => Review::ChangesRequested,
            _ => Review::None,
        };
        match review {
            Review::Approved => pr.approved_count += 1,
            Review::ChangesRequested => pr.changes_requested_count += 1,
            Review::None => {}
        }

        if participant.user.account_id == my_account_id {
            pr.am_i_participating = true;
            pr.my_review = review;
        }
    }

    (pr.is_mine || pr.am_i_participating).then_some(pr)
}

fn validate_repository(repo: &str) -> Result<(), FetchError> {
    let valid = repo
        .split_once('/')
        .is_some_and(|(owner, name)| {
            !owner.is_empty()
                && !name.is_empty()
                && !name.contains('/')
                && repo
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
        });
    if valid {
        Ok(())
    } else {
        Err(FetchError::InvalidRepository(repo.to_string()))
    }
}

/// Bitbucket Cloud client authenticated with an app password.
pub struct BitbucketClient {
    http: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
    repositories: Vec<String>,
    account_id: String,
}

impl BitbucketClient {
    /// Authenticate and look up the current user's account id.
    pub async fn connect(config: &BitbucketConfig) -> Result<Self, FetchError> {
        Self::connect_to(API_URL, config).await
    }

    pub async fn connect_to(api_url: &str, config: &BitbucketConfig) -> Result<Self, FetchError> {
        for repo in &config.repositories {
            validate_repository(repo)?;
        }

        let mut client = Self {
            http: reqwest::Client::builder()
                .user_agent(concat!("pr-dash/", env!("CARGO_PKG_VERSION")))
                .build()?,
            api_url: api_url.trim_end_matches('/').to_string() + "/",
            username: config.username.clone(),
            password: config.password.clone(),
            repositories: config.repositories.clone(),
            account_id: String::new(),
        };

        #[derive(Deserialize)]
        struct Me {
            account_id: String,
        }

        let me: Me = client.get(&format!("{}user", client.api_url)).await?;
        debug!(account_id = %me.account_id, "authenticated with Bitbucket");
        client.account_id = me.account_id;
        Ok(client)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, reqwest::Error> {
        self.http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }

    /// Relevant open pull requests of one repository, following pagination.
    #[instrument(skip(self))]
    pub async fn fetch_repository(&self, repo: &str) -> Result<Vec<PullRequest>, FetchError> {
        let mut url = Some(format!(
            "{}repositories/{}/pullrequests?state=OPEN&pagelen=50&fields={}",
            self.api_url,
            repo,
            PR_FIELDS.join(",")
        ));
        let mut prs = Vec::new();

        while let Some(next) = url.take() {
            let page: Page = self
                .get(&next)
                .await
                .map_err(|source| FetchError::Repository {
                    repo: repo.to_string(),
                    source,
                })?;
            debug!(count = page.values.len(), "received page");
            prs.extend(
                page.values
                    .into_iter()
                    .filter_map(|raw| convert(raw, repo, &self.account_id)),
            );
            url = page.next;
        }

        Ok(prs)
    }
}

#[async_trait]
impl PullRequestSource for BitbucketClient {
    async fn fetch_open_pull_requests(&self) -> Result<Vec<PullRequest>, FetchError> {
        let mut all = Vec::new();
        for repo in &self.repositories {
            all.extend(self.fetch_repository(repo).await?);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "{me-123}";

    fn page(json: &str) -> Page {
        serde_json::from_str(json).unwrap()
    }

    const PAGE: &str = r#"{
        "values": [
            {
                "id": 42,
                "title": "Add login",
                "updated_on": "2024-03-01T10:15:30.123456+00:00",
                "comment_count": 3,
                "author": {"display_name": "Alice", "account_id": "{alice}"},
                "source": {"commit": {"hash": "abc123"}, "branch": {"name": "feature/login"}},
                "destination": {"branch": {"name": "main"}},
                "links": {"html": {"href": "https://bitbucket.org/team/api/pull-requests/42"}},
                "participants": [
                    {"role": "REVIEWER", "state": "approved", "user": {"account_id": "{bob}"}},
                    {"role": "REVIEWER", "state": "changes_requested", "user": {"account_id": "{me-123}"}},
                    {"role": "REVIEWER", "state": null, "user": {"account_id": "{carol}"}},
                    {"role": "PARTICIPANT", "state": "approved", "user": {"account_id": "{dave}"}}
                ]
            },
            {
                "id": 43,
                "title": "Not mine",
                "updated_on": "2024-03-02T10:15:30.000000+00:00",
                "author": {"display_name": "Alice", "account_id": "{alice}"},
                "participants": [
                    {"role": "REVIEWER", "state": null, "user": {"account_id": "{bob}"}}
                ]
            },
            {
                "id": 44,
                "title": "My own",
                "updated_on": "garbage",
                "author": {"display_name": "Me", "account_id": "{me-123}"}
            }
        ],
        "next": "https://api.bitbucket.org/2.0/repositories/team/api/pullrequests?page=2"
    }"#;

    fn converted() -> Vec<PullRequest> {
        page(PAGE)
            .values
            .into_iter()
            .filter_map(|raw| convert(raw, "team/api", ME))
            .collect()
    }

    #[test]
    fn test_reviewer_counts_and_my_review() {
        let prs = converted();
        let pr = &prs[0];
        assert_eq!(pr.uid().as_str(), "team/api/42");
        assert_eq!(pr.author, "Alice");
        assert_eq!(pr.last_commit, "abc123");
        assert_eq!(pr.source_branch, "feature/login");
        assert_eq!(pr.target_branch, "main");
        assert_eq!(pr.comments_count, 3);
        assert_eq!(pr.reviewers_count, 3);
        assert_eq!(pr.approved_count, 1);
        assert_eq!(pr.changes_requested_count, 1);
        assert_eq!(pr.my_review, Review::ChangesRequested);
        assert!(pr.am_i_participating);
        assert!(!pr.is_mine);
        assert!(pr.approved_count + pr.changes_requested_count <= pr.reviewers_count);
    }

    #[test]
    fn test_irrelevant_pull_requests_are_dropped() {
        let ids: Vec<u64> = converted().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![42, 44]);
    }

    #[test]
    fn test_authored_pull_request_is_mine() {
        let prs = converted();
        let mine = &prs[1];
        assert!(mine.is_mine);
        assert!(!mine.am_i_participating);
        assert_eq!(mine.reviewers_count, 0);
    }

    #[test]
    fn test_page_exposes_next_link() {
        assert!(page(PAGE).next.is_some());
        assert!(page(r#"{"values": []}"#).next.is_none());
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-03-01T10:15:30.123456+02:00");
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:15:30.123456+02:00");

        let rfc = parse_timestamp("2024-03-01T10:15:30Z");
        assert_eq!(rfc.timestamp(), 1_709_288_130);
    }

    #[test]
    fn test_unparsable_timestamp_is_epoch() {
        assert_eq!(parse_timestamp("garbage").timestamp(), 0);
        assert_eq!(converted()[1].updated_on.timestamp(), 0);
    }

    #[test]
    fn test_validate_repository() {
        assert!(validate_repository("team/api").is_ok());
        assert!(validate_repository("team/my.repo-2_x").is_ok());
        assert!(validate_repository("api").is_err());
        assert!(validate_repository("team/").is_err());
        assert!(validate_repository("a/b/c").is_err());
        assert!(validate_repository("team/a?b").is_err());
    }
}
