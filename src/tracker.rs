//! Issue tracker access.
//!
//! Sync only ever sees an [`IssueSource`]: a lazy sequence of raw issues,
//! optionally limited to those updated since a timestamp. [`GitHubClient`]
//! is the real implementation; credentials come from a pluggable
//! [`CredentialProvider`].

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, LINK, USER_AGENT};
use std::cell::RefCell;

use crate::config::Config;
use crate::models::RawIssue;

const PER_PAGE: &str = "100";

pub type IssueStream<'a> = Box<dyn Iterator<Item = Result<RawIssue>> + 'a>;

pub trait IssueSource {
    /// Every issue and pull request of the repository, in any order.
    /// With `since`, only records updated at or after that instant.
    fn fetch_issues(&self, since: Option<DateTime<Utc>>) -> Result<IssueStream<'_>>;
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Basic { user: String, password: String },
    Anonymous,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(***)"),
            Credentials::Basic { user, .. } => write!(f, "Basic({}, ***)", user),
            Credentials::Anonymous => f.write_str("Anonymous"),
        }
    }
}

pub trait CredentialProvider {
    /// `None` when this provider has nothing to offer.
    fn credentials(&self) -> Result<Option<Credentials>>;
}

/// Token from `GHANTT_TOKEN`, falling back to `GITHUB_TOKEN`.
pub struct EnvToken;

impl CredentialProvider for EnvToken {
    fn credentials(&self) -> Result<Option<Credentials>> {
        let token = ["GHANTT_TOKEN", "GITHUB_TOKEN"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|v| !v.trim().is_empty());
        Ok(token.map(|t| Credentials::Token(t.trim().to_string())))
    }
}

/// Asks on the terminal for the password or access token of `login`.
pub struct Prompt {
    pub login: String,
}

impl Prompt {
    /// Basic credentials from what was typed; an empty answer means none.
    fn from_input(&self, input: &str) -> Option<Credentials> {
        let password = input.trim_end_matches(['\r', '\n']);
        if password.is_empty() {
            return None;
        }
        Some(Credentials::Basic {
            user: self.login.clone(),
            password: password.to_string(),
        })
    }
}

impl CredentialProvider for Prompt {
    fn credentials(&self) -> Result<Option<Credentials>> {
        let input = rpassword::prompt_password(format!("password or token for {} > ", self.login))
            .context("Failed to read credentials")?;
        Ok(self.from_input(&input))
    }
}

pub struct Static(pub Credentials);

impl CredentialProvider for Static {
    fn credentials(&self) -> Result<Option<Credentials>> {
        Ok(Some(self.0.clone()))
    }
}

/// First provider that yields credentials wins; anonymous otherwise.
pub struct Chain(pub Vec<Box<dyn CredentialProvider>>);

impl Chain {
    /// Environment token first, then a prompt if a login user is known.
    pub fn for_config(config: &Config) -> Self {
        let mut providers: Vec<Box<dyn CredentialProvider>> = vec![Box::new(EnvToken)];
        if let Some(login) = &config.login_user {
            providers.push(Box::new(Prompt {
                login: login.clone(),
            }));
        }
        Chain(providers)
    }

    pub fn resolve(&self) -> Result<Credentials> {
        for provider in &self.0 {
            if let Some(credentials) = provider.credentials()? {
                return Ok(credentials);
            }
        }
        Ok(Credentials::Anonymous)
    }
}

pub struct GitHubClient {
    http: Client,
    api_url: String,
    owner: String,
    repo: String,
    credentials: Credentials,
}

impl GitHubClient {
    pub fn new(config: &Config, credentials: Credentials) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        tracing::debug!(api = %config.api_url, ?credentials, "GitHub client ready");

        Ok(GitHubClient {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            credentials,
        })
    }

    fn issues_url(&self, since: Option<DateTime<Utc>>) -> Result<reqwest::Url> {
        let base = format!("{}/repos/{}/{}/issues", self.api_url, self.owner, self.repo);
        let mut params = vec![("state", "all".to_string()), ("per_page", PER_PAGE.to_string())];
        if let Some(since) = since {
            params.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        reqwest::Url::parse_with_params(&base, &params)
            .with_context(|| format!("Invalid API URL {}", base))
    }

    fn get_page(&self, url: &str) -> Result<Page> {
        tracing::debug!(url, "fetching page");

        let request = self
            .http
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "ghantt");
        let request = match &self.credentials {
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::Basic { user, password } => request.basic_auth(user, Some(password)),
            Credentials::Anonymous => request,
        };

        let resp = request
            .send()
            .with_context(|| format!("GitHub request failed: {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            bail!("GitHub API error {}: {}", status, text.trim());
        }

        let next = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_link);

        let issues: Vec<RawIssue> = resp
            .json()
            .context("Failed to parse GitHub issues response")?;

        Ok((issues, next))
    }
}

impl IssueSource for GitHubClient {
    fn fetch_issues(&self, since: Option<DateTime<Utc>>) -> Result<IssueStream<'_>> {
        let url = self.issues_url(since)?;
        Ok(Box::new(Pages::new(url.to_string(), move |url: &str| {
            self.get_page(url)
        })))
    }
}

type Page = (Vec<RawIssue>, Option<String>);

/// Walks a chain of pages one request at a time, only when the records
/// already fetched run out. An error ends the walk.
struct Pages<F> {
    get_page: F,
    next: Option<String>,
    buffer: std::vec::IntoIter<RawIssue>,
}

impl<F> Pages<F>
where
    F: FnMut(&str) -> Result<Page>,
{
    fn new(first: String, get_page: F) -> Self {
        Pages {
            get_page,
            next: Some(first),
            buffer: Vec::new().into_iter(),
        }
    }
}

impl<F> Iterator for Pages<F>
where
    F: FnMut(&str) -> Result<Page>,
{
    type Item = Result<RawIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(issue) = self.buffer.next() {
                return Some(Ok(issue));
            }
            let url = self.next.take()?;
            match (self.get_page)(&url) {
                Ok((issues, next)) => {
                    self.buffer = issues.into_iter();
                    self.next = next;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Extract the `rel="next"` target from a GitHub `Link` header.
fn next_page_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, rels) = part.split_once(';')?;
        let is_next = rels
            .split(';')
            .any(|p| p.trim().trim_start_matches("rel=").trim_matches('"') == "next");
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(String::from)
    })
}

/// Fixed set of issues served from memory, filtered by `updated_at` the way
/// GitHub filters `since`. Every request is recorded.
pub struct MemorySource {
    issues: Vec<RawIssue>,
    failure: Option<String>,
    requests: RefCell<Vec<Option<DateTime<Utc>>>>,
}

impl MemorySource {
    pub fn new(issues: Vec<RawIssue>) -> Self {
        MemorySource {
            issues,
            failure: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Yields the issues, then fails with `message` partway through.
    pub fn failing(issues: Vec<RawIssue>, message: &str) -> Self {
        MemorySource {
            failure: Some(message.to_string()),
            ..MemorySource::new(issues)
        }
    }

    pub fn requests(&self) -> Vec<Option<DateTime<Utc>>> {
        self.requests.borrow().clone()
    }
}

impl IssueSource for MemorySource {
    fn fetch_issues(&self, since: Option<DateTime<Utc>>) -> Result<IssueStream<'_>> {
        self.requests.borrow_mut().push(since);
        let matching = self
            .issues
            .iter()
            .filter(move |i| since.map_or(true, |s| i.updated_at >= s))
            .cloned()
            .map(Ok);
        let failure = self
            .failure
            .clone()
            .map(|msg| Err(anyhow::anyhow!(msg)));
        Ok(Box::new(matching.chain(failure)))
    }
}
