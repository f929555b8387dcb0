use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, TimeZone};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const URL_INPUT_KIND: &str = "url_input";

const DELETED_AUTHOR: &str = "[deleted]";
const REMOVED_BODIES: [&str; 2] = ["[deleted]", "[removed]"];

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// A discussion thread that can be opened in the comment view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub permalink: String,
    pub kind: String,
}

/// One comment exactly as delivered by the API, flattened depth-first.
///
/// `parent_id` is empty for top-level replies and `order` is the position in
/// the fetch, which is the only ordering the tree builder honours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub author: String,
    pub body: String,
    pub created_utc: f64,
    pub score: i64,
    pub parent_id: String,
    pub order: usize,
}

impl CommentRecord {
    pub fn formatted_time(&self) -> String {
        format_timestamp(self.created_utc)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommentsSnapshot {
    pub records: Vec<CommentRecord>,
    /// Empty when the payload carried no usable title.
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadQuery {
    pub kind: String,
    pub subreddit: String,
    pub flairs: Vec<String>,
    pub max_age_hours: u32,
    pub limit: u32,
    pub title_must_contain: Vec<String>,
    pub title_must_not_contain: Vec<String>,
}

impl ThreadQuery {
    pub fn within_age(&self, created_utc: f64, now_utc: f64) -> bool {
        if self.max_age_hours == 0 {
            return true;
        }
        let max_age = f64::from(self.max_age_hours) * 3600.0;
        created_utc >= now_utc - max_age
    }

    pub fn title_matches(&self, title: &str) -> bool {
        let lower = title.to_lowercase();
        let required = self
            .title_must_contain
            .iter()
            .all(|phrase| lower.contains(&phrase.to_lowercase()));
        let forbidden = self
            .title_must_not_contain
            .iter()
            .any(|phrase| lower.contains(&phrase.to_lowercase()));
        required && !forbidden
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("empty url")]
    Empty,
    #[error("parse url: {0}")]
    Parse(String),
    #[error("not a reddit thread url: {0}")]
    NotAThread(String),
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).with_context(|| format!("parse base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    /// Searches flair by flair and returns the first non-empty match set.
    pub fn find_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>> {
        let mut flairs: Vec<Option<&str>> = query.flairs.iter().map(|f| Some(f.as_str())).collect();
        if flairs.is_empty() {
            flairs.push(None);
        }

        let path = format!("r/{}/search.json", query.subreddit.trim_start_matches("r/"));
        for flair in flairs {
            let mut params = vec![
                ("sort".to_string(), "new".to_string()),
                ("t".to_string(), "week".to_string()),
                ("limit".to_string(), query.limit.to_string()),
                ("restrict_sr".to_string(), "1".to_string()),
            ];
            if let Some(flair) = flair {
                params.insert(0, ("q".to_string(), format!("flair:\"{flair}\"")));
            }
            let resp = self.get(&path, &params).context("fetch threads")?;
            let payload: Value = resp.json().context("decode threads")?;
            let threads = threads_from_search(&payload, query, now_utc());
            tracing::debug!(
                subreddit = %query.subreddit,
                flair = flair.unwrap_or(""),
                found = threads.len(),
                "thread search finished"
            );
            if !threads.is_empty() {
                return Ok(threads);
            }
        }
        Ok(Vec::new())
    }

    pub fn comments(&self, permalink: &str) -> Result<CommentsSnapshot> {
        let path = format!("{}.json", permalink.trim_matches('/'));
        let resp = self.get(&path, &[]).context("fetch comments")?;
        let payload: Vec<Value> = resp.json().context("decode comments")?;
        snapshot_from_payload(&payload)
    }

    pub fn thread_from_url(&self, input: &str) -> Result<Thread> {
        let permalink = normalize_permalink(input)?;
        let thread_id = extract_thread_id(&permalink)
            .ok_or_else(|| UrlError::NotAThread(permalink.clone()))?;
        let snapshot = self.comments(&permalink)?;
        Ok(Thread {
            id: thread_id,
            title: snapshot.title,
            permalink,
            kind: URL_INPUT_KIND.to_string(),
        })
    }

    fn get(&self, path: &str, params: &[(String, String)]) -> Result<Response> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .send()?;
        match resp.status() {
            StatusCode::OK => Ok(resp),
            StatusCode::TOO_MANY_REQUESTS => Err(anyhow!("reddit: rate limited")),
            status => Err(anyhow!("reddit: http {}", status.as_u16())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListingEnvelope {
    data: Listing,
}

#[derive(Debug, Default, Deserialize)]
struct Listing {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    parent_id: String,
    #[serde(default)]
    replies: Value,
}

pub(crate) fn threads_from_search(payload: &Value, query: &ThreadQuery, now_utc: f64) -> Vec<Thread> {
    let Ok(envelope) = ListingEnvelope::deserialize(payload) else {
        return Vec::new();
    };
    envelope
        .data
        .children
        .into_iter()
        .filter(|thing| thing.kind == "t3")
        .filter_map(|thing| PostData::deserialize(thing.data).ok())
        .filter(|post| query.within_age(post.created_utc, now_utc))
        .filter(|post| query.title_matches(&post.title))
        .map(|post| Thread {
            id: post.id,
            title: post.title,
            permalink: post.permalink,
            kind: query.kind.clone(),
        })
        .collect()
}

pub(crate) fn snapshot_from_payload(payload: &[Value]) -> Result<CommentsSnapshot> {
    if payload.len() < 2 {
        bail!("reddit: comments payload missing elements");
    }
    let post_listing =
        ListingEnvelope::deserialize(&payload[0]).context("reddit: decode post listing")?;
    let post = post_listing
        .data
        .children
        .into_iter()
        .find(|thing| thing.kind == "t3")
        .and_then(|thing| PostData::deserialize(thing.data).ok())
        .ok_or_else(|| anyhow!("reddit: missing post id"))?;
    let comment_listing =
        ListingEnvelope::deserialize(&payload[1]).context("reddit: decode comment listing")?;

    let post_fullname = format!("t3_{}", post.id);
    let mut records = Vec::new();
    for thing in comment_listing.data.children {
        if thing.kind != "t1" {
            continue;
        }
        collect_comment(thing.data, &post_fullname, 0, &mut records);
    }

    Ok(CommentsSnapshot {
        records,
        title: post.title,
    })
}

fn collect_comment(raw: Value, post_fullname: &str, depth: usize, out: &mut Vec<CommentRecord>) {
    let Ok(comment) = CommentData::deserialize(raw) else {
        return;
    };
    if REMOVED_BODIES.contains(&comment.body.as_str()) {
        return;
    }
    if depth == 0 && comment.parent_id != post_fullname {
        return;
    }

    let parent_id = if comment.parent_id.starts_with("t3_") {
        String::new()
    } else {
        comment
            .parent_id
            .strip_prefix("t1_")
            .unwrap_or(&comment.parent_id)
            .to_string()
    };
    let author = if comment.author.is_empty() {
        DELETED_AUTHOR.to_string()
    } else {
        comment.author
    };
    out.push(CommentRecord {
        id: comment.id,
        author,
        body: comment.body,
        created_utc: comment.created_utc,
        score: comment.score,
        parent_id,
        order: out.len(),
    });

    // "replies" is an empty string when there are none.
    let Ok(replies) = ListingEnvelope::deserialize(&comment.replies) else {
        return;
    };
    for child in replies.data.children {
        if child.kind != "t1" {
            continue;
        }
        collect_comment(child.data, post_fullname, depth + 1, out);
    }
}

pub fn normalize_permalink(input: &str) -> Result<String, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    // "reddit.com/r/..." pasted without a scheme
    let host_first = !trimmed.starts_with('/')
        && trimmed
            .split('/')
            .next()
            .is_some_and(|segment| segment.contains('.'));
    let with_scheme;
    let trimmed = if host_first {
        with_scheme = format!("https://{trimmed}");
        with_scheme.as_str()
    } else {
        trimmed
    };

    let path = if trimmed.starts_with("http") {
        Url::parse(trimmed)
            .map_err(|err| UrlError::Parse(err.to_string()))?
            .path()
            .to_string()
    } else {
        trimmed.to_string()
    };

    let path = path.strip_suffix(".json").unwrap_or(&path);
    let path = path.trim_end_matches('/');
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("/{path}"))
    }
}

pub fn extract_thread_id(permalink: &str) -> Option<String> {
    let parts: Vec<&str> = permalink.trim_matches('/').split('/').collect();
    match parts.as_slice() {
        ["r", _, "comments", id, ..] if !id.is_empty() => Some((*id).to_string()),
        _ => None,
    }
}

pub fn format_timestamp(ts: f64) -> String {
    if ts == 0.0 {
        return String::new();
    }
    match Local.timestamp_opt(ts as i64, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => String::new(),
    }
}

fn now_utc() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(id: &str, parent: &str, body: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "author": format!("user_{id}"),
                "body": body,
                "created_utc": 0.0,
                "score": 3,
                "parent_id": parent,
                "replies": replies,
            }
        })
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({ "kind": "Listing", "data": { "children": children } })
    }

    fn post_listing() -> Value {
        listing(vec![json!({
            "kind": "t3",
            "data": { "id": "abc", "title": "Match Thread: A vs B", "permalink": "/r/soccer/comments/abc/x/" }
        })])
    }

    #[test]
    fn snapshot_flattens_depth_first() {
        let nested = listing(vec![comment("c2", "t1_c1", "child", json!(""))]);
        let payload = vec![
            post_listing(),
            listing(vec![
                comment("c1", "t3_abc", "root", nested),
                comment("c3", "t3_abc", "second root", json!("")),
            ]),
        ];
        let snapshot = snapshot_from_payload(&payload).unwrap();
        assert_eq!(snapshot.title, "Match Thread: A vs B");
        let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(snapshot.records[0].parent_id, "");
        assert_eq!(snapshot.records[1].parent_id, "c1");
        assert_eq!(snapshot.records[2].order, 2);
    }

    #[test]
    fn snapshot_skips_removed_more_and_malformed() {
        let payload = vec![
            post_listing(),
            listing(vec![
                comment("gone", "t3_abc", "[removed]", json!("")),
                json!({ "kind": "more", "data": { "count": 10 } }),
                json!({ "kind": "t1", "data": { "body": "no id" } }),
                comment("stray", "t3_other", "wrong post", json!("")),
                comment("ok", "t3_abc", "kept", json!("")),
            ]),
        ];
        let snapshot = snapshot_from_payload(&payload).unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].id, "ok");
        assert_eq!(snapshot.records[0].order, 0);
    }

    #[test]
    fn snapshot_defaults_empty_author() {
        let mut raw = comment("c1", "t3_abc", "hi", json!(""));
        raw["data"]["author"] = json!("");
        let payload = vec![post_listing(), listing(vec![raw])];
        let snapshot = snapshot_from_payload(&payload).unwrap();
        assert_eq!(snapshot.records[0].author, "[deleted]");
    }

    #[test]
    fn snapshot_requires_two_listings() {
        assert!(snapshot_from_payload(&[post_listing()]).is_err());
    }

    #[test]
    fn search_filters_by_age_and_title() {
        let query = ThreadQuery {
            kind: "soccer_match".into(),
            subreddit: "soccer".into(),
            max_age_hours: 6,
            limit: 50,
            title_must_contain: vec!["match thread".into()],
            title_must_not_contain: vec!["Post Match".into()],
            ..ThreadQuery::default()
        };
        let now = 100_000.0;
        let payload = listing(vec![
            json!({ "kind": "t3", "data": { "id": "1", "title": "Match Thread: X", "permalink": "/r/soccer/comments/1/", "created_utc": now - 60.0 } }),
            json!({ "kind": "t3", "data": { "id": "2", "title": "Post Match Thread: X", "permalink": "/r/soccer/comments/2/", "created_utc": now - 60.0 } }),
            json!({ "kind": "t3", "data": { "id": "3", "title": "Match Thread: Old", "permalink": "/r/soccer/comments/3/", "created_utc": now - 7.0 * 3600.0 } }),
            json!({ "kind": "t1", "data": { "id": "4" } }),
        ]);
        let threads = threads_from_search(&payload, &query, now);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id, "1");
        assert_eq!(threads[0].kind, "soccer_match");
    }

    #[test]
    fn normalizes_urls_and_paths() {
        assert_eq!(
            normalize_permalink("https://www.reddit.com/r/nfl/comments/xyz/game_thread/").unwrap(),
            "/r/nfl/comments/xyz/game_thread"
        );
        assert_eq!(
            normalize_permalink("r/nfl/comments/xyz.json").unwrap(),
            "/r/nfl/comments/xyz"
        );
        assert_eq!(
            normalize_permalink("old.reddit.com/r/soccer/comments/abc/derby/").unwrap(),
            "/r/soccer/comments/abc/derby"
        );
        assert_eq!(normalize_permalink("   "), Err(UrlError::Empty));
    }

    #[test]
    fn extracts_thread_ids() {
        assert_eq!(
            extract_thread_id("/r/nfl/comments/xyz/game_thread"),
            Some("xyz".to_string())
        );
        assert_eq!(extract_thread_id("/user/someone"), None);
    }

    #[test]
    fn zero_timestamp_formats_empty() {
        assert_eq!(format_timestamp(0.0), "");
        assert_eq!(format_timestamp(1_700_000_000.0).len(), 19);
    }
}
