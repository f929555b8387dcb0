use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread;

use crate::pane::PaneId;
use crate::reddit::{self, CommentsSnapshot, Thread, ThreadQuery};
use crate::session::{FetchOutcome, FetchRequest};

pub trait ThreadService: Send + Sync {
    fn find_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>>;
    fn resolve_url(&self, input: &str) -> Result<Thread>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, permalink: &str) -> Result<CommentsSnapshot>;
}

pub struct RedditThreadService {
    client: Arc<reddit::Client>,
}

impl RedditThreadService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl ThreadService for RedditThreadService {
    fn find_threads(&self, query: &ThreadQuery) -> Result<Vec<Thread>> {
        self.client
            .find_threads(query)
            .with_context(|| format!("search r/{}", query.subreddit))
    }

    fn resolve_url(&self, input: &str) -> Result<Thread> {
        self.client.thread_from_url(input)
    }
}

pub struct RedditCommentService {
    client: Arc<reddit::Client>,
}

impl RedditCommentService {
    pub fn new(client: Arc<reddit::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for RedditCommentService {
    fn load_comments(&self, permalink: &str) -> Result<CommentsSnapshot> {
        self.client.comments(permalink).context("fetch comments")
    }
}

/// A fetch result addressed to the pane whose session asked for it.
pub struct Response {
    pub pane: PaneId,
    pub outcome: FetchOutcome,
}

/// Runs fetch requests on worker threads and posts the outcome back to the
/// UI loop. Dropping the receiving end simply discards late results.
#[derive(Clone)]
pub struct Dispatcher {
    threads: Arc<dyn ThreadService>,
    comments: Arc<dyn CommentService>,
    tx: Sender<Response>,
}

impl Dispatcher {
    pub fn new(
        threads: Arc<dyn ThreadService>,
        comments: Arc<dyn CommentService>,
        tx: Sender<Response>,
    ) -> Self {
        Self {
            threads,
            comments,
            tx,
        }
    }

    pub fn dispatch(&self, pane: PaneId, request: FetchRequest) {
        let threads = Arc::clone(&self.threads);
        let comments = Arc::clone(&self.comments);
        let tx = self.tx.clone();
        tracing::debug!(pane, request_id = request.request_id(), "dispatching fetch");
        thread::spawn(move || {
            let outcome = execute(threads.as_ref(), comments.as_ref(), request);
            if tx.send(Response { pane, outcome }).is_err() {
                tracing::debug!(pane, "ui loop gone; dropping fetch result");
            }
        });
    }
}

fn execute(
    threads: &dyn ThreadService,
    comments: &dyn CommentService,
    request: FetchRequest,
) -> FetchOutcome {
    match request {
        FetchRequest::FindThreads { request_id, query } => FetchOutcome::Threads {
            request_id,
            result: threads.find_threads(&query),
        },
        FetchRequest::FetchComments {
            request_id,
            permalink,
        } => FetchOutcome::Comments {
            request_id,
            result: comments.load_comments(&permalink),
        },
        FetchRequest::ResolveUrl { request_id, input } => FetchOutcome::Resolved {
            request_id,
            result: threads.resolve_url(&input),
        },
    }
}
