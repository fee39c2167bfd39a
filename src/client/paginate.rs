use futures::Stream;
use log::debug;
use serde_json::{json, Value};

use crate::endpoints::Operation;
use crate::error::Result;

use super::Client;

/// Fired once per fetched page
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub fetched: usize,
    pub limit: Option<usize>,
}

/// One page of a cursored timeline. A null cursor marks the end
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

type ExtractFn<T> = Box<dyn Fn(&Value) -> Vec<T> + Send + Sync>;
type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;

/// A lazy, restartable walk over an opaque-cursor timeline. Strictly
/// sequential per instance: the next page is only requested once the
/// previous page's cursor is known. Independent instances carry their
/// own cursor state and never interfere
pub struct Paginator<'a, T> {
    client: &'a Client,
    operation: Operation,
    variables: Value,
    extract: ExtractFn<T>,
    cursor: Option<String>,
    limit: Option<usize>,
    fetched: usize,
    done: bool,
    authenticated: Option<bool>,
    on_progress: Option<ProgressFn>,
}

impl<'a, T> Paginator<'a, T> {
    pub fn new(
        client: &'a Client,
        operation: Operation,
        variables: Value,
        extract: ExtractFn<T>,
    ) -> Self {
        Self {
            client,
            operation,
            variables,
            extract,
            cursor: None,
            limit: None,
            fetched: 0,
            done: false,
            authenticated: None,
            on_progress: None,
        }
    }

    /// Stop once this many items have been fetched. The final page is
    /// still yielded whole; [`Paginator::collect`] truncates
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume from a cursor captured in an earlier walk
    pub fn with_cursor(mut self, cursor: &str) -> Self {
        self.cursor = Some(cursor.to_owned());
        self
    }

    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = Some(authenticated);
        self
    }

    pub fn on_progress(mut self, callback: ProgressFn) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Fetch the next page, or None once the timeline is exhausted or
    /// the limit has been met
    pub async fn next_page(&mut self) -> Result<Option<Page<T>>> {
        if self.done {
            return Ok(None);
        }
        let mut variables = self.variables.clone();
        if let Some(cursor) = &self.cursor {
            variables["cursor"] = json!(cursor);
        }
        let response = self
            .client
            .graphql(self.operation, variables, self.authenticated)
            .await?;
        let items = (self.extract)(&response.data);
        self.fetched += items.len();
        if let Some(callback) = &self.on_progress {
            callback(Progress {
                fetched: self.fetched,
                limit: self.limit,
            });
        }
        let stalled = items.is_empty() && response.cursor == self.cursor;
        if stalled {
            debug!("{} returned an empty page with an unchanged cursor", self.operation);
        }
        if response.cursor.is_none() || stalled {
            self.done = true;
        }
        if let Some(limit) = self.limit {
            if self.fetched >= limit {
                self.done = true;
            }
        }
        self.cursor = response.cursor.clone();
        Ok(Some(Page {
            items,
            cursor: response.cursor,
        }))
    }

    /// Drain the remaining pages into one list, truncated to the limit
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page.items);
        }
        if let Some(limit) = self.limit {
            all.truncate(limit);
        }
        Ok(all)
    }

    /// Adapt the walk into a stream of pages
    pub fn into_stream(self) -> impl Stream<Item = Result<Page<T>>> + 'a
    where
        T: 'a,
    {
        futures::stream::unfold(self, |mut paginator| async move {
            match paginator.next_page().await {
                Ok(Some(page)) => Some((Ok(page), paginator)),
                Ok(None) => None,
                Err(error) => {
                    paginator.done = true;
                    Some((Err(error), paginator))
                }
            }
        })
    }
}
