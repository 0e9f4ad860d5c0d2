//! Crawl frontier and visited set
//!
//! The frontier is a priority queue of pending requests guarded by the
//! visited set. Insertion is an atomic check-and-insert, so any number of
//! workers may push derived requests concurrently without a URL ever being
//! enqueued twice.

use crate::storage::{FrontierRecord, FrontierSnapshot};
use crate::url::NormalizedUrl;
use crate::FolioError;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A unit of work for the crawler
///
/// Requests are immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: NormalizedUrl,
    /// Higher values are dispatched first
    pub priority: i32,
    /// Link distance from a seed
    pub depth: u32,
    pub parent_url: Option<NormalizedUrl>,
    /// Page type the request is expected to be, used during classification
    pub page_type_hint: Option<String>,
}

impl Request {
    /// Creates a seed request at depth 0
    pub fn seed(url: NormalizedUrl, priority: i32) -> Self {
        Self {
            url,
            priority,
            depth: 0,
            parent_url: None,
            page_type_hint: None,
        }
    }

    /// Attaches a page-type hint
    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.page_type_hint = hint;
        self
    }

    /// Creates a request for a link found on `parent`
    pub fn derived(parent: &Request, url: NormalizedUrl, priority: i32) -> Self {
        Self {
            url,
            priority,
            depth: parent.depth + 1,
            parent_url: Some(parent.url.clone()),
            page_type_hint: None,
        }
    }
}

/// A request waiting in the queue
#[derive(Debug, Clone)]
struct QueuedRequest {
    request: Request,
    sequence: u64,
    enqueued_at: DateTime<Utc>,
}

impl QueuedRequest {
    fn to_record(&self) -> FrontierRecord {
        FrontierRecord {
            url: self.request.url.as_str().to_string(),
            priority: self.request.priority,
            depth: self.request.depth,
            parent_url: self
                .request
                .parent_url
                .as_ref()
                .map(|u| u.as_str().to_string()),
            page_type_hint: self.request.page_type_hint.clone(),
            enqueued_at: self.enqueued_at,
            sequence: self.sequence,
        }
    }

    fn from_record(record: FrontierRecord) -> Result<Self, FolioError> {
        let url = parse_stored(&record.url)?;
        let parent_url = record.parent_url.as_deref().map(parse_stored).transpose()?;

        Ok(Self {
            request: Request {
                url,
                priority: record.priority,
                depth: record.depth,
                parent_url,
                page_type_hint: record.page_type_hint,
            },
            sequence: record.sequence,
            enqueued_at: record.enqueued_at,
        })
    }
}

// Higher priority pops first; among equal priorities the earlier sequence wins
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedRequest {}

#[derive(Debug, Default)]
struct FrontierInner {
    queue: BinaryHeap<QueuedRequest>,
    visited: HashSet<NormalizedUrl>,
    /// Popped but not yet completed, kept so snapshots never lose them
    in_flight: HashMap<NormalizedUrl, QueuedRequest>,
    next_sequence: u64,
}

/// Priority queue of pending requests backed by the visited set
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    max_depth: Option<u32>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `max_depth` - Requests deeper than this are rejected on push
    pub fn new(max_depth: Option<u32>) -> Self {
        Self {
            inner: Mutex::new(FrontierInner::default()),
            max_depth,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a request unless its URL was seen before
    ///
    /// # Returns
    ///
    /// * `true` - The request was added to the visited set and the queue
    /// * `false` - The URL is already known or the request is too deep; nothing changed
    pub fn push(&self, request: Request) -> bool {
        if let Some(max) = self.max_depth {
            if request.depth > max {
                tracing::trace!("Rejecting {} at depth {}", request.url, request.depth);
                return false;
            }
        }

        let mut inner = self.lock();
        if !inner.visited.insert(request.url.clone()) {
            return false;
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.queue.push(QueuedRequest {
            request,
            sequence,
            enqueued_at: Utc::now(),
        });
        true
    }

    /// Removes the highest-priority request
    ///
    /// The request stays tracked as in flight until [`Frontier::complete`]
    /// is called for it.
    pub fn pop(&self) -> Option<Request> {
        let mut inner = self.lock();
        let queued = inner.queue.pop()?;
        let request = queued.request.clone();
        inner.in_flight.insert(request.url.clone(), queued);
        Some(request)
    }

    /// Marks a popped request as finished
    pub fn complete(&self, url: &NormalizedUrl) {
        self.lock().in_flight.remove(url);
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Number of URLs ever enqueued
    pub fn visited_len(&self) -> usize {
        self.lock().visited.len()
    }

    /// Checks if a URL has been enqueued or dispatched
    pub fn contains(&self, url: &NormalizedUrl) -> bool {
        self.lock().visited.contains(url)
    }

    /// Requests currently queued, in dispatch order
    pub fn pending(&self) -> Vec<Request> {
        let inner = self.lock();
        let mut queued: Vec<&QueuedRequest> = inner.queue.iter().collect();
        queued.sort_by(|a, b| b.cmp(a));
        queued.into_iter().map(|q| q.request.clone()).collect()
    }

    /// Captures the queue and visited set
    ///
    /// In-flight requests are written as pending so that a crash before
    /// they finish re-dispatches them on resume.
    pub fn snapshot(&self) -> FrontierSnapshot {
        let inner = self.lock();

        let mut pending: Vec<FrontierRecord> = inner
            .queue
            .iter()
            .chain(inner.in_flight.values())
            .map(QueuedRequest::to_record)
            .collect();
        pending.sort_by_key(|r| r.sequence);

        let mut visited: Vec<String> = inner
            .visited
            .iter()
            .map(|u| u.as_str().to_string())
            .collect();
        visited.sort();

        FrontierSnapshot { pending, visited }
    }

    /// Replaces the frontier's contents with a persisted snapshot
    ///
    /// Every stored URL must already be in normalized form; anything else
    /// means the snapshot was damaged and nothing is restored.
    pub fn restore(&self, snapshot: FrontierSnapshot) -> Result<(), FolioError> {
        let mut visited = HashSet::with_capacity(snapshot.visited.len());
        for url in &snapshot.visited {
            visited.insert(parse_stored(url)?);
        }

        let mut queue = BinaryHeap::with_capacity(snapshot.pending.len());
        let mut next_sequence = 0;
        for record in snapshot.pending {
            let queued = QueuedRequest::from_record(record)?;
            next_sequence = next_sequence.max(queued.sequence + 1);
            visited.insert(queued.request.url.clone());
            queue.push(queued);
        }

        let mut inner = self.lock();
        *inner = FrontierInner {
            queue,
            visited,
            in_flight: HashMap::new(),
            next_sequence,
        };
        Ok(())
    }
}

fn parse_stored(url: &str) -> Result<NormalizedUrl, FolioError> {
    NormalizedUrl::parse_normalized(url)
        .map_err(|e| FolioError::PersistenceCorruption(format!("stored URL rejected: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::normalize;
    use std::sync::Arc;

    fn request(path: &str, priority: i32) -> Request {
        let url = normalize(&format!("http://books.toscrape.com/{}", path), None).unwrap();
        Request::seed(url, priority)
    }

    #[test]
    fn test_push_twice_keeps_one_entry() {
        let frontier = Frontier::new(None);
        assert!(frontier.push(request("a", 0)));
        assert!(!frontier.push(request("a", 5)));

        assert_eq!(frontier.visited_len(), 1);
        assert_eq!(frontier.len(), 1);
        assert!(frontier.pop().is_some());
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_priority_then_fifo() {
        let frontier = Frontier::new(None);
        frontier.push(request("first", 5));
        frontier.push(request("pager", 10));
        frontier.push(request("second", 5));

        let order: Vec<String> = std::iter::from_fn(|| frontier.pop())
            .map(|r| r.url.as_str().to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "http://books.toscrape.com/pager",
                "http://books.toscrape.com/first",
                "http://books.toscrape.com/second",
            ]
        );
    }

    #[test]
    fn test_popped_url_is_never_reenqueued() {
        let frontier = Frontier::new(None);
        frontier.push(request("a", 0));
        let popped = frontier.pop().unwrap();
        frontier.complete(&popped.url);

        assert!(!frontier.push(request("a", 0)));
        assert!(frontier.is_empty());
    }

    #[test]
    fn test_max_depth_rejection() {
        let frontier = Frontier::new(Some(1));
        let root = request("", 0);
        let child = Request::derived(&root, request("child", 0).url, 0);
        let grandchild = Request::derived(&child, request("grandchild", 0).url, 0);

        assert!(frontier.push(root));
        assert!(frontier.push(child));
        assert!(!frontier.push(grandchild.clone()));
        assert!(!frontier.contains(&grandchild.url));
        assert_eq!(frontier.len(), 2);
    }

    #[test]
    fn test_derived_request_fields() {
        let parent = request("catalogue/page-1.html", 0);
        let child = Request::derived(&parent, request("catalogue/page-2.html", 0).url, 10)
            .with_hint(Some("listing".to_string()));

        assert_eq!(child.depth, 1);
        assert_eq!(child.priority, 10);
        assert_eq!(child.parent_url.as_ref(), Some(&parent.url));
        assert_eq!(child.page_type_hint.as_deref(), Some("listing"));
    }

    #[test]
    fn test_concurrent_push_is_atomic() {
        let frontier = Arc::new(Frontier::new(None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| frontier.push(request(&format!("p{}", i), 0)))
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 100);
        assert_eq!(frontier.len(), 100);
    }

    #[test]
    fn test_snapshot_includes_in_flight() {
        let frontier = Frontier::new(None);
        frontier.push(request("a", 1));
        frontier.push(request("b", 0));
        let in_flight = frontier.pop().unwrap();
        assert_eq!(in_flight.url.as_str(), "http://books.toscrape.com/a");

        let snapshot = frontier.snapshot();
        assert_eq!(snapshot.pending.len(), 2);
        assert_eq!(snapshot.visited.len(), 2);

        frontier.complete(&in_flight.url);
        assert_eq!(frontier.snapshot().pending.len(), 1);
    }

    #[test]
    fn test_restore_preserves_order_and_dedup() {
        let original = Frontier::new(None);
        original.push(request("low", 0));
        original.push(request("high", 10));
        original.push(request("low2", 0));
        let done = original.pop().unwrap();
        original.complete(&done.url);

        let restored = Frontier::new(None);
        restored.restore(original.snapshot()).unwrap();

        assert_eq!(restored.visited_len(), 3);
        assert!(!restored.push(request("high", 10)));
        assert!(restored.push(request("new", 0)));

        let order: Vec<String> = std::iter::from_fn(|| restored.pop())
            .map(|r| r.url.as_str().to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "http://books.toscrape.com/low",
                "http://books.toscrape.com/low2",
                "http://books.toscrape.com/new",
            ]
        );
    }

    #[test]
    fn test_restore_rejects_unnormalized_url() {
        let frontier = Frontier::new(None);
        let snapshot = FrontierSnapshot {
            pending: vec![],
            visited: vec!["HTTP://Books.toscrape.com/#frag".to_string()],
        };

        let result = frontier.restore(snapshot);
        assert!(matches!(result, Err(FolioError::PersistenceCorruption(_))));
        assert_eq!(frontier.visited_len(), 0);
    }

    #[test]
    fn test_pending_lists_dispatch_order() {
        let frontier = Frontier::new(None);
        frontier.push(request("a", 0));
        frontier.push(request("b", 10));
        let pending: Vec<i32> = frontier.pending().iter().map(|r| r.priority).collect();
        assert_eq!(pending, vec![10, 0]);
    }
}
