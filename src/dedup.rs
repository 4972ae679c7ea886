/*!
 * Processed-content bookkeeping.
 *
 * The detector may report the same node more than once (the region is swept
 * again after every relocation, and an added subtree can be announced by more
 * than one record). The deduplicator absorbs those repeats: the first call for
 * a node marks it, every later call is refused. Marks of nodes that left the
 * document are dropped by `forget_detached`.
 */

use std::collections::HashSet;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::document::{Document, NodeId, Selector};

/// Side table of content nodes that were already submitted
#[derive(Debug, Clone)]
pub struct Deduplicator {
    processed: Arc<Mutex<HashSet<NodeId>>>,
    ignore: Arc<Vec<Selector>>,
}

impl Deduplicator {
    /// Create a deduplicator that also refuses content inside containers matching `ignore`
    pub fn new(ignore: Vec<Selector>) -> Self {
        Self {
            processed: Arc::new(Mutex::new(HashSet::new())),
            ignore: Arc::new(ignore),
        }
    }

    /// Whether `node` lies inside an ignored container
    pub fn is_ignored(&self, document: &Document, node: NodeId) -> bool {
        self.ignore.iter().any(|selector| document.closest(node, selector).is_some())
    }

    /// Decide whether `node` with `text` should be submitted, marking it if so.
    ///
    /// Check and mark happen under one lock, so two concurrent callers for the
    /// same node cannot both get `true`.
    pub fn should_process(&self, document: &Document, node: NodeId, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        if self.is_ignored(document, node) {
            trace!("Skipping {} inside an ignored container", node);
            return false;
        }

        let newly_marked = self.processed.lock().insert(node);
        if !newly_marked {
            trace!("Skipping {}, already processed", node);
        }
        newly_marked
    }

    pub fn is_processed(&self, node: NodeId) -> bool {
        self.processed.lock().contains(&node)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.lock().len()
    }

    /// Drop the marks of nodes no longer attached to `document`.
    ///
    /// Returns the number of marks removed.
    pub fn forget_detached(&self, document: &Document) -> usize {
        let mut processed = self.processed.lock();
        let before = processed.len();
        processed.retain(|node| document.is_attached(*node));
        before - processed.len()
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
