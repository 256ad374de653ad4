use std::collections::{HashSet, VecDeque};

use kvdoc_store::WriteOptions;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::OdmResult;
use crate::session::Session;
use crate::value::DocRef;

/// A document modified as a side effect of saving or deleting another one.
pub(crate) struct Followup {
    pub(crate) doc: Document,
    /// Save it without cascading further.
    pub(crate) endpoint: bool,
}

impl Followup {
    pub(crate) fn cascade(doc: Document) -> Self {
        Self {
            doc,
            endpoint: false,
        }
    }

    pub(crate) fn endpoint(doc: Document) -> Self {
        Self {
            doc,
            endpoint: true,
        }
    }
}

struct Pending {
    doc: Document,
    endpoint: bool,
    depth: usize,
}

/// Breadth-first cascade of followup saves for one top-level call.
///
/// Each document is saved at most once per cascade and the root is never
/// re-entered. Documents already saved in this cascade that get modified
/// again by a later hop have their record rewritten once the queue drains.
pub(crate) struct Cascade {
    root: DocRef,
    visited: HashSet<DocRef>,
    saved: Vec<Document>,
    queue: VecDeque<Pending>,
    max_depth: usize,
}

impl Cascade {
    pub(crate) fn new(root: &Document, max_depth: usize) -> Self {
        let root_ref = root.doc_ref();
        Self {
            visited: HashSet::from([root_ref.clone()]),
            root: root_ref,
            saved: vec![root.clone()],
            queue: VecDeque::new(),
            max_depth,
        }
    }

    /// Queue followups produced by a document `depth - 1` hops from the root.
    pub(crate) fn enqueue(&mut self, followups: Vec<Followup>, depth: usize) {
        if followups.is_empty() {
            return;
        }
        if depth > self.max_depth {
            warn!(
                root = ?self.root,
                depth,
                dropped = followups.len(),
                "cascade depth limit reached, followup saves dropped"
            );
            return;
        }
        self.queue.extend(followups.into_iter().map(|f| Pending {
            doc: f.doc,
            endpoint: f.endpoint,
            depth,
        }));
    }

    pub(crate) fn run(mut self, session: &Session, write: &WriteOptions) -> OdmResult<()> {
        while let Some(pending) = self.queue.pop_front() {
            let doc_ref = pending.doc.doc_ref();
            if !self.visited.insert(doc_ref.clone()) {
                continue;
            }
            debug!(
                root = ?self.root,
                doc = ?doc_ref,
                depth = pending.depth,
                endpoint = pending.endpoint,
                "cascade save"
            );
            let followups = session.save_one(&pending.doc, write, None)?;
            self.saved.push(pending.doc);
            if pending.endpoint {
                if !followups.is_empty() {
                    debug!(
                        doc = ?doc_ref,
                        dropped = followups.len(),
                        "endpoint save, not cascading"
                    );
                }
            } else {
                self.enqueue(followups, pending.depth + 1);
            }
        }
        self.settle(session, write)
    }

    fn settle(&self, session: &Session, write: &WriteOptions) -> OdmResult<()> {
        for doc in &self.saved {
            if doc.is_dirty() && doc.is_saved() {
                debug!(root = ?self.root, doc = ?doc.doc_ref(), "rewriting record after cascade");
                session.rewrite_record(doc, write)?;
            }
        }
        Ok(())
    }
}
