/*!
 * Writes translation results back into the document.
 *
 * Each content node gets at most one derived node, inserted as its next
 * sibling. Applying again rewrites that node, so the latest payload wins.
 * Applies are buffered and written in one pass per frame; several applies to
 * the same node within a frame collapse into the last one.
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::document::{NodeId, SharedDocument};

/// Attribute carried by every derived node, holding the content node it belongs to
pub const DERIVED_ATTRIBUTE: &str = "data-translation-for";

const RESULT_CLASS: &str = "translation-result";
const ERROR_CLASS: &str = "translation-result translation-error";
const PENDING_CLASS: &str = "translation-result translation-pending";

const WAITING_TEXT: &str = "Rate limit reached, waiting in queue...";

/// What to render for a content node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPayload {
    /// A finished translation and the text it was made from
    Translated { original: String, translation: String },
    /// The translation failed
    Failed { message: String },
    /// The request is waiting on the provider quota
    Waiting,
}

impl RenderPayload {
    fn kind(&self) -> RenderKind {
        match self {
            RenderPayload::Translated { .. } => RenderKind::Translation,
            RenderPayload::Failed { .. } => RenderKind::Error,
            RenderPayload::Waiting => RenderKind::Waiting,
        }
    }
}

/// Kind of the derived node currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Translation,
    Original,
    Error,
    Waiting,
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderKind::Translation => "translation",
            RenderKind::Original => "original",
            RenderKind::Error => "error",
            RenderKind::Waiting => "waiting",
        };
        f.write_str(name)
    }
}

/// The rendered state of one content node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedView {
    pub derived: NodeId,
    pub kind: RenderKind,
    pub text: String,
}

#[derive(Debug)]
struct Rendered {
    derived: NodeId,
    payload: RenderPayload,
    showing_original: bool,
}

impl Rendered {
    fn visible(&self) -> (RenderKind, String) {
        match &self.payload {
            RenderPayload::Translated { original, .. } if self.showing_original => {
                (RenderKind::Original, original.clone())
            }
            RenderPayload::Translated { translation, .. } => (RenderKind::Translation, translation.clone()),
            RenderPayload::Failed { message } => (RenderKind::Error, format!("Translation failed: {}", message)),
            RenderPayload::Waiting => (RenderKind::Waiting, WAITING_TEXT.to_string()),
        }
    }
}

fn class_for(kind: RenderKind) -> &'static str {
    match kind {
        RenderKind::Translation | RenderKind::Original => RESULT_CLASS,
        RenderKind::Error => ERROR_CLASS,
        RenderKind::Waiting => PENDING_CLASS,
    }
}

/// Frame-batched writer of translation results
#[derive(Debug, Clone)]
pub struct ResultSink {
    document: SharedDocument,
    frame_interval: Duration,
    pending: Arc<Mutex<HashMap<NodeId, RenderPayload>>>,
    rendered: Arc<Mutex<HashMap<NodeId, Rendered>>>,
    flush_scheduled: Arc<AtomicBool>,
    frames: Arc<AtomicUsize>,
}

impl ResultSink {
    pub fn new(document: SharedDocument, frame_interval: Duration) -> Self {
        Self {
            document,
            frame_interval,
            pending: Arc::new(Mutex::new(HashMap::new())),
            rendered: Arc::new(Mutex::new(HashMap::new())),
            flush_scheduled: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue `payload` for `content` and make sure a frame is scheduled
    pub fn apply(&self, content: NodeId, payload: RenderPayload) {
        trace!("Queueing {} render for {}", payload.kind(), content);
        self.pending.lock().insert(content, payload);

        if self.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let sink = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(sink.frame_interval).await;
                    sink.flush_now();
                });
            }
            Err(_) => {
                self.flush_now();
            }
        }
    }

    /// Write every queued payload in one pass.
    ///
    /// Returns the number of content nodes written.
    pub fn flush_now(&self) -> usize {
        self.flush_scheduled.store(false, Ordering::SeqCst);
        let batch: Vec<(NodeId, RenderPayload)> = self.pending.lock().drain().collect();
        if batch.is_empty() {
            return 0;
        }

        let mut written = 0;
        for (content, payload) in batch {
            if self.render(content, payload) {
                written += 1;
            }
        }

        let frame = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Frame {}: wrote {} results", frame, written);
        written
    }

    fn render(&self, content: NodeId, payload: RenderPayload) -> bool {
        let document = &self.document;
        if !document.is_attached(content) {
            debug!("Dropping result for detached {}", content);
            return false;
        }

        let mut rendered = self.rendered.lock();
        let reusable = rendered
            .get(&content)
            .map(|r| r.derived)
            .filter(|derived| document.is_attached(*derived));

        let derived = match reusable {
            Some(derived) => derived,
            None => {
                let derived = document.create_element("div");
                let linked = document
                    .set_attribute(derived, DERIVED_ATTRIBUTE, &content.to_string())
                    .and_then(|_| document.insert_after(content, derived));
                if let Err(e) = linked {
                    debug!("Could not insert result for {}: {}", content, e);
                    return false;
                }
                derived
            }
        };

        let state = Rendered {
            derived,
            payload,
            showing_original: false,
        };
        self.paint(&state);
        rendered.insert(content, state);
        true
    }

    fn paint(&self, state: &Rendered) {
        let (kind, text) = state.visible();
        // The node was checked to exist just before
        let _ = self.document.set_attribute(state.derived, "class", class_for(kind));
        let _ = self.document.set_text(state.derived, &text);
    }

    /// Switch `content` between its translation and its original text.
    ///
    /// Returns the kind now shown, or `None` when there is no translation to toggle.
    pub fn toggle(&self, content: NodeId) -> Option<RenderKind> {
        let mut rendered = self.rendered.lock();
        let state = rendered.get_mut(&content)?;
        if !matches!(state.payload, RenderPayload::Translated { .. }) || !self.document.is_attached(state.derived) {
            return None;
        }

        state.showing_original = !state.showing_original;
        self.paint(state);
        Some(state.visible().0)
    }

    /// What is currently shown for `content`
    pub fn rendered(&self, content: NodeId) -> Option<RenderedView> {
        let rendered = self.rendered.lock();
        let state = rendered.get(&content)?;
        if !self.document.is_attached(state.derived) {
            return None;
        }
        Some(RenderedView {
            derived: state.derived,
            kind: state.visible().0,
            text: self.document.text_content(state.derived),
        })
    }

    /// Content nodes that have a rendered result
    pub fn rendered_contents(&self) -> Vec<NodeId> {
        let mut contents: Vec<NodeId> = self.rendered.lock().keys().copied().collect();
        contents.sort();
        contents
    }

    /// Drop the state of content nodes that left the document.
    ///
    /// Returns the number of entries removed.
    pub fn forget_detached(&self) -> usize {
        let mut rendered = self.rendered.lock();
        let before = rendered.len();
        rendered.retain(|content, _| self.document.is_attached(*content));
        let forgotten = before - rendered.len();
        if forgotten > 0 {
            trace!("Forgot {} detached results", forgotten);
        }
        forgotten
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Presentation passes performed so far
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    /// Payloads waiting for the next frame
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}
