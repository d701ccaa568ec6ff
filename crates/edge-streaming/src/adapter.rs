//! Normalizes render engine output into a uniform chunk sequence.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};

use crate::chunk::{BoundaryId, ContentChunk, RenderError};
use crate::markers::{partial_marker_len, split_markers};

/// Shared cancellation flag between the assembler and the render engine.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to abandon the render.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Chunks produced by a render engine plus the handle to cancel it.
pub struct RenderSource<S> {
    pub chunks: S,
    pub cancel: CancelHandle,
}

impl<S> RenderSource<S>
where
    S: Stream<Item = ContentChunk> + Unpin,
{
    pub fn new(chunks: S, cancel: CancelHandle) -> Self {
        Self { chunks, cancel }
    }
}

impl RenderSource<BoxStream<'static, ContentChunk>> {
    /// Source over a fixed list of chunks.
    pub fn from_chunks(chunks: Vec<ContentChunk>) -> Self {
        Self {
            chunks: stream::iter(chunks).boxed(),
            cancel: CancelHandle::new(),
        }
    }
}

#[derive(Debug)]
enum BoundaryState {
    /// Fallback seen, waiting for resolution. Holds the fallback markup.
    Pending(String),
    /// Resolved or failed.
    Settled,
}

#[derive(Debug)]
enum Slot {
    Ready(ContentChunk),
    /// Suppressed fallback waiting for its boundary to settle.
    Held(BoundaryId),
}

/// Lazy, finite, non-restartable sequence of `ContentChunk`s.
///
/// Guarantees exactly one terminal chunk (`Done` or stream-level `Failed`),
/// after which it yields `None` forever. With fallback suppression enabled
/// (blocking delivery) no `Fallback` chunk is emitted for a boundary that
/// settles; its `Resolved` or boundary `Failed` chunk is yielded at the
/// fallback's source position instead.
pub struct RenderStreamAdapter<S> {
    upstream: S,
    cancel: CancelHandle,
    suppress_fallback: bool,
    boundaries: HashMap<BoundaryId, BoundaryState>,
    queue: VecDeque<Slot>,
    /// Markup tail that may be the start of a marker split across chunks.
    carry: String,
    upstream_done: bool,
    terminal_queued: bool,
    finished: bool,
}

impl<S> RenderStreamAdapter<S>
where
    S: Stream<Item = ContentChunk> + Unpin,
{
    /// Wrap a render source.
    pub fn new(source: RenderSource<S>) -> Self {
        Self {
            upstream: source.chunks,
            cancel: source.cancel,
            suppress_fallback: false,
            boundaries: HashMap::new(),
            queue: VecDeque::new(),
            carry: String::new(),
            upstream_done: false,
            terminal_queued: false,
            finished: false,
        }
    }

    /// Enable or disable fallback suppression.
    pub fn suppress_fallback(mut self, suppress: bool) -> Self {
        self.suppress_fallback = suppress;
        self
    }

    /// Check if fallbacks are suppressed.
    pub fn is_suppressing(&self) -> bool {
        self.suppress_fallback
    }

    /// Check if the terminal chunk has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Cancellation handle shared with the engine.
    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Abandon the render: signal the engine and end the sequence.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.queue.clear();
        self.carry.clear();
        self.upstream_done = true;
        self.finished = true;
    }

    /// Yield the next chunk.
    ///
    /// Cancel-safe: every chunk pulled from upstream is recorded before the
    /// next await point.
    pub async fn next_chunk(&mut self) -> Option<ContentChunk> {
        loop {
            if self.finished {
                return None;
            }

            match self.queue.front() {
                Some(Slot::Ready(_)) => {
                    if let Some(Slot::Ready(chunk)) = self.queue.pop_front() {
                        if chunk.is_terminal() {
                            self.finished = true;
                        }
                        return Some(chunk);
                    }
                }
                Some(Slot::Held(_)) if self.upstream_done => self.release_held(),
                _ if self.upstream_done => {
                    if self.terminal_queued {
                        self.finished = true;
                        return None;
                    }
                    self.push_terminal(ContentChunk::failed(RenderError::Incomplete));
                }
                _ => match self.upstream.next().await {
                    Some(chunk) => self.accept(chunk),
                    None => {
                        self.flush_carry();
                        self.upstream_done = true;
                        if !self.terminal_queued {
                            tracing::warn!("render stream ended without a terminal event");
                            self.push_terminal(ContentChunk::failed(RenderError::Incomplete));
                        }
                    }
                },
            }
        }
    }

    /// Turn the adapter into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = ContentChunk> {
        stream::unfold(self, |mut adapter| async move {
            adapter.next_chunk().await.map(|chunk| (chunk, adapter))
        })
    }

    fn accept(&mut self, chunk: ContentChunk) {
        if !matches!(chunk, ContentChunk::Html(_)) {
            self.flush_carry();
        }
        match chunk {
            ContentChunk::Html(html) => self.accept_html(html),
            ContentChunk::Marker(_) => self.queue.push_back(Slot::Ready(chunk)),
            ContentChunk::Fallback { boundary, html } => self.accept_fallback(boundary, html),
            ContentChunk::Resolved { boundary, html } => self.accept_resolved(boundary, html),
            ContentChunk::Failed {
                boundary: Some(boundary),
                error,
            } if error.is_boundary_local() => self.accept_boundary_failure(boundary, error),
            ContentChunk::Failed { boundary, error } => {
                if let Some(boundary) = boundary {
                    tracing::debug!(%boundary, %error, "signal escaped boundary");
                }
                self.push_terminal(ContentChunk::failed(error));
                self.upstream_done = true;
            }
            ContentChunk::Done => {
                self.push_terminal(ContentChunk::Done);
                self.upstream_done = true;
            }
        }
    }

    fn accept_html(&mut self, html: String) {
        let mut html = std::mem::take(&mut self.carry) + &html;
        let keep = partial_marker_len(&html);
        self.carry = html.split_off(html.len() - keep);
        for part in split_markers(&html) {
            self.queue.push_back(Slot::Ready(part));
        }
    }

    /// Held markup turned out not to start a marker.
    fn flush_carry(&mut self) {
        if !self.carry.is_empty() {
            let html = std::mem::take(&mut self.carry);
            self.queue.push_back(Slot::Ready(ContentChunk::Html(html)));
        }
    }

    fn accept_fallback(&mut self, boundary: BoundaryId, html: String) {
        if self.boundaries.contains_key(&boundary) {
            tracing::warn!(%boundary, "duplicate fallback dropped");
            return;
        }

        self.boundaries
            .insert(boundary.clone(), BoundaryState::Pending(html.clone()));
        if self.suppress_fallback {
            self.queue.push_back(Slot::Held(boundary));
        } else {
            self.queue
                .push_back(Slot::Ready(ContentChunk::Fallback { boundary, html }));
        }
    }

    fn accept_resolved(&mut self, boundary: BoundaryId, html: String) {
        match self.boundaries.get(&boundary) {
            Some(BoundaryState::Pending(_)) => {
                self.boundaries
                    .insert(boundary.clone(), BoundaryState::Settled);
                self.settle(ContentChunk::Resolved { boundary, html });
            }
            Some(BoundaryState::Settled) => {
                tracing::warn!(%boundary, "boundary already settled, resolution dropped");
            }
            None => {
                // Never suspended: the content is simply inline.
                self.boundaries.insert(boundary, BoundaryState::Settled);
                self.queue.push_back(Slot::Ready(ContentChunk::Html(html)));
            }
        }
    }

    fn accept_boundary_failure(&mut self, boundary: BoundaryId, error: RenderError) {
        match self.boundaries.get(&boundary) {
            Some(BoundaryState::Settled) => {
                tracing::warn!(%boundary, "boundary already settled, failure dropped");
            }
            Some(BoundaryState::Pending(_)) => {
                self.boundaries
                    .insert(boundary.clone(), BoundaryState::Settled);
                self.settle(ContentChunk::Failed {
                    boundary: Some(boundary),
                    error,
                });
            }
            None => {
                self.boundaries
                    .insert(boundary.clone(), BoundaryState::Settled);
                self.queue.push_back(Slot::Ready(ContentChunk::Failed {
                    boundary: Some(boundary),
                    error,
                }));
            }
        }
    }

    /// Place a settling chunk: in the held slot when suppressing, at the
    /// end of the queue otherwise.
    fn settle(&mut self, chunk: ContentChunk) {
        if self.suppress_fallback {
            let target = chunk.boundary().cloned();
            let held = self
                .queue
                .iter_mut()
                .find(|slot| matches!(slot, Slot::Held(id) if Some(id) == target.as_ref()));
            if let Some(slot) = held {
                *slot = Slot::Ready(chunk);
                return;
            }
        }
        self.queue.push_back(Slot::Ready(chunk));
    }

    /// Upstream ended with boundaries still suspended: their fallback is
    /// the only chunk they will ever produce.
    fn release_held(&mut self) {
        for slot in self.queue.iter_mut() {
            if let Slot::Held(boundary) = slot {
                let html = match self.boundaries.get(boundary) {
                    Some(BoundaryState::Pending(html)) => html.clone(),
                    _ => String::new(),
                };
                tracing::debug!(%boundary, "boundary abandoned, keeping fallback");
                *slot = Slot::Ready(ContentChunk::Fallback {
                    boundary: boundary.clone(),
                    html,
                });
            }
        }
    }

    fn push_terminal(&mut self, chunk: ContentChunk) {
        if self.terminal_queued {
            return;
        }
        self.terminal_queued = true;
        self.queue.push_back(Slot::Ready(chunk));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::InsertionPoint;
    use futures::channel::mpsc;

    async fn collect<S>(mut adapter: RenderStreamAdapter<S>) -> Vec<ContentChunk>
    where
        S: Stream<Item = ContentChunk> + Unpin,
    {
        let mut out = Vec::new();
        while let Some(chunk) = adapter.next_chunk().await {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_streaming_passes_fallbacks_through() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::html("<main>"),
            ContentChunk::fallback("b1", "loading"),
            ContentChunk::html("</main>"),
            ContentChunk::resolved("b1", "<p>data</p>"),
            ContentChunk::Done,
        ]);

        let chunks = collect(RenderStreamAdapter::new(source)).await;
        assert_eq!(
            chunks,
            vec![
                ContentChunk::html("<main>"),
                ContentChunk::fallback("b1", "loading"),
                ContentChunk::html("</main>"),
                ContentChunk::resolved("b1", "<p>data</p>"),
                ContentChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_suppressed_fallback_resolves_in_place() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::html("<main>"),
            ContentChunk::fallback("b1", "loading"),
            ContentChunk::html("</main>"),
            ContentChunk::resolved("b1", "<p>data</p>"),
            ContentChunk::Done,
        ]);

        let adapter = RenderStreamAdapter::new(source).suppress_fallback(true);
        let chunks = collect(adapter).await;
        assert_eq!(
            chunks,
            vec![
                ContentChunk::html("<main>"),
                ContentChunk::resolved("b1", "<p>data</p>"),
                ContentChunk::html("</main>"),
                ContentChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_abandoned_boundary_keeps_only_fallback() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::fallback("b1", "loading"),
            ContentChunk::Done,
            ContentChunk::resolved("b1", "late"),
        ]);

        let chunks = collect(RenderStreamAdapter::new(source).suppress_fallback(true)).await;
        assert_eq!(
            chunks,
            vec![ContentChunk::fallback("b1", "loading"), ContentChunk::Done]
        );
    }

    #[tokio::test]
    async fn test_missing_terminal_becomes_incomplete() {
        let source = RenderSource::from_chunks(vec![ContentChunk::html("<p>")]);

        let chunks = collect(RenderStreamAdapter::new(source)).await;
        assert_eq!(
            chunks,
            vec![
                ContentChunk::html("<p>"),
                ContentChunk::failed(RenderError::Incomplete),
            ]
        );
    }

    #[tokio::test]
    async fn test_not_restartable_after_terminal() {
        let source = RenderSource::from_chunks(vec![ContentChunk::Done, ContentChunk::html("x")]);
        let mut adapter = RenderStreamAdapter::new(source);

        assert_eq!(adapter.next_chunk().await, Some(ContentChunk::Done));
        assert_eq!(adapter.next_chunk().await, None);
        assert_eq!(adapter.next_chunk().await, None);
        assert!(adapter.is_finished());
    }

    #[tokio::test]
    async fn test_navigation_escapes_boundary() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::fallback("b1", "loading"),
            ContentChunk::boundary_failed("b1", RenderError::not_found()),
            ContentChunk::html("never"),
        ]);

        let chunks = collect(RenderStreamAdapter::new(source)).await;
        assert_eq!(
            chunks,
            vec![
                ContentChunk::fallback("b1", "loading"),
                ContentChunk::failed(RenderError::not_found()),
            ]
        );
    }

    #[tokio::test]
    async fn test_boundary_error_stays_local() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::fallback("b1", "loading"),
            ContentChunk::html("<p>sibling</p>"),
            ContentChunk::boundary_failed("b1", RenderError::thrown("boom")),
            ContentChunk::Done,
        ]);

        let chunks = collect(RenderStreamAdapter::new(source).suppress_fallback(true)).await;
        assert_eq!(
            chunks,
            vec![
                ContentChunk::boundary_failed("b1", RenderError::thrown("boom")),
                ContentChunk::html("<p>sibling</p>"),
                ContentChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_resolution_dropped() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::fallback("b1", "loading"),
            ContentChunk::resolved("b1", "first"),
            ContentChunk::resolved("b1", "second"),
            ContentChunk::Done,
        ]);

        let chunks = collect(RenderStreamAdapter::new(source)).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], ContentChunk::resolved("b1", "first"));
    }

    #[tokio::test]
    async fn test_unsuspended_resolution_is_inline() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::resolved("b9", "<p>inline</p>"),
            ContentChunk::Done,
        ]);

        let chunks = collect(RenderStreamAdapter::new(source)).await;
        assert_eq!(chunks[0], ContentChunk::html("<p>inline</p>"));
    }

    #[tokio::test]
    async fn test_markers_split_from_html() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::html("<head><!--edge:head--></head>"),
            ContentChunk::Done,
        ]);

        let chunks = collect(RenderStreamAdapter::new(source)).await;
        assert_eq!(
            chunks,
            vec![
                ContentChunk::html("<head>"),
                ContentChunk::Marker(InsertionPoint::head()),
                ContentChunk::html("</head>"),
                ContentChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_marker_split_across_chunks() {
        let source = RenderSource::from_chunks(vec![
            ContentChunk::html("<head><!--edge:"),
            ContentChunk::html("head--></head><"),
            ContentChunk::fallback("b1", "x"),
            ContentChunk::Done,
        ]);

        let chunks = collect(RenderStreamAdapter::new(source)).await;
        assert_eq!(
            chunks,
            vec![
                ContentChunk::html("<head>"),
                ContentChunk::Marker(InsertionPoint::head()),
                ContentChunk::html("</head>"),
                ContentChunk::html("<"),
                ContentChunk::fallback("b1", "x"),
                ContentChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_signals_engine() {
        let (tx, rx) = mpsc::unbounded();
        let cancel = CancelHandle::new();
        let mut adapter = RenderStreamAdapter::new(RenderSource::new(rx, cancel.clone()));

        tx.unbounded_send(ContentChunk::html("<p>")).unwrap();
        assert_eq!(adapter.next_chunk().await, Some(ContentChunk::html("<p>")));

        adapter.cancel();
        assert!(cancel.is_cancelled());
        assert_eq!(adapter.next_chunk().await, None);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let source = RenderSource::from_chunks(vec![ContentChunk::html("a"), ContentChunk::Done]);
        let chunks: Vec<_> = RenderStreamAdapter::new(source).into_stream().collect().await;
        assert_eq!(chunks, vec![ContentChunk::html("a"), ContentChunk::Done]);
    }
}
