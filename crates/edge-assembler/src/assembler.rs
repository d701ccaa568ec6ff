//! Response assembly.
//!
//! Streaming delivery forwards each chunk as one write and splices metadata
//! at the insertion points, deferring body metadata until it is ready.
//! Blocking delivery buffers the whole document and writes it once.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::pin;

use edge_core::{
    DeliveryMode, EdgeError, ErrorClass, NoopObserver, Region, RequestId, SessionEvent,
    SessionObserver, SessionState,
};
use edge_metadata::MetadataChannel;
use edge_streaming::{
    BoundaryId, ContentChunk, RenderError, RenderSource, RenderStreamAdapter, ResponseSink,
    TransportFrame,
};
use futures::future::{select, Either};
use futures::{Sink, Stream};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};

use crate::config::AssemblerConfig;
use crate::markup;
use crate::outcome::{BodyPolicy, Commit, OutcomeResolver, RenderOutcome};
use crate::session::ResponseSession;

static NOOP_OBSERVER: NoopObserver = NoopObserver;

/// Merges a render stream and a metadata channel into one response.
pub struct ResponseAssembler<'a> {
    config: &'a AssemblerConfig,
    observer: &'a dyn SessionObserver,
}

impl<'a> ResponseAssembler<'a> {
    pub fn new(config: &'a AssemblerConfig) -> Self {
        Self {
            config,
            observer: &NOOP_OBSERVER,
        }
    }

    /// Report terminal events to `observer`.
    pub fn with_observer(mut self, observer: &'a dyn SessionObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Run one session to completion.
    ///
    /// Exactly one terminal event reaches the observer. A client disconnect
    /// cancels the render and is reported as `Aborted`.
    pub async fn assemble<S, T, E>(
        &self,
        request_id: RequestId,
        mode: DeliveryMode,
        source: RenderSource<S>,
        metadata: MetadataChannel,
        sink: ResponseSink<T, E>,
    ) -> Result<ResponseSession, EdgeError>
    where
        S: Stream<Item = ContentChunk> + Unpin,
        T: Sink<TransportFrame, Error = E> + Unpin,
        E: Display,
    {
        let adapter = RenderStreamAdapter::new(source).suppress_fallback(mode.is_blocking());
        let mut run = Run {
            config: self.config,
            session: ResponseSession::new(mode),
            adapter,
            metadata,
            sink,
            held: VecDeque::new(),
        };

        let result = match mode {
            DeliveryMode::Streaming => run.stream().await,
            DeliveryMode::Blocking => run.block().await,
        };

        match result {
            Ok(()) => {
                let event = run
                    .session
                    .outcome()
                    .map(RenderOutcome::event)
                    .unwrap_or(SessionEvent::Success);
                self.report(request_id, &event, &run.session);
                Ok(run.session)
            }
            Err(e) => {
                run.adapter.cancel();
                run.metadata.close();
                run.session.transition(SessionState::Closed);
                let event = if e.is_disconnect() {
                    tracing::debug!(%request_id, error = %e, "client went away");
                    SessionEvent::Aborted
                } else {
                    tracing::error!(%request_id, error = %e, "session failed");
                    SessionEvent::Error {
                        class: ErrorClass::TopLevel,
                        message: e.to_string(),
                    }
                };
                self.report(request_id, &event, &run.session);
                Err(e)
            }
        }
    }

    fn report(&self, request_id: RequestId, event: &SessionEvent, session: &ResponseSession) {
        tracing::debug!(
            %request_id,
            event = event.name(),
            mode = %session.mode(),
            flush_count = session.flush_count(),
            "session closed"
        );
        self.observer
            .on_terminal(event, &session.report(request_id));
    }
}

/// Piece of a buffered blocking document.
enum Piece {
    Html(String),
    Marker(Region),
}

struct Run<'a, S, T, E>
where
    T: Sink<TransportFrame, Error = E> + Unpin,
    E: Display,
{
    config: &'a AssemblerConfig,
    session: ResponseSession,
    adapter: RenderStreamAdapter<S>,
    metadata: MetadataChannel,
    sink: ResponseSink<T, E>,
    /// Chunks pulled while body metadata was pending, in source order.
    held: VecDeque<ContentChunk>,
}

impl<S, T, E> Run<'_, S, T, E>
where
    S: Stream<Item = ContentChunk> + Unpin,
    T: Sink<TransportFrame, Error = E> + Unpin,
    E: Display,
{
    async fn stream(&mut self) -> Result<(), EdgeError> {
        self.session.transition(SessionState::EmittingShell);

        loop {
            if self.session.is_closed() {
                return Ok(());
            }
            if self.session.state() == SessionState::AwaitingMetadata {
                self.await_metadata().await?;
                continue;
            }

            let chunk = match self.held.pop_front() {
                Some(chunk) => chunk,
                None => self.next_chunk().await,
            };
            match chunk {
                ContentChunk::Done => return self.finish_streaming().await,
                ContentChunk::Failed {
                    boundary: None,
                    error,
                } => return self.fail(error).await,
                chunk => self.emit(chunk).await?,
            }
        }
    }

    async fn next_chunk(&mut self) -> ContentChunk {
        match self.adapter.next_chunk().await {
            Some(chunk) => chunk,
            None => ContentChunk::failed(RenderError::Incomplete),
        }
    }

    /// Body marker passed before body metadata was ready: keep pulling
    /// content into `held` while waiting on the metadata feed.
    async fn await_metadata(&mut self) -> Result<(), EdgeError> {
        self.metadata.drain_ready();
        if self.metadata.is_ready(Region::Body) {
            return self.splice_deferred().await;
        }
        if self.held.back().is_some_and(ContentChunk::is_terminal) {
            self.metadata.wait_ready(Region::Body).await;
            return self.splice_deferred().await;
        }

        let pulled = {
            let chunk = pin!(self.adapter.next_chunk());
            let event = pin!(self.metadata.recv());
            match select(chunk, event).await {
                Either::Left((chunk, _)) => Some(chunk),
                Either::Right(_) => None,
            }
        };
        let Some(chunk) = pulled else {
            return Ok(());
        };

        match chunk.unwrap_or_else(|| ContentChunk::failed(RenderError::Incomplete)) {
            ContentChunk::Failed {
                boundary: None,
                error,
            } => {
                tracing::debug!(%error, "render failed while body metadata was pending");
                self.session.transition(SessionState::Erroring);
                while let Some(chunk) = self.held.pop_front() {
                    self.emit(chunk).await?;
                }
                self.fail(error).await
            }
            chunk => {
                self.held.push_back(chunk);
                Ok(())
            }
        }
    }

    async fn splice_deferred(&mut self) -> Result<(), EdgeError> {
        self.session.transition(SessionState::SplicingMetadata);
        self.session.timing_mut().mark("metadata_ready");
        let html = self.take_metadata(Region::Body)?;
        self.write(html).await?;
        self.session.transition(SessionState::EmittingBody);
        Ok(())
    }

    /// Write a non-terminal chunk.
    async fn emit(&mut self, chunk: ContentChunk) -> Result<(), EdgeError> {
        match chunk {
            ContentChunk::Marker(point) => self.on_marker(point.region()).await,
            chunk => {
                let html = self.render_chunk(chunk);
                self.write(html).await
            }
        }
    }

    async fn on_marker(&mut self, region: Region) -> Result<(), EdgeError> {
        if !self.session.consume_marker(region) {
            tracing::warn!(error = %EdgeError::InsertionPointReused(region), "marker ignored");
            return Ok(());
        }

        self.metadata.drain_ready();
        match region {
            Region::Head => {
                let mut html = self.take_metadata(Region::Head)?;
                if self.metadata.is_ready(Region::Body) {
                    self.session.timing_mut().mark("metadata_ready");
                    html.push_str(&self.take_metadata(Region::Body)?);
                } else {
                    tracing::debug!("body metadata pending at head, deferring");
                }
                self.write(html).await
            }
            Region::Body if self.session.is_emitted(Region::Body) => {
                self.session.transition(SessionState::EmittingBody);
                Ok(())
            }
            Region::Body if self.metadata.is_ready(Region::Body) => self.splice_deferred().await,
            Region::Body => {
                self.session.transition(SessionState::AwaitingMetadata);
                Ok(())
            }
        }
    }

    async fn finish_streaming(&mut self) -> Result<(), EdgeError> {
        if !self.session.is_emitted(Region::Body) {
            self.metadata.wait_ready(Region::Body).await;
            self.session.timing_mut().mark("metadata_ready");
        }
        let mut tail = self.take_metadata(Region::Head)?;
        tail.push_str(&self.take_metadata(Region::Body)?);
        if !tail.is_empty() {
            tracing::debug!("document had no insertion point, appending metadata");
            self.write(tail).await?;
        }

        self.session.set_outcome(RenderOutcome::Success);
        self.close().await
    }

    async fn block(&mut self) -> Result<(), EdgeError> {
        self.session.transition(SessionState::EmittingShell);

        let mut pieces = Vec::new();
        loop {
            match self.next_chunk().await {
                ContentChunk::Done => break,
                ContentChunk::Failed {
                    boundary: None,
                    error,
                } => return self.fail(error).await,
                ContentChunk::Marker(point) => {
                    let region = point.region();
                    if self.session.consume_marker(region) {
                        pieces.push(Piece::Marker(region));
                    } else {
                        tracing::warn!(error = %EdgeError::InsertionPointReused(region), "marker ignored");
                    }
                }
                chunk => pieces.push(Piece::Html(self.render_chunk(chunk))),
            }
        }

        self.metadata.drain_ready();
        if !self.metadata.is_ready(Region::Body) {
            self.session.transition(SessionState::AwaitingMetadata);
            self.metadata.wait_ready(Region::Body).await;
        }
        self.session.transition(SessionState::SplicingMetadata);
        self.session.timing_mut().mark("metadata_ready");

        let mut document = String::new();
        for piece in pieces {
            match piece {
                Piece::Html(html) => document.push_str(&html),
                Piece::Marker(Region::Head) => {
                    document.push_str(&self.take_metadata(Region::Head)?);
                    document.push_str(&self.take_metadata(Region::Body)?);
                }
                Piece::Marker(Region::Body) => {
                    document.push_str(&self.take_metadata(Region::Body)?)
                }
            }
        }
        document.push_str(&self.take_metadata(Region::Head)?);
        document.push_str(&self.take_metadata(Region::Body)?);
        self.session.transition(SessionState::EmittingBody);

        self.session.set_outcome(RenderOutcome::Success);
        self.send_head(StatusCode::OK, HeaderMap::new()).await?;
        self.write(document).await?;
        self.close().await
    }

    /// Resolve a stream-level failure against what was already sent.
    async fn fail(&mut self, error: RenderError) -> Result<(), EdgeError> {
        self.session.transition(SessionState::Erroring);
        if !self.adapter.is_finished() {
            self.adapter.cancel();
        }

        let outcome = RenderOutcome::from_error(None, &error);
        let resolution = OutcomeResolver::new(self.config).resolve(&outcome, self.commit());
        tracing::debug!(%error, status = %resolution.status, "render ended early");
        self.session.set_outcome(outcome);

        match resolution.policy {
            BodyPolicy::Replace(body) => {
                if self.session.mode().is_blocking() {
                    self.metadata.wait_ready(Region::Body).await;
                } else {
                    self.metadata.drain_ready();
                }
                let mut head = self.take_metadata(Region::Head)?;
                if self.metadata.is_ready(Region::Body) {
                    head.push_str(&self.take_metadata(Region::Body)?);
                }
                let document = markup::document(&self.config.lang, &head, &body);
                self.send_head(resolution.status, resolution.headers)
                    .await?;
                self.write(document).await?;
            }
            BodyPolicy::Empty => {
                self.send_head(resolution.status, resolution.headers)
                    .await?;
                if self.session.mode().is_blocking() {
                    self.sink.send_body(Vec::new()).await?;
                    self.record_writes();
                }
            }
            BodyPolicy::Inject(html) => self.write(html).await?,
            BodyPolicy::Keep | BodyPolicy::BoundaryFallback { .. } => {}
        }

        self.close().await
    }

    async fn close(&mut self) -> Result<(), EdgeError> {
        self.send_head(StatusCode::OK, HeaderMap::new()).await?;
        if self.session.mode().is_blocking() && self.sink.flush_count() != 1 {
            return Err(EdgeError::BlockingFlushCount(self.sink.flush_count()));
        }
        self.sink.complete().await?;

        self.session.settle_suspended();
        self.session.set_readiness(self.metadata.readiness());
        self.session.transition(SessionState::Closed);
        Ok(())
    }

    /// Markup for a content chunk. Markers and terminal chunks render empty.
    fn render_chunk(&mut self, chunk: ContentChunk) -> String {
        let streaming = self.session.mode().is_streaming();
        match chunk {
            ContentChunk::Html(html) => html,
            ContentChunk::Fallback { boundary, html } if streaming => {
                self.session.note_suspended(&boundary);
                markup::fallback_placeholder(&boundary, &html)
            }
            ContentChunk::Fallback { boundary, html } => {
                self.session.note_fallback(&boundary);
                html
            }
            ContentChunk::Resolved { boundary, html } => self.settle(&boundary, html),
            ContentChunk::Failed {
                boundary: Some(boundary),
                error,
            } => {
                let outcome = RenderOutcome::from_error(Some(&boundary), &error);
                let resolution =
                    OutcomeResolver::new(self.config).resolve(&outcome, self.commit());
                tracing::debug!(%boundary, %error, "boundary failed");
                match resolution.policy {
                    BodyPolicy::BoundaryFallback { html, .. } => {
                        self.session.note_fallback(&boundary);
                        self.settle(&boundary, html)
                    }
                    _ => String::new(),
                }
            }
            ContentChunk::Marker(_) | ContentChunk::Failed { boundary: None, .. } | ContentChunk::Done => {
                String::new()
            }
        }
    }

    /// Content for a boundary, revealed over its fallback if one was sent.
    fn settle(&mut self, boundary: &BoundaryId, html: String) -> String {
        if self.session.resume(boundary) {
            markup::reveal_segment(boundary, &html)
        } else {
            html
        }
    }

    fn take_metadata(&mut self, region: Region) -> Result<String, EdgeError> {
        if self.session.is_emitted(region) {
            return Ok(String::new());
        }
        let fragments = self.metadata.take_region(region);
        self.session.mark_emitted(region)?;
        self.session.set_readiness(self.metadata.readiness());
        Ok(markup::render_fragments(&fragments))
    }

    fn commit(&self) -> Commit {
        match self.session.status() {
            Some(status) => Commit::Committed(status),
            None => Commit::Uncommitted,
        }
    }

    /// Commit the status line unless it already is.
    async fn send_head(&mut self, status: StatusCode, mut headers: HeaderMap) -> Result<(), EdgeError> {
        if self.sink.is_committed() {
            return Ok(());
        }
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("text/html; charset=utf-8"));
        self.sink.send_head(status, headers).await?;
        self.session.commit_status(status)
    }

    /// One physical write. The first write commits a 200.
    async fn write(&mut self, html: String) -> Result<(), EdgeError> {
        if html.is_empty() {
            return Ok(());
        }
        self.send_head(StatusCode::OK, HeaderMap::new()).await?;
        self.sink.send_body(html.into_bytes()).await?;
        self.record_writes();
        Ok(())
    }

    fn record_writes(&mut self) {
        self.session
            .record_writes(self.sink.flush_count(), self.sink.bytes_written());
    }
}
