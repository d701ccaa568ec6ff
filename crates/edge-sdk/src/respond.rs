//! Request entry point: classify, then assemble.

use std::fmt::Display;
use std::sync::Arc;

use anyhow::{Context, Result};
use edge_assembler::{ResponseAssembler, ResponseSession};
use edge_classifier::{BotPatterns, ClientClassifier};
use edge_core::{DeliveryMode, EdgeError, RequestContext, SessionObserver};
use edge_metadata::MetadataChannel;
use edge_observability::LoggingObserver;
use edge_streaming::{ContentChunk, RenderSource, ResponseSink, TransportFrame};
use futures::{Sink, Stream};

use crate::config::PlatformConfig;

/// Compiled, shared platform state. Build once at startup.
pub struct Platform {
    config: PlatformConfig,
    patterns: BotPatterns,
    observer: Arc<dyn SessionObserver>,
}

impl Platform {
    /// Compile the classifier patterns and set up session logging.
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let patterns =
            BotPatterns::compile(&config.classifier).context("failed to compile bot patterns")?;
        let observer = LoggingObserver::new(config.logging.format)
            .with_min_level(config.logging.level);

        tracing::debug!(patterns = patterns.len(), "platform ready");

        Ok(Self {
            config,
            patterns,
            observer: Arc::new(observer),
        })
    }

    /// Replace the session observer.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Delivery mode for a request.
    pub fn delivery_mode(&self, ctx: &RequestContext) -> DeliveryMode {
        ClientClassifier::new(&self.patterns).classify(&ctx.signals())
    }

    /// Serve one request.
    pub async fn respond<S, T, E>(
        &self,
        ctx: &RequestContext,
        source: RenderSource<S>,
        metadata: MetadataChannel,
        sink: ResponseSink<T, E>,
    ) -> Result<ResponseSession, EdgeError>
    where
        S: Stream<Item = ContentChunk> + Unpin,
        T: Sink<TransportFrame, Error = E> + Unpin,
        E: Display,
    {
        let mode = self.delivery_mode(ctx);
        tracing::debug!(request_id = %ctx.request_id, path = %ctx.path, %mode, "responding");

        ResponseAssembler::new(&self.config.assembler)
            .with_observer(self.observer.as_ref())
            .assemble(ctx.request_id.clone(), mode, source, metadata, sink)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_core::SessionEvent;
    use edge_metadata::{MetadataFragment, RouteMetadata, RouteTree};
    use edge_observability::RecordingObserver;
    use edge_streaming::{InsertionPoint, RenderError, TransportTarget};
    use futures::channel::mpsc;
    use futures::StreamExt;
    use http::StatusCode;

    const TWITTERBOT: &str = "Twitterbot/1.0";
    const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    fn page(end: ContentChunk) -> Vec<ContentChunk> {
        vec![
            ContentChunk::html("<!DOCTYPE html><html><head>"),
            ContentChunk::Marker(InsertionPoint::head()),
            ContentChunk::html("</head><body>"),
            ContentChunk::fallback("b1", "<p>loading</p>"),
            ContentChunk::resolved("b1", "<p>hello</p>"),
            ContentChunk::Marker(InsertionPoint::body()),
            ContentChunk::html("</body></html>"),
            end,
        ]
    }

    fn metadata() -> MetadataChannel {
        let (mut channel, _feed) = MetadataChannel::new(RouteTree::new(), RouteMetadata::default());
        channel.submit(MetadataFragment::title("root", "index page"));
        channel.settle("root");
        channel
    }

    async fn serve(
        platform: &Platform,
        user_agent: &str,
        chunks: Vec<ContentChunk>,
    ) -> (Vec<TransportFrame>, ResponseSession) {
        let ctx = RequestContext::new("/").with_header("User-Agent", user_agent);
        let (tx, rx) = mpsc::unbounded();
        let session = platform
            .respond(
                &ctx,
                RenderSource::from_chunks(chunks),
                metadata(),
                ResponseSink::new(tx, TransportTarget::Response),
            )
            .await
            .unwrap();
        (rx.collect().await, session)
    }

    fn body(frames: &[TransportFrame]) -> String {
        frames
            .iter()
            .filter_map(|f| match f {
                TransportFrame::Body(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_delivery_mode() {
        let platform = Platform::new(PlatformConfig::default()).unwrap();
        let bot = RequestContext::new("/").with_header("user-agent", TWITTERBOT);
        let browser = RequestContext::new("/").with_header("user-agent", CHROME);
        let unknown = RequestContext::new("/");

        assert_eq!(platform.delivery_mode(&bot), DeliveryMode::Blocking);
        assert_eq!(platform.delivery_mode(&browser), DeliveryMode::Streaming);
        assert_eq!(platform.delivery_mode(&unknown), DeliveryMode::Streaming);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let config = PlatformConfig::from_toml_str("[classifier]\ngeneric_bots = [\"(unclosed\"]")
            .unwrap();
        let err = Platform::new(config).err().unwrap();
        assert!(err.to_string().contains("failed to compile bot patterns"));
    }

    #[tokio::test]
    async fn test_twitterbot_gets_one_write() {
        let recorder = Arc::new(RecordingObserver::new());
        let platform = Platform::new(PlatformConfig::default())
            .unwrap()
            .with_observer(recorder.clone());

        let (frames, session) = serve(&platform, TWITTERBOT, page(ContentChunk::Done)).await;

        assert_eq!(session.mode(), DeliveryMode::Blocking);
        assert_eq!(session.flush_count(), 1);
        assert!(matches!(frames[0], TransportFrame::Head { status, .. } if status == StatusCode::OK));
        let html = body(&frames);
        assert_eq!(html.matches("<title>index page</title>").count(), 1);
        assert!(html.contains("<p>hello</p>"));
        assert!(!html.contains("loading"));

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, SessionEvent::Success);
        assert_eq!(events[0].1.flush_count, 1);
    }

    #[tokio::test]
    async fn test_twitterbot_not_found() {
        let platform = Platform::new(PlatformConfig::default()).unwrap();
        let chunks = vec![
            ContentChunk::html("<!DOCTYPE html><html><head>"),
            ContentChunk::Marker(InsertionPoint::head()),
            ContentChunk::failed(RenderError::not_found()),
        ];

        let (frames, session) = serve(&platform, TWITTERBOT, chunks).await;

        assert_eq!(session.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(session.flush_count(), 1);
        assert!(body(&frames).contains("This page could not be found."));
    }

    #[tokio::test]
    async fn test_browser_streams() {
        let platform = Platform::new(PlatformConfig::default()).unwrap();

        let (frames, session) = serve(&platform, CHROME, page(ContentChunk::Done)).await;

        assert_eq!(session.mode(), DeliveryMode::Streaming);
        assert!(session.flush_count() > 1);
        let html = body(&frames);
        assert!(html.contains(r#"<div data-edge-boundary="b1"><p>loading</p></div>"#));
        assert!(html.contains(r#"<template data-edge-segment="b1"><p>hello</p></template>"#));
    }

    #[tokio::test]
    async fn test_configured_not_found_page() {
        let config = PlatformConfig::from_toml_str(
            "[assembler]\nnot_found_html = \"<h1>Gone</h1>\"",
        )
        .unwrap();
        let platform = Platform::new(config).unwrap();

        let chunks = vec![ContentChunk::failed(RenderError::not_found())];
        let (frames, _) = serve(&platform, CHROME, chunks).await;

        assert!(matches!(frames[0], TransportFrame::Head { status, .. } if status == StatusCode::NOT_FOUND));
        assert!(body(&frames).contains("<h1>Gone</h1>"));
    }
}
