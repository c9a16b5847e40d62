//! Command - 플러그인이 제공하는 CLI 명령어

use crate::{Event, EventSink, PluginError, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::Span;

type Input = Box<dyn AsyncRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// A CLI command exposed by a plugin
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// One-line usage string, e.g. `emit <event-type>`
    fn usage(&self) -> &str {
        self.name()
    }

    async fn execute(&self, ctx: &mut CommandContext, args: &[String]) -> Result<()>;
}

/// Everything a command needs from the host
pub struct CommandContext {
    /// Logger for the invocation
    pub span: Span,
    pub working_dir: PathBuf,
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
    pub cancel: CancellationToken,
    events: Option<EventSink>,
}

impl CommandContext {
    pub fn new(working_dir: impl Into<PathBuf>, stdin: Input, stdout: Output, stderr: Output) -> Self {
        Self {
            span: Span::current(),
            working_dir: working_dir.into(),
            stdin,
            stdout,
            stderr,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Context bound to the process' standard streams
    pub fn stdio(working_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            working_dir,
            Box::new(tokio::io::stdin()),
            Box::new(tokio::io::stdout()),
            Box::new(tokio::io::stderr()),
        )
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Whether events emitted here will reach the pipeline
    pub fn can_emit(&self) -> bool {
        self.events.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Push an event through the host pipeline
    ///
    /// The returned future owns a clone of the sink, so it stays `Send` even
    /// though the context itself is not `Sync`.
    pub fn emit_event(&self, event: Event) -> impl Future<Output = Result<()>> + Send + 'static {
        let sink = self.events.clone();
        async move {
            match sink {
                Some(sink) => sink.emit(event).await,
                None => Err(PluginError::Unsupported(
                    "event pipeline is not attached to this command".to_string(),
                )),
            }
        }
    }

    /// Write a line to stdout
    pub async fn println(&mut self, line: &str) -> Result<()> {
        self.stdout.write_all(line.as_bytes()).await?;
        self.stdout.write_all(b"\n").await?;
        self.stdout.flush().await?;
        Ok(())
    }

    /// Write a line to stderr
    pub async fn eprintln(&mut self, line: &str) -> Result<()> {
        self.stderr.write_all(line.as_bytes()).await?;
        self.stderr.write_all(b"\n").await?;
        self.stderr.flush().await?;
        Ok(())
    }
}
