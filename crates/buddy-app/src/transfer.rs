//! Pull, push, install and move as cancellable event streams
//!
//! Each operation starts an interactive adb session and spawns a pipeline
//! task that turns raw terminal chunks into typed events:
//!
//! ```text
//! chunk -> strip escapes -> split segments -> sanitize -> parse -> dedupe -> stream
//! ```
//!
//! The pipeline owns the session. Cancelling the stream tears the adb child
//! down; so does dropping it, or a parse error.

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use buddy_adb::responses::{parse_install_progress, parse_move_prompt, parse_transfer_progress};
use buddy_adb::{
    sanitize, AdbCommand, CancelHandle, InteractiveCommand, ProcessRunner, SessionWriter,
};
use buddy_core::prelude::*;
use buddy_core::{
    strip_ansi_codes, InstallProgress, MovePrompt, OverwriteAnswer, RemotePath, TransferProgress,
};
use futures_util::Stream;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 32;

/// Typed events from one interactive adb session.
///
/// After [`cancel`](Self::cancel) the stream yields nothing more. An error
/// is always the last item.
#[derive(Debug)]
pub struct ProgressStream<T> {
    events: mpsc::Receiver<Result<T>>,
    cancel: CancelHandle,
    writer: SessionWriter,
}

pub type TransferStream = ProgressStream<TransferProgress>;
pub type InstallStream = ProgressStream<InstallProgress>;
pub type MoveStream = ProgressStream<MovePrompt>;

impl<T> ProgressStream<T> {
    /// Stop the operation and kill its adb process. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Writer for the session's input
    pub fn writer(&self) -> SessionWriter {
        self.writer.clone()
    }
}

impl ProgressStream<MovePrompt> {
    /// Answer an overwrite confirmation
    pub fn answer(&self, answer: OverwriteAnswer) {
        debug!("Answering overwrite prompt: {:?}", answer);
        self.writer.write(answer.as_input());
    }
}

impl<T> Stream for ProgressStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        this.events.poll_recv(cx)
    }
}

/// Turns raw terminal chunks into events
trait ChunkDecoder: Send + 'static {
    type Event: Clone + PartialEq + Send + std::fmt::Debug + 'static;

    fn decode(&mut self, chunk: &str) -> Result<Vec<Self::Event>>;

    /// Called once the session's output is exhausted
    fn finish(&mut self) -> Result<Vec<Self::Event>> {
        Ok(Vec::new())
    }
}

/// Progress output, one update per `\r` or `\n` terminated segment.
///
/// adb redraws its progress line with `\r`; a read can end anywhere inside
/// a line, so the unterminated tail waits for the next chunk.
struct SegmentDecoder<T> {
    pending: String,
    parse: fn(&str) -> Result<T>,
}

impl<T> SegmentDecoder<T> {
    fn new(parse: fn(&str) -> Result<T>) -> Self {
        Self {
            pending: String::new(),
            parse,
        }
    }

    fn parse_segments(&self, text: &str) -> Result<Vec<T>> {
        let text = strip_ansi_codes(text);
        let mut events = Vec::new();
        for segment in text.split(['\r', '\n']) {
            let clean = sanitize(segment)?;
            let clean = clean.trim_end();
            if clean.is_empty() {
                continue;
            }
            events.push((self.parse)(clean)?);
        }
        Ok(events)
    }
}

impl<T> ChunkDecoder for SegmentDecoder<T>
where
    T: Clone + PartialEq + Send + std::fmt::Debug + 'static,
{
    type Event = T;

    fn decode(&mut self, chunk: &str) -> Result<Vec<T>> {
        self.pending.push_str(chunk);
        let Some(end) = self.pending.rfind(['\r', '\n']) else {
            return Ok(Vec::new());
        };
        let complete: String = self.pending.drain(..=end).collect();
        self.parse_segments(&complete)
    }

    fn finish(&mut self) -> Result<Vec<T>> {
        let rest = std::mem::take(&mut self.pending);
        self.parse_segments(&rest)
    }
}

/// Move output: every chunk is one prompt event, minus echoed answers.
struct MoveDecoder;

impl ChunkDecoder for MoveDecoder {
    type Event = MovePrompt;

    fn decode(&mut self, chunk: &str) -> Result<Vec<MovePrompt>> {
        let clean = sanitize(&strip_ansi_codes(chunk))?;
        let remaining = clean
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !is_echoed_answer(line))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(vec![parse_move_prompt(&remaining)?])
    }
}

/// The device terminal echoes `y`/`n` answers back
fn is_echoed_answer(line: &str) -> bool {
    let answer = line.trim();
    answer == OverwriteAnswer::Yes.as_input() || answer == OverwriteAnswer::No.as_input()
}

/// Starts transfers, installs and moves on attached devices.
///
/// Never touches the adb daemon itself; that belongs to
/// [`crate::DeviceSession`].
pub struct TransferCoordinator<R> {
    runner: Arc<R>,
}

impl<R> Clone for TransferCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R: ProcessRunner + Sync + 'static> TransferCoordinator<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Copy `remote` from the device into the local path.
    pub fn pull(&self, serial: &str, remote: &RemotePath, local: &Path) -> Result<TransferStream> {
        let command = AdbCommand::Pull {
            serial: serial.to_string(),
            remote: remote.clone(),
            local: local.to_path_buf(),
        };
        self.start(&command, SegmentDecoder::new(parse_transfer_progress), true)
    }

    /// Copy a local file or directory to `remote` on the device.
    pub fn push(&self, serial: &str, local: &Path, remote: &RemotePath) -> Result<TransferStream> {
        let command = AdbCommand::Push {
            serial: serial.to_string(),
            local: local.to_path_buf(),
            remote: remote.clone(),
        };
        self.start(&command, SegmentDecoder::new(parse_transfer_progress), true)
    }

    pub fn install_apk(&self, serial: &str, apk: &Path) -> Result<InstallStream> {
        let command = AdbCommand::Install {
            serial: serial.to_string(),
            apk: apk.to_path_buf(),
        };
        self.start(&command, SegmentDecoder::new(parse_install_progress), true)
    }

    /// Move `sources` to `destination`.
    ///
    /// Interactive moves stop at every
    /// [`MovePrompt::OverwriteConfirmationRequested`] until it is answered
    /// with [`ProgressStream::answer`]. Non-interactive moves never
    /// overwrite and never prompt; any output is a
    /// [`Error::CommandError`].
    pub fn move_items(
        &self,
        serial: &str,
        sources: &[RemotePath],
        destination: &RemotePath,
        interactive: bool,
    ) -> Result<MoveStream> {
        let command = AdbCommand::Move {
            serial: serial.to_string(),
            sources: sources.to_vec(),
            destination: destination.clone(),
            interactive,
        };

        if interactive {
            self.start(&command, MoveDecoder, false)
        } else {
            let session = self.run_detached(&command);
            Ok(spawn_pipeline(session, MoveDecoder, false))
        }
    }

    fn start<D: ChunkDecoder>(
        &self,
        command: &AdbCommand,
        decoder: D,
        dedupe: bool,
    ) -> Result<ProgressStream<D::Event>> {
        info!("Starting {}: adb {}", command.description(), command.args().join(" "));
        let session = self.runner.run_interactive(&command.args())?;
        Ok(spawn_pipeline(session, decoder, dedupe))
    }

    /// Run a blocking command behind the interactive session interface.
    fn run_detached(&self, command: &AdbCommand) -> InteractiveCommand {
        info!("Starting {}: adb {}", command.description(), command.args().join(" "));
        let (session, io) = InteractiveCommand::channel(None);
        let runner = Arc::clone(&self.runner);
        let args = command.args();

        tokio::spawn(async move {
            let output = tokio::select! {
                biased;
                _ = io.cancel.cancelled() => None,
                _ = io.chunks.closed() => None,
                output = runner.run(&args) => Some(output),
            };
            if let Some(output) = output {
                io.cancel.send(&io.chunks, output).await;
            }
            io.exit.mark_exited();
        });

        session
    }
}

/// Feed a session's chunks through `decoder` into a new stream.
fn spawn_pipeline<D: ChunkDecoder>(
    mut session: InteractiveCommand,
    mut decoder: D,
    dedupe: bool,
) -> ProgressStream<D::Event> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let stream = ProgressStream {
        events: rx,
        cancel: session.cancel_handle(),
        writer: session.writer(),
    };

    tokio::spawn(async move {
        let cancel = session.cancel_handle();
        let mut last: Option<D::Event> = None;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = tx.closed() => {
                    debug!("Progress consumer dropped");
                    break;
                }
                chunk = session.next_chunk() => chunk,
            };

            let decoded = match chunk {
                Some(chunk) => chunk.and_then(|text| decoder.decode(&text)),
                None => {
                    if !cancel.is_cancelled() {
                        let tail = decoder.finish();
                        publish(&tx, &cancel, tail, &mut last, dedupe).await;
                    }
                    break;
                }
            };

            if !publish(&tx, &cancel, decoded, &mut last, dedupe).await {
                break;
            }
        }
        // Dropping the session ends the adb child if it is still running
        drop(session);
    });

    stream
}

/// Send decoded events. Returns false when the pipeline must stop.
///
/// Sends give way to cancellation so an idle consumer cannot hold the
/// session open.
async fn publish<T: Clone + PartialEq + std::fmt::Debug>(
    tx: &mpsc::Sender<Result<T>>,
    cancel: &CancelHandle,
    decoded: Result<Vec<T>>,
    last: &mut Option<T>,
    dedupe: bool,
) -> bool {
    let events = match decoded {
        Ok(events) => events,
        Err(e) => {
            warn!("Interactive command failed: {}", e);
            cancel.send(tx, Err(e)).await;
            return false;
        }
    };

    for event in events {
        if dedupe && last.as_ref() == Some(&event) {
            continue;
        }
        trace!("Progress: {:?}", event);
        *last = Some(event.clone());
        if !cancel.send(tx, Ok(event)).await {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_adb::test_utils::{FixtureRunner, ScriptStep};
    use futures_util::StreamExt;
    use std::time::Duration;

    const PULL: &[&str] = &["-s", "AAA", "pull", "/sdcard/x.iso", "/tmp/roms"];

    fn coordinator(runner: &Arc<FixtureRunner>) -> TransferCoordinator<FixtureRunner> {
        TransferCoordinator::new(Arc::clone(runner))
    }

    fn pull(coordinator: &TransferCoordinator<FixtureRunner>) -> TransferStream {
        coordinator
            .pull(
                "AAA",
                &RemotePath::new("/sdcard/x.iso"),
                Path::new("/tmp/roms"),
            )
            .unwrap()
    }

    async fn collect<T>(mut stream: ProgressStream<T>) -> Vec<Result<T>> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_pull_progress_is_deduplicated() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            PULL,
            vec![
                ScriptStep::chunk("\r[  0%] /sdcard/x.iso\x1b[K"),
                ScriptStep::chunk("\r[ 39%] /sdcard/x.iso\x1b[K\r[ 39%] /sdc"),
                ScriptStep::chunk("ard/x.iso\x1b[K\r[100%] /sdcard/x.iso\x1b[K\n"),
                ScriptStep::chunk(
                    "/sdcard/x.iso: 1 file pulled, 0 skipped. 38.4 MB/s (1468006400 bytes in 36.458s)\n",
                ),
            ],
        );

        let events: Vec<TransferProgress> = collect(pull(&coordinator(&runner)))
            .await
            .into_iter()
            .map(|event| tokio_test::assert_ok!(event))
            .collect();

        assert_eq!(
            events,
            vec![
                TransferProgress::InProgress(0.0),
                TransferProgress::InProgress(0.39),
                TransferProgress::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_flushed() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(PULL, vec![ScriptStep::chunk("[100%] /sdcard/x.iso")]);

        let events = collect(pull(&coordinator(&runner))).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &TransferProgress::Completed);
    }

    #[tokio::test]
    async fn test_pull_tool_error_ends_stream() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            PULL,
            vec![
                ScriptStep::chunk(
                    "adb: error: failed to stat remote object '/sdcard/x.iso': No such file or directory\r\n",
                ),
                ScriptStep::chunk("[ 50%] never delivered\n"),
            ],
        );

        let events = collect(pull(&coordinator(&runner))).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(Error::ToolError { .. })));
    }

    #[tokio::test]
    async fn test_invalid_utf8_ends_stream() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            PULL,
            vec![
                ScriptStep::chunk("[ 10%] /sdcard/x.iso\r"),
                ScriptStep::InvalidUtf8,
            ],
        );

        let events = collect(pull(&coordinator(&runner))).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(Error::NonDecodableOutput)));
    }

    #[tokio::test]
    async fn test_cancel_stops_progress() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            PULL,
            vec![ScriptStep::chunk("[ 10%] /sdcard/x.iso\r"), ScriptStep::Hang],
        );

        let mut stream = pull(&coordinator(&runner));
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            TransferProgress::InProgress(0.1)
        );

        stream.cancel();
        stream.cancel();
        assert!(stream.is_cancelled());
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("cancelled stream must end");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_cancel_releases_session_while_stream_is_unread() {
        let runner = Arc::new(FixtureRunner::new());
        let script = (0..200)
            .map(|i| ScriptStep::chunk(format!("[{:3}%] /sdcard/x.iso\r", i % 100)))
            .chain(std::iter::once(ScriptStep::Hang))
            .collect();
        runner.on_interactive(PULL, script);

        let stream = pull(&coordinator(&runner));
        // Let the event buffer fill up with nobody reading
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stream.events.is_closed());

        stream.cancel();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !stream.events.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pipeline should drop the session after cancel");
    }

    #[tokio::test]
    async fn test_push_uses_push_arguments() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            &["-s", "AAA", "push", "/tmp/x.iso", "/sdcard/Roms"],
            vec![ScriptStep::chunk("[ 50%] /sdcard/Roms/x.iso\r[100%] /sdcard/Roms/x.iso\n")],
        );

        let stream = coordinator(&runner)
            .push("AAA", Path::new("/tmp/x.iso"), &RemotePath::new("/sdcard/Roms"))
            .unwrap();
        let events = collect(stream).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].as_ref().unwrap(),
            &TransferProgress::Completed
        );
    }

    #[tokio::test]
    async fn test_missing_session_fails_immediately() {
        let runner = Arc::new(FixtureRunner::new());
        let result = coordinator(&runner).pull(
            "AAA",
            &RemotePath::new("/sdcard/x.iso"),
            Path::new("/tmp/roms"),
        );
        assert!(matches!(result, Err(Error::ProcessSpawn { .. })));
    }

    #[tokio::test]
    async fn test_install_progress() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            &["-s", "AAA", "install", "-r", "app.apk"],
            vec![
                ScriptStep::chunk("Performing Streamed Install\r\n"),
                ScriptStep::chunk("Success\r\n"),
            ],
        );

        let stream = coordinator(&runner)
            .install_apk("AAA", Path::new("app.apk"))
            .unwrap();
        let events: Vec<InstallProgress> = collect(stream)
            .await
            .into_iter()
            .map(|event| event.unwrap())
            .collect();
        assert_eq!(
            events,
            vec![InstallProgress::InProgress, InstallProgress::Completed]
        );
    }

    #[tokio::test]
    async fn test_install_failure_is_parse_failure() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            &["-s", "AAA", "install", "-r", "app.apk"],
            vec![
                ScriptStep::chunk("Performing Streamed Install\n"),
                ScriptStep::chunk("Failure [INSTALL_FAILED_VERSION_DOWNGRADE]\n"),
            ],
        );

        let stream = coordinator(&runner)
            .install_apk("AAA", Path::new("app.apk"))
            .unwrap();
        let events = collect(stream).await;
        assert!(matches!(events.last(), Some(Err(Error::ParseFailure { .. }))));
    }

    #[tokio::test]
    async fn test_interactive_move_prompt_and_answer() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            &["-s", "AAA", "shell", "mv", "-i", "'sdcard/a.iso'", "'sdcard/x.iso'"],
            vec![
                ScriptStep::chunk("mv: overwrite sdcard/x.iso (y/N): "),
                ScriptStep::AwaitInput,
                ScriptStep::chunk("n\r\n"),
            ],
        );

        let mut stream = coordinator(&runner)
            .move_items(
                "AAA",
                &[RemotePath::new("sdcard/a.iso")],
                &RemotePath::new("sdcard/x.iso"),
                true,
            )
            .unwrap();

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            MovePrompt::OverwriteConfirmationRequested(RemotePath::new("sdcard/x.iso"))
        );
        stream.answer(OverwriteAnswer::No);

        assert_eq!(stream.next().await.unwrap().unwrap(), MovePrompt::Nothing);
        assert!(stream.next().await.is_none());
        assert_eq!(runner.writes(), vec!["n\n"]);

        // Writing after the session ended is silently dropped
        stream.answer(OverwriteAnswer::Yes);
    }

    #[tokio::test]
    async fn test_interactive_move_error() {
        let runner = Arc::new(FixtureRunner::new());
        runner.on_interactive(
            &["-s", "AAA", "shell", "mv", "-i", "'/sdcard/nope'", "'/sdcard/x'"],
            vec![ScriptStep::chunk(
                "mv: bad '/sdcard/nope': No such file or directory\r\n",
            )],
        );

        let stream = coordinator(&runner)
            .move_items(
                "AAA",
                &[RemotePath::new("/sdcard/nope")],
                &RemotePath::new("/sdcard/x"),
                true,
            )
            .unwrap();
        let events = collect(stream).await;
        assert!(matches!(events[0], Err(Error::CommandError { .. })));
    }

    #[tokio::test]
    async fn test_non_interactive_move() {
        let runner = Arc::new(FixtureRunner::new());
        runner
            .on_run(
                &["-s", "AAA", "shell", "mv", "-n", "'/sdcard/a'", "'/sdcard/b'"],
                "",
            )
            .on_run(
                &["-s", "AAA", "shell", "mv", "-n", "'/sdcard/a'", "'/system/b'"],
                "mv: /system/b: Read-only file system\n",
            );
        let coordinator = coordinator(&runner);

        let ok = coordinator
            .move_items(
                "AAA",
                &[RemotePath::new("/sdcard/a")],
                &RemotePath::new("/sdcard/b"),
                false,
            )
            .unwrap();
        let events = collect(ok).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &MovePrompt::Nothing);

        let failed = coordinator
            .move_items(
                "AAA",
                &[RemotePath::new("/sdcard/a")],
                &RemotePath::new("/system/b"),
                false,
            )
            .unwrap();
        let events = collect(failed).await;
        match &events[0] {
            Err(Error::CommandError { output }) => assert!(output.contains("Read-only")),
            other => panic!("expected CommandError, got {other:?}"),
        }
    }

    #[test]
    fn test_echoed_answers() {
        assert!(is_echoed_answer("y"));
        assert!(is_echoed_answer(" n\r"));
        assert!(!is_echoed_answer("yes"));
    }
}
