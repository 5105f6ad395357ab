//! Process Supervisor - owns the single supervised game server.
//!
//! - `start` / `stop` / `kill` with a single-instance invariant
//! - one reader task per output stream, decoding lines into a shared dispatch channel
//! - one dispatch task per process lifetime that classifies lines in arrival order
//! - `run_command` capture windows on top of the unframed console
//!
//! None of the operations wait for the server to react. Completion is observed
//! through [`ServerEvent`]s.

pub mod error;
pub mod events;
pub mod process;
pub mod state_machine;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::console::capture::{CaptureWindow, CapturedOutput};
use crate::console::classifier::{self, LogLevel};
use crate::console::decoder::LineDecoder;
use crate::console::history::{ConsoleHistory, LogLine, LogSource, DEFAULT_HISTORY_SIZE};

pub use error::SupervisorError;
pub use events::ServerEvent;
pub use state_machine::ServerState;
use state_machine::StateMachine;

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Console line understood by the server as "save and shut down".
pub const STOP_COMMAND: &str = "stop";

const READ_CHUNK: usize = 8192;
const DISPATCH_CAPACITY: usize = 1024;
const EVENT_CAPACITY: usize = 256;
/// How long the exit watcher waits for the pipes to drain after the child is reaped.
/// An orphaned grandchild can keep a pipe open forever.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Fixed console encoding for the whole process lifetime
    pub encoding: &'static Encoding,
    pub history_size: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub state: ServerState,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
}

/// The live child. Exists from a successful spawn until its exit is dispatched.
struct ServerProcess {
    pid: u32,
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    started_at: Instant,
    /// Set by the exit watcher as soon as the OS reports termination,
    /// before remaining output has been drained.
    exited: bool,
}

struct Slot {
    machine: StateMachine,
    process: Option<ServerProcess>,
}

impl Slot {
    fn advance(&mut self, to: ServerState) {
        if let Err(e) = self.machine.transition(to) {
            tracing::error!("{}", e);
        }
    }
}

enum Dispatch {
    Line { source: LogSource, line: String },
    Exited { code: Option<i32>, detail: String },
}

struct Shared {
    options: SupervisorOptions,
    slot: Mutex<Slot>,
    capture: Mutex<CaptureWindow>,
    history: Mutex<ConsoleHistory>,
    events: broadcast::Sender<ServerEvent>,
    /// Single-slot queue: one capture window at a time.
    command_turn: tokio::sync::Mutex<()>,
}

/// Handle to the supervisor. Cheap to clone; all clones drive the same server.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorOptions::default())
    }
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let history = ConsoleHistory::with_capacity(options.history_size);
        Self {
            shared: Arc::new(Shared {
                options,
                slot: Mutex::new(Slot {
                    machine: StateMachine::new(),
                    process: None,
                }),
                capture: Mutex::new(CaptureWindow::new()),
                history: Mutex::new(history),
                events,
                command_turn: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Subscribe to chat, start and exit events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events.subscribe()
    }

    pub fn status(&self) -> ServerStatus {
        let slot = lock(&self.shared.slot);
        let process = slot.process.as_ref();
        ServerStatus {
            state: slot.machine.state,
            pid: process.map(|p| p.pid),
            uptime_secs: process.map(|p| p.started_at.elapsed().as_secs()),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.slot)
            .process
            .as_ref()
            .is_some_and(|p| !p.exited)
    }

    /// Launch the server through the platform shell and return its PID.
    ///
    /// Must be called inside a Tokio runtime. Returns as soon as the child is
    /// spawned; readiness can only be inferred from its console output.
    pub fn start(&self, working_dir: impl AsRef<Path>, launch_command: &str) -> Result<u32> {
        let working_dir = working_dir.as_ref();
        let mut slot = lock(&self.shared.slot);
        if let Some(process) = &slot.process {
            return Err(SupervisorError::AlreadyRunning { pid: process.pid });
        }
        slot.advance(ServerState::Starting);

        tracing::info!(
            "Starting server: '{}' in {}",
            launch_command,
            working_dir.display()
        );

        let spawned = process::shell_command(launch_command, working_dir)
            .spawn()
            .map_err(|e| {
                format!(
                    "failed to launch '{}' in {}: {}",
                    launch_command,
                    working_dir.display(),
                    e
                )
            })
            .and_then(take_pipes);

        let (child, pid, stdin, stdout, stderr) = match spawned {
            Ok(parts) => parts,
            Err(reason) => {
                tracing::error!("{}", reason);
                slot.advance(ServerState::Stopped);
                drop(slot);
                self.shared.emit(ServerEvent::ServerStartFailed { reason: reason.clone() });
                return Err(SupervisorError::SpawnFailed(reason));
            }
        };

        let encoding = self.shared.options.encoding;
        let (tx, rx) = mpsc::channel(DISPATCH_CAPACITY);
        let readers = vec![
            tokio::spawn(read_stream(stdout, LogSource::Stdout, encoding, tx.clone())),
            tokio::spawn(read_stream(stderr, LogSource::Stderr, encoding, tx.clone())),
        ];
        tokio::spawn(dispatch(self.shared.clone(), rx));
        tokio::spawn(watch_exit(self.shared.clone(), child, readers, tx));

        slot.process = Some(ServerProcess {
            pid,
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            started_at: Instant::now(),
            exited: false,
        });
        slot.advance(ServerState::Running);
        drop(slot);

        tracing::info!("Server started with PID {}", pid);
        self.shared.record_system(format!("Process started with PID {}", pid));
        self.shared.emit(ServerEvent::ServerStarted { pid });
        Ok(pid)
    }

    /// Ask the server to shut down by writing `stop`. Does not wait for the exit.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("Sending graceful stop to server");
        self.write_line(STOP_COMMAND).await
    }

    /// Force-kill the server and all of its descendants.
    ///
    /// Returns once the kill is issued; `ServerExited` confirms it later.
    pub fn kill(&self) -> Result<()> {
        let slot = lock(&self.shared.slot);
        let pid = match slot.process.as_ref() {
            Some(process) if !process.exited => process.pid,
            _ => return Err(SupervisorError::NotRunning),
        };
        tracing::warn!("Force killing server process tree (PID {})", pid);
        process::kill_tree(pid).map_err(|e| SupervisorError::KillFailed(e.to_string()))
    }

    /// Write a command and collect what the server prints during `window`.
    ///
    /// Overlapping calls are served one after another, each with its own window.
    /// An empty capture is a normal outcome.
    pub async fn run_command(&self, text: &str, window: Duration) -> Result<CapturedOutput> {
        self.ensure_running()?;
        let command = single_line(text);
        if command.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }

        let _turn = self.shared.command_turn.lock().await;
        let capture = CaptureGuard::open(&self.shared.capture);
        self.write_line(&command).await?;
        tokio::time::sleep(window).await;
        let output = CapturedOutput::new(capture.finish());

        tracing::debug!(
            "Command '{}' captured {} line(s)",
            command,
            output.line_count()
        );
        Ok(output)
    }

    /// Write a console line without waiting for any output.
    pub async fn send_raw(&self, text: &str) -> Result<()> {
        self.ensure_running()?;
        let command = single_line(text);
        if command.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }
        self.write_line(&command).await
    }

    /// Relay a chat message from outside into the game.
    pub async fn say(&self, speaker: &str, message: &str) -> Result<()> {
        self.send_raw(&format!("say [{}] {}", single_line(speaker), message)).await
    }

    /// Console lines with `id > since_id`.
    pub fn console_since(&self, since_id: u64) -> Vec<LogLine> {
        lock(&self.shared.history).since(since_id)
    }

    /// The most recent `count` console lines.
    pub fn recent_console(&self, count: usize) -> Vec<LogLine> {
        lock(&self.shared.history).recent(count)
    }

    fn ensure_running(&self) -> Result<()> {
        self.stdin().map(|_| ())
    }

    fn stdin(&self) -> Result<Arc<tokio::sync::Mutex<ChildStdin>>> {
        match lock(&self.shared.slot).process.as_ref() {
            Some(process) if !process.exited => Ok(process.stdin.clone()),
            _ => Err(SupervisorError::NotRunning),
        }
    }

    async fn write_line(&self, text: &str) -> Result<()> {
        let stdin = self.stdin()?;
        let mut pipe = stdin.lock().await;
        let data = format!("{}\n", single_line(text));
        let written = match pipe.write_all(data.as_bytes()).await {
            Ok(()) => pipe.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            tracing::warn!("Failed to write to server stdin: {}", e);
            SupervisorError::WriteFailed(e.to_string())
        })
    }
}

impl Shared {
    fn emit(&self, event: ServerEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    fn record_system(&self, message: String) {
        lock(&self.history).push(LogSource::System, message, LogLevel::Info);
    }

    fn handle_line(&self, source: LogSource, line: String) {
        if line.trim().is_empty() {
            return;
        }

        let mut level = classifier::parse_level(&line);
        if source == LogSource::Stderr {
            level = level.max(LogLevel::Warn);
            tracing::warn!(target: "mc_server", "{}", line);
        } else {
            tracing::info!(target: "mc_server", "{}", line);
        }

        let chat = match source {
            LogSource::Stdout => classifier::extract_chat(&line),
            _ => None,
        };

        // 캡처 중이면 버퍼로, 아니면 채팅 판별
        let captured = lock(&self.capture).feed(classifier::strip_metadata(&line));
        lock(&self.history).push(source, line, level);
        if captured {
            return;
        }
        if let Some(chat) = chat {
            self.emit(chat.into());
        }
    }

    fn handle_exit(&self, code: Option<i32>, detail: String) {
        {
            let mut slot = lock(&self.slot);
            slot.process = None;
            slot.advance(ServerState::Stopped);
        }
        tracing::info!("{}", detail);
        self.record_system(detail);
        self.emit(ServerEvent::ServerExited { code });
    }
}

/// Closes the capture window even if `run_command` is dropped mid-wait.
struct CaptureGuard<'a> {
    window: &'a Mutex<CaptureWindow>,
}

impl<'a> CaptureGuard<'a> {
    fn open(window: &'a Mutex<CaptureWindow>) -> Self {
        lock(window).open();
        Self { window }
    }

    fn finish(self) -> Vec<String> {
        lock(self.window).close()
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        let mut window = lock(self.window);
        if window.is_active() {
            window.close();
        }
    }
}

type Pipes = (Child, u32, ChildStdin, tokio::process::ChildStdout, tokio::process::ChildStderr);

fn take_pipes(mut child: Child) -> std::result::Result<Pipes, String> {
    let pid = child.id();
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    match (pid, stdin, stdout, stderr) {
        (Some(pid), Some(stdin), Some(stdout), Some(stderr)) => Ok((child, pid, stdin, stdout, stderr)),
        _ => {
            // 파이프를 얻지 못한 프로세스는 남겨두지 않음
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to clean up half-spawned process: {}", e);
            }
            Err("spawned process is missing its PID or stdio pipes".to_string())
        }
    }
}

/// Read one output stream until EOF, forwarding decoded lines in order.
async fn read_stream<R>(
    mut stream: R,
    source: LogSource,
    encoding: &'static Encoding,
    tx: mpsc::Sender<Dispatch>,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = LineDecoder::new(encoding);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed to read server {:?}: {}", source, e);
                break;
            }
        };
        for line in decoder.feed(&buf[..n]) {
            if tx.send(Dispatch::Line { source, line }).await.is_err() {
                return;
            }
        }
    }
    if let Some(line) = decoder.finish() {
        let _ = tx.send(Dispatch::Line { source, line }).await;
    }
}

/// Serial classification loop for one process lifetime.
async fn dispatch(shared: Arc<Shared>, mut rx: mpsc::Receiver<Dispatch>) {
    while let Some(message) = rx.recv().await {
        match message {
            Dispatch::Line { source, line } => shared.handle_line(source, line),
            Dispatch::Exited { code, detail } => shared.handle_exit(code, detail),
        }
    }
}

/// Reap the child, let its output drain, then report the exit exactly once.
async fn watch_exit(
    shared: Arc<Shared>,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    tx: mpsc::Sender<Dispatch>,
) {
    let (code, detail) = match child.wait().await {
        Ok(status) => (status.code(), format!("Process exited with {}", status)),
        Err(e) => (None, format!("Failed to wait for process: {}", e)),
    };

    if let Some(process) = lock(&shared.slot).process.as_mut() {
        process.exited = true;
    }

    for mut reader in readers {
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await.is_err() {
            tracing::warn!("Output stream still open after exit, abandoning it");
            reader.abort();
        }
    }

    if let Err(mpsc::error::SendError(message)) = tx.send(Dispatch::Exited { code, detail }).await {
        tracing::error!("Dispatch loop is gone, handling exit inline");
        if let Dispatch::Exited { code, detail } = message {
            shared.handle_exit(code, detail);
        }
    }
}

/// Collapse a caller string into one console line.
fn single_line(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// Lock a std mutex, recovering the data if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_without_process() {
        let supervisor = Supervisor::default();
        assert_eq!(supervisor.stop().await, Err(SupervisorError::NotRunning));
        assert_eq!(supervisor.kill(), Err(SupervisorError::NotRunning));
        assert_eq!(supervisor.send_raw("list").await, Err(SupervisorError::NotRunning));
        assert_eq!(
            supervisor.run_command("list", Duration::from_millis(10)).await,
            Err(SupervisorError::NotRunning)
        );
        assert_eq!(supervisor.say("Alice", "hi").await, Err(SupervisorError::NotRunning));
    }

    #[test]
    fn test_initial_status() {
        let supervisor = Supervisor::default();
        let status = supervisor.status();
        assert_eq!(status.state, ServerState::Stopped);
        assert_eq!(status.pid, None);
        assert!(!supervisor.is_running());
        assert!(supervisor.recent_console(10).is_empty());
    }

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("  list \n"), "list");
        assert_eq!(single_line("say hi\nstop"), "say hi stop");
        assert_eq!(single_line("a\r\nb"), "a  b");
        assert_eq!(single_line(" \n "), "");
    }

    #[test]
    fn test_handle_line_routes_chat_and_capture() {
        let supervisor = Supervisor::default();
        let mut events = supervisor.subscribe();
        let shared = &supervisor.shared;

        shared.handle_line(LogSource::Stdout, "[12:00:00] [Server thread/INFO]: <Alice> hello".into());
        assert_eq!(
            events.try_recv().unwrap(),
            ServerEvent::ChatMessage { speaker: "Alice".into(), message: "hello".into() }
        );

        lock(&shared.capture).open();
        shared.handle_line(LogSource::Stdout, "[12:00:01] [Server thread/INFO]: <Bob> captured".into());
        shared.handle_line(LogSource::Stderr, "java.lang.RuntimeException".into());
        shared.handle_line(LogSource::Stdout, "   ".into());
        assert_eq!(
            lock(&shared.capture).close(),
            vec!["<Bob> captured", "java.lang.RuntimeException"]
        );
        assert!(events.try_recv().is_err());

        let history = supervisor.recent_console(10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].source, LogSource::Stderr);
        assert_eq!(history[2].level, LogLevel::Warn);
    }

    #[test]
    fn test_stderr_chat_is_not_broadcast() {
        let supervisor = Supervisor::default();
        let mut events = supervisor.subscribe();
        supervisor
            .shared
            .handle_line(LogSource::Stderr, "[12:00:00] [Server thread/INFO]: <Alice> hello".into());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_capture_guard_closes_on_drop() {
        let window = Mutex::new(CaptureWindow::new());
        {
            let _guard = CaptureGuard::open(&window);
            assert!(lock(&window).is_active());
        }
        assert!(!lock(&window).is_active());
    }
}
