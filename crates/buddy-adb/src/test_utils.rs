//! Test utilities for code built on [`ProcessRunner`]
//!
//! [`FixtureRunner`] answers argument vectors with canned output. Blocking
//! fixtures hold raw adb text and go through the real sanitizer; interactive
//! fixtures are scripts of chunks that can pause until the consumer writes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buddy_core::prelude::*;

use crate::interactive::InteractiveCommand;
use crate::process::ProcessRunner;
use crate::sanitize::sanitize;

/// One step of a scripted interactive session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Deliver a chunk of terminal output
    Chunk(String),
    /// Deliver a chunk that fails to decode
    InvalidUtf8,
    /// Block until the consumer writes a line
    AwaitInput,
    /// Block until cancelled, like a transfer that never finishes
    Hang,
}

impl ScriptStep {
    pub fn chunk(text: impl Into<String>) -> Self {
        ScriptStep::Chunk(text.into())
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    SpawnFailure,
}

#[derive(Debug, Default)]
struct Fixtures {
    blocking: HashMap<Vec<String>, VecDeque<Reply>>,
    delays: HashMap<Vec<String>, Duration>,
    interactive: HashMap<Vec<String>, Vec<ScriptStep>>,
    calls: Vec<Vec<String>>,
    writes: Vec<String>,
}

/// A programmable [`ProcessRunner`].
///
/// Replies queued for the same arguments are consumed in order; the last
/// one repeats forever so polling loops keep getting an answer. Unknown
/// arguments fail like adb does for an unknown command.
#[derive(Debug, Clone, Default)]
pub struct FixtureRunner {
    fixtures: Arc<Mutex<Fixtures>>,
}

impl FixtureRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw output for a blocking command
    pub fn on_run(&self, args: &[&str], raw_output: &str) -> &Self {
        self.push_reply(args, Reply::Output(raw_output.to_string()))
    }

    /// Queue a spawn failure for a blocking command
    pub fn fail_spawn(&self, args: &[&str]) -> &Self {
        self.push_reply(args, Reply::SpawnFailure)
    }

    /// Delay every reply for `args` by `delay`
    pub fn delay(&self, args: &[&str], delay: Duration) -> &Self {
        self.lock().delays.insert(key(args), delay);
        self
    }

    /// Script an interactive session
    pub fn on_interactive(&self, args: &[&str], script: Vec<ScriptStep>) -> &Self {
        self.lock().interactive.insert(key(args), script);
        self
    }

    /// Every argument vector run so far, blocking and interactive
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.lock().calls.clone()
    }

    /// Number of times `args` was run
    pub fn call_count(&self, args: &[&str]) -> usize {
        let wanted = key(args);
        self.lock().calls.iter().filter(|c| **c == wanted).count()
    }

    /// Every line written to interactive sessions, newline included
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    fn push_reply(&self, args: &[&str], reply: Reply) -> &Self {
        self.lock()
            .blocking
            .entry(key(args))
            .or_default()
            .push_back(reply);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Fixtures> {
        self.fixtures.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, args: &[String]) -> (Option<Reply>, Option<Duration>) {
        let mut fixtures = self.lock();
        fixtures.calls.push(args.to_vec());
        let delay = fixtures.delays.get(args).copied();
        let reply = fixtures.blocking.get_mut(args).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        });
        (reply, delay)
    }
}

impl ProcessRunner for FixtureRunner {
    async fn run(&self, args: &[String]) -> Result<String> {
        let (reply, delay) = self.next_reply(args);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Some(Reply::Output(raw)) => sanitize(&raw),
            Some(Reply::SpawnFailure) => Err(Error::process_spawn("fixture spawn failure")),
            None => sanitize(&format!("adb: unknown command {}\n", args.join(" "))),
        }
    }

    fn run_interactive(&self, args: &[String]) -> Result<InteractiveCommand> {
        let script = {
            let mut fixtures = self.lock();
            fixtures.calls.push(args.to_vec());
            fixtures.interactive.get(args).cloned()
        };
        let Some(script) = script else {
            return Err(Error::process_spawn(format!(
                "no interactive fixture for {}",
                args.join(" ")
            )));
        };

        let (command, io) = InteractiveCommand::channel(None);
        let fixtures = Arc::clone(&self.fixtures);

        tokio::spawn(async move {
            let mut input = io.input;
            for step in script {
                let keep_going = tokio::select! {
                    biased;
                    _ = io.cancel.cancelled() => false,
                    _ = io.chunks.closed() => false,
                    ok = play(step, &io.chunks, &mut input, &fixtures) => ok,
                };
                if !keep_going {
                    break;
                }
            }
            io.exit.mark_exited();
        });

        Ok(command)
    }
}

/// Run one step. Returns false when the script must stop.
async fn play(
    step: ScriptStep,
    chunks: &tokio::sync::mpsc::Sender<Result<String>>,
    input: &mut tokio::sync::mpsc::UnboundedReceiver<String>,
    fixtures: &Mutex<Fixtures>,
) -> bool {
    match step {
        ScriptStep::Chunk(text) => chunks.send(Ok(text)).await.is_ok(),
        ScriptStep::InvalidUtf8 => {
            let _ = chunks.send(Err(Error::NonDecodableOutput)).await;
            false
        }
        ScriptStep::AwaitInput => match input.recv().await {
            Some(line) => {
                fixtures
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .writes
                    .push(line);
                true
            }
            None => false,
        },
        ScriptStep::Hang => std::future::pending().await,
    }
}

fn key(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}
