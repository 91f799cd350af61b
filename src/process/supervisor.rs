//! Supervision of named external processes
//!
//! Each registered name owns exactly one slot. A slot runs at most one process
//! at a time; starting an occupied slot fails immediately with
//! [`WizardError::AlreadyRunning`] instead of queueing. Output is drained line by
//! line while the process runs, forwarded to the log and the presentation
//! channel, and retained on the slot until the next start.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{Result, WizardError};
use crate::models::{AppEvent, OutputStream, ProcessInvocation, ProcessOutcome, ProcessState};
use crate::process::classify::{classify_line, forward_line};

/// Mutable record of one process slot
#[derive(Debug)]
struct ProcessHandle {
    command: String,
    base_args: Vec<String>,
    arguments: Vec<String>,
    env_overrides: BTreeMap<String, String>,
    state: ProcessState,
    accumulated_stdout: String,
    accumulated_stderr: String,
    last_exit_code: Option<i32>,
}

impl ProcessHandle {
    fn new(command: String, base_args: Vec<String>) -> Self {
        Self {
            arguments: base_args.clone(),
            command,
            base_args,
            env_overrides: BTreeMap::new(),
            state: ProcessState::NotRunning,
            accumulated_stdout: String::new(),
            accumulated_stderr: String::new(),
            last_exit_code: None,
        }
    }
}

/// Read-only copy of a slot for inspection
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub command: String,
    pub arguments: Vec<String>,
    pub env_overrides: BTreeMap<String, String>,
    pub state: ProcessState,
    pub accumulated_stdout: String,
    pub accumulated_stderr: String,
    pub last_exit_code: Option<i32>,
}

type SharedHandle = Arc<Mutex<ProcessHandle>>;

fn lock(handle: &SharedHandle) -> MutexGuard<'_, ProcessHandle> {
    // A panicking reader task must not wedge the slot forever
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owner of all named process slots
pub struct ExternalProcessSupervisor {
    slots: Mutex<HashMap<String, SharedHandle>>,
    start_timeout: Duration,
    sink: Option<mpsc::UnboundedSender<AppEvent>>,
}

impl ExternalProcessSupervisor {
    pub fn new(start_timeout: Duration, sink: Option<mpsc::UnboundedSender<AppEvent>>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            start_timeout,
            sink,
        }
    }

    /// Create (or re-point) the slot `name` at `executable base_args...`
    pub fn register(&self, name: &str, executable: &str, base_args: &[&str]) -> Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = slots.get(name) {
            if lock(existing).state != ProcessState::NotRunning {
                return Err(WizardError::AlreadyRunning(name.to_string()));
            }
        }
        log::debug!(
            "Adding external process {} ({}, {:?})",
            name,
            executable,
            base_args
        );
        let handle = ProcessHandle::new(
            executable.to_string(),
            base_args.iter().map(|s| s.to_string()).collect(),
        );
        slots.insert(name.to_string(), Arc::new(Mutex::new(handle)));
        Ok(())
    }

    fn slot(&self, name: &str) -> Result<SharedHandle> {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| WizardError::Config(format!("no process registered as '{}'", name)))
    }

    pub fn state(&self, name: &str) -> Option<ProcessState> {
        self.slot(name).ok().map(|h| lock(&h).state)
    }

    /// True when the slot exists and is not `NotRunning`
    pub fn is_busy(&self, name: &str) -> bool {
        matches!(
            self.state(name),
            Some(ProcessState::Starting) | Some(ProcessState::Running)
        )
    }

    pub fn snapshot(&self, name: &str) -> Option<ProcessSnapshot> {
        let handle = self.slot(name).ok()?;
        let h = lock(&handle);
        Some(ProcessSnapshot {
            command: h.command.clone(),
            arguments: h.arguments.clone(),
            env_overrides: h.env_overrides.clone(),
            state: h.state,
            accumulated_stdout: h.accumulated_stdout.clone(),
            accumulated_stderr: h.accumulated_stderr.clone(),
            last_exit_code: h.last_exit_code,
        })
    }

    fn set_state(&self, name: &str, handle: &SharedHandle, state: ProcessState) {
        lock(handle).state = state;
        log::info!("{}:State changed: {}", name, state);
        if let Some(tx) = &self.sink {
            let _ = tx.send(AppEvent::ProcessStateChanged(name.to_string(), state));
        }
    }

    /// Run the process registered as `name` to completion.
    ///
    /// Fails with `AlreadyRunning` (without touching the slot) when the slot is
    /// occupied. Otherwise `on_finished` is called exactly once with the
    /// outcome, including when the executable cannot be launched. There is no
    /// limit on how long the process may run.
    pub async fn start<F>(
        &self,
        name: &str,
        invocation: ProcessInvocation,
        on_finished: F,
    ) -> Result<ProcessOutcome>
    where
        F: FnOnce(&ProcessOutcome) + Send,
    {
        let handle = self.slot(name)?;

        let (command, all_args) = {
            let mut h = lock(&handle);
            if h.state != ProcessState::NotRunning {
                return Err(WizardError::AlreadyRunning(name.to_string()));
            }
            h.state = ProcessState::Starting;
            h.accumulated_stdout.clear();
            h.accumulated_stderr.clear();
            h.last_exit_code = None;
            h.arguments = h
                .base_args
                .iter()
                .chain(invocation.extra_args.iter())
                .cloned()
                .collect();
            h.env_overrides = invocation.env_overrides.clone();
            (h.command.clone(), h.arguments.clone())
        };
        log::info!("{}:State changed: {}", name, ProcessState::Starting);
        if let Some(tx) = &self.sink {
            let _ = tx.send(AppEvent::ProcessStateChanged(
                name.to_string(),
                ProcessState::Starting,
            ));
        }

        log::info!("Starting {} with args: {:?}", command, all_args);
        if !invocation.env_overrides.is_empty() {
            log::debug!("{} environment overrides: {:?}", name, invocation.env_overrides);
        }

        let mut cmd = Command::new(&command);
        cmd.args(&all_args)
            .envs(&invocation.env_overrides)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("{}:failed to start {}: {}", name, command, e);
                let outcome = {
                    let mut h = lock(&handle);
                    h.accumulated_stderr.push_str(&e.to_string());
                    ProcessOutcome {
                        name: name.to_string(),
                        exit_code: None,
                        stdout: String::new(),
                        stderr: h.accumulated_stderr.clone(),
                    }
                };
                self.set_state(name, &handle, ProcessState::NotRunning);
                on_finished(&outcome);
                return Ok(outcome);
            }
        };
        if spawn_started.elapsed() > self.start_timeout {
            // Advisory only, slow spawns under load are tolerated
            log::warn!(
                "{}:did not start within {:?}",
                name,
                self.start_timeout
            );
        }
        self.set_state(name, &handle, ProcessState::Running);

        let mut readers: Vec<JoinHandle<()>> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_reader(name, &handle, stdout, OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader(name, &handle, stderr, OutputStream::Stderr));
        }

        let exit_code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                log::warn!("{}:did not finish: {}", name, e);
                None
            }
        };
        for reader in readers {
            let _ = reader.await;
        }

        let outcome = {
            let mut h = lock(&handle);
            h.last_exit_code = exit_code;
            ProcessOutcome {
                name: name.to_string(),
                exit_code,
                stdout: h.accumulated_stdout.clone(),
                stderr: h.accumulated_stderr.clone(),
            }
        };
        self.set_state(name, &handle, ProcessState::NotRunning);
        log::info!("{} finished with status {:?}", name, exit_code);

        on_finished(&outcome);
        Ok(outcome)
    }

    fn spawn_reader<R>(
        &self,
        name: &str,
        handle: &SharedHandle,
        stream: R,
        kind: OutputStream,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = handle.clone();
        let sink = self.sink.clone();
        let name = name.to_string();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buffer = Vec::new();

            while reader.read_until(b'\n', &mut buffer).await.unwrap_or(0) > 0 {
                let line = String::from_utf8_lossy(&buffer)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                buffer.clear();

                {
                    let mut h = lock(&handle);
                    let text = match kind {
                        OutputStream::Stderr => &mut h.accumulated_stderr,
                        _ => &mut h.accumulated_stdout,
                    };
                    text.push_str(&line);
                    text.push('\n');
                }
                let level = classify_line(kind, &line);
                forward_line(&name, level, line, sink.as_ref());
            }
        })
    }
}
