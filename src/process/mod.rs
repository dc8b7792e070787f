//! A single supervised OS process: spawning it with the right environment,
//! user/group and piped output, and later signalling it to stop.
//!
//! Like the output-streaming command runners this engine grew out of,
//! `Process` is a typestate: an [`Unstarted`] process only holds what it
//! needs to spawn, a [`Started`] one only holds what it needs to signal and
//! wait on. There is no state in which both are valid at once.

mod error;

pub use error::ProcessError;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::credentials::{self, Credentials};
use crate::output::{FanoutWriter, LineBuffer};
use crate::reaper::{ExitStatus, Reaper};

pub struct Unstarted;
pub struct Started;

pub struct Process<State = Unstarted> {
    name: String,
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    environment: HashMap<String, String>,
    credentials: Option<Credentials>,

    pid: Option<i32>,
    child: Option<std::process::Child>,
    exit_rx: Option<Receiver<ExitStatus>>,
    started_at: Option<Instant>,
    stream_threads: Mutex<Vec<JoinHandle<()>>>,

    state: PhantomData<State>,
}

impl Process<Unstarted> {
    pub fn new(service: &ServiceConfig) -> Result<Self, ProcessError> {
        let credentials = credentials::resolve(service.user.as_deref(), service.group.as_deref())?;
        Ok(Self {
            name: service.name.clone(),
            command: service.command.clone(),
            args: service.args.clone(),
            working_dir: service.working_dir.as_ref().map(PathBuf::from),
            environment: service.environment.clone(),
            credentials,
            pid: None,
            child: None,
            exit_rx: None,
            started_at: None,
            stream_threads: Mutex::new(Vec::new()),
            state: PhantomData,
        })
    }

    pub fn start(
        self,
        reaper: &Arc<Reaper>,
        mut stdout: Option<FanoutWriter>,
        mut stderr: Option<FanoutWriter>,
    ) -> Result<Process<Started>, ProcessError> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .envs(&self.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        if let Some(credentials) = &self.credentials {
            command.uid(credentials.uid.as_raw());
            command.gid(credentials.gid.as_raw());
        }
        // A fresh process group means SIGTERM/SIGKILL sent to the group
        // (signal_group) reaches this child and anything it forks without
        // also landing on the supervisor itself.
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        let pid = child.id() as i32;
        debug!(service = %self.name, pid, "spawned process");

        let exit_rx = reaper.register(pid);

        let out = child.stdout.take();
        let err = child.stderr.take();
        let mut stream_threads = Vec::new();
        stream_threads.extend(spawn_stream_thread(self.name.clone(), "stdout", out, stdout.take()));
        stream_threads.extend(spawn_stream_thread(self.name.clone(), "stderr", err, stderr.take()));

        Ok(Process {
            name: self.name,
            command: self.command,
            args: self.args,
            working_dir: self.working_dir,
            environment: self.environment,
            credentials: self.credentials,
            pid: Some(pid),
            child: Some(child),
            exit_rx: Some(exit_rx),
            started_at: Some(Instant::now()),
            stream_threads: Mutex::new(stream_threads),
            state: PhantomData,
        })
    }
}

impl Process<Started> {
    pub fn pid(&self) -> i32 {
        self.pid.expect("Started process always has a pid")
    }

    pub fn uptime(&self) -> Duration {
        self.started_at
            .expect("Started process always has a start time")
            .elapsed()
    }

    pub fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        signal::kill(Pid::from_raw(self.pid()), signal).map_err(|source| ProcessError::Signal {
            pid: self.pid(),
            source,
        })
    }

    /// Forwards `signal` to the child's whole process group (negative pid on
    /// Unix), reaching any descendants it spawned in turn.
    pub fn signal_group(&self, signal: Signal) -> Result<(), ProcessError> {
        signal::kill(Pid::from_raw(-self.pid()), signal).map_err(|source| ProcessError::Signal {
            pid: self.pid(),
            source,
        })
    }

    /// Blocks until the process exits, with no time limit.
    pub fn wait(&self) -> Result<ExitStatus, ProcessError> {
        self.exit_rx
            .as_ref()
            .expect("Started process always has an exit receiver")
            .recv()
            .map_err(|_| ProcessError::ReaperDisconnected(self.pid()))
    }

    /// Sends SIGTERM and waits up to `grace_period` for the process to exit;
    /// escalates to SIGKILL and waits indefinitely if it doesn't.
    pub fn terminate(&self, grace_period: Duration) -> Result<ExitStatus, ProcessError> {
        self.signal(Signal::SIGTERM)?;
        let rx = self
            .exit_rx
            .as_ref()
            .expect("Started process always has an exit receiver");
        match rx.recv_timeout(grace_period) {
            Ok(status) => Ok(status),
            Err(_) => {
                warn!(service = %self.name, pid = self.pid(), "grace period elapsed, sending SIGKILL");
                self.signal(Signal::SIGKILL)?;
                rx.recv().map_err(|_| ProcessError::ReaperDisconnected(self.pid()))
            }
        }
    }

    pub fn reload_signal(&self) -> Result<(), ProcessError> {
        self.signal(Signal::SIGHUP)
    }

    /// Joins the stdout/stderr capture threads, which close (and fsync)
    /// their sinks once they observe EOF on the child's pipes. Safe to call
    /// more than once; later calls are no-ops since the handles are taken
    /// on the first call.
    pub fn close_sinks(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.stream_threads.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn spawn_stream_thread(
    service: String,
    stream_name: &'static str,
    pipe: Option<impl std::io::Read + Send + 'static>,
    sink: Option<FanoutWriter>,
) -> Option<JoinHandle<()>> {
    let pipe = pipe?;
    Some(thread::spawn(move || {
        let mut pipe = pipe;
        let mut buffer = LineBuffer::new();
        let mut sink = sink;
        let mut chunk = [0u8; 4096];
        use std::io::Read;
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    for line in buffer.feed(&chunk[..n]) {
                        if let Some(sink) = sink.as_mut() {
                            if let Err(err) = sink.write_line(&line) {
                                warn!(service = %service, stream = stream_name, %err, "failed writing captured output");
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(service = %service, stream = stream_name, %err, "error reading captured output");
                    break;
                }
            }
        }
        if let Some(tail) = buffer.flush() {
            if let Some(sink) = sink.as_mut() {
                let _ = sink.write_line(&tail);
            }
        }
        if let Some(sink) = sink.as_mut() {
            if let Err(err) = sink.close() {
                warn!(service = %service, stream = stream_name, %err, "failed closing captured output sink");
            }
        }
    }))
}
