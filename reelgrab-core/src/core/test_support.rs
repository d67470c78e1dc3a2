//! Scripted stand-in for the process boundary.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::process::{ProcessControl, ProcessEvent, ProcessLauncher, Signal, SpawnedProcess};

#[derive(Debug, Clone, Default)]
pub struct Script {
    stdout: Vec<String>,
    stderr: Vec<String>,
    /// `None` keeps the process alive until killed or released.
    code: Option<i32>,
    ignore_terminate: bool,
    not_found: bool,
}

impl Script {
    pub fn exits(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    pub fn hangs() -> Self {
        Self::default()
    }

    pub fn not_found() -> Self {
        Self {
            not_found: true,
            ..Default::default()
        }
    }

    pub fn stdout(mut self, line: &str) -> Self {
        self.stdout.push(line.to_string());
        self
    }

    pub fn stderr(mut self, line: &str) -> Self {
        self.stderr.push(line.to_string());
        self
    }

    pub fn ignore_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub program: PathBuf,
    pub args: Vec<String>,
}

enum Ctl {
    Signal(Signal),
    Exit(i32),
}

struct FakeControl {
    tx: mpsc::UnboundedSender<Ctl>,
    kills: Arc<Mutex<Vec<Signal>>>,
}

impl ProcessControl for FakeControl {
    fn kill(&self, signal: Signal) {
        self.kills.lock().unwrap().push(signal);
        let _ = self.tx.send(Ctl::Signal(signal));
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    scripts: Mutex<VecDeque<Script>>,
    default_script: Mutex<Option<Script>>,
    calls: Mutex<Vec<Call>>,
    controls: Mutex<Vec<mpsc::UnboundedSender<Ctl>>>,
    kills: Arc<Mutex<Vec<Signal>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Used once the queued scripts run out.
    pub fn set_default(&self, script: Script) {
        *self.default_script.lock().unwrap() = Some(script);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn kills(&self) -> Vec<Signal> {
        self.kills.lock().unwrap().clone()
    }

    /// Makes the `index`-th spawned (hanging) process exit with `code`.
    pub fn release(&self, index: usize, code: i32) {
        let controls = self.controls.lock().unwrap();
        let _ = controls[index].send(Ctl::Exit(code));
    }

    pub async fn wait_for_spawns(&self, n: usize) {
        for _ in 0..1000 {
            if self.spawn_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {} spawns, saw {}", n, self.spawn_count());
    }

    fn next_script(&self) -> Script {
        if let Some(s) = self.scripts.lock().unwrap().pop_front() {
            return s;
        }
        self.default_script
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Script::exits(0))
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn start(&self, program: &Path, args: &[String]) -> std::io::Result<SpawnedProcess> {
        let script = self.next_script();
        if script.not_found {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"));
        }

        self.calls.lock().unwrap().push(Call {
            program: program.to_path_buf(),
            args: args.to_vec(),
        });

        let (tx, rx) = mpsc::channel(64);
        let (ctl_tx, mut ctl_rx) = mpsc::unbounded_channel();
        self.controls.lock().unwrap().push(ctl_tx.clone());

        tokio::spawn(async move {
            for line in script.stdout {
                let _ = tx.send(ProcessEvent::Stdout(line)).await;
            }
            for line in script.stderr {
                let _ = tx.send(ProcessEvent::Stderr(line)).await;
            }
            if let Some(code) = script.code {
                let _ = tx.send(ProcessEvent::Exited(Some(code))).await;
                return;
            }
            while let Some(ctl) = ctl_rx.recv().await {
                match ctl {
                    Ctl::Signal(Signal::Terminate) if script.ignore_terminate => continue,
                    Ctl::Signal(_) => {
                        let _ = tx.send(ProcessEvent::Exited(None)).await;
                        return;
                    }
                    Ctl::Exit(code) => {
                        let _ = tx.send(ProcessEvent::Exited(Some(code))).await;
                        return;
                    }
                }
            }
        });

        Ok(SpawnedProcess {
            pid: None,
            events: rx,
            control: Arc::new(FakeControl {
                tx: ctl_tx,
                kills: self.kills.clone(),
            }),
        })
    }
}
