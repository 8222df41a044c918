//! In-memory fakes of the container engine and remote shell

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::engine::{
    CommitSpec, ContainerEngine, ContainerSpec, EngineError, ExecState, ImageReference,
    PushProgress, PushStream, RegistryCredentials,
};
use crate::models::{ContainerSummary, FsChange};
use crate::tty::{BridgeError, RemoteShell, ShellConnector, ShellEvent};

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    image: String,
    running: bool,
}

#[derive(Debug, Clone)]
struct FakeExec {
    container_id: String,
    exit_code: i64,
    started: bool,
    inspections: u32,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    containers: HashMap<String, FakeContainer>,
    execs: HashMap<String, FakeExec>,
    images: HashMap<String, String>,
    pulls: Vec<String>,
    pushes: Vec<(String, Option<RegistryCredentials>)>,
    commits: Vec<(String, CommitSpec)>,
    changes: Vec<FsChange>,
    push_script: Option<Vec<PushProgress>>,
    create_error: Option<String>,
    start_error: Option<String>,
    exec_running_polls: u32,
    exec_hangs: bool,
    stop_on_inspect: bool,
}

/// Container engine that keeps everything in memory.
///
/// Commands follow shell conventions: `true` and `echo` exit 0, `false` exits 1,
/// `exit N` exits N and anything else exits 127.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Register a running container with the given id
    pub fn with_running_container(self, id: &str) -> Self {
        self.state().containers.insert(
            id.to_string(),
            FakeContainer {
                name: id.to_string(),
                image: "fake:latest".to_string(),
                running: true,
            },
        );
        self
    }

    pub fn with_changes(self, changes: Vec<FsChange>) -> Self {
        self.state().changes = changes;
        self
    }

    pub fn with_push_script(self, script: Vec<PushProgress>) -> Self {
        self.state().push_script = Some(script);
        self
    }

    pub fn failing_create(self, message: &str) -> Self {
        self.state().create_error = Some(message.to_string());
        self
    }

    pub fn failing_start(self, message: &str) -> Self {
        self.state().start_error = Some(message.to_string());
        self
    }

    /// Report execs as running for this many inspections before they exit
    pub fn with_exec_running_polls(self, polls: u32) -> Self {
        self.state().exec_running_polls = polls;
        self
    }

    /// Execs never finish
    pub fn with_hanging_execs(self) -> Self {
        self.state().exec_hangs = true;
        self
    }

    /// The container disappears the first time a running exec is inspected
    pub fn removing_container_during_exec(self) -> Self {
        self.state().exec_hangs = true;
        self.state().stop_on_inspect = true;
        self
    }

    /// Remove a container behind the orchestrator's back
    pub fn remove_container(&self, id: &str) {
        self.state().containers.remove(id);
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state().pulls.clone()
    }

    pub fn pushes(&self) -> Vec<(String, Option<RegistryCredentials>)> {
        self.state().pushes.clone()
    }

    pub fn commits(&self) -> Vec<(String, CommitSpec)> {
        self.state().commits.clone()
    }

    pub fn is_present(&self, id: &str) -> bool {
        self.state().containers.contains_key(id)
    }

    pub fn container_name(&self, id: &str) -> Option<String> {
        self.state().containers.get(id).map(|c| c.name.clone())
    }

    /// Image id a reference currently resolves to
    pub fn image_for(&self, reference: &str) -> Option<String> {
        self.state().images.get(reference).cloned()
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}{:012x}", prefix, state.next_id)
    }
}

fn exit_code_for(argv: &[String]) -> i64 {
    match argv.first().map(String::as_str) {
        Some("true") | Some("echo") => 0,
        Some("false") => 1,
        Some("exit") => argv.get(1).and_then(|code| code.parse().ok()).unwrap_or(0),
        _ => 127,
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn version(&self) -> Result<String, EngineError> {
        Ok("fake-24.0".to_string())
    }

    async fn pull_image(&self, reference: &ImageReference) -> Result<(), EngineError> {
        self.state().pulls.push(reference.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let mut state = self.state();
        if let Some(message) = state.create_error.clone() {
            return Err(EngineError::Api(message));
        }
        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(EngineError::Conflict(format!(
                "The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        let id = Self::next_id(&mut state, "c");
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: spec.name.clone(),
                image: spec.image.clone(),
                running: false,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        if let Some(message) = state.start_error.clone() {
            return Err(EngineError::Api(message));
        }
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(EngineError::NotFound(id.to_string())),
        }
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        match state.containers.get(id) {
            None => Err(EngineError::NotFound(id.to_string())),
            Some(container) if !container.running => Err(EngineError::NotModified(id.to_string())),
            Some(_) => {
                // auto-remove
                state.containers.remove(id);
                Ok(())
            }
        }
    }

    async fn is_running(&self, id: &str) -> Result<bool, EngineError> {
        Ok(self.state().containers.get(id).map(|c| c.running).unwrap_or(false))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        let state = self.state();
        let mut summaries: Vec<ContainerSummary> = state
            .containers
            .iter()
            .filter(|(_, c)| c.running)
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                names: vec![c.name.clone()],
                image: c.image.clone(),
                state: Some("running".to_string()),
                ..Default::default()
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn container_changes(&self, id: &str) -> Result<Vec<FsChange>, EngineError> {
        let state = self.state();
        if !state.containers.contains_key(id) {
            return Err(EngineError::NotFound(id.to_string()));
        }
        Ok(state.changes.clone())
    }

    async fn create_exec(&self, container_id: &str, argv: &[String]) -> Result<String, EngineError> {
        let mut state = self.state();
        match state.containers.get(container_id) {
            None => return Err(EngineError::NotFound(container_id.to_string())),
            Some(c) if !c.running => {
                return Err(EngineError::Conflict(format!(
                    "Container {} is not running",
                    container_id
                )))
            }
            Some(_) => {}
        }
        let id = Self::next_id(&mut state, "e");
        state.execs.insert(
            id.clone(),
            FakeExec {
                container_id: container_id.to_string(),
                exit_code: exit_code_for(argv),
                started: false,
                inspections: 0,
            },
        );
        Ok(id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<(), EngineError> {
        match self.state().execs.get_mut(exec_id) {
            Some(exec) => {
                exec.started = true;
                Ok(())
            }
            None => Err(EngineError::NotFound(exec_id.to_string())),
        }
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecState, EngineError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let exec = state
            .execs
            .get_mut(exec_id)
            .ok_or_else(|| EngineError::NotFound(exec_id.to_string()))?;

        if !exec.started {
            return Ok(ExecState::default());
        }

        exec.inspections += 1;
        if state.exec_hangs || exec.inspections <= state.exec_running_polls {
            if state.stop_on_inspect {
                let container_id = exec.container_id.clone();
                state.containers.remove(&container_id);
            }
            return Ok(ExecState {
                running: true,
                exit_code: None,
            });
        }

        Ok(ExecState {
            running: false,
            exit_code: Some(exec.exit_code),
        })
    }

    async fn commit_container(&self, container_id: &str, spec: &CommitSpec) -> Result<String, EngineError> {
        let mut state = self.state();
        if !state.containers.contains_key(container_id) {
            return Err(EngineError::NotFound(container_id.to_string()));
        }
        state.next_id += 1;
        let image_id = format!("sha256:{:064x}", state.next_id);
        state.images.insert(spec.reference.to_string(), image_id.clone());
        state.commits.push((container_id.to_string(), spec.clone()));
        Ok(image_id)
    }

    async fn push_image(
        &self,
        reference: &ImageReference,
        credentials: Option<RegistryCredentials>,
    ) -> Result<PushStream, EngineError> {
        let mut state = self.state();
        state.pushes.push((reference.to_string(), credentials));

        let script = state.push_script.clone().unwrap_or_else(|| {
            vec![
                PushProgress {
                    status: Some(format!("The push refers to repository [{}]", reference.repository)),
                    ..Default::default()
                },
                PushProgress {
                    id: Some("5f70bf18a086".to_string()),
                    status: Some("Pushed".to_string()),
                    ..Default::default()
                },
                PushProgress {
                    status: Some(format!("{}: digest: sha256:0 size: 528", reference.tag)),
                    ..Default::default()
                },
            ]
        });

        Ok(futures::stream::iter(script.into_iter().map(Ok)).boxed())
    }
}

/// How a [`FakeConnector`] behaves
#[derive(Debug, Clone, Default)]
pub struct ShellScript {
    pub connect_error: Option<String>,
    pub shell_error: Option<String>,
    pub connect_delay: Duration,
    /// Close the shell once this many bytes were echoed
    pub close_after: Option<usize>,
    /// Fail the stream once this many bytes were echoed
    pub fail_after: Option<(usize, String)>,
}

/// Connects to an in-memory shell that echoes its input
#[derive(Default)]
pub struct FakeConnector {
    script: ShellScript,
    connects: AtomicUsize,
    closed: Arc<AtomicBool>,
}

impl FakeConnector {
    pub fn new(script: ShellScript) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Whether the last shell was torn down
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShellConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>, BridgeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.script.connect_delay.is_zero() {
            tokio::time::sleep(self.script.connect_delay).await;
        }
        if let Some(message) = &self.script.connect_error {
            return Err(BridgeError::Connect(message.clone()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Box::new(EchoShell {
            script: self.script.clone(),
            events_tx,
            events_rx,
            echoed: 0,
            closed: self.closed.clone(),
        }))
    }
}

struct EchoShell {
    script: ShellScript,
    events_tx: mpsc::UnboundedSender<ShellEvent>,
    events_rx: mpsc::UnboundedReceiver<ShellEvent>,
    echoed: usize,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl RemoteShell for EchoShell {
    async fn open_shell(&mut self) -> Result<(), BridgeError> {
        match &self.script.shell_error {
            Some(message) => Err(BridgeError::Shell(message.clone())),
            None => Ok(()),
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.echoed += bytes.len();
        let _ = self.events_tx.send(ShellEvent::Output(bytes.to_vec()));

        if let Some((limit, message)) = &self.script.fail_after {
            if self.echoed >= *limit {
                let _ = self.events_tx.send(ShellEvent::Failed(message.clone()));
            }
        } else if let Some(limit) = self.script.close_after {
            if self.echoed >= limit {
                let _ = self.events_tx.send(ShellEvent::Closed);
            }
        }
        Ok(())
    }

    async fn next_event(&mut self) -> ShellEvent {
        match self.events_rx.recv().await {
            Some(event) => event,
            None => ShellEvent::Closed,
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
