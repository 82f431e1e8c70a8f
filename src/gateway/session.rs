//! Session protocol adapter
//!
//! Binds one client to at most one in-flight execution. The adapter is
//! transport agnostic: it reads wire text from one channel and writes
//! [`ServerMessage`]s to another, so the WebSocket handler only pumps frames.
//!
//! Events are forwarded in the order the supervisor produced them. After a
//! prompt line is forwarded, further non-terminal events are held until the
//! client answers with input for that process; a terminal event flushes
//! everything held and then itself. Prompts inferred from idle stdout are
//! forwarded without holding anything. Events are read continuously, so a
//! run always reaches its terminal event; once the hold reaches
//! [`MAX_HELD_EVENTS`] it is flushed and holding stops until the next prompt.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{
    errors, parse_client_message, ClientMessage, InputRequest, RunRequest, ServerMessage,
};
use crate::error::Error;
use crate::sandbox::{Engine, ExecutionEvent, ExecutionRequest, Language, ProcessHandle, ProcessId};

/// Events held behind an unanswered prompt before they are flushed anyway
const MAX_HELD_EVENTS: usize = 4096;

struct ActiveRun {
    id: ProcessId,
    events: mpsc::Receiver<ExecutionEvent>,
    /// A forwarded prompt has not been answered yet
    suspended: bool,
    held: VecDeque<ExecutionEvent>,
}

enum Step {
    Message(Option<String>),
    Event(Option<ExecutionEvent>),
}

/// State for one connected client
pub struct Session {
    id: Uuid,
    engine: Engine,
    processes: HashMap<ProcessId, Arc<ProcessHandle>>,
    active: Option<ActiveRun>,
}

impl Session {
    pub fn new(engine: Engine) -> Self {
        Session {
            id: Uuid::new_v4(),
            engine,
            processes: HashMap::new(),
            active: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serve the client until its inbound channel closes or the outbound
    /// side goes away. Every tracked process is terminated on return.
    pub async fn serve(
        mut self,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<ServerMessage>,
    ) {
        info!(session_id = %self.id, "Session opened");

        loop {
            let step = tokio::select! {
                message = inbound.recv() => Step::Message(message),
                event = next_event(&mut self.active) => Step::Event(event),
            };

            let replies = match step {
                Step::Message(Some(text)) => self.handle_text(&text).await,
                Step::Message(None) => break,
                Step::Event(event) => self.handle_event(event),
            };

            let mut delivered = true;
            for reply in replies {
                if outbound.send(reply).await.is_err() {
                    delivered = false;
                    break;
                }
            }
            if !delivered {
                debug!(session_id = %self.id, "Client went away");
                break;
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> Vec<ServerMessage> {
        debug!(session_id = %self.id, "Received: {}", text);

        match parse_client_message(text) {
            Ok(ClientMessage::Run(run)) => self.handle_run(run).await,
            Ok(ClientMessage::Input(input)) => self.handle_input(input),
            Err(reply) => vec![reply],
        }
    }

    async fn handle_run(&mut self, run: RunRequest) -> Vec<ServerMessage> {
        if let Some(active) = &self.active {
            return vec![ServerMessage::process_error(
                errors::ALREADY_RUNNING,
                active.id.to_string().into(),
            )];
        }

        let language: Language = match run.language.parse() {
            Ok(language) => language,
            Err(e) => return vec![ServerMessage::error(e.to_string())],
        };

        let mut request = ExecutionRequest::new(run.code, language);
        request.stdin = run.stdin;

        match self.engine.start(request).await {
            Ok(execution) => {
                let id = execution.id();
                info!(session_id = %self.id, process_id = %id, %language, "Run accepted");
                self.processes.insert(id, execution.handle);
                self.active = Some(ActiveRun {
                    id,
                    events: execution.events,
                    suspended: false,
                    held: VecDeque::new(),
                });
                Vec::new()
            }
            Err(e @ Error::InvalidInput(_)) => vec![ServerMessage::error(e.to_string())],
            Err(e) => {
                warn!(session_id = %self.id, "Run failed to launch: {}", e);
                vec![ServerMessage::from(ExecutionEvent::Failed {
                    id: None,
                    reason: e.to_string(),
                })]
            }
        }
    }

    fn handle_input(&mut self, input: InputRequest) -> Vec<ServerMessage> {
        let target = input.target();
        let Some(handle) = target.and_then(|id| self.processes.get(&id)) else {
            return vec![ServerMessage::no_active_process(input.process_id)];
        };

        let accepted = handle.inject_input(input.stdin);
        let mut replies = match self.active.as_mut() {
            Some(active) if Some(active.id) == target => release_held(active),
            _ => Vec::new(),
        };

        if let Err(e) = accepted {
            // The terminal event is still on its way; keep the client informed
            debug!(session_id = %self.id, "Input rejected: {}", e);
            replies.push(ServerMessage::no_active_process(input.process_id));
        }
        replies
    }

    fn handle_event(&mut self, event: Option<ExecutionEvent>) -> Vec<ServerMessage> {
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };

        let event = match event {
            Some(event) => event,
            // Supervisor ended without a terminal event
            None => ExecutionEvent::Failed {
                id: Some(active.id),
                reason: "supervision ended unexpectedly".to_string(),
            },
        };

        if event.is_terminal() {
            let mut replies: Vec<ServerMessage> =
                active.held.drain(..).map(ServerMessage::from).collect();
            replies.push(ServerMessage::from(event));

            let id = active.id;
            self.processes.remove(&id);
            self.active = None;
            info!(session_id = %self.id, process_id = %id, "Run finished");
            return replies;
        }

        if active.suspended {
            active.held.push_back(event);
            if active.held.len() < MAX_HELD_EVENTS {
                return Vec::new();
            }

            warn!(
                session_id = %self.id,
                process_id = %active.id,
                "Prompt unanswered after {} events, resuming output", MAX_HELD_EVENTS
            );
            active.suspended = false;
            return active.held.drain(..).map(ServerMessage::from).collect();
        }

        active.suspended = event.is_line_prompt();
        vec![ServerMessage::from(event)]
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for (id, handle) in self.processes.drain() {
            debug!(session_id = %self.id, process_id = %id, "Terminating on disconnect");
            handle.terminate();
        }
        info!(session_id = %self.id, "Session closed");
    }
}

/// Forward held events up to and including the next prompt
fn release_held(active: &mut ActiveRun) -> Vec<ServerMessage> {
    active.suspended = false;
    let mut replies = Vec::new();

    while let Some(event) = active.held.pop_front() {
        let prompt = event.is_line_prompt();
        replies.push(ServerMessage::from(event));
        if prompt {
            active.suspended = true;
            break;
        }
    }

    replies
}

async fn next_event(active: &mut Option<ActiveRun>) -> Option<ExecutionEvent> {
    match active {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::sandbox::testing::ShellRuntime;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Client {
        _root: TempDir,
        root: std::path::PathBuf,
        tx: mpsc::Sender<String>,
        rx: mpsc::Receiver<ServerMessage>,
        task: JoinHandle<()>,
    }

    impl Client {
        fn connect(timeout_ms: u64, poll_ms: u64) -> Self {
            Self::connect_with(SandboxConfig {
                execution_timeout: Duration::from_millis(timeout_ms),
                poll_interval: Duration::from_millis(poll_ms),
                startup_grace: Duration::from_millis(poll_ms),
                drain_grace: Duration::from_millis(500),
                ..Default::default()
            })
        }

        fn connect_with(config: SandboxConfig) -> Self {
            let root = tempdir().unwrap();
            let config = SandboxConfig {
                workspace_root: root.path().to_path_buf(),
                ..config
            };
            let engine = Engine::new(Arc::new(ShellRuntime::default()), &config);
            let (tx, inbound) = mpsc::channel(16);
            let (outbound, rx) = mpsc::channel(64);
            let task = tokio::spawn(Session::new(engine).serve(inbound, outbound));

            Client {
                root: root.path().to_path_buf(),
                _root: root,
                tx,
                rx,
                task,
            }
        }

        async fn send(&self, message: Value) {
            self.tx.send(message.to_string()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let message = timeout(Duration::from_secs(10), self.rx.recv())
                .await
                .expect("reply within 10s")
                .expect("session open");
            serde_json::to_value(message).unwrap()
        }

        async fn run(&mut self, code: &str) -> String {
            self.send(json!({"action": "run", "code": code, "language": "python"}))
                .await;
            let started = self.recv().await;
            started["process_id"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_run_streams_output_then_completion() {
        let mut client = Client::connect(5_000, 2_000);

        let pid = client.run("echo hello").await;

        assert_eq!(
            client.recv().await,
            json!({"output": "hello", "prompt": false, "process_id": pid})
        );
        assert_eq!(
            client.recv().await,
            json!({"process_id": pid, "finished": true, "exit_code": 0})
        );
    }

    #[tokio::test]
    async fn test_stderr_becomes_error_message() {
        let mut client = Client::connect(5_000, 2_000);

        let pid = client.run("echo boom >&2; exit 2").await;

        assert_eq!(client.recv().await, json!({"error": "boom", "process_id": pid}));
        assert_eq!(
            client.recv().await,
            json!({"process_id": pid, "finished": true, "exit_code": 2})
        );
    }

    #[tokio::test]
    async fn test_interactive_round_trip() {
        let mut client = Client::connect(5_000, 200);

        let pid = client.run("read x; echo \"$x\"").await;

        assert_eq!(
            client.recv().await,
            json!({"output": "", "prompt": true, "process_id": pid})
        );
        client
            .send(json!({"action": "input", "process_id": pid, "stdin": "42"}))
            .await;
        assert_eq!(
            client.recv().await,
            json!({"output": "42", "prompt": false, "process_id": pid})
        );
        assert_eq!(client.recv().await["finished"], json!(true));
    }

    #[tokio::test]
    async fn test_slow_start_shows_real_prompt() {
        let mut client = Client::connect_with(SandboxConfig {
            execution_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(200),
            startup_grace: Duration::from_secs(2),
            drain_grace: Duration::from_millis(500),
            ..Default::default()
        });

        let pid = client
            .run("sleep 0.6; printf 'Name: '; read n; echo \"hi $n\"")
            .await;

        assert_eq!(
            client.recv().await,
            json!({"output": "Name: ", "prompt": true, "process_id": pid})
        );
        client
            .send(json!({"action": "input", "process_id": pid, "stdin": "ada"}))
            .await;
        assert_eq!(
            client.recv().await,
            json!({"output": "hi ada", "prompt": false, "process_id": pid})
        );
        assert_eq!(client.recv().await["finished"], json!(true));
    }

    #[tokio::test]
    async fn test_idle_prompt_does_not_hold_output() {
        let mut client = Client::connect(5_000, 200);

        let pid = client.run("sleep 0.6; echo late").await;

        assert_eq!(
            client.recv().await,
            json!({"output": "", "prompt": true, "process_id": pid})
        );
        assert_eq!(
            client.recv().await,
            json!({"output": "late", "prompt": false, "process_id": pid})
        );
        assert_eq!(client.recv().await["finished"], json!(true));
    }

    #[tokio::test]
    async fn test_input_releases_held_output_up_to_next_prompt() {
        let mut client = Client::connect(5_000, 2_000);

        let pid = client
            .run("echo 'Enter a:'; echo one; echo 'Enter b:'; echo two; read x; echo \"$x\"")
            .await;

        assert_eq!(
            client.recv().await,
            json!({"output": "Enter a:", "prompt": true, "process_id": pid})
        );
        client
            .send(json!({"action": "input", "process_id": pid, "stdin": "x1"}))
            .await;

        assert_eq!(
            client.recv().await,
            json!({"output": "one", "prompt": false, "process_id": pid})
        );
        assert_eq!(
            client.recv().await,
            json!({"output": "Enter b:", "prompt": true, "process_id": pid})
        );
        // Still held behind "Enter b:" until the run ends
        assert_eq!(client.recv().await["output"], json!("two"));
        assert_eq!(client.recv().await["output"], json!("x1"));
        assert_eq!(
            client.recv().await,
            json!({"process_id": pid, "finished": true, "exit_code": 0})
        );
    }

    #[tokio::test]
    async fn test_terminal_event_flushes_held_output() {
        let mut client = Client::connect(5_000, 2_000);

        let pid = client.run("echo 'Enter:'; echo a; echo b").await;

        assert_eq!(client.recv().await["prompt"], json!(true));
        assert_eq!(
            client.recv().await,
            json!({"output": "a", "prompt": false, "process_id": pid})
        );
        assert_eq!(
            client.recv().await,
            json!({"output": "b", "prompt": false, "process_id": pid})
        );
        assert_eq!(
            client.recv().await,
            json!({"process_id": pid, "finished": true, "exit_code": 0})
        );
    }

    #[tokio::test]
    async fn test_unanswered_prompt_with_flood_still_finishes() {
        let mut client = Client::connect(10_000, 2_000);
        let lines = MAX_HELD_EVENTS + 1_000;

        let pid = client
            .run(&format!("echo 'Enter:'; seq 1 {}", lines))
            .await;

        assert_eq!(client.recv().await["prompt"], json!(true));
        for n in 1..=lines {
            assert_eq!(client.recv().await["output"], json!(n.to_string()));
        }
        assert_eq!(
            client.recv().await,
            json!({"process_id": pid, "finished": true, "exit_code": 0})
        );

        // The session is free for the next run
        let next = client.run("echo again").await;
        assert_ne!(next, pid);
        assert_eq!(client.recv().await["output"], json!("again"));
    }

    #[tokio::test]
    async fn test_rejects_bad_messages() {
        let mut client = Client::connect(5_000, 2_000);

        client.tx.send("{oops".into()).await.unwrap();
        let reply = client.recv().await;
        assert!(reply["error"].as_str().unwrap().starts_with("Invalid JSON: "));

        client.send(json!({"action": "dance"})).await;
        assert_eq!(client.recv().await, json!({"error": "Invalid action"}));

        client
            .send(json!({"action": "run", "code": "x", "language": "cobol"}))
            .await;
        assert_eq!(
            client.recv().await,
            json!({"error": "Unsupported language: cobol"})
        );
        assert_eq!(std::fs::read_dir(&client.root).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[tokio::test]
    async fn test_input_for_unknown_process() {
        let mut client = Client::connect(5_000, 2_000);

        client
            .send(json!({"action": "input", "process_id": "nope", "stdin": "1"}))
            .await;

        assert_eq!(
            client.recv().await,
            json!({"error": "No active process found", "process_id": "nope"})
        );
    }

    #[tokio::test]
    async fn test_input_after_completion() {
        let mut client = Client::connect(5_000, 2_000);

        let pid = client.run("echo done").await;
        client.recv().await;
        assert_eq!(client.recv().await["finished"], json!(true));

        client
            .send(json!({"action": "input", "process_id": pid, "stdin": "late"}))
            .await;
        assert_eq!(
            client.recv().await,
            json!({"error": "No active process found", "process_id": pid})
        );
    }

    #[tokio::test]
    async fn test_second_run_is_rejected_while_active() {
        let mut client = Client::connect(5_000, 2_000);

        let pid = client.run("sleep 1").await;
        client
            .send(json!({"action": "run", "code": "echo hi", "language": "python"}))
            .await;

        let mut reply = client.recv().await;
        // Skip the idle prompt the sleeping run may produce first
        while reply.get("output").is_some() {
            reply = client.recv().await;
        }
        assert_eq!(
            reply,
            json!({"error": "Execution already in progress", "process_id": pid})
        );
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let mut client = Client::connect(600, 2_000);

        let pid = client.run("while true; do sleep 0.05; done").await;

        let mut reply = client.recv().await;
        while reply.get("output").is_some() {
            reply = client.recv().await;
        }
        assert_eq!(
            reply,
            json!({"error": "Execution timed out", "process_id": pid})
        );
    }

    #[tokio::test]
    async fn test_disconnect_terminates_processes() {
        let mut client = Client::connect(30_000, 2_000);

        client.run("sleep 30").await;
        assert_eq!(std::fs::read_dir(&client.root).unwrap().count(), 1);

        let Client { _root, root, tx, rx, task } = client;
        drop(tx);
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        drop(rx);

        let mut cleaned = false;
        for _ in 0..50 {
            if std::fs::read_dir(&root).unwrap().count() == 0 {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(cleaned, "workspace left behind after disconnect");
    }
}
