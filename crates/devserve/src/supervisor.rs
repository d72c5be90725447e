use crate::monitor;
use crate::platform::platform_terminator;
use devserve_core::{
    CompletionSignal, EnvSnapshot, EnvTable, ModuleLoader, OutputSink, ServerHandle,
    ServerOptions, ServerRegistry, SupervisorError, TaskOutcome, TerminationResult,
    TreeTerminator,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lifecycle of one supervised target. Terminal transitions loop back to
/// `Idle`; the supervisor is reusable across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Supervises one target's server across start/stop cycles.
///
/// The registry and the environment table are process-wide collaborators
/// injected at construction; the supervisor itself is cheap to recreate,
/// which is exactly what live-reload workflows do - a fresh supervisor
/// finds the previous child through the registry and replaces it.
pub struct Supervisor {
    target: String,
    registry: ServerRegistry,
    env: EnvTable,
    terminator: Arc<dyn TreeTerminator>,
    loader: Option<Arc<dyn ModuleLoader>>,
    stdout_sink: OutputSink,
    stderr_sink: OutputSink,
    state: SupervisorState,
    backup: Option<EnvSnapshot>,
    completion: Option<CompletionSignal>,
    watchers: Option<CancellationToken>,
}

impl Supervisor {
    /// Create a supervisor for `target` with platform defaults: the host
    /// process environment, the platform terminator, and the host's own
    /// stdout/stderr as forwarding sinks.
    pub fn new(target: impl Into<String>, registry: ServerRegistry) -> Self {
        Self {
            target: target.into(),
            registry,
            env: EnvTable::from_process_env(),
            terminator: platform_terminator(),
            loader: None,
            stdout_sink: OutputSink::stdout(),
            stderr_sink: OutputSink::stderr(),
            state: SupervisorState::Idle,
            backup: None,
            completion: None,
            watchers: None,
        }
    }

    /// Replace the environment table (embedded hosts, tests).
    pub fn with_env_table(mut self, env: EnvTable) -> Self {
        self.env = env;
        self
    }

    /// Replace the tree terminator.
    pub fn with_terminator(mut self, terminator: Arc<dyn TreeTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Install the module loader used for foreground mode.
    pub fn with_module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Redirect the sinks child output is teed into.
    pub fn with_output_sinks(mut self, stdout: OutputSink, stderr: OutputSink) -> Self {
        self.stdout_sink = stdout;
        self.stderr_sink = stderr;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Start the target's server.
    ///
    /// `done` is the caller's one-shot completion callback; it fires at
    /// most once per call, on the first of: configured delay elapsing,
    /// output pattern matching, child exit, or an explicit stop.
    /// `stop_requested` reflects a stop-only invocation: when the target
    /// is already live it is stopped and no new child is started.
    ///
    /// Spawn failures of the child surface through the completion signal,
    /// not the return value; `Err` is reserved for caller mistakes such as
    /// invalid options or a missing module loader.
    pub async fn start(
        &mut self,
        options: &ServerOptions,
        stop_requested: bool,
        done: impl FnOnce(TaskOutcome) + Send + 'static,
    ) -> Result<(), SupervisorError> {
        if let Err(e) = options.validate() {
            return Err(SupervisorError::configuration(e.to_string()));
        }

        let completion = CompletionSignal::new(done);
        self.state = SupervisorState::Starting;

        if self.registry.get(&self.target).is_some() {
            self.stop().await;

            if stop_requested {
                // Stop-only invocation: report completion, start nothing.
                completion.fire(TaskOutcome::Stopped);
                self.state = SupervisorState::Idle;
                return Ok(());
            }
            self.state = SupervisorState::Starting;
        }

        self.backup = Some(self.env.capture());

        info!(
            target = %self.target,
            mode = if options.background { "background" } else { "foreground" },
            "Starting server"
        );

        self.completion = Some(completion.clone());

        // Child-visible environment.
        self.env.set("PORT", options.port.to_string());
        if let Some(node_env) = &options.node_env {
            self.env.set("NODE_ENV", node_env.clone());
        }

        let mut args = options.args.clone();
        if options.debug {
            args.insert(0, "--debug".to_string());
        }

        if options.background {
            let watchers = CancellationToken::new();
            match monitor::launch(
                options,
                &args,
                self.env.to_map(),
                &completion,
                &watchers,
                self.stdout_sink.clone(),
                self.stderr_sink.clone(),
            ) {
                Ok(pid) => {
                    self.watchers = Some(watchers);
                    self.registry.set(
                        &self.target,
                        ServerHandle::Spawned {
                            pid,
                            command: options.cmd.clone(),
                        },
                    );
                    self.state = SupervisorState::Running;
                }
                Err(e) => {
                    // Already reported through the completion signal.
                    warn!(target = %self.target, error = %e, "Server process failed to launch");
                    self.state = SupervisorState::Idle;
                }
            }
        } else {
            let Some(loader) = self.loader.clone() else {
                self.state = SupervisorState::Idle;
                return Err(SupervisorError::NoModuleLoader);
            };
            let Some(script) = options.script.clone() else {
                self.state = SupervisorState::Idle;
                return Err(SupervisorError::configuration(
                    "foreground mode requires a script",
                ));
            };

            if let Err(e) = loader.load(&script).await {
                self.state = SupervisorState::Idle;
                return Err(SupervisorError::module_load(script, e.to_string()));
            }

            // Completion is driven by the loaded module's own lifecycle.
            self.registry
                .set(&self.target, ServerHandle::InProcess { script });
            self.state = SupervisorState::Running;
        }

        Ok(())
    }

    /// Stop the target's server, restore the pre-start environment, and
    /// fire the completion signal.
    ///
    /// Safe to call repeatedly and before any start: with no live handle,
    /// termination is skipped and the environment/signal steps are no-ops
    /// when no snapshot/signal exists. Termination failures are logged,
    /// never surfaced.
    pub async fn stop(&mut self) {
        self.state = SupervisorState::Stopping;

        if let Some(handle) = self.registry.get(&self.target) {
            if let Some(pid) = handle.pid() {
                info!(target = %self.target, pid = %pid, "Stopping server");

                match self.terminator.terminate_tree(pid).await {
                    TerminationResult::Success | TerminationResult::ProcessNotFound => {}
                    result => {
                        warn!(
                            target = %self.target,
                            pid = %pid,
                            result = ?result,
                            "Tree termination incomplete"
                        );
                    }
                }

                // Listener removal for the finished cycle.
                if let Some(watchers) = self.watchers.take() {
                    watchers.cancel();
                }
                self.registry.clear(&self.target);
            }
        }

        if let Some(backup) = self.backup.take() {
            self.env.restore(&backup);
        }

        if let Some(completion) = self.completion.take() {
            completion.fire(TaskOutcome::Stopped);
        }

        self.state = SupervisorState::Idle;
    }

    /// Host-lifecycle shutdown hook.
    ///
    /// Hosts register this against their exit path; it must stay safe to
    /// invoke at any point and must not block indefinitely. Tree
    /// termination is signal-and-return, so the bound holds.
    pub async fn shutdown(&mut self) {
        self.stop().await;
    }
}
