#![cfg(unix)]

use async_trait::async_trait;
use devserve::{
    ChildDiscovery, CompletionSignal, EnvTable, ModuleLoader, ProcessId, ServerHandle,
    ServerOptions, ServerRegistry, Supervisor, SupervisorState, TaskOutcome, TerminationResult,
    TreeTerminator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_file(true)
        .with_thread_ids(false)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

/// Records every completion delivery for assertions.
#[derive(Clone, Default)]
struct DoneProbe {
    count: Arc<AtomicUsize>,
    outcomes: Arc<Mutex<Vec<TaskOutcome>>>,
}

impl DoneProbe {
    fn new() -> Self {
        Self::default()
    }

    fn callback(&self) -> impl FnOnce(TaskOutcome) + Send + 'static {
        let count = self.count.clone();
        let outcomes = self.outcomes.clone();
        move |outcome| {
            count.fetch_add(1, Ordering::SeqCst);
            outcomes.lock().unwrap().push(outcome);
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn last_is_success(&self) -> Option<bool> {
        self.outcomes
            .lock()
            .unwrap()
            .last()
            .map(TaskOutcome::is_success)
    }

    fn last_is_ready(&self) -> bool {
        matches!(
            self.outcomes.lock().unwrap().last(),
            Some(TaskOutcome::Ready)
        )
    }

    async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.count() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.count() >= count
    }
}

/// Terminator stub whose discovery is unsupported; signals are recorded
/// and still delivered for real so spawned children don't linger.
struct RecordingTerminator {
    discovery_supported: bool,
    signaled: Arc<Mutex<Vec<ProcessId>>>,
}

impl RecordingTerminator {
    fn new(discovery_supported: bool) -> (Arc<Self>, Arc<Mutex<Vec<ProcessId>>>) {
        let signaled = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(Self {
                discovery_supported,
                signaled: signaled.clone(),
            }),
            signaled,
        )
    }
}

#[async_trait]
impl TreeTerminator for RecordingTerminator {
    async fn find_direct_children(&self, _pid: ProcessId) -> ChildDiscovery {
        if self.discovery_supported {
            ChildDiscovery::Found(vec![])
        } else {
            ChildDiscovery::NotSupported
        }
    }

    async fn signal(&self, pid: ProcessId) -> TerminationResult {
        self.signaled.lock().unwrap().push(pid);
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        TerminationResult::Success
    }
}

#[derive(Default)]
struct RecordingLoader {
    loaded: Mutex<Vec<String>>,
}

#[async_trait]
impl ModuleLoader for RecordingLoader {
    async fn load(&self, script: &str) -> anyhow::Result<()> {
        self.loaded.lock().unwrap().push(script.to_string());
        Ok(())
    }
}

fn test_env() -> EnvTable {
    [("PATH", "/usr/bin:/bin"), ("HOME", "/home/dev")]
        .into_iter()
        .collect()
}

fn sh_options(script: &str, port: u16) -> ServerOptions {
    ServerOptions::builder()
        .port(port)
        .background(true)
        .cmd("sh")
        .args(["-c", script])
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_start_stop_restores_environment() {
    init_tracing();
    let registry = ServerRegistry::new();
    let env = test_env();
    let before = env.to_map();

    let mut supervisor = Supervisor::new("web", registry.clone()).with_env_table(env.clone());

    let mut options = sh_options("sleep 30", 3000);
    options.node_env = Some("test".to_string());

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert_eq!(env.get("PORT"), Some("3000".to_string()));
    assert_eq!(env.get("NODE_ENV"), Some("test".to_string()));

    supervisor.stop().await;

    assert_eq!(env.to_map(), before);
    assert_eq!(supervisor.state(), SupervisorState::Idle);
    assert!(registry.get("web").is_none());
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn test_completion_fires_once_under_competing_triggers() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    // Delay, output match, and process exit all race for the same signal.
    let mut options = sh_options("echo READY; sleep 0.3", 3000);
    options.delay = Some(100);
    options.output = Some("ready".to_string());

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert!(probe.wait_for_count(1, Duration::from_secs(2)).await);
    // Leave room for the remaining triggers to (not) fire.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(probe.count(), 1);

    supervisor.stop().await;
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn test_delay_fires_at_configured_time() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    let mut options = sh_options("sleep 5", 3000);
    options.delay = Some(500);

    let fired_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let fired = fired_at.clone();
    let started = Instant::now();

    supervisor
        .start(&options, false, move |_| {
            *fired.lock().unwrap() = Some(Instant::now());
        })
        .await
        .unwrap();

    while fired_at.lock().unwrap().is_none() && started.elapsed() < Duration::from_secs(3) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let elapsed = fired_at.lock().unwrap().expect("signal fired") - started;
    assert!(elapsed >= Duration::from_millis(450), "fired too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "fired too late: {elapsed:?}");

    supervisor.stop().await;
}

#[tokio::test]
async fn test_output_match_is_case_insensitive() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    let mut options = sh_options("echo Express SERVER READY; sleep 5", 3000);
    options.output = Some("ready".to_string());

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert!(probe.wait_for_count(1, Duration::from_secs(2)).await);
    assert!(probe.last_is_ready());

    supervisor.stop().await;
}

#[tokio::test]
async fn test_injected_port_reaches_the_child() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    // Readiness pattern only matches if the child saw the injected PORT.
    let mut options = sh_options("echo serving on $PORT; sleep 5", 4321);
    options.output = Some("serving on 4321".to_string());

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert!(probe.wait_for_count(1, Duration::from_secs(2)).await);
    assert!(probe.last_is_ready());

    supervisor.stop().await;
}

#[tokio::test]
async fn test_stop_without_start_is_a_noop() {
    init_tracing();
    let registry = ServerRegistry::new();
    let env = test_env();
    let before = env.to_map();

    let mut supervisor = Supervisor::new("web", registry).with_env_table(env.clone());
    supervisor.stop().await;
    supervisor.stop().await;

    assert_eq!(env.to_map(), before);
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn test_restart_replaces_the_previous_child() {
    init_tracing();
    let registry = ServerRegistry::new();
    let (terminator, signaled) = RecordingTerminator::new(true);
    let mut supervisor = Supervisor::new("web", registry.clone())
        .with_env_table(test_env())
        .with_terminator(terminator);

    let options = sh_options("sleep 30", 3000);

    let first_probe = DoneProbe::new();
    supervisor
        .start(&options, false, first_probe.callback())
        .await
        .unwrap();
    let first_pid = registry.get("web").unwrap().pid().unwrap();

    let second_probe = DoneProbe::new();
    supervisor
        .start(&options, false, second_probe.callback())
        .await
        .unwrap();
    let second_pid = registry.get("web").unwrap().pid().unwrap();

    // The first tree was signaled before the second child was spawned,
    // and the registry only holds the replacement.
    assert!(signaled.lock().unwrap().contains(&first_pid));
    assert_ne!(first_pid, second_pid);
    assert_eq!(first_probe.count(), 1);
    assert_eq!(second_probe.count(), 0);

    supervisor.stop().await;
    assert_eq!(second_probe.count(), 1);
    assert!(registry.get("web").is_none());
}

#[tokio::test]
async fn test_stop_requested_skips_the_new_child() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry.clone()).with_env_table(test_env());

    let options = sh_options("sleep 30", 3000);

    let first_probe = DoneProbe::new();
    supervisor
        .start(&options, false, first_probe.callback())
        .await
        .unwrap();

    let second_probe = DoneProbe::new();
    supervisor
        .start(&options, true, second_probe.callback())
        .await
        .unwrap();

    assert_eq!(first_probe.count(), 1);
    assert_eq!(second_probe.count(), 1);
    assert_eq!(second_probe.last_is_success(), Some(true));
    assert!(registry.get("web").is_none());
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn test_unsupported_discovery_still_stops_the_primary() {
    init_tracing();
    let registry = ServerRegistry::new();
    let (terminator, signaled) = RecordingTerminator::new(false);
    let mut supervisor = Supervisor::new("web", registry.clone())
        .with_env_table(test_env())
        .with_terminator(terminator);

    let options = sh_options("sleep 30", 3000);
    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();
    let pid = registry.get("web").unwrap().pid().unwrap();

    supervisor.stop().await;

    assert_eq!(*signaled.lock().unwrap(), vec![pid]);
    assert!(registry.get("web").is_none());
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn test_spawn_failure_reports_through_the_signal() {
    init_tracing();
    let registry = ServerRegistry::new();
    let env = test_env();
    let before = env.to_map();
    let mut supervisor = Supervisor::new("web", registry.clone()).with_env_table(env.clone());

    let options = sh_options("true", 3000);
    let options = ServerOptions {
        cmd: "devserve-no-such-command".to_string(),
        ..options
    };

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert_eq!(probe.count(), 1);
    assert_eq!(probe.last_is_success(), Some(false));
    assert!(registry.get("web").is_none());
    assert_eq!(supervisor.state(), SupervisorState::Idle);

    // The snapshot is still restored by the following stop.
    supervisor.stop().await;
    assert_eq!(env.to_map(), before);
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn test_spawn_failure_with_fallback_reports_the_fallback() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    let mut options = sh_options("true", 3000);
    options.cmd = "devserve-no-such-command".to_string();
    options.fallback = Some("dev server skipped".to_string());

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert_eq!(probe.count(), 1);
    assert_eq!(probe.last_is_success(), Some(true));
    assert!(matches!(
        probe.outcomes.lock().unwrap().last(),
        Some(TaskOutcome::Fallback(value)) if value == "dev server skipped"
    ));
}

#[tokio::test]
async fn test_exit_completion_passes_status_through() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    // No delay, no output pattern: completion rides the exit status.
    let options = sh_options("exit 3", 3000);
    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert!(probe.wait_for_count(1, Duration::from_secs(2)).await);
    assert_eq!(probe.last_is_success(), Some(false));

    let options = sh_options("exit 0", 3000);
    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert!(probe.wait_for_count(1, Duration::from_secs(2)).await);
    assert_eq!(probe.last_is_success(), Some(true));

    supervisor.stop().await;
}

#[tokio::test]
async fn test_foreground_mode_delegates_to_the_loader() {
    init_tracing();
    let registry = ServerRegistry::new();
    let env = test_env();
    let before = env.to_map();
    let loader = Arc::new(RecordingLoader::default());

    let mut supervisor = Supervisor::new("web", registry.clone())
        .with_env_table(env.clone())
        .with_module_loader(loader.clone());

    let options = ServerOptions::builder()
        .port(3000u16)
        .script("app/server")
        .build()
        .unwrap();

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert_eq!(*loader.loaded.lock().unwrap(), vec!["app/server".to_string()]);
    assert_eq!(
        registry.get("web"),
        Some(ServerHandle::InProcess {
            script: "app/server".to_string()
        })
    );
    // Completion belongs to the loaded module's lifecycle, not to start.
    assert_eq!(probe.count(), 0);

    supervisor.stop().await;

    // No PID to kill: the handle stays registered, but the environment is
    // restored and the signal fires.
    assert!(registry.get("web").is_some());
    assert_eq!(env.to_map(), before);
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn test_foreground_without_loader_is_an_error() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    let options = ServerOptions::builder()
        .port(3000u16)
        .script("app/server")
        .build()
        .unwrap();

    let probe = DoneProbe::new();
    let result = supervisor.start(&options, false, probe.callback()).await;

    assert!(matches!(
        result,
        Err(devserve::SupervisorError::NoModuleLoader)
    ));
    assert_eq!(probe.count(), 0);
}

#[tokio::test]
async fn test_invalid_options_are_rejected() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    // Background without a command.
    let options = ServerOptions {
        port: 3000,
        background: true,
        ..Default::default()
    };

    let probe = DoneProbe::new();
    let result = supervisor.start(&options, false, probe.callback()).await;
    assert!(result.is_err());
    assert_eq!(probe.count(), 0);
}

#[tokio::test]
async fn test_debug_flag_is_prepended() {
    init_tracing();
    let registry = ServerRegistry::new();
    let mut supervisor = Supervisor::new("web", registry).with_env_table(test_env());

    // `sh -c 'script' name args...`: with --debug prepended before `-c`,
    // sh would fail; instead exercise echo, which prints all arguments.
    let mut options = ServerOptions::builder()
        .port(3000u16)
        .background(true)
        .cmd("echo")
        .args(["server.js"])
        .build()
        .unwrap();
    options.debug = true;
    options.output = Some("--debug server\\.js".to_string());

    let probe = DoneProbe::new();
    supervisor
        .start(&options, false, probe.callback())
        .await
        .unwrap();

    assert!(probe.wait_for_count(1, Duration::from_secs(2)).await);
    assert!(probe.last_is_ready());

    supervisor.stop().await;
}

#[tokio::test]
async fn test_completion_signal_is_shared_one_shot() {
    init_tracing();
    let probe = DoneProbe::new();
    let signal = CompletionSignal::new(probe.callback());
    let racing = signal.clone();

    assert!(racing.fire(TaskOutcome::Ready));
    assert!(!signal.fire(TaskOutcome::Stopped));
    assert_eq!(probe.count(), 1);
}
