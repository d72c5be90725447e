use derive_builder::Builder;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options consumed by a supervisor `start` call.
///
/// This is the structured object the task runner hands over: which command
/// to launch, what the child's environment should look like, and how
/// readiness is detected.
#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into, strip_option))]
pub struct ServerOptions {
    /// Injected into the child environment as `PORT`.
    pub port: u16,

    /// Value for `NODE_ENV`; the variable is left untouched when absent.
    #[builder(default)]
    #[serde(default)]
    pub node_env: Option<String>,

    /// Prepend a `--debug` flag to the argument list.
    #[builder(default)]
    #[serde(default)]
    pub debug: bool,

    /// Spawn a separate OS process instead of loading code in-process.
    #[builder(default)]
    #[serde(default)]
    pub background: bool,

    /// Command launched in background mode.
    #[builder(default)]
    #[serde(default)]
    pub cmd: String,

    /// Arguments passed to `cmd`, in order.
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub args: Vec<String>,

    /// Fire the completion signal after this many milliseconds, regardless
    /// of other readiness signals.
    #[builder(default)]
    #[serde(default)]
    pub delay: Option<u64>,

    /// Pattern matched case-insensitively against child stdout lines; the
    /// first match fires the completion signal.
    #[builder(default)]
    #[serde(default)]
    pub output: Option<String>,

    /// Result reported through the completion signal when the command
    /// itself cannot be launched.
    #[builder(default)]
    #[serde(default)]
    pub fallback: Option<String>,

    /// Module loaded in-process in foreground mode.
    #[builder(default)]
    #[serde(default)]
    pub script: Option<String>,
}

impl ServerOptions {
    pub fn builder() -> ServerOptionsBuilder {
        ServerOptionsBuilder::default()
    }

    /// Validate the options and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.background && self.cmd.is_empty() {
            return Err(anyhow::anyhow!("background mode requires a command"));
        }

        if !self.background && self.script.is_none() {
            return Err(anyhow::anyhow!("foreground mode requires a script"));
        }

        if let Err(e) = self.output_matcher() {
            return Err(anyhow::anyhow!("invalid output pattern: {e}"));
        }

        Ok(())
    }

    /// Compile the readiness pattern, if one is configured.
    ///
    /// Matching is case-insensitive; server banners vary in casing.
    pub fn output_matcher(&self) -> Result<Option<Regex>, regex::Error> {
        self.output
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
            })
            .transpose()
    }

    /// Get the readiness delay as Duration
    pub fn delay_duration(&self) -> Option<Duration> {
        self.delay.map(Duration::from_millis)
    }
}

impl ServerOptionsBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }
}
