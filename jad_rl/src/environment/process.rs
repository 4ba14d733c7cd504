//! Simulator reached over line-delimited JSON on a child process.
//!
//! Requests are `{"command": "reset"}`, `{"command": "step", "action": ..}`
//! and `{"command": "close"}`, one per line on stdin; each is answered by a
//! single JSON line on stdout. The process is spawned on the first `reset`
//! and receives the fight configuration through environment variables.

use serde::Serialize;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::{EnvAction, EnvError, EnvironmentAdapter, StepOutcome};
use crate::jad::{JadConfig, RewardFunction};

/// How to launch the simulator.
#[derive(Debug, Clone)]
pub struct ProcessEnvConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub jad: JadConfig,
    /// Passed through as `REWARD_FUNC`
    pub reward_function: RewardFunction,
}

impl ProcessEnvConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            jad: JadConfig::default(),
            reward_function: RewardFunction::Shaped,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_jad(mut self, jad: JadConfig) -> Self {
        self.jad = jad;
        self
    }

    pub fn with_reward_function(mut self, function: RewardFunction) -> Self {
        self.reward_function = function;
        self
    }
}

#[derive(Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Request<'a> {
    Reset,
    Step { action: &'a EnvAction },
    Close,
}

struct Running {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// One simulator process.
pub struct ProcessEnv {
    config: ProcessEnvConfig,
    running: Option<Running>,
}

impl ProcessEnv {
    pub fn new(config: ProcessEnvConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    pub fn config(&self) -> &ProcessEnvConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn start(&mut self) -> Result<(), EnvError> {
        if self.running.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .env("JAD_COUNT", self.config.jad.jad_count().to_string())
            .env("HEALERS_PER_JAD", self.config.jad.healers_per_jad().to_string())
            .env("REWARD_FUNC", self.config.reward_function.name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(EnvError::Spawn)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EnvError::Protocol {
                    message: "environment process has no stdio pipes".to_string(),
                    stderr: String::new(),
                });
            }
        };

        log::debug!("spawned environment process {}", child.id());
        self.running = Some(Running {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        Ok(())
    }

    /// Tear down a broken process and report what it wrote to stderr.
    fn fail(&mut self, message: &str) -> EnvError {
        let mut stderr = String::new();
        if let Some(mut running) = self.running.take() {
            let _ = running.child.kill();
            let _ = running.child.wait();
            if let Some(mut pipe) = running.child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
        }
        log::warn!("{}: {}", message, stderr.trim_end());
        EnvError::Protocol {
            message: message.to_string(),
            stderr,
        }
    }

    fn send(&mut self, request: &Request<'_>) -> Result<String, EnvError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let Some(running) = self.running.as_mut() else {
            return Err(EnvError::NotStarted);
        };
        let written = running
            .stdin
            .write_all(line.as_bytes())
            .and_then(|_| running.stdin.flush());
        if written.is_err() {
            return Err(self.fail("environment process crashed"));
        }

        let mut response = String::new();
        match running.stdout.read_line(&mut response) {
            Ok(0) | Err(_) => Err(self.fail("environment closed unexpectedly")),
            Ok(_) => Ok(response),
        }
    }

    fn request(&mut self, request: &Request<'_>) -> Result<StepOutcome, EnvError> {
        let response = self.send(request)?;
        Ok(serde_json::from_str(&response)?)
    }
}

impl EnvironmentAdapter for ProcessEnv {
    fn reset(&mut self) -> Result<StepOutcome, EnvError> {
        self.start()?;
        let mut outcome = self.request(&Request::Reset)?;
        outcome.reward = 0.0;
        outcome.terminated = false;
        Ok(outcome)
    }

    fn step(&mut self, action: &EnvAction) -> Result<StepOutcome, EnvError> {
        if self.running.is_none() {
            return Err(EnvError::NotStarted);
        }
        self.request(&Request::Step { action })
    }

    fn close(&mut self) -> Result<(), EnvError> {
        if let Some(mut running) = self.running.take() {
            // the process may already be gone
            if let Ok(mut line) = serde_json::to_string(&Request::Close) {
                line.push('\n');
                let _ = running.stdin.write_all(line.as_bytes());
                let _ = running.stdin.flush();
            }
            drop(running.stdin);
            let _ = running.child.wait();
        }
        Ok(())
    }
}

impl Drop for ProcessEnv {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const OBS: &str = r#"{"player_hp": 99, "player_prayer": 99, "active_prayer": 0}"#;

    fn scripted(script: &str) -> ProcessEnv {
        ProcessEnv::new(
            ProcessEnvConfig::new("sh")
                .with_args(["-c", script])
                .with_jad(JadConfig::new(2, 1).unwrap())
                .with_reward_function(RewardFunction::Sparse),
        )
    }

    fn echo_server() -> String {
        format!(
            r#"while read line; do
  case "$line" in
    *reset*) echo '{{"observation": {obs}}}' ;;
    *close*) exit 0 ;;
    *'[1,2]'*) echo '{{"observation": {obs}, "reward": 2.5, "terminated": true}}' ;;
    *) echo '{{"observation": {obs}, "reward": '"$JAD_COUNT"', "terminated": false, "valid_action_mask": [true, false]}}' ;;
  esac
done"#,
            obs = OBS
        )
    }

    #[test]
    fn test_step_before_reset_is_not_started() {
        let mut env = scripted(&echo_server());
        assert!(matches!(env.step(&EnvAction::Single(0)), Err(EnvError::NotStarted)));
        assert!(!env.is_running());
    }

    #[test]
    fn test_reset_step_close_roundtrip() {
        let mut env = scripted(&echo_server());
        let first = env.reset().unwrap();
        assert!(env.is_running());
        assert_eq!(first.observation.player_hp, 99);
        assert_eq!(first.reward, 0.0);

        // JAD_COUNT reaches the child environment
        let step = env.step(&EnvAction::Single(3)).unwrap();
        assert_eq!(step.reward, 2.0);
        assert!(!step.terminated);
        assert_eq!(step.valid_action_mask, Some(vec![true, false]));

        let last = env.step(&EnvAction::Multi(vec![1, 2])).unwrap();
        assert!(last.terminated);
        assert_eq!(last.reward, 2.5);

        env.close().unwrap();
        assert!(!env.is_running());
        env.close().unwrap();
    }

    #[test]
    fn test_crash_reports_stderr() {
        let mut env = scripted("read line; echo 'simulator exploded' >&2; exit 1");
        match env.reset() {
            Err(EnvError::Protocol { message, stderr }) => {
                assert!(message.contains("closed unexpectedly"));
                assert!(stderr.contains("simulator exploded"));
            }
            other => panic!("expected protocol error, got {:?}", other.map(|_| ())),
        }
        assert!(!env.is_running());
        // not retried: the next step needs a fresh reset
        assert!(matches!(env.step(&EnvAction::Single(0)), Err(EnvError::NotStarted)));
    }

    #[test]
    fn test_bad_json_is_decode_error() {
        let mut env = scripted("read line; echo 'not json'; read line");
        assert!(matches!(env.reset(), Err(EnvError::Decode(_))));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let mut env = ProcessEnv::new(ProcessEnvConfig::new("/nonexistent/jad-simulator"));
        assert!(matches!(env.reset(), Err(EnvError::Spawn(_))));
    }
}
