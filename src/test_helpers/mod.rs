// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::downloader::process::CANCELLED_SENTINEL;
use crate::downloader::traits::{CommandSpec, ProcessOutput};
use crate::downloader::{DownloadError, DownloadSettings, ProcessRunner};

/// What a scripted SteamCMD invocation does
#[derive(Debug, Clone)]
pub enum Step {
    /// Exit 0, print the success marker and write a file into the content dir
    Succeed,
    /// Exit 0 with the success marker but leave the content dir empty
    SucceedWithoutFiles,
    /// Exit 0, write files, but omit the success marker from the output
    SucceedWithoutMarker,
    /// Exit 0 with the success marker; the files show up after the given time
    SucceedWithLateFiles(Duration),
    /// Exit with the given non-zero code
    Fail(i32),
    /// Fail to launch
    SpawnError,
    /// Error that no further attempt can fix
    Unrecoverable,
    /// Panic inside the runner
    Panic,
    /// Run for the given time, then succeed unless cancelled first
    Slow(Duration),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub args: Vec<String>,
    pub item_id: Option<String>,
    pub at: Instant,
}

#[derive(Default)]
struct RunnerState {
    calls: Vec<Call>,
    attempts: HashMap<String, usize>,
    running: usize,
    peak: usize,
}

/// In-process stand-in for SteamCMD driven by per-item scripts
pub struct ScriptedRunner {
    init: Step,
    scripts: HashMap<String, Vec<Step>>,
    delay: Duration,
    state: Mutex<RunnerState>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            init: Step::Succeed,
            scripts: HashMap::new(),
            delay: Duration::ZERO,
            state: Mutex::new(RunnerState::default()),
        }
    }

    pub fn with_init(mut self, step: Step) -> Self {
        self.init = step;
        self
    }

    /// Steps for successive attempts at `item_id`; the last step repeats
    pub fn with_script(mut self, item_id: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(item_id.to_string(), steps);
        self
    }

    /// Time every download invocation takes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn attempts_for(&self, item_id: &str) -> usize {
        self.state.lock().unwrap().attempts.get(item_id).copied().unwrap_or(0)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.state.lock().unwrap().peak
    }

    fn content_dir(command: &CommandSpec, app_id: &str, item_id: &str) -> PathBuf {
        command
            .working_dir
            .join("steamapps")
            .join("workshop")
            .join("content")
            .join(app_id)
            .join(item_id)
    }

    fn success(command: &CommandSpec, app_id: &str, item_id: &str, attempt: usize, files: bool, marker: bool) -> ProcessOutput {
        let dir = Self::content_dir(command, app_id, item_id);
        std::fs::create_dir_all(&dir).unwrap();
        if files {
            std::fs::write(dir.join("payload.txt"), format!("attempt {attempt}")).unwrap();
        }
        let output = if marker {
            format!("Success. Downloaded item {item_id} to \"{}\"", dir.display())
        } else {
            "Update complete".to_string()
        };
        ProcessOutput { exit_code: Some(0), output }
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        _timeout: Option<Duration>,
        cancel: Option<CancellationToken>,
    ) -> Result<ProcessOutput, DownloadError> {
        // +login anonymous +workshop_download_item <app> <item> +quit
        let target = match command.args.iter().position(|a| a == "+workshop_download_item") {
            Some(i) => command.args.get(i + 1).cloned().zip(command.args.get(i + 2).cloned()),
            None => None,
        };

        let (step, attempt) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call {
                args: command.args.clone(),
                item_id: target.as_ref().map(|(_, item)| item.clone()),
                at: Instant::now(),
            });

            match &target {
                Some((_, item_id)) => {
                    let attempt = {
                        let counter = state.attempts.entry(item_id.clone()).or_insert(0);
                        *counter += 1;
                        *counter
                    };
                    state.running += 1;
                    state.peak = state.peak.max(state.running);

                    let step = self
                        .scripts
                        .get(item_id)
                        .and_then(|steps| steps.get(attempt - 1).or_else(|| steps.last()))
                        .cloned()
                        .unwrap_or(Step::Succeed);
                    (step, attempt)
                }
                None => (self.init.clone(), 1),
            }
        };

        let Some((app_id, item_id)) = target else {
            return Ok(match step {
                Step::Fail(code) => ProcessOutput { exit_code: Some(code), output: "login failed".into() },
                _ => ProcessOutput { exit_code: Some(0), output: "Logged in OK".into() },
            });
        };

        let cancelled = async {
            match &cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let run_for = match step {
            Step::Slow(d) => self.delay + d,
            _ => self.delay,
        };
        let was_cancelled = tokio::select! {
            _ = tokio::time::sleep(run_for) => false,
            _ = cancelled => true,
        };

        self.state.lock().unwrap().running -= 1;

        if was_cancelled {
            return Ok(ProcessOutput { exit_code: None, output: CANCELLED_SENTINEL.to_string() });
        }

        match step {
            Step::Succeed | Step::Slow(_) => Ok(Self::success(command, &app_id, &item_id, attempt, true, true)),
            Step::SucceedWithoutFiles => Ok(Self::success(command, &app_id, &item_id, attempt, false, true)),
            Step::SucceedWithoutMarker => Ok(Self::success(command, &app_id, &item_id, attempt, true, false)),
            Step::SucceedWithLateFiles(after) => {
                let output = Self::success(command, &app_id, &item_id, attempt, false, true);
                let file = Self::content_dir(command, &app_id, &item_id).join("payload.txt");
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tokio::fs::write(file, format!("attempt {attempt}")).await;
                });
                Ok(output)
            }
            Step::Fail(code) => Ok(ProcessOutput {
                exit_code: Some(code),
                output: format!("ERROR! Download item {item_id} failed (Failure)."),
            }),
            Step::SpawnError => Err(DownloadError::ProcessSpawn {
                program: command.program.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            Step::Unrecoverable => Err(DownloadError::Bootstrap("SteamCMD installation disappeared".into())),
            Step::Panic => panic!("scripted panic for item {item_id}"),
        }
    }
}

/// Download settings with millisecond delays so tests stay fast
pub fn fast_settings() -> DownloadSettings {
    DownloadSettings {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        validation_attempts: 3,
        validation_delay: Duration::from_millis(5),
        timeout: None,
        success_marker: Some("Success. Downloaded item".to_string()),
        kill_in_flight_on_abort: false,
    }
}

/// Create a test configuration rooted in a temporary directory
pub fn create_test_config(root: &std::path::Path) -> Config {
    Config {
        steamcmd_dir: root.join("steamcmd"),
        log_level: "error".to_string(), // Reduce log noise in tests
        retry_base_delay_secs: 0,
        validation_delay_ms: 1,
        ..Config::default()
    }
}

/// Create a temporary directory for tests
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("Failed to create temp directory")
}
