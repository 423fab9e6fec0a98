//! Package build routine
//!
//! Each package moves through `Configuring -> Building -> (Checking) ->
//! Installing -> Completed`. Every phase produces an explicit
//! [`PhaseOutcome`]; the [`FailurePolicy`] decides whether a failed phase
//! ends the run or is only logged.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::sys::resource::{getrusage, UsageWho};
use nix::sys::time::TimeVal;

use crate::core::recipe::{PackageContext, Phase, Recipe};
use crate::core::specs;
use crate::error::BuildError;
use crate::infra::process::{Invocation, ProcessError, ToolRunner};

/// States of a build routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoutineState {
    Configuring,
    Building,
    Checking,
    Installing,
    Completed,
}

impl RoutineState {
    /// Following state; checking is skipped when checks are off
    pub fn next(self, run_checks: bool) -> Option<Self> {
        match self {
            Self::Configuring => Some(Self::Building),
            Self::Building if run_checks => Some(Self::Checking),
            Self::Building | Self::Checking => Some(Self::Installing),
            Self::Installing => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// Phase executed in this state
    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::Configuring => Some(Phase::Configure),
            Self::Building => Some(Phase::Build),
            Self::Checking => Some(Phase::Check),
            Self::Installing => Some(Phase::Install),
            Self::Completed => None,
        }
    }
}

/// Result of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Every step exited successfully
    Succeeded,
    /// A step failed or could not start; `exit_code` is `None` when no
    /// status was available
    SoftFailed { exit_code: Option<i32> },
}

impl PhaseOutcome {
    /// Whether the phase succeeded
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

/// What to do when a phase fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and continue with the next phase
    #[default]
    BestEffort,
    /// Stop the run on configure, build or install failures
    Strict,
}

impl FailurePolicy {
    /// Whether a failure in `phase` stops the run
    ///
    /// Check failures never do.
    pub fn escalates(self, phase: Phase) -> bool {
        self == Self::Strict && phase != Phase::Check
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BestEffort => write!(f, "best-effort"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// Resource usage of one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTiming {
    /// Elapsed wall-clock time
    pub wall: Duration,
    /// User CPU time of child processes
    pub user: Duration,
    /// System CPU time of child processes
    pub system: Duration,
}

impl fmt::Display for PhaseTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}s real, {:.1}s user, {:.1}s sys",
            self.wall.as_secs_f64(),
            self.user.as_secs_f64(),
            self.system.as_secs_f64()
        )
    }
}

fn timeval_duration(tv: TimeVal) -> Duration {
    let secs = u64::try_from(tv.tv_sec()).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec()).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}

/// CPU time consumed so far by waited-for children
fn children_cpu() -> (Duration, Duration) {
    getrusage(UsageWho::RUSAGE_CHILDREN)
        .map(|usage| (timeval_duration(usage.user_time()), timeval_duration(usage.system_time())))
        .unwrap_or_default()
}

struct PhaseClock {
    started: Instant,
    user: Duration,
    system: Duration,
}

impl PhaseClock {
    fn start() -> Self {
        let (user, system) = children_cpu();
        Self {
            started: Instant::now(),
            user,
            system,
        }
    }

    fn stop(self) -> PhaseTiming {
        let (user, system) = children_cpu();
        PhaseTiming {
            wall: self.started.elapsed(),
            user: user.saturating_sub(self.user),
            system: system.saturating_sub(self.system),
        }
    }
}

/// Record of one executed phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub outcome: PhaseOutcome,
    pub timing: PhaseTiming,
    pub log: PathBuf,
}

/// Record of a package routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineReport {
    /// Canonical package name
    pub name: String,
    /// Executed phases in order
    pub phases: Vec<PhaseReport>,
    /// State reached
    pub state: RoutineState,
}

impl RoutineReport {
    /// Phases that did not succeed
    pub fn soft_failures(&self) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(|p| !p.outcome.is_success())
    }
}

/// Receives phase results as they happen
pub trait PhaseObserver {
    /// A phase is about to run
    fn phase_started(&self, _name: &str, _phase: Phase) {}

    /// A phase finished
    fn phase_finished(&self, _name: &str, _report: &PhaseReport) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PhaseObserver for NoopObserver {}

/// Runs recipes for one package at a time
#[derive(Debug)]
pub struct BuildRoutine<'a> {
    runner: &'a ToolRunner,
    policy: FailurePolicy,
    run_checks: bool,
    /// Directory holding `<name>/<phase>.log`
    logs_dir: PathBuf,
    /// Prefix whose `lib64` is embedded into the gcc specs
    prefix: PathBuf,
}

impl<'a> BuildRoutine<'a> {
    /// Create a routine runner
    pub fn new(
        runner: &'a ToolRunner,
        policy: FailurePolicy,
        run_checks: bool,
        logs_dir: PathBuf,
        prefix: PathBuf,
    ) -> Self {
        Self {
            runner,
            policy,
            run_checks,
            logs_dir,
            prefix,
        }
    }

    /// Log directory of a package
    pub fn package_logs(&self, name: &str) -> PathBuf {
        self.logs_dir.join(name)
    }

    /// Drive `recipe` from `Configuring` to `Completed`
    ///
    /// Soft failures are reported in the returned record; an error is
    /// returned only when the policy escalates a failure or the log
    /// directory cannot be prepared.
    pub async fn run(
        &self,
        ctx: &PackageContext,
        recipe: &Recipe,
        observer: &dyn PhaseObserver,
    ) -> Result<RoutineReport, BuildError> {
        let logs = self.package_logs(&ctx.name);
        reset_dir(&logs).await?;

        let mut report = RoutineReport {
            name: ctx.name.clone(),
            phases: Vec::new(),
            state: RoutineState::Configuring,
        };

        let mut state = RoutineState::Configuring;
        while let Some(phase) = state.phase() {
            observer.phase_started(&ctx.name, phase);
            let log = phase.log_path(&logs);
            let clock = PhaseClock::start();

            let mut outcome = self.run_steps(recipe.steps(phase), &log).await;
            if phase == Phase::Install && recipe.patch_specs && outcome.is_success() {
                outcome = self.patch_specs(ctx, &log).await;
            }

            let phase_report = PhaseReport {
                phase,
                outcome,
                timing: clock.stop(),
                log: log.clone(),
            };
            tracing::info!("{} {phase}: {:?} ({})", ctx.name, outcome, phase_report.timing);
            observer.phase_finished(&ctx.name, &phase_report);
            report.phases.push(phase_report);

            if !outcome.is_success() {
                if self.policy.escalates(phase) {
                    return Err(BuildError::PhaseFailed {
                        package: ctx.name.clone(),
                        phase: phase.to_string(),
                        log,
                    });
                }
                tracing::warn!("{} {phase} failed, continuing (see {})", ctx.name, log.display());
            }

            // Advance only after the phase ran; there is no way back
            state = state.next(self.run_checks).unwrap_or(RoutineState::Completed);
            report.state = state;
        }

        Ok(report)
    }

    async fn run_steps(&self, steps: &[Invocation], log: &Path) -> PhaseOutcome {
        for step in steps {
            match self.runner.run_logged(step, log).await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    return PhaseOutcome::SoftFailed {
                        exit_code: status.code(),
                    }
                }
                Err(ProcessError::Spawn { program, error }) => {
                    tracing::warn!("Failed to start {program}: {error}");
                    return PhaseOutcome::SoftFailed { exit_code: None };
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    return PhaseOutcome::SoftFailed { exit_code: None };
                }
            }
        }
        PhaseOutcome::Succeeded
    }

    async fn patch_specs(&self, ctx: &PackageContext, log: &Path) -> PhaseOutcome {
        let gcc = self.prefix.join("bin").join("gcc");
        let rpath = self.prefix.join("lib64");
        match specs::patch_compiler_specs(self.runner, &gcc, &rpath, &ctx.work_dir, log).await {
            Ok(_) => PhaseOutcome::Succeeded,
            Err(e) => {
                tracing::warn!("{e}");
                append_note(log, &format!("specs patch failed: {e}")).await;
                PhaseOutcome::SoftFailed { exit_code: None }
            }
        }
    }
}

async fn reset_dir(dir: &Path) -> Result<(), BuildError> {
    let io_err = |e: std::io::Error| BuildError::Io {
        path: dir.to_path_buf(),
        error: e.to_string(),
    };
    if dir.exists() {
        tokio::fs::remove_dir_all(dir).await.map_err(io_err)?;
    }
    tokio::fs::create_dir_all(dir).await.map_err(io_err)
}

async fn append_note(log: &Path, note: &str) {
    use tokio::io::AsyncWriteExt;

    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .await?;
        file.write_all(format!("{note}\n").as_bytes()).await?;
        file.flush().await
    }
    .await;
    if let Err(e) = result {
        tracing::warn!("Failed to write to {}: {e}", log.display());
    }
}
