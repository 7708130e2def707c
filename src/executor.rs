//! The job-list executor.
//!
//! Runs an execute list in order, consulting each job's requirement
//! edges and the continue-on-failure policy when prerequisites fail.
//! Fetch jobs whose requirements are already met may run concurrently
//! ahead of the serial install/uninstall sequence; installs and
//! uninstalls never overlap.

use std::fmt;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resolver::{ExecuteJob, FetchJob, InstallJob, JobLists, PretendJob, UninstallJob};

/// How execution proceeds after a prerequisite failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContinueOnFailure {
    /// Continue only fetch jobs after any failure.
    IfFetchOnly,
    /// Abort everything after the first failure.
    #[default]
    Never,
    /// Run a job only if its satisfied-requirements all succeeded.
    IfSatisfied,
    /// Run a job only if its independent-requirements all succeeded.
    IfIndependent,
    /// Keep going regardless (hard `always` requirements still bind).
    Always,
}

/// The interface to the external build tool. The core asks the driver to
/// perform jobs; it never builds anything itself.
pub trait BuildDriver: Send + Sync {
    /// Download sources for one id.
    fn fetch(&self, job: &FetchJob) -> Result<()>;

    /// Build and merge one id.
    fn install(&self, job: &InstallJob) -> Result<()>;

    /// Remove installed ids.
    fn uninstall(&self, job: &UninstallJob) -> Result<()>;

    /// Dry-run checks for one id.
    fn pretend(&self, job: &PretendJob) -> Result<()> {
        let _ = job;
        Ok(())
    }

    /// Post-install configuration for one installed id.
    fn config(&self, id_spec: &crate::types::PackageDepSpec) -> Result<()> {
        Err(crate::error::CinderError::UnsupportedAction {
            id: id_spec.to_string(),
            action: "config".to_string(),
        })
    }

    /// Display information about one id.
    fn info(&self, id_spec: &crate::types::PackageDepSpec) -> Result<()> {
        Err(crate::error::CinderError::UnsupportedAction {
            id: id_spec.to_string(),
            action: "info".to_string(),
        })
    }
}

/// One job's state after (or during) execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Not reached yet.
    Pending,
    /// Completed successfully.
    Succeeded,
    /// The driver reported failure.
    Failed(String),
    /// Not run because a prerequisite failed or the policy aborted.
    Skipped(String),
}

impl JobState {
    /// Whether this state counts as a met prerequisite.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(e) => write!(f, "failed: {e}"),
            Self::Skipped(why) => write!(f, "skipped: {why}"),
        }
    }
}

/// The outcome of one execute run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Final state per job, indexed like the execute list.
    pub states: Vec<JobState>,
    /// Whether every job succeeded.
    pub success: bool,
}

/// Executes job lists through a [`BuildDriver`].
pub struct Executor<'d> {
    driver: &'d dyn BuildDriver,
    continue_on_failure: ContinueOnFailure,
    parallel_fetches: bool,
}

impl<'d> Executor<'d> {
    /// An executor with the given failure policy.
    #[must_use]
    pub const fn new(driver: &'d dyn BuildDriver, continue_on_failure: ContinueOnFailure) -> Self {
        Self {
            driver,
            continue_on_failure,
            parallel_fetches: true,
        }
    }

    /// Disable the concurrent fetch-ahead phase.
    #[must_use]
    pub const fn serial_fetches(mut self) -> Self {
        self.parallel_fetches = false;
        self
    }

    /// What: Run the pretend phase.
    ///
    /// Output:
    /// - Failures per pretend job; an empty list means all checks
    ///   passed.
    pub fn pretend(&self, lists: &JobLists) -> Vec<(usize, String)> {
        let mut failures = Vec::new();
        for (index, job) in lists.pretend_jobs.iter().enumerate() {
            if let Err(e) = self.driver.pretend(job) {
                failures.push((index, e.to_string()));
            }
        }
        failures
    }

    /// What: Run the execute list.
    ///
    /// Details:
    /// - Jobs run in list order. Before each job, its requirement edges
    ///   are checked: a failed `always` prerequisite always skips the
    ///   job; otherwise the continue-on-failure policy decides whether
    ///   the job still runs once anything has failed.
    /// - When enabled, fetch jobs with no unmet requirements are
    ///   performed concurrently up front; their results are reused when
    ///   the walk reaches them.
    pub fn execute(&self, lists: &JobLists) -> ExecutionResult {
        let jobs = &lists.execute_jobs;
        let mut states = vec![JobState::Pending; jobs.len()];

        if self.parallel_fetches {
            self.fetch_ahead(jobs, &mut states);
        }

        let mut anything_failed = false;
        for index in 0..jobs.len() {
            if matches!(states[index], JobState::Pending) {
                match self.gate(jobs, &states, index, anything_failed) {
                    Ok(()) => {
                        let outcome = self.perform(&jobs[index]);
                        states[index] = match outcome {
                            Ok(()) => JobState::Succeeded,
                            Err(e) => {
                                tracing::warn!("job {index} ({}) failed: {e}", jobs[index]);
                                JobState::Failed(e.to_string())
                            }
                        };
                    }
                    Err(why) => {
                        tracing::debug!("job {index} ({}) skipped: {why}", jobs[index]);
                        states[index] = JobState::Skipped(why);
                    }
                }
            }
            if matches!(states[index], JobState::Failed(_)) {
                anything_failed = true;
            }
        }

        let success = states.iter().all(JobState::succeeded);
        ExecutionResult { states, success }
    }

    /// Run requirement-free fetch jobs concurrently, filling their
    /// states in.
    fn fetch_ahead(&self, jobs: &[ExecuteJob], states: &mut [JobState]) {
        let ready: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.is_fetch() && job.requirements().is_empty())
            .map(|(index, _)| index)
            .collect();
        if ready.len() < 2 {
            return;
        }

        let (sender, receiver) = mpsc::channel::<(usize, std::result::Result<(), String>)>();
        std::thread::scope(|scope| {
            for &index in &ready {
                let sender = sender.clone();
                let job = &jobs[index];
                scope.spawn(move || {
                    let outcome = match job {
                        ExecuteJob::Fetch(fetch) => {
                            self.driver.fetch(fetch).map_err(|e| e.to_string())
                        }
                        _ => Ok(()),
                    };
                    // A send failure means the receiver is gone; nothing
                    // to report to.
                    let _ = sender.send((index, outcome));
                });
            }
        });
        drop(sender);
        for (index, outcome) in receiver {
            states[index] = match outcome {
                Ok(()) => JobState::Succeeded,
                Err(e) => JobState::Failed(e),
            };
        }
    }

    /// Whether a job may run, or the reason it must be skipped.
    fn gate(
        &self,
        jobs: &[ExecuteJob],
        states: &[JobState],
        index: usize,
        anything_failed: bool,
    ) -> std::result::Result<(), String> {
        let job = &jobs[index];

        for requirement in job.requirements() {
            if requirement.flags.always && !states[requirement.job_index].succeeded() {
                return Err(format!(
                    "hard prerequisite job {} did not succeed",
                    requirement.job_index
                ));
            }
        }

        if !anything_failed {
            return Ok(());
        }

        match self.continue_on_failure {
            ContinueOnFailure::Never => Err("an earlier job failed".to_string()),
            ContinueOnFailure::IfFetchOnly => {
                if job.is_fetch() {
                    Ok(())
                } else {
                    Err("an earlier job failed and only fetches continue".to_string())
                }
            }
            ContinueOnFailure::IfSatisfied => {
                for requirement in job.requirements() {
                    if requirement.flags.for_satisfied
                        && !states[requirement.job_index].succeeded()
                    {
                        return Err(format!(
                            "requirement-for-satisfied job {} did not succeed",
                            requirement.job_index
                        ));
                    }
                }
                Ok(())
            }
            ContinueOnFailure::IfIndependent => {
                for requirement in job.requirements() {
                    if requirement.flags.for_independent
                        && !states[requirement.job_index].succeeded()
                    {
                        return Err(format!(
                            "requirement-for-independence job {} did not succeed",
                            requirement.job_index
                        ));
                    }
                }
                Ok(())
            }
            ContinueOnFailure::Always => Ok(()),
        }
    }

    fn perform(&self, job: &ExecuteJob) -> Result<()> {
        match job {
            ExecuteJob::Fetch(fetch) => self.driver.fetch(fetch),
            ExecuteJob::Install(install) => self.driver.install(install),
            ExecuteJob::Uninstall(uninstall) => self.driver.uninstall(uninstall),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::resolver::{DestinationType, JobRequirement, JobRequirementFlags};
    use crate::types::name::{QualifiedPackageName, RepositoryName};
    use crate::types::spec::PackageDepSpec;

    struct ScriptedDriver {
        fail: Vec<String>,
        log: Mutex<Vec<String>>,
    }

    impl ScriptedDriver {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(ToString::to_string).collect(),
                log: Mutex::new(Vec::new()),
            }
        }

        fn run(&self, what: String) -> Result<()> {
            self.log.lock().unwrap().push(what.clone());
            if self.fail.iter().any(|f| what.contains(f.as_str())) {
                return Err(crate::error::CinderError::ActionFailed(what));
            }
            Ok(())
        }
    }

    impl BuildDriver for ScriptedDriver {
        fn fetch(&self, job: &FetchJob) -> Result<()> {
            self.run(format!("fetch {}", job.origin_id_spec))
        }

        fn install(&self, job: &InstallJob) -> Result<()> {
            self.run(format!("install {}", job.origin_id_spec))
        }

        fn uninstall(&self, job: &UninstallJob) -> Result<()> {
            self.run(format!(
                "uninstall {}",
                job.ids_to_remove_specs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            ))
        }
    }

    fn spec(s: &str) -> PackageDepSpec {
        PackageDepSpec::simple(QualifiedPackageName::new(s).unwrap())
    }

    fn fetch_install(name: &str, jobs: &mut Vec<ExecuteJob>) {
        let fetch_index = jobs.len();
        jobs.push(ExecuteJob::Fetch(FetchJob {
            requirements: Vec::new(),
            origin_id_spec: spec(name),
        }));
        jobs.push(ExecuteJob::Install(InstallJob {
            requirements: vec![JobRequirement {
                job_index: fetch_index,
                flags: JobRequirementFlags { for_satisfied: true, for_independent: true, always: true },
            }],
            origin_id_spec: spec(name),
            destination_repository: RepositoryName::new("installed").unwrap(),
            destination_type: DestinationType::InstallToSlash,
            replacing_specs: Vec::new(),
        }));
    }

    fn lists(names: &[&str]) -> JobLists {
        let mut jobs = Vec::new();
        for name in names {
            fetch_install(name, &mut jobs);
        }
        JobLists {
            pretend_jobs: Vec::new(),
            execute_jobs: jobs,
        }
    }

    #[test]
    fn test_all_succeed() {
        let driver = ScriptedDriver::new(&[]);
        let result = Executor::new(&driver, ContinueOnFailure::Never)
            .serial_fetches()
            .execute(&lists(&["a/one", "a/two"]));
        assert!(result.success);
        assert!(result.states.iter().all(JobState::succeeded));
    }

    #[test]
    fn test_failed_fetch_skips_install_via_always() {
        let driver = ScriptedDriver::new(&["fetch a/one"]);
        let result = Executor::new(&driver, ContinueOnFailure::Always)
            .serial_fetches()
            .execute(&lists(&["a/one", "a/two"]));
        assert!(!result.success);
        assert!(matches!(result.states[0], JobState::Failed(_)));
        assert!(matches!(result.states[1], JobState::Skipped(_)));
        // Policy `always` lets unrelated jobs continue.
        assert!(result.states[2].succeeded());
        assert!(result.states[3].succeeded());
    }

    #[test]
    fn test_never_policy_aborts_after_failure() {
        let driver = ScriptedDriver::new(&["fetch a/one"]);
        let result = Executor::new(&driver, ContinueOnFailure::Never)
            .serial_fetches()
            .execute(&lists(&["a/one", "a/two"]));
        assert!(matches!(result.states[0], JobState::Failed(_)));
        assert!(matches!(result.states[1], JobState::Skipped(_)));
        assert!(matches!(result.states[2], JobState::Skipped(_)));
        assert!(matches!(result.states[3], JobState::Skipped(_)));
    }

    #[test]
    fn test_fetch_only_policy_still_fetches() {
        let driver = ScriptedDriver::new(&["fetch a/one"]);
        let result = Executor::new(&driver, ContinueOnFailure::IfFetchOnly)
            .serial_fetches()
            .execute(&lists(&["a/one", "a/two"]));
        assert!(matches!(result.states[1], JobState::Skipped(_)));
        assert!(result.states[2].succeeded(), "later fetch still runs");
        assert!(matches!(result.states[3], JobState::Skipped(_)));
    }

    #[test]
    fn test_if_satisfied_chain_of_uninstalls() {
        // Four uninstalls chained by for_satisfied edges; a failure in
        // the second skips the rest under if_satisfied.
        let mut jobs = Vec::new();
        for (index, name) in ["a/first", "a/second", "a/third", "a/fourth"].iter().enumerate() {
            let requirements = if index == 0 {
                Vec::new()
            } else {
                vec![JobRequirement {
                    job_index: index - 1,
                    flags: JobRequirementFlags { for_satisfied: true, ..JobRequirementFlags::default() },
                }]
            };
            jobs.push(ExecuteJob::Uninstall(UninstallJob {
                requirements,
                ids_to_remove_specs: vec![spec(name)],
            }));
        }
        let lists = JobLists { pretend_jobs: Vec::new(), execute_jobs: jobs };

        let driver = ScriptedDriver::new(&["a/second"]);
        let result = Executor::new(&driver, ContinueOnFailure::IfSatisfied).execute(&lists);
        assert!(result.states[0].succeeded());
        assert!(matches!(result.states[1], JobState::Failed(_)));
        assert!(matches!(result.states[2], JobState::Skipped(_)));
        assert!(matches!(result.states[3], JobState::Skipped(_)));
    }

    #[test]
    fn test_parallel_fetches_record_results() {
        let driver = ScriptedDriver::new(&[]);
        let result = Executor::new(&driver, ContinueOnFailure::Never)
            .execute(&lists(&["a/one", "a/two", "a/three"]));
        assert!(result.success);
        let log = driver.log.lock().unwrap();
        assert_eq!(log.len(), 6);
    }
}
