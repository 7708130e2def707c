//! The linearised plan: jobs and the requirement edges between them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resolver::resolvent::DestinationType;
use crate::types::name::RepositoryName;
use crate::types::spec::PackageDepSpec;

/// Flags on a requirement edge, directing the executor's
/// continue-on-failure logic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequirementFlags {
    /// The dependent's semantic prerequisite is unmet if this job fails.
    pub for_satisfied: bool,
    /// The dependent is not independent of this job's outcome.
    pub for_independent: bool,
    /// Hard prerequisite; the dependent never runs after a failure here.
    pub always: bool,
}

impl fmt::Display for JobRequirementFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.for_satisfied {
            parts.push("satisfied");
        }
        if self.for_independent {
            parts.push("independent");
        }
        if self.always {
            parts.push("always");
        }
        f.write_str(&parts.join(" "))
    }
}

/// One requirement edge: the referencing job needs `job_index` (always a
/// smaller index) per the flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequirement {
    /// Index of the prerequisite job within the execute list.
    pub job_index: usize,
    /// How hard the requirement is.
    pub flags: JobRequirementFlags,
}

impl fmt::Display for JobRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.job_index, self.flags)
    }
}

/// Download the origin id's sources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchJob {
    /// Requirement edges.
    pub requirements: Vec<JobRequirement>,
    /// Uniquely identifying spec of the id to fetch for.
    pub origin_id_spec: PackageDepSpec,
}

/// Build the origin id and merge it into a destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallJob {
    /// Requirement edges.
    pub requirements: Vec<JobRequirement>,
    /// Uniquely identifying spec of the id to install.
    pub origin_id_spec: PackageDepSpec,
    /// The destination repository.
    pub destination_repository: RepositoryName,
    /// The destination kind.
    pub destination_type: DestinationType,
    /// Specs of installed ids this install replaces.
    pub replacing_specs: Vec<PackageDepSpec>,
}

/// Remove installed ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallJob {
    /// Requirement edges.
    pub requirements: Vec<JobRequirement>,
    /// Specs of the ids to remove.
    pub ids_to_remove_specs: Vec<PackageDepSpec>,
}

/// One executable unit of the plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecuteJob {
    /// A fetch.
    Fetch(FetchJob),
    /// An install.
    Install(InstallJob),
    /// An uninstall.
    Uninstall(UninstallJob),
}

impl ExecuteJob {
    /// The job's requirement edges.
    #[must_use]
    pub fn requirements(&self) -> &[JobRequirement] {
        match self {
            Self::Fetch(j) => &j.requirements,
            Self::Install(j) => &j.requirements,
            Self::Uninstall(j) => &j.requirements,
        }
    }

    /// Whether this is a fetch job.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

impl fmt::Display for ExecuteJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(j) => write!(f, "fetch {}", j.origin_id_spec),
            Self::Install(j) => {
                write!(f, "install {} to {}", j.origin_id_spec, j.destination_repository)
            }
            Self::Uninstall(j) => {
                let specs = j
                    .ids_to_remove_specs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "uninstall {specs}")
            }
        }
    }
}

/// A dry-run job, one per planned install.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PretendJob {
    /// Uniquely identifying spec of the id to pretend-install.
    pub origin_id_spec: PackageDepSpec,
}

/// The pretend and execute phases of a resolved plan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLists {
    /// Dry-run jobs, one per changes-to-make decision.
    pub pretend_jobs: Vec<PretendJob>,
    /// The execute list, in run order.
    pub execute_jobs: Vec<ExecuteJob>,
}

impl JobLists {
    /// What: Check the topological invariant.
    ///
    /// Output:
    /// - `true` when every requirement's job index is strictly smaller
    ///   than the index of the job carrying it.
    #[must_use]
    pub fn requirements_are_acyclic(&self) -> bool {
        self.execute_jobs
            .iter()
            .enumerate()
            .all(|(index, job)| job.requirements().iter().all(|r| r.job_index < index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::name::QualifiedPackageName;

    fn spec(s: &str) -> PackageDepSpec {
        PackageDepSpec::simple(QualifiedPackageName::new(s).unwrap())
    }

    #[test]
    fn test_requirement_display_matches_flag_order() {
        let requirement = JobRequirement {
            job_index: 0,
            flags: JobRequirementFlags {
                for_satisfied: true,
                for_independent: true,
                always: true,
            },
        };
        assert_eq!(requirement.to_string(), "0 satisfied independent always");
    }

    #[test]
    fn test_acyclic_check() {
        let fetch = ExecuteJob::Fetch(FetchJob {
            requirements: Vec::new(),
            origin_id_spec: spec("cat/pkg"),
        });
        let install = ExecuteJob::Install(InstallJob {
            requirements: vec![JobRequirement {
                job_index: 0,
                flags: JobRequirementFlags { for_satisfied: true, for_independent: true, always: true },
            }],
            origin_id_spec: spec("cat/pkg"),
            destination_repository: RepositoryName::new("installed").unwrap(),
            destination_type: DestinationType::InstallToSlash,
            replacing_specs: Vec::new(),
        });
        let lists = JobLists {
            pretend_jobs: Vec::new(),
            execute_jobs: vec![fetch, install],
        };
        assert!(lists.requirements_are_acyclic());

        let backwards = JobLists {
            pretend_jobs: Vec::new(),
            execute_jobs: vec![ExecuteJob::Fetch(FetchJob {
                requirements: vec![JobRequirement {
                    job_index: 0,
                    flags: JobRequirementFlags::default(),
                }],
                origin_id_spec: spec("cat/pkg"),
            })],
        };
        assert!(!backwards.requirements_are_acyclic());
    }
}
