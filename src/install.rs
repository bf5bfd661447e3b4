//! The install pipeline.
//!
//! ```text
//! pre-check ─► fetch ─► inspect ─► metadata ─► decide ─► apply ─► verify
//!                          │                                        │
//!                          └──────────── detach (always) ◄──────────┘
//! ```
//!
//! Every step logs through [`Log`] and records a summary entry.  The
//! mounted image is owned by an [`Artifact`] and the downloaded file by an
//! [`InstallerSource`]; both clean up on drop, so early returns leave
//! nothing behind.
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::artifact::{Artifact, Target};
use crate::config::InstallOptions;
use crate::error::InstallError;
use crate::exec::Executor;
use crate::logging::{Log, StepStatus};
use crate::package_info;
use crate::plist;
use crate::resources::app_bundle::{self, AppBundleResource};
use crate::resources::receipt::ReceiptResource;
use crate::resources::{InstallDecision, InstallPolicy, Resource, ResourceState, decide};
use crate::source::{Fetcher, InstallerSource};
use crate::version;

/// Shared collaborators for one task.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    /// Runs OS tools.
    pub executor: &'a dyn Executor,
    /// Downloads remote installers.
    pub fetcher: &'a dyn Fetcher,
    /// Progress and summary logging.
    pub log: &'a dyn Log,
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("executor", &self.executor)
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

/// Result of a task, serialized as the module's JSON result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    /// Whether the host was (or in check mode would be) changed.
    pub changed: bool,
    /// Human-readable result.
    pub msg: String,
    /// Package or bundle that was evaluated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkg_path: Option<String>,
    /// Receipt or bundle identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Version now present (or that would be installed in check mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_installed: Option<String>,
    /// Version that was replaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Why nothing was done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    /// Non-fatal problems, such as a volume that would not detach.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// What the pipeline found to install.
struct Candidate<'a> {
    resource: Box<dyn Resource + 'a>,
    path: PathBuf,
    identifier: Option<String>,
    version: String,
}

fn to_install_error(e: anyhow::Error) -> InstallError {
    e.downcast::<InstallError>()
        .unwrap_or_else(InstallError::Other)
}

/// Record a step's result and pass it through.
fn step<T>(log: &dyn Log, name: &str, result: Result<T, InstallError>) -> Result<T, InstallError> {
    match &result {
        Ok(_) => log.record_step(name, StepStatus::Ok, None),
        Err(e) => {
            log.error(&e.to_string());
            log.record_step(name, StepStatus::Failed, Some(&e.to_string()));
        }
    }
    result
}

/// Run one install task.
///
/// # Errors
///
/// Returns the [`InstallError`] of the first step that failed.  Unmount
/// failures are not errors; they appear in [`TaskOutcome::warnings`].
pub fn run(opts: &InstallOptions, ctx: &Context<'_>) -> Result<TaskOutcome, InstallError> {
    if opts.has_precheck_hint()
        && let Some(outcome) = step(ctx.log, "Check installed state", precheck(opts, ctx))?
    {
        return Ok(outcome);
    }

    ctx.log.stage("Fetching installer");
    let source = step(
        ctx.log,
        "Fetch installer",
        InstallerSource::resolve(
            &opts.source,
            opts.kind,
            opts.checksum.as_ref(),
            ctx.fetcher,
            ctx.log,
        ),
    )?;

    ctx.log.stage("Inspecting installer");
    let artifact = step(
        ctx.log,
        "Inspect installer",
        Artifact::inspect(source.kind, &source.path, ctx.executor, ctx.log),
    )?;

    let result = evaluate_and_apply(opts, ctx, &artifact);

    let mut warnings = Vec::new();
    if let Some(e) = artifact.close() {
        ctx.log.warn(&e.to_string());
        warnings.push(e.to_string());
    }
    if source.is_downloaded() {
        ctx.log.debug(&format!("removing downloaded {}", source.path.display()));
    }
    drop(source);

    let mut outcome = result?;
    outcome.warnings = warnings;
    Ok(outcome)
}

/// Decide from the `id` / `app` hint alone whether the fetch can be
/// skipped.
fn precheck(opts: &InstallOptions, ctx: &Context<'_>) -> Result<Option<TaskOutcome>, InstallError> {
    if opts.force {
        return Ok(None);
    }
    let (label, pkg_path, state) = if let Some(id) = &opts.id {
        let state = ReceiptResource::new(id.as_str(), ctx.executor).current_state();
        (id.clone(), None, state.map_err(to_install_error)?)
    } else if let Some(app) = &opts.app {
        let resource = AppBundleResource::new(app, opts.location.as_deref(), ctx.executor);
        let state = resource.current_state().map_err(to_install_error)?;
        let destination = resource.destination().display().to_string();
        (destination.clone(), Some(destination), state)
    } else {
        return Ok(None);
    };

    ctx.log.stage("Checking installed state");
    let ResourceState::Installed { version: installed } = state else {
        ctx.log.info(&format!("{label} is not installed"));
        return Ok(None);
    };

    let satisfied = !opts.upgrade
        || match (&installed, &opts.version) {
            (Some(have), Some(want)) => version::is_at_least(have, want),
            _ => false,
        };
    if !satisfied {
        ctx.log.info(&format!(
            "{label} {} is installed, inspecting installer",
            installed.as_deref().unwrap_or("(unknown version)")
        ));
        return Ok(None);
    }

    let msg = format!(
        "{label} {} is already installed",
        installed.as_deref().unwrap_or("(unknown version)")
    );
    ctx.log.info(&msg);
    Ok(Some(TaskOutcome {
        changed: false,
        msg,
        pkg_path,
        identifier: opts.id.clone(),
        version_installed: installed,
        skipped_reason: Some("already installed".to_string()),
        ..TaskOutcome::default()
    }))
}

fn evaluate_and_apply(
    opts: &InstallOptions,
    ctx: &Context<'_>,
    artifact: &Artifact<'_>,
) -> Result<TaskOutcome, InstallError> {
    let target = artifact.target()?;
    ctx.log.stage("Reading package properties");
    let candidate = step(
        ctx.log,
        "Read package properties",
        candidate_for(&target, opts, ctx.executor),
    )?;
    if let (Some(want), Some(found)) = (&opts.id, &candidate.identifier)
        && want != found
    {
        ctx.log.warn(&format!(
            "id is {want} but the package declares {found}; using {found}"
        ));
    }
    ctx.log.info(&format!(
        "{} {}",
        candidate.resource.description(),
        candidate.version
    ));

    let state = candidate
        .resource
        .current_state()
        .map_err(to_install_error)?;
    let policy = InstallPolicy {
        force: opts.force,
        upgrade: opts.upgrade,
    };
    let mut outcome = TaskOutcome {
        pkg_path: Some(candidate.path.display().to_string()),
        identifier: candidate.identifier.clone(),
        version_installed: Some(candidate.version.clone()),
        ..TaskOutcome::default()
    };

    let previous = match decide(&state, &candidate.version, policy) {
        InstallDecision::AlreadyInstalled { installed } => {
            let reason = if opts.upgrade {
                "installed version is current"
            } else {
                "already installed and upgrade is disabled"
            };
            outcome.msg = format!(
                "{} {} is already installed",
                candidate.resource.description(),
                installed.as_deref().unwrap_or("(unknown version)")
            );
            outcome.skipped_reason = Some(reason.to_string());
            ctx.log.info(&outcome.msg);
            ctx.log.record_step("Install", StepStatus::Skipped, Some(reason));
            return Ok(outcome);
        }
        InstallDecision::Proceed { previous } => previous,
    };
    outcome.changed = true;
    outcome.previous_version.clone_from(&previous);
    let action = previous.as_deref().map_or_else(
        || "install".to_string(),
        |p| format!("replace {p} with"),
    );

    if opts.check_mode {
        outcome.msg = format!(
            "Would {action} {} {}",
            candidate.resource.description(),
            candidate.version
        );
        ctx.log.dry_run(&outcome.msg);
        ctx.log.record_step("Install", StepStatus::DryRun, None);
        return Ok(outcome);
    }

    ctx.log.stage("Installing");
    ctx.log.info(&format!("{action} {}", candidate.resource.description()));
    let applied = candidate
        .resource
        .apply()
        .map_err(to_install_error)
        .and_then(|()| verify(&candidate));
    step(ctx.log, "Install", applied)?;

    outcome.msg = format!(
        "Installed {} {}",
        candidate.resource.description(),
        candidate.version
    );
    ctx.log.record_step("Install", StepStatus::Changed, Some(&candidate.version));
    Ok(outcome)
}

/// Confirm the software is present after a successful install.
fn verify(candidate: &Candidate<'_>) -> Result<(), InstallError> {
    let state = candidate
        .resource
        .current_state()
        .map_err(to_install_error)?;
    if state.is_installed() {
        Ok(())
    } else {
        Err(InstallError::Install {
            target: candidate.path.display().to_string(),
            reason: "installer reported success but nothing was recorded".to_string(),
        })
    }
}

fn candidate_for<'a>(
    target: &Target,
    opts: &InstallOptions,
    executor: &'a dyn Executor,
) -> Result<Candidate<'a>, InstallError> {
    match target {
        Target::Package(pkg) => {
            let info = package_info::read(pkg, executor)?;
            let resource = ReceiptResource::new(info.identifier.as_str(), executor).with_package(
                pkg,
                opts.location.as_deref(),
                opts.allow_untrusted,
            );
            Ok(Candidate {
                resource: Box::new(resource),
                path: pkg.clone(),
                identifier: Some(info.identifier),
                version: info.version,
            })
        }
        Target::Application(bundle) => {
            let name = bundle_file_name(bundle)?;
            let version = app_bundle::bundle_version(executor, bundle)?
                .ok_or_else(|| InstallError::Metadata {
                    package: bundle.display().to_string(),
                    reason: "bundle does not specify its version".to_string(),
                })?;
            let identifier = plist::read_string(
                executor,
                &bundle.join("Contents").join("Info.plist"),
                "CFBundleIdentifier",
            )?;
            let resource = AppBundleResource::new(&name, opts.location.as_deref(), executor)
                .with_source(bundle);
            Ok(Candidate {
                resource: Box::new(resource),
                path: bundle.clone(),
                identifier,
                version,
            })
        }
    }
}

fn bundle_file_name(bundle: &Path) -> Result<String, InstallError> {
    bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| InstallError::Metadata {
            package: bundle.display().to_string(),
            reason: "bundle has no name".to_string(),
        })
}
