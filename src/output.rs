use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::Error;
use crate::manager::InstrumentationManager;
use crate::printer::print_file;
use crate::report::InstrumentationReport;
use crate::resolve::{Package, load_project};
use crate::rewrite::instrument_packages;

/// Run the whole pipeline over the project at `root`: load, instrument, and
/// (unless `dry_run`) write the rewritten tree next to the original.
///
/// The rewritten project is produced in a temporary staging copy first and
/// only persisted to the output directory once every file has been written,
/// so a failure never leaves a partial output behind.
pub fn instrument_project(
    root: &Path,
    output: Option<&Path>,
    app_name: &str,
    agent_var: &str,
    dry_run: bool,
) -> Result<(InstrumentationReport, Option<PathBuf>), Error> {
    let packages = load_project(root)?;
    let baseline = baseline_texts(&packages);

    let mut mgr = InstrumentationManager::new(packages, app_name, agent_var);
    instrument_packages(&mut mgr)?;

    let report_packages = mgr.package_paths();
    let mut packages_instrumented = mgr.packages_needing_agent();
    packages_instrumented.sort();
    let handlers = mgr.handlers.clone();
    let warnings = mgr.warnings.clone();
    let traced_functions = mgr.traced_functions();
    let packages = mgr.into_packages();

    let mut rewritten: Vec<(PathBuf, String)> = Vec::new();
    for pkg in &packages {
        for file in &pkg.files {
            let text = print_file(file);
            if baseline.get(&file.path) != Some(&text) {
                rewritten.push((file.path.clone(), text));
            }
        }
    }
    rewritten.sort_by(|a, b| a.0.cmp(&b.0));

    let report = InstrumentationReport {
        app_name: app_name.to_string(),
        packages: report_packages,
        packages_instrumented,
        handlers,
        traced_functions,
        warnings,
        files_rewritten: rewritten
            .iter()
            .map(|(p, _)| p.display().to_string())
            .collect(),
    };

    if dry_run {
        return Ok((report, None));
    }

    let staging = tempfile::tempdir()?;
    prepare_staging(root, staging.path())?;
    for (rel, text) in &rewritten {
        let dest = staging.path().join(rel);
        std::fs::write(&dest, text).map_err(|source| Error::WriteError {
            path: dest.clone(),
            source,
        })?;
    }

    let output_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => default_output_dir(root),
    };
    persist(staging.path(), &output_dir)?;
    Ok((report, Some(output_dir)))
}

/// `<project>-instrumented`, next to the project directory.
pub fn default_output_dir(root: &Path) -> PathBuf {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    root.with_file_name(format!("{name}-instrumented"))
}

/// Copy the user's project into a staging directory, respecting .gitignore.
pub fn prepare_staging(project_root: &Path, staging_dir: &Path) -> Result<(), Error> {
    let walker = WalkBuilder::new(project_root)
        .hidden(false)
        .require_git(false)
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let source = entry.path();
        let relative = source
            .strip_prefix(project_root)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let dest = staging_dir.join(relative);

        if entry.file_type().is_some_and(|ft| ft.is_dir()) {
            std::fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_some_and(|ft| ft.is_file()) {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(source, &dest)?;
        }
    }

    Ok(())
}

/// The text every loaded file prints as before any transformation, keyed by
/// its project-relative path. Comparing against this (rather than the raw
/// input bytes) keeps formatting normalization out of the change set.
fn baseline_texts(packages: &[Package]) -> HashMap<PathBuf, String> {
    let mut texts = HashMap::new();
    for pkg in packages {
        for file in &pkg.files {
            texts.insert(file.path.clone(), print_file(file));
        }
    }
    texts
}

/// Copy the fully written staging tree into the output directory.
fn persist(staging: &Path, output: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(output)?;
    copy_tree(staging, output)
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), Error> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        if source.is_dir() {
            std::fs::create_dir_all(&dest)?;
            copy_tree(&source, &dest)?;
        } else {
            std::fs::copy(&source, &dest).map_err(|source_err| Error::WriteError {
                path: dest.clone(),
                source: source_err,
            })?;
        }
    }
    Ok(())
}
