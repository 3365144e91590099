//! Batch compilation of a whole project to a static output tree.
//!
//! ## Phases
//!
//! Each phase gates the next:
//!
//! ```text
//! 1. resolve output      www → /abs/project/www
//! 2. guard               refuse destinations that would swallow the project
//!                        or overwrite its public sources
//! 3. prepare output      create it, clear stale entries (never the project),
//!                        stamp it as compile output
//! 4. scan + plan         compilable vs pass-through (see crate::scan), one
//!                        source per destination
//! 5. compile phase       render + write, bounded pool, fail fast
//! 6. copy phase          verbatim copies, only if 5 fully succeeded
//! 7. report              output, version stamp, public configuration
//! ```
//!
//! Nothing touches the filesystem before the guard has approved the
//! destination. An output directory inside the public directory is only
//! accepted while empty or when it carries [`OUTPUT_STAMP`] from an earlier
//! compile; anything else there is source.
//!
//! When several sources map to one destination (`about.md` and
//! `about.shtml`, or `page.md` and a static `page.html`) the compiled tree
//! holds what the server would serve: the earliest-registered processor
//! wins and shadowed pass-through files are not copied.
//!
//! ## Concurrency
//!
//! Both phases run on a dedicated rayon pool with [`COMPILE_CONCURRENCY`]
//! threads, which caps the files open at once. After the first failure no
//! queued job starts; jobs already running finish and their output stays on
//! disk. The first error is the one reported.

use crate::cache::RenderCache;
use crate::config::{ConfigError, Project};
use crate::guard;
use crate::render::{RenderError, Registry, Renderer, SiteRenderer};
use crate::scan::{self, ScanError, SourceTree};
use rayon::ThreadPool;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Output directory used when none is given, relative to the project.
pub const DEFAULT_OUTPUT_DIR: &str = "www";

/// Paths copied verbatim instead of compiled when none are given.
pub const DEFAULT_IGNORE: &[&str] = &["vendor"];

/// Upper bound on simultaneously running compile or copy jobs.
pub const COMPILE_CONCURRENCY: usize = 72;

/// Marker file written into every output directory.
pub const OUTPUT_STAMP: &str = ".sitepress-output";

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(
        "Invalid output path {}: it would overwrite the sources of project {} (the output \
         may not contain the project or its public directory, except as the direct parent \
         of a project whose name starts with `_`)",
        output_path.display(),
        project_path.display()
    )]
    OutputPathViolation {
        project_path: PathBuf,
        output_path: PathBuf,
    },
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl CompileError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Output directory; relative paths are taken from the project root.
    pub output: PathBuf,
    /// Paths under the public directory that are copied, never compiled.
    pub ignore: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of a successful compile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub output: PathBuf,
    pub version: String,
    /// Declared project configuration without internal fields.
    pub config: toml::Table,
    pub compiled: usize,
    pub copied: usize,
}

/// One unit of batch work.
#[derive(Debug, Clone)]
struct CompileJob {
    source: PathBuf,
    dest: PathBuf,
}

/// Compiles projects through a [`Registry`].
pub struct BatchCompiler {
    registry: Arc<Registry>,
    renderer: Option<Arc<dyn Renderer>>,
    cache: Option<Arc<RenderCache>>,
    concurrency: usize,
}

impl BatchCompiler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            renderer: None,
            cache: None,
            concurrency: COMPILE_CONCURRENCY,
        }
    }

    /// Render with `renderer` instead of a [`SiteRenderer`] for the project.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Render through a shared cache. Takes precedence over any renderer.
    pub fn with_cache(mut self, cache: Arc<RenderCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn compile(
        &self,
        project_path: &Path,
        options: &CompileOptions,
    ) -> Result<BuildReport, CompileError> {
        let project = Project::load(project_path)?;
        let output = guard::normalize(&project.root.join(&options.output));

        check_output(&project, &output)?;
        prepare_output(&output, &project.root)?;

        let ignore = project.ignore_rules(&options.ignore);
        let tree = scan::scan(&project.public_dir, &self.registry, &ignore, Some(&output))?;
        let (compile_jobs, copy_jobs) = self.plan(&tree, &project.public_dir, &output);

        let renderer: Arc<dyn Renderer> = match &self.renderer {
            Some(renderer) => Arc::clone(renderer),
            None => Arc::new(SiteRenderer::new(
                &project.public_dir,
                Arc::clone(&self.registry),
                project.config.globals.clone(),
            )),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("compile-{i}"))
            .build()?;

        tracing::info!(
            project = %project.root.display(),
            output = %output.display(),
            compilable = compile_jobs.len(),
            pass_through = copy_jobs.len(),
            "compiling"
        );

        run_phase(&pool, &compile_jobs, |job| {
            let body = match &self.cache {
                Some(cache) => cache.render(&job.source)?.body,
                None => renderer.render(&job.source)?.body.into(),
            };
            write_file(&job.dest, &body)
        })?;

        run_phase(&pool, &copy_jobs, |job| {
            ensure_parent(&job.dest)?;
            fs::copy(&job.source, &job.dest)
                .map(|_| ())
                .map_err(|e| CompileError::io(&job.source, e))
        })?;

        tracing::info!(
            compiled = compile_jobs.len(),
            copied = copy_jobs.len(),
            "compile finished"
        );

        Ok(BuildReport {
            output,
            version: crate::version_string().to_string(),
            config: project.config.public_table(),
            compiled: compile_jobs.len(),
            copied: copy_jobs.len(),
        })
    }
}

impl BatchCompiler {
    /// Pair scanned files with destinations, keeping one source per
    /// destination.
    fn plan(
        &self,
        tree: &SourceTree,
        public_dir: &Path,
        output: &Path,
    ) -> (Vec<CompileJob>, Vec<CompileJob>) {
        let mut winners: BTreeMap<PathBuf, (usize, &PathBuf)> = BTreeMap::new();
        for rel in &tree.compilable {
            let (Some(dest), Some(priority)) =
                (self.registry.output_path(rel), self.registry.priority(rel))
            else {
                continue;
            };
            match winners.entry(dest) {
                Entry::Vacant(slot) => {
                    slot.insert((priority, rel));
                }
                Entry::Occupied(mut slot) => {
                    let (held, kept) = *slot.get();
                    let (kept, shadowed) = if priority < held {
                        slot.insert((priority, rel));
                        (rel, kept)
                    } else {
                        (kept, rel)
                    };
                    tracing::warn!(
                        kept = %kept.display(),
                        shadowed = %shadowed.display(),
                        "sources share an output path"
                    );
                }
            }
        }

        let copy_jobs = tree
            .pass_through
            .iter()
            .filter(|rel| match winners.get(rel.as_path()) {
                Some((_, source)) => {
                    tracing::warn!(
                        kept = %source.display(),
                        shadowed = %rel.display(),
                        "static file shadowed by a compiled page"
                    );
                    false
                }
                None => true,
            })
            .map(|rel| CompileJob {
                source: public_dir.join(rel),
                dest: output.join(rel),
            })
            .collect();
        let compile_jobs = winners
            .into_iter()
            .map(|(dest, (_, rel))| CompileJob {
                source: public_dir.join(rel),
                dest: output.join(dest),
            })
            .collect();
        (compile_jobs, copy_jobs)
    }
}

/// Compile `project_path` with the standard processors.
pub fn compile(project_path: &Path, options: &CompileOptions) -> Result<BuildReport, CompileError> {
    BatchCompiler::new(Arc::new(Registry::standard())).compile(project_path, options)
}

/// Run `work` for every job on `pool`, stopping new jobs after the first
/// failure. Returns that first failure.
fn run_phase<F>(pool: &ThreadPool, jobs: &[CompileJob], work: F) -> Result<(), CompileError>
where
    F: Fn(&CompileJob) -> Result<(), CompileError> + Sync,
{
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<CompileError>> = Mutex::new(None);

    pool.scope_fifo(|scope| {
        let failed = &failed;
        let first_error = &first_error;
        let work = &work;
        for job in jobs {
            scope.spawn_fifo(move |_| {
                if failed.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(err) = work(job) {
                    if !failed.swap(true, Ordering::SeqCst) {
                        tracing::debug!(source = %job.source.display(), "job failed: {err}");
                        *first_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
                    }
                }
            });
        }
    });

    match first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Refuse destinations that would overwrite the sources being compiled.
fn check_output(project: &Project, output: &Path) -> Result<(), CompileError> {
    let public = project.public_dir.as_path();
    let refused = !guard::allows(&project.root, output)
        || output == public
        || (output.starts_with(public) && !is_reusable_output(output)?);
    if refused {
        return Err(CompileError::OutputPathViolation {
            project_path: project.root.clone(),
            output_path: output.to_path_buf(),
        });
    }
    Ok(())
}

/// True when `output` is missing, empty, or stamped by an earlier compile.
fn is_reusable_output(output: &Path) -> Result<bool, CompileError> {
    if output.join(OUTPUT_STAMP).is_file() {
        return Ok(true);
    }
    match fs::read_dir(output) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(CompileError::io(output, err)),
    }
}

/// Create `output`, remove everything in it except an entry that contains
/// the project itself, and stamp it.
fn prepare_output(output: &Path, project_root: &Path) -> Result<(), CompileError> {
    fs::create_dir_all(output).map_err(|e| CompileError::io(output, e))?;
    let entries = fs::read_dir(output).map_err(|e| CompileError::io(output, e))?;
    for entry in entries {
        let path = entry.map_err(|e| CompileError::io(output, e))?.path();
        if project_root.starts_with(&path) {
            continue;
        }
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| CompileError::io(&path, e))?;
    }
    let stamp = output.join(OUTPUT_STAMP);
    fs::write(&stamp, format!("{}\n", crate::version_string()))
        .map_err(|e| CompileError::io(&stamp, e))
}

fn ensure_parent(path: &Path) -> Result<(), CompileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CompileError::io(parent, e))?;
    }
    Ok(())
}

fn write_file(path: &Path, body: &[u8]) -> Result<(), CompileError> {
    ensure_parent(path)?;
    fs::write(path, body).map_err(|e| CompileError::io(path, e))
}
