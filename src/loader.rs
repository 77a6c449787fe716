//! Filling layers from heterogeneous sources.
//!
//! A source can be an in-memory mapping, a document string, a file, a
//! directory tree, or a bundle of resources registered under a package name.
//! [`Source::detect`] guesses which one a free-form spec string refers to;
//! the [`Loader`] dispatches and writes the result into any [`Layer`].
//!
//! Directory loading maps the filesystem onto dotted branches: each relative
//! directory becomes a branch, each file stem a child branch, and files whose
//! stem starts with `_` contribute to the directory's own branch instead.
//! Deeper files are loaded first, so values set by a subdirectory can be
//! overridden by a file higher up.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::FigtreeError;
use crate::path;
use crate::stack::Layer;
use crate::tree::Tree;
use crate::value::Value;

/// Extensions parsed as structured documents.
const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "conf", "config"];

/// Extension loaded as one raw string scalar; content is stored unmodified.
const RAW_EXTENSION: &str = "txt";

/// A recognized configuration source.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Mapping(serde_yaml::Mapping),
    Text(String),
    File(PathBuf),
    Directory(PathBuf),
    Package {
        package: String,
        path: String,
        pattern: Option<String>,
    },
    /// Nothing recognizable; loading it is a no-op.
    Nothing,
}

impl Source {
    /// Guess what a spec string refers to.
    ///
    /// `pkg://name/sub/dir` addresses a registered resource bundle; a final
    /// component containing `*` is kept as a file-name pattern. Existing
    /// filesystem paths are classified directly. Anything containing a
    /// newline or a `:` is treated as document text.
    pub fn detect(spec: &str) -> Source {
        if let Some(rest) = spec.strip_prefix("pkg://") {
            let mut parts: Vec<&str> = rest.split('/').filter(|p| !p.is_empty()).collect();
            if parts.is_empty() {
                return Source::Nothing;
            }
            let package = parts.remove(0).to_string();
            let pattern = if parts.last().is_some_and(|last| last.contains('*')) {
                parts.pop().map(str::to_string)
            } else {
                None
            };
            return Source::Package {
                package,
                path: parts.join("/"),
                pattern,
            };
        }
        let as_path = Path::new(spec);
        if as_path.is_dir() {
            return Source::Directory(as_path.to_path_buf());
        }
        if as_path.is_file() {
            return Source::File(as_path.to_path_buf());
        }
        if spec.contains('\n') || spec.contains(':') {
            return Source::Text(spec.to_string());
        }
        Source::Nothing
    }
}

/// Merge a parsed mapping into a layer with overwrite semantics.
pub fn load_mapping(
    target: &mut dyn Layer,
    mapping: &serde_yaml::Mapping,
) -> Result<(), FigtreeError> {
    target.merge_branch("", Tree::from_mapping(mapping.clone())?)
}

/// Parse document text and merge it into a layer.
pub fn load_text(target: &mut dyn Layer, text: &str) -> Result<(), FigtreeError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text).map_err(FigtreeError::Parse)?;
    match doc {
        serde_yaml::Value::Mapping(mapping) => {
            target.merge_branch("", Tree::from_mapping(mapping)?)
        }
        serde_yaml::Value::Null => Ok(()),
        other => Err(FigtreeError::InvalidSourceType(format!(
            "expected a mapping document, got {other:?}"
        ))),
    }
}

/// Read a document file and write it into a layer.
pub fn load_file(target: &mut dyn Layer, file: &Path) -> Result<(), FigtreeError> {
    let text =
        std::fs::read_to_string(file).map_err(|e| FigtreeError::io(file.to_path_buf(), e))?;
    load_text(target, &text)
}

/// Read-only view over a named set of resources, addressed by `/`-separated
/// relative paths.
pub trait ResourceBundle {
    fn is_dir(&self, path: &str) -> bool;
    /// Immediate child names under `path` (not full paths).
    fn list(&self, path: &str) -> Vec<String>;
    fn read(&self, path: &str) -> Option<Vec<u8>>;
}

/// A bundle backed by an in-memory map, as produced by embedding resources
/// in the binary.
#[derive(Debug, Default)]
pub struct StaticBundle {
    files: BTreeMap<String, Vec<u8>>,
}

impl StaticBundle {
    pub fn new() -> Self {
        StaticBundle::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl ResourceBundle for StaticBundle {
    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let dir = format!("{path}/");
        self.files.keys().any(|k| k.starts_with(&dir))
    }

    fn list(&self, path: &str) -> Vec<String> {
        let dir = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut names = Vec::new();
        for key in self.files.keys() {
            let Some(rest) = key.strip_prefix(&dir) else {
                continue;
            };
            let name = rest.split('/').next().unwrap_or(rest).to_string();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }
}

/// Named resource bundles available to `pkg://` sources.
#[derive(Default)]
pub struct PackageRegistry {
    bundles: HashMap<String, Box<dyn ResourceBundle>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        PackageRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, bundle: Box<dyn ResourceBundle>) {
        self.bundles.insert(name.into(), bundle);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ResourceBundle> {
        self.bundles.get(name).map(|b| b.as_ref())
    }
}

/// Per-file state of a walked directory: path, modification time and size
/// of every file, in walk order. Two walks with equal fingerprints saw the
/// same files in the same state.
type DirFingerprint = Vec<(PathBuf, SystemTime, u64)>;

/// Replays the assignments of a previous directory load when every file in
/// the directory is unchanged since.
#[derive(Default)]
pub struct DirCache {
    entries: HashMap<PathBuf, (DirFingerprint, Vec<(String, Value)>)>,
}

impl DirCache {
    pub fn new() -> Self {
        DirCache::default()
    }

    fn lookup(&self, dir: &Path, fingerprint: &DirFingerprint) -> Option<&[(String, Value)]> {
        match self.entries.get(dir) {
            Some((cached, pairs)) if cached == fingerprint => Some(pairs),
            _ => None,
        }
    }

    fn store(&mut self, dir: PathBuf, fingerprint: DirFingerprint, pairs: Vec<(String, Value)>) {
        self.entries.insert(dir, (fingerprint, pairs));
    }

    pub fn invalidate(&mut self, dir: &Path) {
        self.entries.remove(dir);
    }
}

/// Dispatches sources into layers.
#[derive(Default)]
pub struct Loader {
    registry: PackageRegistry,
    cache: DirCache,
}

impl Loader {
    pub fn new() -> Self {
        Loader::default()
    }

    pub fn with_registry(registry: PackageRegistry) -> Self {
        Loader {
            registry,
            cache: DirCache::new(),
        }
    }

    pub fn registry_mut(&mut self) -> &mut PackageRegistry {
        &mut self.registry
    }

    pub fn cache_mut(&mut self) -> &mut DirCache {
        &mut self.cache
    }

    /// Auto-detect `spec` and load it. Unrecognized specs are skipped.
    pub fn load(&mut self, target: &mut dyn Layer, spec: &str) -> Result<(), FigtreeError> {
        let source = Source::detect(spec);
        if source == Source::Nothing {
            debug!(spec, "nothing to load");
            return Ok(());
        }
        self.load_source(target, &source)
    }

    pub fn load_source(
        &mut self,
        target: &mut dyn Layer,
        source: &Source,
    ) -> Result<(), FigtreeError> {
        match source {
            Source::Mapping(mapping) => load_mapping(target, mapping),
            Source::Text(text) => load_text(target, text),
            Source::File(file) => load_file(target, file),
            Source::Directory(dir) => self.load_directory(target, dir),
            Source::Package {
                package,
                path,
                pattern,
            } => self.load_package(target, package, path, pattern.as_deref()),
            Source::Nothing => Ok(()),
        }
    }

    /// Load every recognized file under `root`, deepest first.
    ///
    /// Results are cached against the modification time and size of every
    /// file in the directory, so a repeated load of an unchanged directory
    /// replays recorded assignments without parsing the files again. Any
    /// edited, added or removed file misses the cache.
    pub fn load_directory(
        &mut self,
        target: &mut dyn Layer,
        root: &Path,
    ) -> Result<(), FigtreeError> {
        let mut files: Vec<(usize, PathBuf)> = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| {
                let io = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                FigtreeError::io(root.to_path_buf(), io)
            })?;
            if entry.file_type().is_file() {
                files.push((entry.depth(), entry.path().to_path_buf()));
            }
        }
        // deepest directories first, name order within a level
        files.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut fingerprint = DirFingerprint::with_capacity(files.len());
        for (_, file) in &files {
            let meta =
                std::fs::metadata(file).map_err(|e| FigtreeError::io(file.clone(), e))?;
            let modified = meta
                .modified()
                .map_err(|e| FigtreeError::io(file.clone(), e))?;
            fingerprint.push((file.clone(), modified, meta.len()));
        }

        if let Some(pairs) = self.cache.lookup(root, &fingerprint) {
            debug!(dir = %root.display(), "replaying cached directory load");
            for (key, value) in pairs {
                match value {
                    Value::Tree(tree) => target.merge_branch(key, tree.clone())?,
                    other => target.assign(key, other.clone())?,
                }
            }
            return Ok(());
        }

        let mut recorder = Recorder::new(target);
        for (_, file) in &files {
            let branch = file_branch(root, file);
            load_branch_file(&mut recorder, &branch, file)?;
        }
        let pairs = recorder.into_pairs();
        self.cache.store(root.to_path_buf(), fingerprint, pairs);
        Ok(())
    }

    /// Load files from a registered bundle, walking `path` recursively.
    ///
    /// `pattern` is a file-name glob where `*` matches any run of
    /// characters; non-matching files are skipped. Unknown packages are
    /// skipped with a log line rather than failing the whole load.
    pub fn load_package(
        &mut self,
        target: &mut dyn Layer,
        package: &str,
        path: &str,
        pattern: Option<&str>,
    ) -> Result<(), FigtreeError> {
        let Some(bundle) = self.registry.get(package) else {
            debug!(package, "package not registered, skipping");
            return Ok(());
        };
        let filter = match pattern {
            Some(p) => {
                let regex = p.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
                Some(
                    Regex::new(&format!("^{regex}$"))
                        .map_err(|e| FigtreeError::InvalidSourceType(e.to_string()))?,
                )
            }
            None => None,
        };
        load_bundle_dir(target, bundle, path, "", filter.as_ref())
    }
}

/// Walk one bundle directory, subdirectories before files.
fn load_bundle_dir(
    target: &mut dyn Layer,
    bundle: &dyn ResourceBundle,
    dir: &str,
    branch: &str,
    filter: Option<&Regex>,
) -> Result<(), FigtreeError> {
    let mut names = bundle.list(dir);
    names.sort();
    let joined = |name: &str| {
        if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        }
    };
    for name in names.iter().filter(|n| bundle.is_dir(&joined(n))) {
        load_bundle_dir(target, bundle, &joined(name), &path::join(branch, name), filter)?;
    }
    for name in names.iter().filter(|n| !bundle.is_dir(&joined(n))) {
        if let Some(regex) = filter {
            if !regex.is_match(name) {
                continue;
            }
        }
        let full = joined(name);
        let Some(bytes) = bundle.read(&full) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let (stem, ext) = split_name(name);
        let file_branch = if stem.starts_with('_') {
            branch.to_string()
        } else {
            path::join(branch, stem)
        };
        load_classified(target, &file_branch, stem, ext, &text, &full)?;
    }
    Ok(())
}

/// Dotted branch a file contributes to, relative to the walk root.
fn file_branch(root: &Path, file: &Path) -> String {
    let rel = file.parent().and_then(|p| p.strip_prefix(root).ok());
    let mut branch = String::new();
    if let Some(rel) = rel {
        for part in rel.components() {
            branch = path::join(&branch, &part.as_os_str().to_string_lossy());
        }
    }
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.starts_with('_') {
        branch
    } else {
        path::join(&branch, &stem)
    }
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (name, ""),
    }
}

fn load_branch_file(
    target: &mut dyn Layer,
    branch: &str,
    file: &Path,
) -> Result<(), FigtreeError> {
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text =
        std::fs::read_to_string(file).map_err(|e| FigtreeError::io(file.to_path_buf(), e))?;
    load_classified(target, branch, &stem, &ext, &text, &file.to_string_lossy())
}

/// Route one file's text by extension: documents merge under the branch,
/// raw files become a single string scalar at the branch.
fn load_classified(
    target: &mut dyn Layer,
    branch: &str,
    stem: &str,
    ext: &str,
    text: &str,
    origin: &str,
) -> Result<(), FigtreeError> {
    if stem.starts_with('.') || stem.is_empty() {
        return Ok(());
    }
    if DOCUMENT_EXTENSIONS.contains(&ext) {
        let doc: serde_yaml::Value = serde_yaml::from_str(text).map_err(FigtreeError::Parse)?;
        match doc {
            serde_yaml::Value::Mapping(mapping) => {
                target.merge_branch(branch, Tree::from_mapping(mapping)?)
            }
            serde_yaml::Value::Null => Ok(()),
            other => Err(FigtreeError::InvalidSourceType(format!(
                "{origin}: expected a mapping document, got {other:?}"
            ))),
        }
    } else if ext == RAW_EXTENSION {
        if branch.is_empty() {
            debug!(origin, "raw file with no branch, skipping");
            return Ok(());
        }
        target.assign(branch, Value::from(text))
    } else {
        debug!(origin, ext, "unrecognized extension, skipping");
        Ok(())
    }
}

/// A layer wrapper that records every assignment it forwards.
struct Recorder<'a> {
    inner: &'a mut dyn Layer,
    pairs: Vec<(String, Value)>,
}

impl<'a> Recorder<'a> {
    fn new(inner: &'a mut dyn Layer) -> Self {
        Recorder {
            inner,
            pairs: Vec::new(),
        }
    }

    fn into_pairs(self) -> Vec<(String, Value)> {
        self.pairs
    }
}

impl Layer for Recorder<'_> {
    fn lookup(&self, key: &str) -> Result<Option<Value>, FigtreeError> {
        self.inner.lookup(key)
    }

    fn assign(&mut self, key: &str, value: Value) -> Result<(), FigtreeError> {
        self.pairs.push((key.to_string(), value.clone()));
        self.inner.assign(key, value)
    }

    fn merge_branch(&mut self, branch: &str, tree: Tree) -> Result<(), FigtreeError> {
        self.pairs
            .push((branch.to_string(), Value::Tree(tree.clone())));
        self.inner.merge_branch(branch, tree)
    }

    fn keys(&self, depth: usize) -> Result<Vec<String>, FigtreeError> {
        self.inner.keys(depth)
    }

    fn branch(&self, key: &str) -> Result<Box<dyn Layer>, FigtreeError> {
        self.inner.branch(key)
    }
}
