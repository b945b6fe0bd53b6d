use super::relative_path;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Disk-backed store: record text goes to per-path files in a temp scope and
/// is moved under the output root by [`SpillStore::finalize`].
///
/// Appends must arrive in bundle order. The temp scope, and any directories
/// created to hold it, are removed when the store is dropped unfinalized.
pub struct SpillStore {
    scope: TempDir,
    /// relative path → ordinal of the occurrence currently held on disk
    owners: HashMap<PathBuf, u64>,
    /// every ancestor directory of a path in `owners`
    dirs: HashSet<PathBuf>,
    order: Vec<PathBuf>,
    current: Option<(PathBuf, File)>,
    duplicates: u64,
    // dropped after `scope`, so the directories are empty by then
    parents: CreatedDirs,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Placed {
    pub files: usize,
    pub bytes: u64,
}

/// What [`SpillStore::append`] did with a piece of record text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Appended {
    Written,
    /// The path would escape the output root or names nothing.
    Unsafe,
    /// The path needs a file where another record needs a directory (or the reverse).
    Conflict,
}

/// Directories created on behalf of a store; removed again unless kept.
#[derive(Default)]
struct CreatedDirs {
    dirs: Vec<PathBuf>,
    keep: bool,
}

impl Drop for CreatedDirs {
    fn drop(&mut self) {
        if !self.keep {
            for d in self.dirs.iter().rev() {
                let _ = fs::remove_dir(d);
            }
        }
    }
}

impl SpillStore {
    /// Create the temp scope inside `parent`, so the final moves are renames
    /// on the same filesystem. Missing ancestors of `parent` are created and
    /// removed again if the store is never finalized.
    pub fn new_in(parent: &Path) -> io::Result<Self> {
        let mut parents = CreatedDirs::default();
        ensure_dir(parent, &mut parents.dirs)?;
        let scope = tempfile::Builder::new()
            .prefix(".debundle-")
            .tempdir_in(parent)?;
        tracing::debug!(scope = %scope.path().display(), "spill scope created");
        Ok(Self {
            scope,
            owners: HashMap::new(),
            dirs: HashSet::new(),
            order: Vec::new(),
            current: None,
            duplicates: 0,
            parents,
        })
    }

    pub fn scope(&self) -> &Path {
        self.scope.path()
    }

    fn files_root(&self) -> PathBuf {
        self.scope.path().join("files")
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Append `text` to the file of `path`.
    ///
    /// A new `ordinal` for a known path starts that file over (last wins).
    /// Paths that cannot live under an output root, or that clash with the
    /// file/directory shape of earlier paths, are refused and nothing is written.
    pub fn append(&mut self, path: &str, ordinal: u64, text: &str) -> io::Result<Appended> {
        let Some(rel) = relative_path(path) else {
            return Ok(Appended::Unsafe);
        };
        if !self.owners.contains_key(&rel) && self.clashes(&rel) {
            return Ok(Appended::Conflict);
        }

        let reuse = matches!(&self.current, Some((cur, _)) if *cur == rel)
            && self.owners.get(&rel) == Some(&ordinal);
        if !reuse {
            let file = self.open_for(&rel, ordinal)?;
            self.current = Some((rel, file));
        }
        if let Some((_, f)) = self.current.as_mut() {
            f.write_all(text.as_bytes())?;
        }
        Ok(Appended::Written)
    }

    fn clashes(&self, rel: &Path) -> bool {
        self.dirs.contains(rel) || rel.ancestors().skip(1).any(|a| self.owners.contains_key(a))
    }

    fn open_for(&mut self, rel: &Path, ordinal: u64) -> io::Result<File> {
        let full = self.files_root().join(rel);
        match self.owners.get(rel).copied() {
            Some(owner) if owner == ordinal => OpenOptions::new().append(true).open(&full),
            Some(_) => {
                self.duplicates += 1;
                self.owners.insert(rel.to_path_buf(), ordinal);
                tracing::debug!(path = %rel.display(), "duplicate path; later content wins");
                File::create(&full)
            }
            None => {
                if let Some(parent) = full.parent() {
                    fs::create_dir_all(parent)?;
                }
                self.owners.insert(rel.to_path_buf(), ordinal);
                for a in rel.ancestors().skip(1) {
                    if !a.as_os_str().is_empty() {
                        self.dirs.insert(a.to_path_buf());
                    }
                }
                self.order.push(rel.to_path_buf());
                File::create(&full)
            }
        }
    }

    /// Move every spilled file to `output_root/<relative path>`.
    ///
    /// A file already at a target is set aside first. On failure, the moved
    /// files are removed, set-aside files are put back and directories
    /// created here are removed before the error is returned.
    pub fn finalize(mut self, output_root: &Path) -> io::Result<Placed> {
        if let Some((_, f)) = self.current.take() {
            f.sync_all()?;
        }

        let files = self.files_root();
        let displaced_root = self.scope.path().join("displaced");
        let mut created = Vec::new();
        let mut moved = Vec::new();
        let mut displaced = Vec::new();
        let mut placed = Placed::default();
        let result = (|| -> io::Result<()> {
            ensure_dir(output_root, &mut created)?;
            for rel in &self.order {
                let from = files.join(rel);
                let to = output_root.join(rel);
                if let Some(parent) = to.parent() {
                    ensure_dir(parent, &mut created)?;
                }
                if to.symlink_metadata().is_ok_and(|m| m.is_file()) {
                    let aside = displaced_root.join(rel);
                    if let Some(parent) = aside.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    move_file(&to, &aside)?;
                    displaced.push((to.clone(), aside));
                }
                placed.bytes += fs::metadata(&from)?.len();
                move_file(&from, &to)?;
                moved.push(to);
                placed.files += 1;
            }
            Ok(())
        })();

        if let Err(e) = result {
            tracing::warn!(error = %e, moved = moved.len(), "finalize failed; rolling back");
            for f in moved.iter().rev() {
                let _ = fs::remove_file(f);
            }
            for (original, aside) in displaced.iter().rev() {
                if let Err(err) = move_file(aside, original) {
                    tracing::warn!(path = %original.display(), error = %err, "cannot restore file");
                }
            }
            for d in created.iter().rev() {
                let _ = fs::remove_dir(d);
            }
            return Err(e);
        }

        self.parents.keep = true;
        self.scope.close()?;
        Ok(placed)
    }
}

/// `create_dir_all`, remembering which directories did not exist before (outermost first).
fn ensure_dir(dir: &Path, created: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut missing = Vec::new();
    let mut cur = Some(dir);
    while let Some(d) = cur {
        if d.as_os_str().is_empty() || d.exists() {
            break;
        }
        missing.push(d.to_path_buf());
        cur = d.parent();
    }
    fs::create_dir_all(dir)?;
    created.extend(missing.into_iter().rev());
    Ok(())
}

/// Rename; copy + remove only when the rename crosses filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_finalizes_into_tree() {
        let work = tempfile::tempdir().unwrap();
        let out = work.path().join("out");
        let mut store = SpillStore::new_in(work.path()).unwrap();
        assert_eq!(store.append("/project_root/src/a.rs", 0, "fn a() {}\n").unwrap(), Appended::Written);
        assert_eq!(store.append("/project_root/src/a.rs", 0, "// more\n").unwrap(), Appended::Written);
        assert_eq!(store.append("/project_root/b.txt", 1, "").unwrap(), Appended::Written);
        let scope = store.scope().to_path_buf();
        assert!(scope.starts_with(work.path()));

        let placed = store.finalize(&out).unwrap();
        assert_eq!(placed, Placed { files: 2, bytes: 18 });
        assert_eq!(
            fs::read_to_string(out.join("project_root/src/a.rs")).unwrap(),
            "fn a() {}\n// more\n"
        );
        assert_eq!(fs::read(out.join("project_root/b.txt")).unwrap(), b"");
        assert!(!scope.exists());
    }

    #[test]
    fn later_occurrence_replaces_file() {
        let work = tempfile::tempdir().unwrap();
        let mut store = SpillStore::new_in(work.path()).unwrap();
        store.append("/a", 0, "first\n").unwrap();
        store.append("/b", 1, "b\n").unwrap();
        store.append("/a", 2, "second").unwrap();
        store.append("/a", 2, " part\n").unwrap();
        assert_eq!(store.duplicates(), 1);
        assert_eq!(store.len(), 2);
        let out = work.path().join("out");
        store.finalize(&out).unwrap();
        assert_eq!(fs::read_to_string(out.join("a")).unwrap(), "second part\n");
    }

    #[test]
    fn unsafe_paths_are_refused() {
        let work = tempfile::tempdir().unwrap();
        let mut store = SpillStore::new_in(work.path()).unwrap();
        assert_eq!(store.append("/../escape", 0, "x").unwrap(), Appended::Unsafe);
        assert!(store.is_empty());
    }

    #[test]
    fn dropping_removes_scope() {
        let work = tempfile::tempdir().unwrap();
        let mut store = SpillStore::new_in(work.path()).unwrap();
        store.append("/a", 0, "x").unwrap();
        let scope = store.scope().to_path_buf();
        drop(store);
        assert!(!scope.exists());
        assert!(!work.path().join("a").exists());
    }

    #[test]
    fn failed_finalize_rolls_back() {
        let work = tempfile::tempdir().unwrap();
        let out = work.path().join("out");
        fs::create_dir_all(&out).unwrap();
        // "blocker" is a file, so "blocker/x" cannot be created
        fs::write(out.join("blocker"), "keep").unwrap();
        let mut store = SpillStore::new_in(work.path()).unwrap();
        store.append("/fresh/one", 0, "1").unwrap();
        store.append("/blocker/x", 1, "2").unwrap();
        assert!(store.finalize(&out).is_err());
        assert!(!out.join("fresh").exists());
        assert_eq!(fs::read_to_string(out.join("blocker")).unwrap(), "keep");
    }

    #[test]
    fn failed_finalize_restores_files_it_replaced() {
        let work = tempfile::tempdir().unwrap();
        let out = work.path().join("out");
        fs::create_dir_all(out.join("project_root")).unwrap();
        fs::write(out.join("project_root/a.txt"), "precious").unwrap();
        fs::write(out.join("project_root/blocker"), "keep").unwrap();
        let mut store = SpillStore::new_in(work.path()).unwrap();
        store.append("/project_root/a.txt", 0, "new").unwrap();
        store.append("/project_root/blocker/x", 1, "2").unwrap();
        assert!(store.finalize(&out).is_err());
        assert_eq!(
            fs::read_to_string(out.join("project_root/a.txt")).unwrap(),
            "precious"
        );
        assert_eq!(fs::read_to_string(out.join("project_root/blocker")).unwrap(), "keep");
    }

    #[test]
    fn successful_finalize_replaces_existing_files() {
        let work = tempfile::tempdir().unwrap();
        let out = work.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("a.txt"), "old").unwrap();
        let mut store = SpillStore::new_in(work.path()).unwrap();
        store.append("/a.txt", 0, "new").unwrap();
        store.finalize(&out).unwrap();
        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "new");
    }

    #[test]
    fn file_and_directory_clash_is_refused() {
        let work = tempfile::tempdir().unwrap();
        let mut store = SpillStore::new_in(work.path()).unwrap();
        assert_eq!(store.append("/p/a", 0, "1").unwrap(), Appended::Written);
        assert_eq!(store.append("/p/a/b", 1, "2").unwrap(), Appended::Conflict);
        assert_eq!(store.append("/q/x/y", 2, "3").unwrap(), Appended::Written);
        assert_eq!(store.append("/q/x", 3, "4").unwrap(), Appended::Conflict);
        // a later occurrence of a placed path is not a clash
        assert_eq!(store.append("/p/a", 4, "5").unwrap(), Appended::Written);
        let out = work.path().join("out");
        let placed = store.finalize(&out).unwrap();
        assert_eq!(placed.files, 2);
        assert_eq!(fs::read_to_string(out.join("p/a")).unwrap(), "5");
    }

    #[test]
    fn dropping_removes_created_parents() {
        let work = tempfile::tempdir().unwrap();
        let parent = work.path().join("new").join("deeper");
        let mut store = SpillStore::new_in(&parent).unwrap();
        store.append("/a", 0, "x").unwrap();
        drop(store);
        assert!(!work.path().join("new").exists());
    }

    #[test]
    fn finalize_keeps_created_parents() {
        let work = tempfile::tempdir().unwrap();
        let parent = work.path().join("new");
        let mut store = SpillStore::new_in(&parent).unwrap();
        store.append("/a", 0, "x").unwrap();
        store.finalize(&parent.join("out")).unwrap();
        assert_eq!(fs::read_to_string(parent.join("out/a")).unwrap(), "x");
    }
}
