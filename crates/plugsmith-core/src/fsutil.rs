//! Directory walking and copying helpers shared by the compiler, packager
//! and installer. Everything here is blocking; async callers go through
//! `spawn_blocking`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// One entry of a sorted directory walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Path relative to the walk root
    pub relative: PathBuf,
    pub absolute: PathBuf,
    pub is_dir: bool,
}

/// Walk `root` depth-first, visiting the children of each directory in
/// byte order of their names. `keep` sees every entry before it is
/// yielded; returning false for a directory prunes the whole subtree.
/// Symlinks are not followed.
pub fn walk_sorted<F>(root: &Path, keep: F) -> io::Result<Vec<WalkEntry>>
where
    F: Fn(&Path, bool) -> bool,
{
    let mut entries = Vec::new();
    walk_into(root, Path::new(""), &keep, &mut entries)?;
    Ok(entries)
}

fn walk_into<F>(dir: &Path, prefix: &Path, keep: &F, out: &mut Vec<WalkEntry>) -> io::Result<()>
where
    F: Fn(&Path, bool) -> bool,
{
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let file_type = child.file_type()?;
        if file_type.is_symlink() {
            continue;
        }

        let relative = prefix.join(child.file_name());
        let is_dir = file_type.is_dir();
        if !keep(&relative, is_dir) {
            continue;
        }

        let absolute = child.path();
        out.push(WalkEntry {
            relative: relative.clone(),
            absolute: absolute.clone(),
            is_dir,
        });
        if is_dir {
            walk_into(&absolute, &relative, keep, out)?;
        }
    }
    Ok(())
}

/// Copy `src` into `dst` recursively, skipping files whose name matches
/// `skip_file`. Returns the number of files copied.
pub fn copy_dir_filtered<F>(src: &Path, dst: &Path, skip_file: F) -> io::Result<usize>
where
    F: Fn(&str) -> bool,
{
    fs::create_dir_all(dst)?;
    let entries = walk_sorted(src, |relative, is_dir| {
        is_dir || !file_name_of(relative).is_some_and(&skip_file)
    })?;

    let mut copied = 0;
    for entry in entries {
        let target = dst.join(&entry.relative);
        if entry.is_dir {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(&entry.absolute, &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Relative path rendered with `/` separators, as stored in zip archives
pub fn archive_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative).unwrap();
    }

    #[test]
    fn test_walk_sorted_is_depth_first_and_ordered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.txt");
        touch(dir.path(), "a/z.txt");
        touch(dir.path(), "a/c.txt");

        let names: Vec<String> = walk_sorted(dir.path(), |_, _| true)
            .unwrap()
            .into_iter()
            .map(|e| archive_path(&e.relative))
            .collect();

        assert_eq!(names, vec!["a", "a/c.txt", "a/z.txt", "b.txt"]);
    }

    #[test]
    fn test_walk_prunes_rejected_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "node_modules/x/index.js");
        touch(dir.path(), "index.ts");

        let entries = walk_sorted(dir.path(), |rel, is_dir| {
            !(is_dir && rel.ends_with("node_modules"))
        })
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative, PathBuf::from("index.ts"));
    }

    #[test]
    fn test_copy_dir_filtered_skips_matching_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        touch(src.path(), "widget.ts");
        touch(src.path(), "types.d.ts");
        touch(src.path(), "nested/style.css");

        let copied = copy_dir_filtered(src.path(), &dst.path().join("out"), |name| {
            name.ends_with(".ts") && !name.ends_with(".d.ts")
        })
        .unwrap();

        assert_eq!(copied, 2);
        assert!(dst.path().join("out/types.d.ts").exists());
        assert!(dst.path().join("out/nested/style.css").exists());
        assert!(!dst.path().join("out/widget.ts").exists());
    }

    #[test]
    fn test_archive_path_uses_forward_slashes() {
        let path: PathBuf = ["assets", "icons", "a.png"].iter().collect();
        assert_eq!(archive_path(&path), "assets/icons/a.png");
    }
}
