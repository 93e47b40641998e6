//! Creating and extracting zip and tar archives.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use strum::Display;
use tar::{Archive as TarArchive, Builder as TarBuilder};
use veld_core::PathEntry;
use zip::write::SimpleFileOptions as ZipFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::fs::path_exists;
use crate::operation::OpError;

/// Supported archive formats, inferred from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ArchiveFormat {
    #[strum(serialize = "zip")]
    Zip,
    #[strum(serialize = "tar")]
    Tar,
    #[strum(serialize = "tar.gz")]
    TarGz,
}

impl ArchiveFormat {
    /// Infer the format from `path`'s extension.
    pub fn from_path(path: &Path) -> Result<Self, OpError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Ok(Self::TarGz);
        }

        match path.extension().map(|e| e.to_string_lossy().to_lowercase()) {
            Some(ext) if ext == "zip" => Ok(Self::Zip),
            Some(ext) if ext == "tar" => Ok(Self::Tar),
            Some(ext) => Err(OpError::configuration(format!(
                "Unsupported archive format '.{ext}'"
            ))),
            None => Err(OpError::configuration(
                "Archive path must have an extension (e.g., .zip)",
            )),
        }
    }
}

/// Totals for one archive run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub format: Option<ArchiveFormat>,
    /// Files and directories written.
    pub entries: usize,
    /// Bytes of file content written.
    pub bytes: u64,
    /// Entry names refused because they would land outside the destination.
    pub rejected: Vec<String>,
}

/// Default archive location for a selection: `<stem>.zip` for one entry,
/// `archive.zip` for several.
pub fn default_archive_path(sources: &[PathEntry], dir: &Path) -> PathBuf {
    match sources {
        [single] => {
            let stem = single
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "archive".to_string());
            dir.join(format!("{stem}.zip"))
        }
        _ => dir.join("archive.zip"),
    }
}

/// A file or directory to store, with its name inside the archive.
struct SourceItem {
    path: PathBuf,
    name: String,
    is_dir: bool,
}

/// Write `sources` into a new archive at `target`.
///
/// Each source is stored under its own name; directories are stored
/// recursively. An existing `target` is never overwritten.
pub fn create_archive(sources: &[PathEntry], target: &Path) -> Result<ArchiveSummary, OpError> {
    let format = ArchiveFormat::from_path(target)?;
    if sources.is_empty() {
        return Err(OpError::configuration("Nothing selected to archive"));
    }
    if path_exists(target) {
        return Err(OpError::AlreadyExists {
            path: target.to_path_buf(),
        });
    }

    let mut items = Vec::new();
    for source in sources {
        collect_items(source.path(), Path::new(source.name()), &mut items)
            .map_err(|e| OpError::io(source.path(), e))?;
    }

    tracing::debug!(target = %target.display(), %format, items = items.len(), "Creating archive");
    let file = File::create(target).map_err(|e| OpError::io(target, e))?;
    let result = match format {
        ArchiveFormat::Zip => write_zip(file, &items).map_err(io::Error::other),
        ArchiveFormat::Tar => {
            let mut builder = TarBuilder::new(file);
            write_tar(&mut builder, &items).and_then(|summary| {
                builder.finish()?;
                Ok(summary)
            })
        }
        ArchiveFormat::TarGz => {
            let mut builder = TarBuilder::new(GzEncoder::new(file, Compression::default()));
            write_tar(&mut builder, &items).and_then(|summary| {
                builder.into_inner()?.finish()?;
                Ok(summary)
            })
        }
    };

    match result {
        Ok(mut summary) => {
            summary.format = Some(format);
            Ok(summary)
        }
        Err(e) => {
            // Do not leave a truncated archive behind.
            let _ = fs::remove_file(target);
            Err(OpError::Archive {
                path: target.to_path_buf(),
                message: e.to_string(),
            })
        }
    }
}

/// Unpack `archive` into `destination`, creating it if needed.
///
/// Existing files are overwritten. Entries that would land outside
/// `destination`, by name or through a symlink already on disk, are skipped
/// and listed in [`ArchiveSummary::rejected`].
pub fn extract_archive(archive: &Path, destination: &Path) -> Result<ArchiveSummary, OpError> {
    let format = ArchiveFormat::from_path(archive)?;
    fs::create_dir_all(destination).map_err(|e| OpError::io(destination, e))?;
    let file = File::open(archive).map_err(|e| OpError::io(archive, e))?;

    tracing::debug!(archive = %archive.display(), %format, destination = %destination.display(), "Extracting archive");
    let result = match format {
        ArchiveFormat::Zip => read_zip(file, destination).map_err(io::Error::other),
        ArchiveFormat::Tar => read_tar(TarArchive::new(file), destination),
        ArchiveFormat::TarGz => read_tar(TarArchive::new(GzDecoder::new(file)), destination),
    };

    let mut summary = result.map_err(|e| OpError::Archive {
        path: archive.to_path_buf(),
        message: e.to_string(),
    })?;
    if !summary.rejected.is_empty() {
        tracing::warn!(rejected = ?summary.rejected, "Skipped archive entries outside the destination");
    }
    summary.format = Some(format);
    Ok(summary)
}

fn collect_items(path: &Path, name: &Path, out: &mut Vec<SourceItem>) -> io::Result<()> {
    let is_dir = fs::symlink_metadata(path)?.is_dir();
    out.push(SourceItem {
        path: path.to_path_buf(),
        name: archive_name(name),
        is_dir,
    });
    if is_dir {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            collect_items(&entry.path(), &name.join(entry.file_name()), out)?;
        }
    }
    Ok(())
}

/// Forward-slash name as stored inside an archive.
fn archive_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(v) => Some(v.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn write_zip(file: File, items: &[SourceItem]) -> zip::result::ZipResult<ArchiveSummary> {
    let mut writer = ZipWriter::new(file);
    let options = ZipFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut summary = ArchiveSummary::default();

    for item in items {
        if item.is_dir {
            writer.add_directory(format!("{}/", item.name), options)?;
        } else {
            writer.start_file(item.name.as_str(), options)?;
            let mut src = File::open(&item.path)?;
            summary.bytes += io::copy(&mut src, &mut writer)?;
        }
        summary.entries += 1;
    }

    writer.finish()?;
    Ok(summary)
}

fn write_tar<W: Write>(builder: &mut TarBuilder<W>, items: &[SourceItem]) -> io::Result<ArchiveSummary> {
    let mut summary = ArchiveSummary::default();
    for item in items {
        if item.is_dir {
            builder.append_dir(&item.name, &item.path)?;
        } else {
            let mut src = File::open(&item.path)?;
            summary.bytes += src.metadata()?.len();
            builder.append_file(&item.name, &mut src)?;
        }
        summary.entries += 1;
    }
    Ok(summary)
}

fn read_zip(file: File, destination: &Path) -> zip::result::ZipResult<ArchiveSummary> {
    let mut archive = ZipArchive::new(file)?;
    let mut summary = ArchiveSummary::default();
    let root = fs::canonicalize(destination)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(out) = contained_path(destination, Path::new(entry.name())) else {
            summary.rejected.push(entry.name().to_string());
            continue;
        };
        if out == destination {
            continue;
        }
        if !prepare_output(&root, &out)? {
            summary.rejected.push(entry.name().to_string());
            continue;
        }

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            let mut dest = File::create(&out)?;
            summary.bytes += io::copy(&mut entry, &mut dest)?;
        }
        summary.entries += 1;
    }
    Ok(summary)
}

fn read_tar<R: Read>(mut archive: TarArchive<R>, destination: &Path) -> io::Result<ArchiveSummary> {
    let mut summary = ArchiveSummary::default();
    let root = fs::canonicalize(destination)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.into_owned();
        let rejected = name.to_string_lossy().into_owned();
        let Some(out) = contained_path(destination, &name) else {
            summary.rejected.push(rejected);
            continue;
        };
        if out == destination {
            continue;
        }
        if !prepare_output(&root, &out)? {
            summary.rejected.push(rejected);
            continue;
        }

        // unpack_in also keeps hard link targets inside the destination.
        let size = entry.size();
        if !entry.unpack_in(destination)? {
            summary.rejected.push(rejected);
            continue;
        }
        summary.bytes += size;
        summary.entries += 1;
    }
    Ok(summary)
}

/// Make room for an entry at `out`.
///
/// Returns `false` if the nearest existing ancestor of `out` resolves outside
/// `root` (a canonical path). A symlink already sitting at `out` is removed
/// so the entry replaces it instead of writing through it.
fn prepare_output(root: &Path, out: &Path) -> io::Result<bool> {
    let Some(parent) = out.parent() else {
        return Ok(false);
    };
    let mut existing = parent;
    while !path_exists(existing) {
        match existing.parent() {
            Some(up) => existing = up,
            None => return Ok(false),
        }
    }
    let inside = fs::canonicalize(existing)
        .map(|resolved| resolved.starts_with(root))
        .unwrap_or(false);
    if !inside {
        return Ok(false);
    }

    fs::create_dir_all(parent)?;
    if fs::symlink_metadata(out).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(out)?;
    }
    Ok(true)
}

/// Join an entry name onto `root`, or `None` if it would escape `root`.
fn contained_path(root: &Path, name: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(root.join(clean))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(base: &Path) -> Vec<PathEntry> {
        fs::create_dir_all(base.join("docs/inner")).unwrap();
        fs::write(base.join("docs/a.txt"), "alpha").unwrap();
        fs::write(base.join("docs/inner/b.txt"), "beta").unwrap();
        fs::write(base.join("notes.md"), "# notes").unwrap();
        vec![
            PathEntry::resolve(base.join("docs")).unwrap(),
            PathEntry::resolve(base.join("notes.md")).unwrap(),
        ]
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ArchiveFormat::from_path(Path::new("a.zip")).unwrap(), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::from_path(Path::new("a.TAR")).unwrap(), ArchiveFormat::Tar);
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tar.gz")).unwrap(), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::from_path(Path::new("a.tgz")).unwrap(), ArchiveFormat::TarGz);

        let err = ArchiveFormat::from_path(Path::new("backup")).unwrap_err();
        assert!(matches!(err, OpError::Configuration { .. }));
        assert!(ArchiveFormat::from_path(Path::new("a.rar")).is_err());
    }

    #[test]
    fn test_zip_and_tar_gz_contents_survive_extraction() {
        let temp = tempfile::tempdir().unwrap();
        let sources = sample(&temp.path().join("src"));

        for name in ["out.zip", "out.tar.gz"] {
            let archive = temp.path().join(name);
            let created = create_archive(&sources, &archive).unwrap();
            assert_eq!(created.entries, 5);

            let dest = temp.path().join(format!("x-{name}"));
            let extracted = extract_archive(&archive, &dest).unwrap();
            assert!(extracted.rejected.is_empty());
            assert_eq!(fs::read_to_string(dest.join("docs/inner/b.txt")).unwrap(), "beta");
            assert_eq!(fs::read_to_string(dest.join("notes.md")).unwrap(), "# notes");
        }
    }

    #[test]
    fn test_create_refuses_existing_target() {
        let temp = tempfile::tempdir().unwrap();
        let sources = sample(&temp.path().join("src"));
        let archive = temp.path().join("out.tar");
        fs::write(&archive, "keep").unwrap();

        assert!(create_archive(&sources, &archive).is_err());
        assert_eq!(fs::read_to_string(&archive).unwrap(), "keep");
    }

    #[test]
    fn test_contained_path_blocks_escape() {
        let root = Path::new("/dest");
        assert_eq!(contained_path(root, Path::new("a/./b")), Some(PathBuf::from("/dest/a/b")));
        assert_eq!(contained_path(root, Path::new("../evil")), None);
        assert_eq!(contained_path(root, Path::new("/etc/passwd")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_tar_cannot_write_through_its_own_symlink() {
        use tar::{EntryType, Header};

        let temp = tempfile::tempdir().unwrap();
        let outside = temp.path().join("outside");
        fs::create_dir(&outside).unwrap();

        let archive = temp.path().join("evil.tar");
        let mut builder = TarBuilder::new(File::create(&archive).unwrap());
        let mut link = Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        link.set_link_name(&outside).unwrap();
        builder.append_data(&mut link, "link", io::empty()).unwrap();
        let mut file = Header::new_gnu();
        file.set_size(5);
        file.set_mode(0o644);
        builder
            .append_data(&mut file, "link/pwned.txt", &b"pwned"[..])
            .unwrap();
        builder.finish().unwrap();
        drop(builder);

        let dest = temp.path().join("dest");
        let summary = extract_archive(&archive, &dest).unwrap();

        assert_eq!(summary.rejected, vec!["link/pwned.txt".to_string()]);
        assert!(!outside.join("pwned.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_zip_replaces_symlink_instead_of_following_it() {
        let temp = tempfile::tempdir().unwrap();
        let sources = sample(&temp.path().join("src"));
        let archive = temp.path().join("out.zip");
        create_archive(&sources, &archive).unwrap();

        let victim = temp.path().join("victim.md");
        fs::write(&victim, "keep").unwrap();
        let dest = temp.path().join("dest");
        fs::create_dir(&dest).unwrap();
        std::os::unix::fs::symlink(&victim, dest.join("notes.md")).unwrap();

        extract_archive(&archive, &dest).unwrap();

        assert_eq!(fs::read_to_string(&victim).unwrap(), "keep");
        assert_eq!(fs::read_to_string(dest.join("notes.md")).unwrap(), "# notes");
    }

    #[test]
    fn test_default_archive_path() {
        let one = vec![PathEntry::from_parts("/d/report.pdf", false)];
        assert_eq!(default_archive_path(&one, Path::new("/d")), PathBuf::from("/d/report.zip"));
        let two = vec![
            PathEntry::from_parts("/d/a", false),
            PathEntry::from_parts("/d/b", false),
        ];
        assert_eq!(default_archive_path(&two, Path::new("/d")), PathBuf::from("/d/archive.zip"));
    }
}
