mod pattern;
mod source;

pub use pattern::*;
pub use source::*;

use crate::error::DownloaderError;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemberOutcome {
    Extracted(PathBuf),
    ExcludedByStrip,
    ExcludedByPattern,
    Unsupported,
}

/// Extract the members of `archive` selected by `pattern` into `destination`,
/// dropping the first `strip` path segments of each.
///
/// Returns how many files and directories were written. Members written
/// before a failure are left in place.
#[tracing::instrument(skip(pattern), fields(pattern = pattern.map(MemberPattern::as_str)))]
pub fn extract_archive(
    archive: &Path,
    destination: &Path,
    pattern: Option<&MemberPattern>,
    strip: usize,
) -> Result<usize, DownloaderError> {
    let mut source = open_archive(archive)?;

    tracing::info!("Extract from: [{}]", archive.display());
    tracing::info!("        into: [{}]", destination.display());

    let extracted = extract_from(source.as_mut(), destination, pattern, strip)?;
    log_summary(extracted, pattern, strip);

    Ok(extracted)
}

pub fn extract_from(
    source: &mut dyn ArchiveSource,
    destination: &Path,
    pattern: Option<&MemberPattern>,
    strip: usize,
) -> Result<usize, DownloaderError> {
    let mut extracted = 0;

    source.for_each_member(&mut |member| {
        let path = member.path.clone();

        match extract_member(member, destination, pattern, strip)? {
            MemberOutcome::Extracted(target) => {
                tracing::debug!("{} -> [{}]", path, target.display());
                extracted += 1;
            }
            MemberOutcome::ExcludedByStrip => {
                tracing::debug!("{} (excluded by --strip-path-components)", path)
            }
            MemberOutcome::ExcludedByPattern => tracing::debug!("{} (excluded by pattern)", path),
            MemberOutcome::Unsupported => {
                tracing::debug!("{} (skipped, not a file or directory)", path)
            }
        }

        Ok(())
    })?;

    Ok(extracted)
}

fn extract_member(
    mut member: ArchiveMember<'_>,
    destination: &Path,
    pattern: Option<&MemberPattern>,
    strip: usize,
) -> Result<MemberOutcome, DownloaderError> {
    let segments = path_segments(&member.path);

    if segments.len() <= strip {
        return Ok(MemberOutcome::ExcludedByStrip);
    }

    if !pattern.is_none_or(|pattern| pattern.matches_segments(&segments)) {
        return Ok(MemberOutcome::ExcludedByPattern);
    }

    if member.path.starts_with('/') || segments.contains(&"..") {
        return Err(DownloaderError::UnsafePath(PathBuf::from(&member.path)));
    }

    let target = segments[strip..]
        .iter()
        .fold(destination.to_path_buf(), |acc, segment| acc.join(segment));

    match member.kind {
        MemberKind::Directory => {
            std::fs::create_dir_all(&target)?;
        }
        MemberKind::File => {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = File::create(&target)?;
            let written = std::io::copy(member.reader(), &mut file)?;
            tracing::trace!("Wrote {} of {} bytes", written, member.size);

            set_mode(&target, member.mode)?;
        }
        MemberKind::Other => return Ok(MemberOutcome::Unsupported),
    }

    Ok(MemberOutcome::Extracted(target))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), DownloaderError> {
    use std::os::unix::fs::PermissionsExt as _;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), DownloaderError> {
    Ok(())
}

fn log_summary(extracted: usize, pattern: Option<&MemberPattern>, strip: usize) {
    match (extracted, pattern, strip) {
        (0, Some(pattern), 1..) => tracing::warn!(
            "No files were extracted. Likely all files were excluded by \"--only={}\" and/or \"--strip-path-components={}\"",
            pattern.as_str(),
            strip
        ),
        (0, Some(pattern), 0) => tracing::warn!(
            "No files were extracted. Likely all files were excluded by the \"--only={}\" filter",
            pattern.as_str()
        ),
        (0, None, 1..) => tracing::warn!(
            "No files were extracted. Likely all files were excluded by \"--strip-path-components={}\"",
            strip
        ),
        (0, None, 0) => tracing::warn!("No files were extracted. Empty archive?"),
        (1, _, _) => tracing::info!("One file extracted"),
        (n, _, _) => tracing::info!("{} files extracted", n),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write as _;
    use zip::write::SimpleFileOptions;

    pub(crate) enum Entry<'a> {
        Dir(&'a str),
        File(&'a str, &'a [u8], u32),
    }

    pub(crate) fn write_tgz(path: &Path, entries: &[Entry<'_>]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for entry in entries {
            let mut header = tar::Header::new_gnu();
            match entry {
                Entry::Dir(name) => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    builder
                        .append_data(&mut header, name, std::io::empty())
                        .unwrap();
                }
                Entry::File(name, content, mode) => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(content.len() as u64);
                    header.set_mode(*mode);
                    builder.append_data(&mut header, name, *content).unwrap();
                }
            }
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, entries: &[Entry<'_>]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());

        for entry in entries {
            match entry {
                Entry::Dir(name) => {
                    writer
                        .add_directory(*name, SimpleFileOptions::default())
                        .unwrap();
                }
                Entry::File(name, content, mode) => {
                    let options = SimpleFileOptions::default().unix_permissions(*mode);
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(content).unwrap();
                }
            }
        }

        writer.finish().unwrap();
    }

    pub(crate) fn sample_entries() -> Vec<Entry<'static>> {
        vec![
            Entry::Dir("mongodb-7.0.1/"),
            Entry::Dir("mongodb-7.0.1/bin/"),
            Entry::File("mongodb-7.0.1/bin/mongod", b"server", 0o755),
            Entry::File("mongodb-7.0.1/bin/mongos", b"router", 0o755),
            Entry::File("mongodb-7.0.1/LICENSE", b"license", 0o644),
        ]
    }

    fn pattern(glob: &str) -> MemberPattern {
        MemberPattern::new(glob).unwrap()
    }

    #[test]
    fn tgz_extracts_everything_without_pattern() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("server.tgz");
        write_tgz(&archive, &sample_entries());
        let out = scratch.path().join("out");

        let count = extract_archive(&archive, &out, None, 0).unwrap();

        assert_eq!(count, 5);
        assert_eq!(
            std::fs::read(out.join("mongodb-7.0.1/bin/mongod")).unwrap(),
            b"server"
        );
        assert!(out.join("mongodb-7.0.1/bin").is_dir());
    }

    #[test]
    fn strip_drops_leading_segments_and_shallow_members() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("server.tgz");
        write_tgz(
            &archive,
            &[
                Entry::Dir("a/"),
                Entry::Dir("a/b/"),
                Entry::File("a/b/c", b"deep", 0o644),
            ],
        );

        let out = scratch.path().join("strip2");
        assert_eq!(extract_archive(&archive, &out, None, 2).unwrap(), 1);
        assert_eq!(std::fs::read(out.join("c")).unwrap(), b"deep");
        assert!(!out.join("a").exists());

        let out = scratch.path().join("strip3");
        assert_eq!(extract_archive(&archive, &out, None, 3).unwrap(), 0);
        assert!(!out.exists());
    }

    #[test]
    fn count_includes_matching_files_and_directories() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("server.tgz");
        write_tgz(&archive, &sample_entries());
        let out = scratch.path().join("out");

        let count = extract_archive(&archive, &out, Some(&pattern("*/bin")), 1).unwrap();

        // bin/ plus its two files; the top-level directory and LICENSE are excluded.
        assert_eq!(count, 3);
        assert!(out.join("bin/mongod").is_file());
        assert!(out.join("bin/mongos").is_file());
        assert!(!out.join("LICENSE").exists());
    }

    #[test]
    fn recursive_pattern_selects_nested_files() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("server.zip");
        write_zip(&archive, &sample_entries());
        let out = scratch.path().join("out");

        let count = extract_archive(&archive, &out, Some(&pattern("**/mongo?")), 2).unwrap();

        assert_eq!(count, 2);
        assert_eq!(std::fs::read(out.join("mongos")).unwrap(), b"router");
    }

    #[test]
    fn anchored_pattern_does_not_recurse() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("server.zip");
        write_zip(&archive, &sample_entries());
        let out = scratch.path().join("out");

        assert_eq!(
            extract_archive(&archive, &out, Some(&pattern("mongod")), 0).unwrap(),
            0
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_modes_are_preserved() {
        use std::os::unix::fs::PermissionsExt as _;

        let scratch = tempfile::tempdir().unwrap();
        for name in ["server.tgz", "server.zip"] {
            let archive = scratch.path().join(name);
            if name.ends_with(".zip") {
                write_zip(&archive, &sample_entries());
            } else {
                write_tgz(&archive, &sample_entries());
            }
            let out = scratch.path().join(format!("out-{name}"));

            extract_archive(&archive, &out, None, 1).unwrap();

            let mode = |p: &str| {
                std::fs::metadata(out.join(p)).unwrap().permissions().mode() & 0o777
            };
            assert_eq!(mode("bin/mongod"), 0o755, "{name}");
            assert_eq!(mode("LICENSE"), 0o644, "{name}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn stored_mode_without_permission_bits_is_kept() {
        use std::os::unix::fs::PermissionsExt as _;

        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("locked.tgz");
        write_tgz(&archive, &[Entry::File("locked", b"secret", 0o000)]);
        let out = scratch.path().join("out");

        assert_eq!(extract_archive(&archive, &out, None, 0).unwrap(), 1);

        let mode = std::fs::metadata(out.join("locked")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o000);
    }

    #[test]
    fn zip_symlinks_are_skipped() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("links.zip");
        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("bin/mongod", SimpleFileOptions::default().unix_permissions(0o755))
            .unwrap();
        writer.write_all(b"server").unwrap();
        writer
            .add_symlink("bin/mongod-latest", "mongod", SimpleFileOptions::default())
            .unwrap();
        writer.finish().unwrap();

        let out = scratch.path().join("out");
        assert_eq!(extract_archive(&archive, &out, None, 0).unwrap(), 1);
        assert!(out.join("bin/mongod").is_file());
        assert!(std::fs::symlink_metadata(out.join("bin/mongod-latest")).is_err());
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("server.tar.xz");
        std::fs::write(&archive, b"not really").unwrap();

        let err = extract_archive(&archive, scratch.path(), None, 0).unwrap_err();
        assert!(matches!(err, DownloaderError::UnsupportedFormat(_)));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("evil.zip");
        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("../escape.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"nope").unwrap();
        writer.finish().unwrap();

        let out = scratch.path().join("out");
        let err = extract_archive(&archive, &out, None, 0).unwrap_err();

        assert!(matches!(err, DownloaderError::UnsafePath(_)));
        assert!(!scratch.path().join("escape.txt").exists());
    }
}
