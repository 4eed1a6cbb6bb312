// src/archive.rs

//! Archive codec glue (tar+gzip, zip) and glob-filtered extraction.
//!
//! Not present in the teacher at all — its archive handling is CAS/delta
//! plumbing for package payloads, not general tar/zip codecs — so this
//! module is new code, grounded on the dependency choices the rest of the
//! retrieval pack makes for the same job: `tar`+`flate2` for tar+gzip
//! (already in the teacher's own `Cargo.toml`, used by its package-format
//! readers) and the `zip` crate for the zip path, the same one
//! `uutils-coreutils`'s manifest reaches for.

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::fs::path::safe_join;
use crate::fs::{FileKind, Filesystem};
use crate::op::ArchiveFormat;
use crate::{Error, Result};

fn io_error(message: impl Into<String>) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, message.into()))
}

fn matches_any(path: &Path, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let as_str = path.to_string_lossy();
    patterns
        .iter()
        .any(|pattern| glob::Pattern::new(pattern).map(|p| p.matches(&as_str)).unwrap_or(false))
}

/// Build an archive of `sources`, read from `fs`, in the given format.
pub fn create(fs: &dyn Filesystem, format: ArchiveFormat, sources: &[PathBuf]) -> Result<Vec<u8>> {
    match format {
        ArchiveFormat::TarGz => create_tar_gz(fs, sources),
        ArchiveFormat::Zip => create_zip(fs, sources),
    }
}

/// Extract `archive_path` (read through `fs`) into `extract_path`,
/// honoring glob `patterns` against archive-internal paths. An empty
/// pattern list extracts everything.
pub fn extract(
    fs: &dyn Filesystem,
    format: ArchiveFormat,
    archive_path: &Path,
    extract_path: &Path,
    patterns: &[String],
) -> Result<Vec<PathBuf>> {
    let bytes = fs.read(archive_path)?;
    match format {
        ArchiveFormat::TarGz => extract_tar_gz(fs, &bytes, extract_path, patterns),
        ArchiveFormat::Zip => extract_zip(fs, &bytes, extract_path, patterns),
    }
}

fn create_tar_gz(fs: &dyn Filesystem, sources: &[PathBuf]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for src in sources {
        append_tar_entry(fs, &mut builder, src)?;
    }
    let encoder = builder
        .into_inner()
        .map_err(|e| io_error(format!("finalizing tar stream: {e}")))?;
    encoder
        .finish()
        .map_err(|e| io_error(format!("finalizing gzip stream: {e}")))
}

fn append_tar_entry<W: Write>(
    fs: &dyn Filesystem,
    builder: &mut tar::Builder<W>,
    path: &Path,
) -> Result<()> {
    let meta = fs
        .stat(path)?
        .ok_or_else(|| io_error(format!("archive source vanished: {}", path.display())))?;
    match meta.kind {
        FileKind::File => {
            let content = fs.read(path)?;
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(meta.mode);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_slice())?;
        }
        FileKind::Directory => {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_mode(meta.mode);
            header.set_cksum();
            builder.append_data(&mut header, path, std::io::empty())?;
            for name in fs.read_dir(path)? {
                append_tar_entry(fs, builder, &path.join(name))?;
            }
        }
        FileKind::Symlink => {
            let target = fs.readlink(path)?;
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            header.set_cksum();
            builder.append_link(&mut header, path, &target)?;
        }
    }
    Ok(())
}

fn extract_tar_gz(
    fs: &dyn Filesystem,
    bytes: &[u8],
    extract_path: &Path,
    patterns: &[String],
) -> Result<Vec<PathBuf>> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if !matches_any(&entry_path, patterns) {
            continue;
        }
        let out_path = safe_join(extract_path, &entry_path)?;
        let mode = entry.header().mode().unwrap_or(0o644);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs.mkdir_all(&out_path, mode)?;
            }
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name()?
                    .ok_or_else(|| io_error("tar symlink entry missing link target"))?
                    .into_owned();
                if let Some(parent) = out_path.parent() {
                    fs.mkdir_all(parent, 0o755)?;
                }
                fs.symlink(&target, &out_path)?;
            }
            _ => {
                let mut content = Vec::new();
                entry.read_to_end(&mut content)?;
                if let Some(parent) = out_path.parent() {
                    fs.mkdir_all(parent, 0o755)?;
                }
                fs.write_file(&out_path, &content, mode)?;
            }
        }
        extracted.push(out_path);
    }
    Ok(extracted)
}

fn create_zip(fs: &dyn Filesystem, sources: &[PathBuf]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut writer = zip::ZipWriter::new(cursor);
        for src in sources {
            append_zip_entry(fs, &mut writer, src)?;
        }
        writer
            .finish()
            .map_err(|e| io_error(format!("finalizing zip stream: {e}")))?;
    }
    Ok(buf)
}

fn append_zip_entry<W: Write + std::io::Seek>(
    fs: &dyn Filesystem,
    writer: &mut zip::ZipWriter<W>,
    path: &Path,
) -> Result<()> {
    let meta = fs
        .stat(path)?
        .ok_or_else(|| io_error(format!("archive source vanished: {}", path.display())))?;
    let name = path.to_string_lossy().to_string();
    match meta.kind {
        FileKind::File => {
            let content = fs.read(path)?;
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(meta.mode);
            writer
                .start_file(&name, options)
                .map_err(|e| io_error(format!("starting zip entry {name}: {e}")))?;
            writer.write_all(&content)?;
        }
        FileKind::Directory => {
            let dir_name = format!("{name}/");
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default().unix_permissions(meta.mode);
            writer
                .add_directory(&dir_name, options)
                .map_err(|e| io_error(format!("starting zip directory {dir_name}: {e}")))?;
            for child in fs.read_dir(path)? {
                append_zip_entry(fs, writer, &path.join(child))?;
            }
        }
        FileKind::Symlink => {
            let target = fs.readlink(path)?;
            let options: zip::write::FileOptions<()> = zip::write::FileOptions::default().unix_permissions(0o777);
            writer
                .add_symlink(&name, target.to_string_lossy(), options)
                .map_err(|e| io_error(format!("starting zip symlink {name}: {e}")))?;
        }
    }
    Ok(())
}

fn extract_zip(
    fs: &dyn Filesystem,
    bytes: &[u8],
    extract_path: &Path,
    patterns: &[String],
) -> Result<Vec<PathBuf>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| io_error(format!("reading zip archive: {e}")))?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| io_error(format!("reading zip entry {i}: {e}")))?;
        let Some(entry_name) = file.enclosed_name() else {
            continue;
        };
        if !matches_any(&entry_name, patterns) {
            continue;
        }
        let out_path = safe_join(extract_path, &entry_name)?;
        let mode = file.unix_mode().unwrap_or(if file.is_dir() { 0o755 } else { 0o644 });

        if file.is_dir() {
            fs.mkdir_all(&out_path, mode)?;
        } else {
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            if let Some(parent) = out_path.parent() {
                fs.mkdir_all(parent, 0o755)?;
            }
            fs.write_file(&out_path, &content, mode)?;
        }
        extracted.push(out_path);
    }
    Ok(extracted)
}
