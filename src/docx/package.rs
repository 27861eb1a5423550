use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, TransplantError};

pub const STYLES_PART: &str = "word/styles.xml";
pub const DOCUMENT_PART: &str = "word/document.xml";

/// Parts every package must carry for the engine to work on it.
pub const MANDATORY_PARTS: [&str; 2] = [STYLES_PART, DOCUMENT_PART];

#[derive(Debug)]
pub struct DocxPackage {
    pub path: PathBuf,
    pub entries: Vec<DocxEntry>,
}

#[derive(Debug)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    /// Opens a package and checks that the style part and the primary content part exist.
    pub fn open(path: &Path) -> Result<Self> {
        let pkg = Self::read(path)?;
        for part in MANDATORY_PARTS {
            if pkg.part(part).is_none() {
                return Err(TransplantError::PartMissing {
                    path: path.to_path_buf(),
                    part: part.to_string(),
                });
            }
        }
        Ok(pkg)
    }

    /// Reads every entry of the archive into memory without checking for mandatory parts.
    pub fn read(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| TransplantError::corrupt(path, e))?;
        let entries = read_entries(f).map_err(|e| TransplantError::corrupt(path, format!("{e:#}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.name == name)
            .map(|e| e.data.as_slice())
    }

    pub fn read_part(&self, name: &str) -> Result<&[u8]> {
        self.part(name).ok_or_else(|| TransplantError::PartMissing {
            path: self.path.clone(),
            part: name.to_string(),
        })
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter(|e| !e.is_dir).map(|e| e.name.as_str())
    }

    /// Writes a new package at `output_path` holding every entry of this one, with the parts
    /// named in `replacements` substituted. The archive is staged in a temporary file next to
    /// `output_path` and renamed into place only once it is complete.
    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<()> {
        let dir = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let staged = tempfile::Builder::new()
            .prefix(".style-transplant-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| TransplantError::io(dir, e))?;

        let staged = self
            .write_entries(staged, replacements)
            .map_err(|e| TransplantError::io(output_path, std::io::Error::other(format!("{e:#}"))))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| TransplantError::io(staged.path(), e))?;
        staged
            .persist(output_path)
            .map_err(|e| TransplantError::io(output_path, e.error))?;
        Ok(())
    }

    fn write_entries<W: Write + Seek>(
        &self,
        sink: W,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<W> {
        let mut zout = ZipWriter::new(sink);
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(&ent.name, opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let known: BTreeSet<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        let mut added: Vec<(&String, &Vec<u8>)> = replacements
            .iter()
            .filter(|(name, _)| !known.contains(name.as_str()))
            .collect();
        added.sort_by(|a, b| a.0.cmp(b.0));
        for (name, data) in added {
            zout.start_file(name, SimpleFileOptions::default())
                .with_context(|| format!("start zip file: {name}"))?;
            zout.write_all(data)
                .with_context(|| format!("write zip file: {name}"))?;
        }
        zout.finish().context("finish zip")
    }
}

fn read_entries<R: Read + Seek>(reader: R) -> anyhow::Result<Vec<DocxEntry>> {
    let mut zip = ZipArchive::new(reader).context("read zip")?;
    let mut entries = Vec::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).context("zip entry")?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .with_context(|| format!("read zip entry: {}", file.name()))?;
        entries.push(DocxEntry {
            name: file.name().to_string(),
            data,
            compression: file.compression(),
            last_modified: file.last_modified().unwrap_or_default(),
            unix_mode: file.unix_mode(),
            is_dir: file.is_dir(),
        });
    }
    Ok(entries)
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PassthroughReport {
    pub checked: usize,
    pub changed: Vec<String>,
    pub missing: Vec<String>,
}

impl PassthroughReport {
    pub fn is_clean(&self) -> bool {
        self.changed.is_empty() && self.missing.is_empty()
    }
}

pub fn part_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checks that every part of `original` other than `modified` reappears in `output` with the
/// same content digest.
pub fn verify_passthrough(original: &Path, output: &Path, modified: &[&str]) -> Result<PassthroughReport> {
    let before = DocxPackage::read(original)?;
    let after = DocxPackage::read(output)?;
    let after_digests: HashMap<&str, String> = after
        .entries
        .iter()
        .filter(|e| !e.is_dir)
        .map(|e| (e.name.as_str(), part_digest(&e.data)))
        .collect();

    let mut report = PassthroughReport::default();
    for ent in before.entries.iter().filter(|e| !e.is_dir) {
        if modified.contains(&ent.name.as_str()) {
            continue;
        }
        report.checked += 1;
        match after_digests.get(ent.name.as_str()) {
            None => report.missing.push(ent.name.clone()),
            Some(d) if *d != part_digest(&ent.data) => report.changed.push(ent.name.clone()),
            Some(_) => {}
        }
    }
    Ok(report)
}


#[cfg(test)]
mod tests {
    use super::test_support::write_zip;
    use super::*;

    fn sample(dir: &Path) -> PathBuf {
        let path = dir.join("in.docx");
        write_zip(
            &path,
            &[
                ("[Content_Types].xml", "<Types/>".as_bytes()),
                (STYLES_PART, "<w:styles/>".as_bytes()),
                (DOCUMENT_PART, "<w:document/>".as_bytes()),
                ("word/media/image1.png", &[0x89u8, 0x50, 0x4e, 0x47, 0, 1, 2][..]),
            ],
        );
        path
    }

    #[test]
    fn open_requires_mandatory_parts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bare.docx");
        write_zip(&path, &[(DOCUMENT_PART, "<w:document/>".as_bytes())]);
        match DocxPackage::open(&path) {
            Err(TransplantError::PartMissing { part, .. }) => assert_eq!(part, STYLES_PART),
            other => panic!("unexpected: {:?}", other.err()),
        }
    }

    #[test]
    fn unopenable_input_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = DocxPackage::open(&dir.path().join("absent.docx")).expect_err("no such file");
        assert!(matches!(err, TransplantError::PackageCorrupt { .. }), "{err}");

        let err = DocxPackage::open(dir.path()).expect_err("a directory is not a package");
        assert!(matches!(err, TransplantError::PackageCorrupt { .. }), "{err}");
    }

    #[test]
    fn open_rejects_non_zip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("junk.docx");
        std::fs::write(&path, b"definitely not a zip").expect("write");
        assert!(matches!(
            DocxPackage::open(&path),
            Err(TransplantError::PackageCorrupt { .. })
        ));
    }

    #[test]
    fn replacements_only_touch_named_parts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = sample(dir.path());
        let output = dir.path().join("out.docx");
        let pkg = DocxPackage::open(&input).expect("open");

        let mut repl = HashMap::new();
        repl.insert(STYLES_PART.to_string(), b"<w:styles>new</w:styles>".to_vec());
        pkg.write_with_replacements(&output, &repl).expect("write");

        let out = DocxPackage::open(&output).expect("reopen");
        assert_eq!(out.read_part(STYLES_PART).expect("styles"), b"<w:styles>new</w:styles>");
        let report = verify_passthrough(&input, &output, &[STYLES_PART]).expect("verify");
        assert!(report.is_clean(), "{report:?}");
        assert_eq!(report.checked, 3);
    }

    #[test]
    fn failed_write_leaves_existing_output_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = sample(dir.path());
        let pkg = DocxPackage::open(&input).expect("open");
        let output = dir.path().join("missing-dir").join("out.docx");
        let err = pkg
            .write_with_replacements(&output, &HashMap::new())
            .expect_err("parent dir does not exist");
        assert!(matches!(err, TransplantError::IoFailure { .. }));
        assert!(!output.exists());
    }
}
