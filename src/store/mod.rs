//! Skill Content Store
//!
//! Sandboxed filesystem operations on skill directories: zip import and
//! export, node read/write/create/delete, tree listing, and trash-first
//! delete with rollback. Every destructive sequence is all-or-nothing —
//! a failure after the first destructive write removes the partial state
//! before the error propagates.
//!
//! Publishing an import is atomic: content is staged privately, moved
//! under a hidden temporary name inside the skills root, then renamed to
//! the final slug directory, so concurrent imports cannot collide on one
//! final name.

pub mod paths;

use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::cache::MetadataCache;
use crate::error::{Result, SkillError};
use crate::manifest::{self, SkillSlug, MANIFEST_FILENAME};
use crate::repository::{SkillRecord, SkillRepository};
use paths::{is_text_path, resolve_path};

/// One node in a skill directory tree
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    /// POSIX-style path relative to the skill root
    pub path: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

/// Text file content keyed by its normalized relative path
#[derive(Debug, Clone, Serialize)]
pub struct NodeContent {
    pub path: String,
    pub content: String,
}

/// Sandboxed store over the skills root directory
pub struct SkillStore {
    data_dir: PathBuf,
    skills_root: PathBuf,
    repo: Arc<dyn SkillRepository>,
    cache: Arc<MetadataCache>,
}

impl SkillStore {
    /// Create the store, ensuring the skills root exists
    pub fn new(
        data_dir: impl Into<PathBuf>,
        repo: Arc<dyn SkillRepository>,
        cache: Arc<MetadataCache>,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        let skills_root = data_dir.join("skills");
        fs::create_dir_all(&skills_root)?;
        Ok(Self {
            data_dir,
            skills_root,
            repo,
            cache,
        })
    }

    pub fn skills_root(&self) -> &Path {
        &self.skills_root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Find a slug that is free in both the repository and the filesystem.
    /// Taken names are probed as `base-v2`, `base-v3`, ... — no UUIDs, so
    /// names stay human-readable.
    pub async fn allocate_slug(&self, base: &SkillSlug) -> Result<SkillSlug> {
        if !self.repo.exists_slug(base.as_str()).await?
            && !self.skills_root.join(base.as_str()).exists()
        {
            return Ok(base.clone());
        }

        let mut idx: u32 = 2;
        loop {
            let candidate = format!("{}-v{}", base.as_str(), idx);
            if !self.repo.exists_slug(&candidate).await?
                && !self.skills_root.join(&candidate).exists()
            {
                return SkillSlug::parse(&candidate);
            }
            idx += 1;
        }
    }

    /// Import a skill from zip bytes.
    ///
    /// The archive must contain exactly one `SKILL.md`; its directory
    /// becomes the skill root. Entry paths are validated before anything
    /// is extracted. The final directory appears atomically under the
    /// skills root or not at all.
    pub async fn import(&self, zip_bytes: &[u8], created_by: Option<&str>) -> Result<SkillRecord> {
        // Private scratch area next to the skills root so the publish below
        // is a same-filesystem rename.
        let scratch = tempfile::Builder::new()
            .prefix(".skill-import-")
            .tempdir_in(&self.data_dir)?;
        let extract_dir = scratch.path().join("extract");
        fs::create_dir_all(&extract_dir)?;

        let mut archive = ZipArchive::new(Cursor::new(zip_bytes))
            .map_err(|e| SkillError::validation(format!("not a valid zip archive: {}", e)))?;
        validate_zip_entry_paths(&archive)?;
        archive.extract(&extract_dir)?;

        let manifests: Vec<PathBuf> = WalkDir::new(&extract_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == MANIFEST_FILENAME)
            .map(|e| e.into_path())
            .collect();
        if manifests.len() != 1 {
            return Err(SkillError::validation(
                "archive must contain exactly one skill (exactly one SKILL.md)",
            ));
        }

        let manifest_file = &manifests[0];
        let source_dir = manifest_file
            .parent()
            .ok_or_else(|| SkillError::validation("SKILL.md has no containing directory"))?
            .to_path_buf();

        let mut content = fs::read_to_string(manifest_file)
            .map_err(|_| SkillError::validation("SKILL.md must be UTF-8 text"))?;
        let parsed = manifest::parse_manifest(&content)?;

        let final_slug = self.allocate_slug(&parsed.name).await?;
        if final_slug != parsed.name {
            debug!(
                "Slug '{}' taken, importing as '{}'",
                parsed.name, final_slug
            );
            content = manifest::rewrite_frontmatter_name(&content, final_slug.as_str())?;
            fs::write(manifest_file, &content)?;
        }

        // Hidden temporary name inside the skills root, then atomic rename.
        let temp_target = self
            .skills_root
            .join(format!(".{}.tmp-{}", final_slug, short_id()));
        if temp_target.exists() {
            fs::remove_dir_all(&temp_target)?;
        }
        fs::rename(&source_dir, &temp_target)?;

        let final_dir = self.skills_root.join(final_slug.as_str());
        if final_dir.exists() {
            let _ = fs::remove_dir_all(&temp_target);
            return Err(SkillError::Conflict(format!(
                "skill directory '{}' already exists, retry the import",
                final_slug
            )));
        }
        if let Err(e) = fs::rename(&temp_target, &final_dir) {
            let _ = fs::remove_dir_all(&temp_target);
            return Err(e.into());
        }

        let dir_path = format!("skills/{}", final_slug);
        let record = match self
            .repo
            .create(
                final_slug.as_str(),
                final_slug.as_str(),
                &parsed.description,
                &dir_path,
                created_by,
            )
            .await
        {
            Ok(record) => record,
            Err(e) => {
                // Published directory must not outlive a failed record
                let _ = fs::remove_dir_all(&final_dir);
                return Err(e);
            }
        };

        info!("Imported skill '{}'", final_slug);
        self.rebuild_cache().await;
        Ok(record)
    }

    /// Export a skill directory as a zip rooted at `<slug>/...`, written to
    /// a private temporary file. The caller owns cleanup of the returned
    /// path.
    pub async fn export(&self, slug: &str) -> Result<(PathBuf, String)> {
        let record = self.get_or_err(slug).await?;
        let skill_dir = self.resolve_skill_dir(&record);
        if !skill_dir.is_dir() {
            return Err(SkillError::not_found(format!(
                "skill directory {}",
                record.dir_path
            )));
        }

        let tmp = tempfile::Builder::new()
            .prefix(&format!("skill-{}-", slug))
            .suffix(".zip")
            .tempfile()?;

        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(tmp.reopen()?);
        let result: Result<()> = (|| {
            for entry in WalkDir::new(&skill_dir).min_depth(1) {
                let entry = entry.map_err(|e| SkillError::Io(e.into()))?;
                let rel = entry
                    .path()
                    .strip_prefix(&skill_dir)
                    .map_err(|_| SkillError::path_violation(entry.path()))?;
                let arcname = format!("{}/{}", slug, posix(rel));
                if entry.file_type().is_dir() {
                    writer.add_directory(arcname, options)?;
                } else {
                    writer.start_file(arcname, options)?;
                    let mut file = fs::File::open(entry.path())?;
                    std::io::copy(&mut file, &mut writer)?;
                }
            }
            writer.finish()?;
            Ok(())
        })();
        result?;

        let (_file, path) = tmp.keep().map_err(|e| SkillError::Io(e.error))?;
        Ok((path, format!("{}.zip", slug)))
    }

    /// Read a text file inside a skill directory
    pub async fn read_file(&self, slug: &str, relative_path: &str) -> Result<NodeContent> {
        let record = self.get_or_err(slug).await?;
        let skill_dir = self.resolve_skill_dir(&record);
        let (target, rel) = resolve_path(&skill_dir, relative_path, false)?;

        if !target.is_file() {
            return Err(SkillError::not_found(format!("file '{}'", relative_path)));
        }
        if !is_text_path(&target) {
            return Err(SkillError::validation("only text files can be read"));
        }

        let bytes = fs::read(&target)?;
        let content = String::from_utf8(bytes)
            .map_err(|_| SkillError::validation("file is not UTF-8 text"))?;
        Ok(NodeContent { path: rel, content })
    }

    /// Create a file or directory inside a skill directory
    pub async fn create_node(
        &self,
        slug: &str,
        relative_path: &str,
        is_dir: bool,
        content: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<()> {
        let record = self.get_or_err(slug).await?;
        let skill_dir = self.resolve_skill_dir(&record);
        let (target, _) = resolve_path(&skill_dir, relative_path, false)?;

        if target.exists() {
            return Err(SkillError::Conflict("target already exists".to_string()));
        }

        if is_dir {
            fs::create_dir_all(&target)?;
            return Ok(());
        }

        if !is_text_path(&target) {
            return Err(SkillError::validation("only text files can be created"));
        }

        let content = content.unwrap_or_default();
        let manifest_meta = self.parse_root_manifest(&record, &skill_dir, &target, content)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;

        if let Some((name, description)) = manifest_meta {
            self.sync_manifest_metadata(&record, &name, &description, updated_by)
                .await?;
        }
        Ok(())
    }

    /// Overwrite an existing text file inside a skill directory
    pub async fn update_file(
        &self,
        slug: &str,
        relative_path: &str,
        content: &str,
        updated_by: Option<&str>,
    ) -> Result<()> {
        let record = self.get_or_err(slug).await?;
        let skill_dir = self.resolve_skill_dir(&record);
        let (target, _) = resolve_path(&skill_dir, relative_path, false)?;

        if !target.is_file() {
            return Err(SkillError::not_found(format!("file '{}'", relative_path)));
        }
        if !is_text_path(&target) {
            return Err(SkillError::validation("only text files can be edited"));
        }

        let manifest_meta = self.parse_root_manifest(&record, &skill_dir, &target, content)?;

        fs::write(&target, content)?;

        if let Some((name, description)) = manifest_meta {
            self.sync_manifest_metadata(&record, &name, &description, updated_by)
                .await?;
        }
        Ok(())
    }

    /// Delete a file or directory inside a skill directory. The root
    /// manifest can never be deleted.
    pub async fn delete_node(&self, slug: &str, relative_path: &str) -> Result<()> {
        let record = self.get_or_err(slug).await?;
        let skill_dir = self.resolve_skill_dir(&record);
        let (target, rel) = resolve_path(&skill_dir, relative_path, false)?;

        if !target.exists() {
            return Err(SkillError::not_found(format!("node '{}'", relative_path)));
        }
        if rel == MANIFEST_FILENAME {
            return Err(SkillError::validation(
                "the root SKILL.md cannot be deleted",
            ));
        }

        if target.is_dir() {
            fs::remove_dir_all(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        Ok(())
    }

    /// Recursive directory listing: directories first, then case-insensitive
    /// name order, POSIX-style relative paths throughout
    pub async fn tree(&self, slug: &str) -> Result<Vec<TreeNode>> {
        let record = self.get_or_err(slug).await?;
        let skill_dir = self.resolve_skill_dir(&record);
        if !skill_dir.is_dir() {
            return Err(SkillError::not_found(format!(
                "skill directory {}",
                record.dir_path
            )));
        }
        build_tree(&skill_dir, &skill_dir)
    }

    /// Delete a skill: rename its directory to a trash name, delete the
    /// persisted record, then purge the trash best-effort. If persistence
    /// fails, the directory is restored exactly as it was.
    pub async fn delete(&self, slug: &str) -> Result<()> {
        let record = self.get_or_err(slug).await?;
        let skill_dir = self.resolve_skill_dir(&record);

        let mut trash_dir: Option<PathBuf> = None;
        if skill_dir.exists() {
            let trash = skill_dir.with_file_name(format!(".deleted-{}-{}", slug, short_id()));
            fs::rename(&skill_dir, &trash)?;
            trash_dir = Some(trash);
        }

        if let Err(e) = self.repo.delete(slug).await {
            if let Some(trash) = &trash_dir {
                if trash.exists() {
                    let _ = fs::rename(trash, &skill_dir);
                }
            }
            return Err(e);
        }

        if let Some(trash) = trash_dir {
            if trash.exists() {
                // Purge is best-effort; the record is already gone
                if let Err(e) = fs::remove_dir_all(&trash) {
                    warn!("Failed to purge trash for '{}': {}", slug, e);
                }
            }
        }

        info!("Deleted skill '{}'", slug);
        self.rebuild_cache().await;
        Ok(())
    }

    /// Fetch a record or fail with `NotFound`
    pub async fn get_or_err(&self, slug: &str) -> Result<SkillRecord> {
        self.repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| SkillError::not_found(format!("skill '{}'", slug)))
    }

    fn resolve_skill_dir(&self, record: &SkillRecord) -> PathBuf {
        let dir = Path::new(&record.dir_path);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.data_dir.join(dir)
        }
    }

    /// If `target` is the root manifest, parse `content` and require its
    /// name to match the skill slug. Returns the parsed (name, description)
    /// when a metadata sync is needed.
    fn parse_root_manifest(
        &self,
        record: &SkillRecord,
        skill_dir: &Path,
        target: &Path,
        content: &str,
    ) -> Result<Option<(String, String)>> {
        let is_root_manifest = target.file_name().map(|n| n == MANIFEST_FILENAME).unwrap_or(false)
            && target.parent().map(|p| paths_equal(p, skill_dir)).unwrap_or(false);
        if !is_root_manifest {
            return Ok(None);
        }

        let parsed = manifest::parse_manifest(content)?;
        if parsed.name.as_str() != record.slug {
            return Err(SkillError::validation(
                "SKILL.md frontmatter name must match the skill slug",
            ));
        }
        Ok(Some((parsed.name.to_string(), parsed.description)))
    }

    async fn sync_manifest_metadata(
        &self,
        record: &SkillRecord,
        name: &str,
        description: &str,
        updated_by: Option<&str>,
    ) -> Result<()> {
        self.repo
            .update_metadata(&record.slug, name, description, updated_by)
            .await?;
        self.rebuild_cache().await;
        Ok(())
    }

    /// Wholesale cache rebuild; failures degrade (stale cache) but never
    /// fail the mutation that triggered them
    async fn rebuild_cache(&self) {
        if let Err(e) = self.cache.rebuild(self.repo.as_ref(), &self.data_dir).await {
            warn!("Metadata cache rebuild failed: {}", e);
        }
    }
}

/// Reject absolute entry paths and parent-traversal segments before
/// anything is extracted
fn validate_zip_entry_paths<R: std::io::Read + std::io::Seek>(
    archive: &ZipArchive<R>,
) -> Result<()> {
    for name in archive.file_names() {
        let normalized = name.replace('\\', "/");
        if normalized.starts_with('/') {
            return Err(SkillError::validation(format!(
                "archive contains an absolute path: {}",
                name
            )));
        }
        if normalized.split('/').any(|segment| segment == "..") {
            return Err(SkillError::validation(format!(
                "archive contains a parent-traversal segment: {}",
                name
            )));
        }
    }
    Ok(())
}

fn build_tree(path: &Path, base_dir: &Path) -> Result<Vec<TreeNode>> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(path)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| {
        let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
        (!is_dir, e.file_name().to_string_lossy().to_lowercase())
    });

    let mut children = Vec::with_capacity(entries.len());
    for entry in entries {
        let child = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let rel = child
            .strip_prefix(base_dir)
            .map(posix)
            .map_err(|_| SkillError::path_violation(&child))?;
        if entry.file_type()?.is_dir() {
            children.push(TreeNode {
                name,
                path: rel,
                is_dir: true,
                children: build_tree(&child, base_dir)?,
            });
        } else {
            children.push(TreeNode {
                name,
                path: rel,
                is_dir: false,
                children: Vec::new(),
            });
        }
    }
    Ok(children)
}

fn posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
