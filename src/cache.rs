//! Metadata Cache
//!
//! Process-wide, read-mostly mapping from skill slug to display metadata,
//! manifest virtual path, and parsed dependency declaration. Rebuilt
//! wholesale after every mutating store or repository operation; the hot
//! prompt/resolver path reads it without touching disk or database.
//!
//! The cache is an explicitly owned object passed by `Arc` to the
//! components that need it — never an implicit global.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::manifest::{self, DependencyDeclaration, SkillSlug, MANIFEST_FILENAME};
use crate::repository::SkillRepository;

/// Cached per-skill metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub slug: SkillSlug,
    pub name: String,
    pub description: String,
    /// Virtual path of the manifest as exposed to the agent
    pub manifest_path: String,
    pub dependencies: DependencyDeclaration,
}

/// Operator-facing skill option (for configurable selection lists)
#[derive(Debug, Clone, Serialize)]
pub struct SkillOption {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Slug order as returned by the repository (most recently updated first)
    order: Vec<String>,
}

/// Read-mostly skill metadata cache with a single-writer rebuild contract
#[derive(Default)]
pub struct MetadataCache {
    state: RwLock<CacheState>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the whole cache from the repository and the skills on disk.
    ///
    /// Dependency declarations are parsed from each skill's manifest here,
    /// once per rebuild, so per-turn resolution never performs I/O. A
    /// manifest that fails to parse keeps its repository metadata and an
    /// empty declaration.
    pub async fn rebuild(&self, repo: &dyn SkillRepository, data_dir: &Path) -> Result<usize> {
        let records = repo.list_all().await?;

        let mut entries = HashMap::with_capacity(records.len());
        let mut order = Vec::with_capacity(records.len());

        for record in records {
            let slug = match SkillSlug::parse(&record.slug) {
                Ok(slug) => slug,
                Err(e) => {
                    warn!("Skipping skill with invalid slug '{}': {}", record.slug, e);
                    continue;
                }
            };

            let manifest_file = data_dir.join(&record.dir_path).join(MANIFEST_FILENAME);
            let dependencies = match std::fs::read_to_string(&manifest_file)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    manifest::parse_manifest(&content).map_err(|e| e.to_string())
                }) {
                Ok(parsed) => parsed.dependencies,
                Err(e) => {
                    warn!(
                        "Manifest unreadable for '{}', using empty dependencies: {}",
                        record.slug, e
                    );
                    DependencyDeclaration::default()
                }
            };

            order.push(record.slug.clone());
            entries.insert(
                record.slug.clone(),
                CacheEntry {
                    manifest_path: slug.manifest_path(),
                    slug,
                    name: record.name,
                    description: record.description,
                    dependencies,
                },
            );
        }

        let count = entries.len();
        *self.state.write() = CacheState { entries, order };
        info!("Rebuilt skill metadata cache with {} entries", count);
        Ok(count)
    }

    pub fn get(&self, slug: &str) -> Option<CacheEntry> {
        self.state.read().entries.get(slug).cloned()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.state.read().entries.contains_key(slug)
    }

    /// Options in repository order, for operator selection UIs
    pub fn options(&self) -> Vec<SkillOption> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|slug| state.entries.get(slug))
            .map(|entry| SkillOption {
                id: entry.slug.to_string(),
                name: entry.name.clone(),
                description: entry.description.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Prompt metadata for the given slugs: deduped, input order, unknown
    /// slugs silently skipped
    pub fn prompt_metadata_for(&self, slugs: &[String]) -> Vec<CacheEntry> {
        let state = self.state.read();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for slug in slugs {
            if !seen.insert(slug.as_str()) {
                continue;
            }
            match state.entries.get(slug.as_str()) {
                Some(entry) => out.push(entry.clone()),
                None => debug!("Skill slug not in cache, skipping prompt metadata: {}", slug),
            }
        }
        out
    }
}
