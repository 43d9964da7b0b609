//! Routing Backend
//!
//! Dispatches file-capability calls by path prefix: anything under
//! `/skills/` goes to a read-only view scoped to the turn's visible skills;
//! everything else goes to the default read/write session-storage backend.
//! Write attempts under `/skills/` are rejected by the read-only backend
//! itself, never silently redirected.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Result, SkillError};
use crate::manifest::SkillSlug;
use crate::store::SkillStore;

/// File capability surface exposed to the agent's tools
#[async_trait]
pub trait FileBackend: Send + Sync {
    async fn read(&self, path: &str) -> Result<String>;
    async fn write(&self, path: &str, content: &str) -> Result<()>;
    /// Paths available under `path` (non-recursive for directories)
    async fn list(&self, path: &str) -> Result<Vec<String>>;
}

/// Default read/write session storage: an in-memory, per-turn key/value
/// space addressed by absolute-looking paths
#[derive(Default)]
pub struct StateBackend {
    files: RwLock<HashMap<String, String>>,
}

impl StateBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileBackend for StateBackend {
    async fn read(&self, path: &str) -> Result<String> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| SkillError::not_found(format!("file '{}'", path)))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.files
            .write()
            .await
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let files = self.files.read().await;
        let mut paths: Vec<String> = files
            .keys()
            .filter(|k| k.starts_with(path))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}

/// Read-only view over skill content, scoped to the turn's visible slugs.
/// Skills outside the visible set are indistinguishable from missing ones.
pub struct SkillsReadonlyBackend {
    store: Arc<SkillStore>,
    visible: Vec<SkillSlug>,
}

impl SkillsReadonlyBackend {
    pub fn new(store: Arc<SkillStore>, visible: Vec<SkillSlug>) -> Self {
        Self { store, visible }
    }

    fn split(&self, path: &str) -> Result<(String, String)> {
        let rest = path
            .strip_prefix("/skills/")
            .ok_or_else(|| SkillError::not_found(format!("path '{}'", path)))?;
        let (slug, rel) = match rest.split_once('/') {
            Some((slug, rel)) => (slug.to_string(), rel.to_string()),
            None => (rest.to_string(), String::new()),
        };
        if slug.is_empty() {
            return Err(SkillError::not_found(format!("path '{}'", path)));
        }
        if !self.visible.iter().any(|s| s.as_str() == slug) {
            return Err(SkillError::not_found(format!("path '{}'", path)));
        }
        Ok((slug, rel))
    }
}

#[async_trait]
impl FileBackend for SkillsReadonlyBackend {
    async fn read(&self, path: &str) -> Result<String> {
        let (slug, rel) = self.split(path)?;
        if rel.is_empty() {
            return Err(SkillError::validation("cannot read a directory"));
        }
        let node = self.store.read_file(&slug, &rel).await?;
        Ok(node.content)
    }

    async fn write(&self, path: &str, _content: &str) -> Result<()> {
        Err(SkillError::validation(format!(
            "'{}' is read-only: skill content cannot be modified from a session",
            path
        )))
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        if path == "/skills" || path == "/skills/" {
            return Ok(self
                .visible
                .iter()
                .map(|slug| format!("/skills/{}/", slug))
                .collect());
        }

        let (slug, rel) = self.split(path)?;
        let tree = self.store.tree(&slug).await?;
        let mut out = Vec::new();
        collect_paths(&tree, &slug, &rel, &mut out);
        Ok(out)
    }
}

fn collect_paths(nodes: &[crate::store::TreeNode], slug: &str, under: &str, out: &mut Vec<String>) {
    for node in nodes {
        let in_scope = under.is_empty()
            || node.path == under
            || node.path.starts_with(&format!("{}/", under));
        if in_scope {
            let suffix = if node.is_dir { "/" } else { "" };
            out.push(format!("/skills/{}/{}{}", slug, node.path, suffix));
        }
        collect_paths(&node.children, slug, under, out);
    }
}

/// Prefix router over backends: first matching route wins, otherwise the
/// default backend handles the call
pub struct CompositeBackend {
    default: Arc<dyn FileBackend>,
    routes: Vec<(String, Arc<dyn FileBackend>)>,
}

impl CompositeBackend {
    pub fn new(default: Arc<dyn FileBackend>) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    pub fn route(mut self, prefix: impl Into<String>, backend: Arc<dyn FileBackend>) -> Self {
        self.routes.push((prefix.into(), backend));
        self
    }

    /// Build the standard per-turn composite: session state plus the
    /// read-only `/skills/` view for the given visible set
    pub fn for_turn(store: Arc<SkillStore>, visible: Vec<SkillSlug>) -> Self {
        Self::new(Arc::new(StateBackend::new())).route(
            "/skills/",
            Arc::new(SkillsReadonlyBackend::new(store, visible)),
        )
    }

    fn backend_for(&self, path: &str) -> &dyn FileBackend {
        for (prefix, backend) in &self.routes {
            if path.starts_with(prefix.as_str()) {
                return backend.as_ref();
            }
        }
        self.default.as_ref()
    }
}

#[async_trait]
impl FileBackend for CompositeBackend {
    async fn read(&self, path: &str) -> Result<String> {
        self.backend_for(path).read(path).await
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.backend_for(path).write(path, content).await
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        self.backend_for(path).list(path).await
    }
}
