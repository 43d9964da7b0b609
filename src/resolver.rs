//! Dependency Resolver
//!
//! Pure computation of the per-turn visible-skill closure. Input slugs are
//! deduplicated and validated with first-seen order preserved; invalid or
//! unknown slugs are dropped silently — resolution never raises over bad
//! input. Skill-requires-skill edges are walked with an explicit visited
//! set, so cyclic declarations terminate and nothing is duplicated.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::cache::MetadataCache;
use crate::error::Result;
use crate::manifest::{DependencyDeclaration, SkillSlug};

/// Prompt metadata for one visible skill
#[derive(Debug, Clone)]
pub struct PromptEntry {
    pub name: String,
    pub description: String,
    /// Manifest virtual path, e.g. `/skills/demo/SKILL.md`
    pub path: String,
}

/// Resolved, per-turn view of selected/visible/dependency state.
/// Computed once at turn start and never recomputed mid-turn.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Deduped, validated selection in input order
    pub selected_skills: Vec<SkillSlug>,
    /// Selected skills first (input order), then transitive dependencies
    /// in discovery order
    pub visible_skills: Vec<SkillSlug>,
    /// Restricted to the visible set
    pub prompt_metadata: HashMap<SkillSlug, PromptEntry>,
    /// Restricted to the visible set
    pub dependency_map: HashMap<SkillSlug, DependencyDeclaration>,
}

impl SessionSnapshot {
    pub fn is_visible(&self, slug: &str) -> bool {
        self.visible_skills.iter().any(|s| s.as_str() == slug)
    }

    /// Fallback snapshot when resolution fails: visibility reduced to the
    /// (pattern-valid) selection, no dependency knowledge
    pub fn degraded(selected: &[String]) -> Self {
        let mut seen = HashSet::new();
        let selected_skills: Vec<SkillSlug> = selected
            .iter()
            .filter(|raw| SkillSlug::is_valid(raw))
            .filter(|raw| seen.insert(raw.trim().to_string()))
            .filter_map(|raw| SkillSlug::parse(raw).ok())
            .collect();
        SessionSnapshot {
            visible_skills: selected_skills.clone(),
            selected_skills,
            prompt_metadata: HashMap::new(),
            dependency_map: HashMap::new(),
        }
    }
}

/// Compute the visible-skill closure for a selection.
///
/// `visible_skills` is a fixed point: resolving it again yields the same
/// set. The traversal is guarded by a visited set and terminates on cyclic
/// graphs.
pub fn resolve(cache: &MetadataCache, selected: &[String]) -> Result<SessionSnapshot> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut selected_skills: Vec<SkillSlug> = Vec::new();

    for raw in selected {
        let raw = raw.trim();
        if !SkillSlug::is_valid(raw) {
            debug!("Dropping invalid skill slug from selection: {:?}", raw);
            continue;
        }
        if !cache.contains(raw) {
            debug!("Dropping unknown skill slug from selection: {}", raw);
            continue;
        }
        if seen.insert(raw.to_string()) {
            selected_skills.push(SkillSlug::parse(raw)?);
        }
    }

    let mut visible_skills = selected_skills.clone();
    let mut queue: VecDeque<SkillSlug> = selected_skills.iter().cloned().collect();

    while let Some(slug) = queue.pop_front() {
        let Some(entry) = cache.get(slug.as_str()) else {
            continue;
        };
        for dep in &entry.dependencies.skills {
            if !cache.contains(dep.as_str()) {
                debug!("Skill '{}' requires unknown skill '{}', skipping", slug, dep);
                continue;
            }
            if seen.insert(dep.as_str().to_string()) {
                visible_skills.push(dep.clone());
                queue.push_back(dep.clone());
            }
        }
    }

    let mut prompt_metadata = HashMap::with_capacity(visible_skills.len());
    let mut dependency_map = HashMap::with_capacity(visible_skills.len());
    for slug in &visible_skills {
        if let Some(entry) = cache.get(slug.as_str()) {
            prompt_metadata.insert(
                slug.clone(),
                PromptEntry {
                    name: entry.name,
                    description: entry.description,
                    path: entry.manifest_path,
                },
            );
            dependency_map.insert(slug.clone(), entry.dependencies);
        }
    }

    Ok(SessionSnapshot {
        selected_skills,
        visible_skills,
        prompt_metadata,
        dependency_map,
    })
}
