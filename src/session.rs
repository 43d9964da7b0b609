//! Session State Manager
//!
//! Orchestrates skill visibility across a turn's three hook points: turn
//! start, each model call, each tool call. Per skill and per turn the state
//! machine is `NotVisible → Visible → Activated`:
//!
//! - the resolver makes a skill Visible at turn start;
//! - a tool call that reads a visible skill's manifest makes it Activated,
//!   unlocking its declared tool/integration dependencies;
//! - a manifest read for a skill outside the visible set is denied outright.
//!
//! Resolver and prompt-injection failures are never fatal to a turn; they
//! degrade visibility and are only logged.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::cache::MetadataCache;
use crate::manifest::{IntegrationName, SkillSlug, ToolName, MANIFEST_FILENAME};
use crate::resolver::{self, SessionSnapshot};
use crate::turn::{IntegrationRegistry, ToolDefinition, TurnContext};
use std::sync::Arc;

/// Per-skill, per-turn state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillState {
    NotVisible,
    Visible,
    Activated,
}

/// Outcome of intercepting a file-read tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ReadDecision {
    /// Manifest of a visible skill: activation recorded, the read proceeds
    Activated(SkillSlug),
    /// Manifest of a skill not visible this turn: an ordinary denial tool
    /// result, the read is never performed
    Denied { slug: String, message: String },
    /// Not a skill manifest path; routing applies as usual
    PassThrough,
}

/// Union of requirements declared by the turn's activated skills,
/// accumulated in activation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyBundle {
    pub tools: Vec<ToolName>,
    pub integrations: Vec<IntegrationName>,
    pub skills: Vec<SkillSlug>,
}

/// What the framework sends to the model on one call
#[derive(Debug, Clone)]
pub struct ModelCallPlan {
    pub system_prompt: String,
    pub tools: Vec<ToolDefinition>,
}

/// Drives skill visibility, prompt injection, and lazy tool unlocking
/// across one turn
pub struct SessionManager {
    cache: Arc<MetadataCache>,
}

impl SessionManager {
    pub fn new(cache: Arc<MetadataCache>) -> Self {
        Self { cache }
    }

    /// Turn-start hook. Resolves the snapshot once and injects the Skills
    /// prompt section at most once per turn, guarded by an explicit flag.
    pub fn begin_turn(&self, ctx: &mut TurnContext) {
        if ctx.snapshot.is_some() {
            return;
        }

        match resolver::resolve(&self.cache, &ctx.selected_skills) {
            Ok(snapshot) => {
                if !ctx.skills_prompt_injected && !snapshot.visible_skills.is_empty() {
                    ctx.system_prompt.push_str(&render_skills_section(&snapshot));
                    ctx.skills_prompt_injected = true;
                }
                ctx.snapshot = Some(snapshot);
            }
            Err(e) => {
                warn!(
                    "Skill resolution failed, continuing turn without skills prompt: {}",
                    e
                );
                ctx.snapshot = Some(SessionSnapshot::degraded(&ctx.selected_skills));
            }
        }
    }

    /// Model-call hook. Passes the injected prompt through unchanged (plus
    /// a current-timestamp marker) and computes tool availability: base
    /// tools, minus tools declared by visible-but-not-activated skills,
    /// plus the dependency bundle of the activated set.
    pub async fn prepare_model_call(
        &self,
        ctx: &TurnContext,
        base_tools: &[ToolDefinition],
        integrations: &dyn IntegrationRegistry,
    ) -> ModelCallPlan {
        let system_prompt = format!(
            "{}\n\nCurrent time: {}",
            ctx.system_prompt,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        let Some(snapshot) = &ctx.snapshot else {
            return ModelCallPlan {
                system_prompt,
                tools: base_tools.to_vec(),
            };
        };

        let activated = self.activated_set(ctx);
        let bundle = compute_bundle(snapshot, &activated);

        let unlocked: HashSet<&str> = bundle.tools.iter().map(ToolName::as_str).collect();
        let withheld: HashSet<&str> = snapshot
            .visible_skills
            .iter()
            .filter(|slug| !activated.contains(slug))
            .filter_map(|slug| snapshot.dependency_map.get(slug))
            .flat_map(|decl| decl.tools.iter().map(ToolName::as_str))
            .filter(|name| !unlocked.contains(name))
            .collect();

        let mut tools: Vec<ToolDefinition> = base_tools
            .iter()
            .filter(|tool| !withheld.contains(tool.name.as_str()))
            .cloned()
            .collect();

        // Integration tools are fetched per integration, in activation
        // order; a failed fetch is logged and the rest keep loading.
        // Conflicting tool names resolve last-activated-wins.
        let mut index: HashMap<String, usize> = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        for integration in &bundle.integrations {
            match integrations.tools_for(integration).await {
                Ok(fetched) => {
                    for tool in fetched {
                        match index.get(&tool.name) {
                            Some(&i) => tools[i] = tool,
                            None => {
                                index.insert(tool.name.clone(), tools.len());
                                tools.push(tool);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Integration '{}' tool fetch failed: {}", integration, e);
                }
            }
        }

        ModelCallPlan {
            system_prompt,
            tools,
        }
    }

    /// Tool-call hook. Intercepts file reads targeting a skill manifest
    /// virtual path; anything else passes through to normal routing.
    pub fn observe_file_read(&self, ctx: &mut TurnContext, path: &str) -> ReadDecision {
        let Some(slug) = manifest_slug_of(path) else {
            return ReadDecision::PassThrough;
        };

        let visible = ctx
            .snapshot
            .as_ref()
            .and_then(|s| s.visible_skills.iter().find(|v| v.as_str() == slug))
            .cloned();

        match visible {
            Some(skill) => {
                debug!("Activating skill '{}' via manifest read", skill);
                ctx.file_reads.push(path.to_string());
                ReadDecision::Activated(skill)
            }
            None => ReadDecision::Denied {
                slug: slug.to_string(),
                message: format!(
                    "Skill '{}' is not available in this session. Only skills listed in the Skills section can be read.",
                    slug
                ),
            },
        }
    }

    /// Current state of one skill within the turn
    pub fn skill_state(&self, ctx: &TurnContext, slug: &str) -> SkillState {
        let visible = ctx
            .snapshot
            .as_ref()
            .map(|s| s.is_visible(slug))
            .unwrap_or(false);
        if !visible {
            return SkillState::NotVisible;
        }
        if self.activated_set(ctx).iter().any(|s| s.as_str() == slug) {
            SkillState::Activated
        } else {
            SkillState::Visible
        }
    }

    /// Dependency bundle of the turn's activated set, matching what the
    /// next model call will see
    pub fn dependency_bundle(&self, ctx: &TurnContext) -> DependencyBundle {
        match &ctx.snapshot {
            Some(snapshot) => compute_bundle(snapshot, &self.activated_set(ctx)),
            None => DependencyBundle::default(),
        }
    }

    /// Skills whose manifest has been read this turn, in first-read order,
    /// recomputed from the accumulated tool-call history
    pub fn activated_set(&self, ctx: &TurnContext) -> Vec<SkillSlug> {
        let Some(snapshot) = &ctx.snapshot else {
            return Vec::new();
        };

        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for path in &ctx.file_reads {
            if let Some(slug) = manifest_slug_of(path) {
                if seen.insert(slug) {
                    if let Some(skill) = snapshot.visible_skills.iter().find(|v| v.as_str() == slug)
                    {
                        out.push(skill.clone());
                    }
                }
            }
        }
        out
    }
}

/// Extract the owning slug when `path` is a manifest virtual path
/// (`/skills/<slug>/SKILL.md`)
fn manifest_slug_of(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/skills/")?;
    let (slug, file) = rest.split_once('/')?;
    if !slug.is_empty() && file == MANIFEST_FILENAME {
        Some(slug)
    } else {
        None
    }
}

/// Union of the activated skills' declarations, deduped in activation order
fn compute_bundle(snapshot: &SessionSnapshot, activated: &[SkillSlug]) -> DependencyBundle {
    let mut bundle = DependencyBundle::default();
    let mut seen_tools = HashSet::new();
    let mut seen_integrations = HashSet::new();
    let mut seen_skills = HashSet::new();

    for slug in activated {
        let Some(decl) = snapshot.dependency_map.get(slug) else {
            continue;
        };
        for tool in &decl.tools {
            if seen_tools.insert(tool.as_str().to_string()) {
                bundle.tools.push(tool.clone());
            }
        }
        for integration in &decl.integrations {
            if seen_integrations.insert(integration.as_str().to_string()) {
                bundle.integrations.push(integration.clone());
            }
        }
        for skill in &decl.skills {
            if seen_skills.insert(skill.as_str().to_string()) {
                bundle.skills.push(skill.clone());
            }
        }
    }
    bundle
}

fn render_skills_section(snapshot: &SessionSnapshot) -> String {
    let mut section = String::from(
        "\n\n## Skills\n\n\
         Specialized skill bundles are mounted read-only under `/skills/` \
         (higher priority than session storage).\n\nAvailable skills:\n",
    );
    for slug in &snapshot.visible_skills {
        if let Some(entry) = snapshot.prompt_metadata.get(slug) {
            section.push_str(&format!(
                "- **{}**: {}\n  Read `{}` for full instructions before using this skill.\n",
                entry.name, entry.description, entry.path
            ));
        }
    }
    section.push_str(
        "\nUsage guidance:\n\
         - Recognize when a skill applies to the current request.\n\
         - Read a skill's SKILL.md before relying on its instructions or tools.\n\
         - Skill files are read-only; only files under a skill's own directory are accessible.\n",
    );
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{SkillRepository, SqliteSkillRepository};
    use crate::turn::StaticIntegrationRegistry;
    use tempfile::TempDir;

    /// Seed a cache from (slug, frontmatter-extra) pairs
    async fn seeded(skills: &[(&str, &str)]) -> (Arc<MetadataCache>, TempDir) {
        let data_dir = TempDir::new().unwrap();
        let repo = SqliteSkillRepository::open_in_memory().unwrap();

        for (slug, extra) in skills {
            let dir = data_dir.path().join("skills").join(slug);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join("SKILL.md"),
                format!(
                    "---\nname: {}\ndescription: {} skill\n{}---\nbody\n",
                    slug, slug, extra
                ),
            )
            .unwrap();
            repo.create(slug, slug, &format!("{} skill", slug), &format!("skills/{}", slug), None)
                .await
                .unwrap();
        }

        let cache = Arc::new(MetadataCache::new());
        cache.rebuild(&repo, data_dir.path()).await.unwrap();
        (cache, data_dir)
    }

    fn base_tools() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::named("read_file", "Read a file"),
            ToolDefinition::named("write_file", "Write a file"),
            ToolDefinition::named("web_search", "Search the web"),
        ]
    }

    #[tokio::test]
    async fn test_begin_turn_injects_section_once() {
        let (cache, _dir) = seeded(&[("a", "skills:\n  - b\n"), ("b", "")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "You are an assistant.");

        manager.begin_turn(&mut ctx);
        assert!(ctx.skills_prompt_injected);
        let first_len = ctx.system_prompt.len();
        assert_eq!(ctx.system_prompt.matches("## Skills").count(), 1);

        // Re-entering the hook must not re-inject or re-resolve
        manager.begin_turn(&mut ctx);
        assert_eq!(ctx.system_prompt.len(), first_len);
        assert_eq!(ctx.system_prompt.matches("## Skills").count(), 1);
    }

    #[tokio::test]
    async fn test_begin_turn_lists_selected_before_dependencies() {
        let (cache, _dir) = seeded(&[("a", "skills:\n  - b\n"), ("b", "")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "");

        manager.begin_turn(&mut ctx);
        let a_line = "- **a**: a skill";
        let b_line = "- **b**: b skill";
        assert!(ctx.system_prompt.contains(a_line));
        assert!(ctx.system_prompt.contains(b_line));
        assert!(ctx.system_prompt.find(a_line).unwrap() < ctx.system_prompt.find(b_line).unwrap());
        assert!(ctx.system_prompt.contains("/skills/a/SKILL.md"));
    }

    #[tokio::test]
    async fn test_begin_turn_empty_selection_injects_nothing() {
        let (cache, _dir) = seeded(&[("a", "")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(Vec::new(), "base");

        manager.begin_turn(&mut ctx);
        assert!(!ctx.skills_prompt_injected);
        assert_eq!(ctx.system_prompt, "base");
        assert!(ctx.snapshot.is_some());
    }

    #[tokio::test]
    async fn test_manifest_read_activates_visible_skill() {
        let (cache, _dir) = seeded(&[("a", "tools:\n  - web_search\n")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "");
        manager.begin_turn(&mut ctx);

        assert_eq!(manager.skill_state(&ctx, "a"), SkillState::Visible);

        let decision = manager.observe_file_read(&mut ctx, "/skills/a/SKILL.md");
        assert!(matches!(decision, ReadDecision::Activated(ref s) if s.as_str() == "a"));
        assert_eq!(manager.skill_state(&ctx, "a"), SkillState::Activated);
    }

    #[tokio::test]
    async fn test_manifest_read_denied_for_invisible_skill() {
        let (cache, _dir) = seeded(&[("a", ""), ("hidden", "")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "");
        manager.begin_turn(&mut ctx);

        let decision = manager.observe_file_read(&mut ctx, "/skills/hidden/SKILL.md");
        assert!(matches!(decision, ReadDecision::Denied { ref slug, .. } if slug == "hidden"));
        assert_eq!(manager.skill_state(&ctx, "hidden"), SkillState::NotVisible);
        assert!(ctx.file_reads.is_empty());
    }

    #[tokio::test]
    async fn test_non_manifest_paths_pass_through() {
        let (cache, _dir) = seeded(&[("a", "")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "");
        manager.begin_turn(&mut ctx);

        assert_eq!(
            manager.observe_file_read(&mut ctx, "/skills/a/prompts/extra.md"),
            ReadDecision::PassThrough
        );
        assert_eq!(
            manager.observe_file_read(&mut ctx, "/notes/todo.md"),
            ReadDecision::PassThrough
        );
    }

    #[tokio::test]
    async fn test_declared_tools_withheld_until_activation() {
        let (cache, _dir) = seeded(&[("a", "tools:\n  - web_search\n")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "");
        manager.begin_turn(&mut ctx);

        let registry = StaticIntegrationRegistry::new();
        let plan = manager
            .prepare_model_call(&ctx, &base_tools(), &registry)
            .await;
        let names: Vec<&str> = plan.tools.iter().map(|t| t.name.as_str()).collect();
        assert!(!names.contains(&"web_search"));
        assert!(names.contains(&"read_file"));

        // Reading the manifest unlocks the declared tool on the next call
        manager.observe_file_read(&mut ctx, "/skills/a/SKILL.md");
        let plan = manager
            .prepare_model_call(&ctx, &base_tools(), &registry)
            .await;
        let names: Vec<&str> = plan.tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"web_search"));
    }

    #[tokio::test]
    async fn test_integration_failure_does_not_block_others() {
        let (cache, _dir) = seeded(&[(
            "a",
            "integrations:\n  - broken\n  - github\n",
        )])
        .await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "");
        manager.begin_turn(&mut ctx);
        manager.observe_file_read(&mut ctx, "/skills/a/SKILL.md");

        let mut registry = StaticIntegrationRegistry::new();
        registry.insert(
            "github",
            vec![ToolDefinition::named("create_issue", "Create an issue")],
        );
        // "broken" is not configured, so its fetch fails

        let plan = manager
            .prepare_model_call(&ctx, &base_tools(), &registry)
            .await;
        let names: Vec<&str> = plan.tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"create_issue"));
    }

    #[tokio::test]
    async fn test_conflicting_tool_names_last_activated_wins() {
        let (cache, _dir) = seeded(&[
            ("first", "integrations:\n  - alpha\n"),
            ("second", "integrations:\n  - beta\n"),
        ])
        .await;
        let manager = SessionManager::new(cache);
        let mut ctx =
            TurnContext::new(vec!["first".to_string(), "second".to_string()], "");
        manager.begin_turn(&mut ctx);
        manager.observe_file_read(&mut ctx, "/skills/first/SKILL.md");
        manager.observe_file_read(&mut ctx, "/skills/second/SKILL.md");

        let mut registry = StaticIntegrationRegistry::new();
        registry.insert("alpha", vec![ToolDefinition::named("deploy", "Deploy via alpha")]);
        registry.insert("beta", vec![ToolDefinition::named("deploy", "Deploy via beta")]);

        let plan = manager
            .prepare_model_call(&ctx, &base_tools(), &registry)
            .await;
        let deploy: Vec<&ToolDefinition> =
            plan.tools.iter().filter(|t| t.name == "deploy").collect();
        assert_eq!(deploy.len(), 1);
        assert_eq!(deploy[0].description, "Deploy via beta");
    }

    #[tokio::test]
    async fn test_model_call_appends_timestamp_marker() {
        let (cache, _dir) = seeded(&[("a", "")]).await;
        let manager = SessionManager::new(cache);
        let mut ctx = TurnContext::new(vec!["a".to_string()], "base prompt");
        manager.begin_turn(&mut ctx);

        let registry = StaticIntegrationRegistry::new();
        let plan = manager
            .prepare_model_call(&ctx, &base_tools(), &registry)
            .await;
        assert!(plan.system_prompt.starts_with("base prompt"));
        assert!(plan.system_prompt.contains("Current time: "));
    }

    #[test]
    fn test_manifest_slug_of() {
        assert_eq!(manifest_slug_of("/skills/demo/SKILL.md"), Some("demo"));
        assert_eq!(manifest_slug_of("/skills/demo/other.md"), None);
        assert_eq!(manifest_slug_of("/skills/demo/nested/SKILL.md"), None);
        assert_eq!(manifest_slug_of("/files/demo/SKILL.md"), None);
        assert_eq!(manifest_slug_of("/skills//SKILL.md"), None);
    }
}
