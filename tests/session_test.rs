//! Session Scoping Integration Tests
//!
//! Full wiring: imported skills → metadata cache → resolver → session
//! hooks → composite routing backend.

use skilldock::{
    CompositeBackend, FileBackend, MetadataCache, ReadDecision, SessionManager, SkillError,
    SkillRepository, SkillState, SkillStore, SqliteSkillRepository, StaticIntegrationRegistry,
    ToolDefinition, TurnContext,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::FileOptions::default();
        for (path, content) in files {
            writer.start_file(*path, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

struct Fixture {
    store: Arc<SkillStore>,
    cache: Arc<MetadataCache>,
    manager: SessionManager,
    _data_dir: TempDir,
}

/// Import skills from (slug, frontmatter-extra) pairs
async fn fixture(skills: &[(&str, &str)]) -> Fixture {
    let data_dir = TempDir::new().expect("Failed to create temp dir");
    let repo: Arc<dyn SkillRepository> =
        Arc::new(SqliteSkillRepository::open_in_memory().expect("Failed to open repo"));
    let cache = Arc::new(MetadataCache::new());
    let store = Arc::new(
        SkillStore::new(data_dir.path().to_path_buf(), repo.clone(), cache.clone())
            .expect("Failed to create store"),
    );

    for (slug, extra) in skills {
        let manifest = format!(
            "---\nname: {}\ndescription: {} skill\n{}---\n# {}\n\nInstructions here.\n",
            slug, slug, extra, slug
        );
        let zip_bytes = build_zip(&[(&format!("{}/SKILL.md", slug), manifest.as_str())]);
        store.import(&zip_bytes, None).await.expect("import failed");
    }

    let manager = SessionManager::new(cache.clone());
    Fixture {
        store,
        cache,
        manager,
        _data_dir: data_dir,
    }
}

fn base_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::named("read_file", "Read a file"),
        ToolDefinition::named("write_file", "Write a file"),
        ToolDefinition::named("web_search", "Search the web"),
    ]
}

#[tokio::test]
async fn test_dependency_scenario_a_requires_b() {
    let fx = fixture(&[("a", "skills:\n  - b\n"), ("b", "")]).await;

    let mut ctx = TurnContext::new(vec!["a".to_string()], "You are an assistant.");
    fx.manager.begin_turn(&mut ctx);

    let snapshot = ctx.snapshot.as_ref().unwrap();
    let visible: Vec<&str> = snapshot.visible_skills.iter().map(|s| s.as_str()).collect();
    assert_eq!(visible, vec!["a", "b"]);
    assert_eq!(snapshot.dependency_map.len(), 2);

    // Injected prompt lists "a" before "b"
    let a_pos = ctx.system_prompt.find("- **a**").unwrap();
    let b_pos = ctx.system_prompt.find("- **b**").unwrap();
    assert!(a_pos < b_pos);
}

#[tokio::test]
async fn test_prompt_injected_once_across_model_calls() {
    let fx = fixture(&[("a", "")]).await;

    let mut ctx = TurnContext::new(vec!["a".to_string()], "base");
    fx.manager.begin_turn(&mut ctx);

    let registry = StaticIntegrationRegistry::new();
    for _ in 0..3 {
        let plan = fx
            .manager
            .prepare_model_call(&ctx, &base_tools(), &registry)
            .await;
        // The section is passed through unchanged, never re-rendered
        assert_eq!(plan.system_prompt.matches("## Skills").count(), 1);
    }
    assert_eq!(ctx.system_prompt.matches("## Skills").count(), 1);
}

#[tokio::test]
async fn test_manifest_read_gates_and_unlocks() {
    let fx = fixture(&[
        ("research", "tools:\n  - web_search\n"),
        ("hidden", ""),
    ])
    .await;

    let mut ctx = TurnContext::new(vec!["research".to_string()], "");
    fx.manager.begin_turn(&mut ctx);

    // Invisible manifest read: denied, no state change, no read performed
    let decision = fx
        .manager
        .observe_file_read(&mut ctx, "/skills/hidden/SKILL.md");
    assert!(matches!(decision, ReadDecision::Denied { .. }));
    assert_eq!(fx.manager.skill_state(&ctx, "hidden"), SkillState::NotVisible);

    // Visible manifest read: activated, and the declared tool unlocks
    let registry = StaticIntegrationRegistry::new();
    let before = fx
        .manager
        .prepare_model_call(&ctx, &base_tools(), &registry)
        .await;
    assert!(!before.tools.iter().any(|t| t.name == "web_search"));

    let decision = fx
        .manager
        .observe_file_read(&mut ctx, "/skills/research/SKILL.md");
    assert!(matches!(decision, ReadDecision::Activated(_)));

    let after = fx
        .manager
        .prepare_model_call(&ctx, &base_tools(), &registry)
        .await;
    assert!(after.tools.iter().any(|t| t.name == "web_search"));

    let bundle = fx.manager.dependency_bundle(&ctx);
    assert_eq!(bundle.tools.len(), 1);
    assert_eq!(bundle.tools[0].as_str(), "web_search");
}

#[tokio::test]
async fn test_composite_backend_scopes_skill_reads_to_visible_set() {
    let fx = fixture(&[("a", ""), ("hidden", "")]).await;

    let mut ctx = TurnContext::new(vec!["a".to_string()], "");
    fx.manager.begin_turn(&mut ctx);
    let visible = ctx.snapshot.as_ref().unwrap().visible_skills.clone();

    let backend = CompositeBackend::for_turn(fx.store.clone(), visible);

    // Visible skill content is readable
    let content = backend.read("/skills/a/SKILL.md").await.unwrap();
    assert!(content.contains("name: a"));

    // Invisible skill content reads as missing
    let err = backend.read("/skills/hidden/SKILL.md").await.unwrap_err();
    assert!(matches!(err, SkillError::NotFound(_)));

    // Writes under /skills/ are rejected by the read-only backend itself
    let err = backend
        .write("/skills/a/SKILL.md", "tampered")
        .await
        .unwrap_err();
    assert!(matches!(err, SkillError::Validation(_)));

    // Everything else routes to normal read/write session storage
    backend.write("/notes/draft.md", "hello").await.unwrap();
    assert_eq!(backend.read("/notes/draft.md").await.unwrap(), "hello");
}

#[tokio::test]
async fn test_composite_backend_lists_only_visible_skills() {
    let fx = fixture(&[("a", ""), ("b", ""), ("hidden", "")]).await;

    let mut ctx = TurnContext::new(vec!["a".to_string(), "b".to_string()], "");
    fx.manager.begin_turn(&mut ctx);
    let visible = ctx.snapshot.as_ref().unwrap().visible_skills.clone();

    let backend = CompositeBackend::for_turn(fx.store.clone(), visible);
    let listing = backend.list("/skills/").await.unwrap();
    assert_eq!(listing, vec!["/skills/a/", "/skills/b/"]);

    let files = backend.list("/skills/a/").await.unwrap();
    assert!(files.iter().any(|p| p == "/skills/a/SKILL.md"));
}

#[tokio::test]
async fn test_cache_rebuild_after_mutation_changes_next_turn() {
    let fx = fixture(&[("a", "")]).await;

    let mut ctx = TurnContext::new(vec!["a".to_string()], "");
    fx.manager.begin_turn(&mut ctx);
    assert!(ctx.snapshot.as_ref().unwrap().is_visible("a"));

    // Operator deletes the skill; the wholesale rebuild drops it from the
    // cache, so the next turn resolves without it
    fx.store.delete("a").await.unwrap();
    assert!(!fx.cache.contains("a"));

    let mut next = TurnContext::new(vec!["a".to_string()], "");
    fx.manager.begin_turn(&mut next);
    assert!(next.snapshot.as_ref().unwrap().visible_skills.is_empty());
    assert!(!next.skills_prompt_injected);
}

#[tokio::test]
async fn test_unknown_selection_degrades_silently() {
    let fx = fixture(&[("a", "")]).await;

    let mut ctx = TurnContext::new(
        vec!["a".to_string(), "never-imported".to_string()],
        "base",
    );
    fx.manager.begin_turn(&mut ctx);

    let snapshot = ctx.snapshot.as_ref().unwrap();
    let visible: Vec<&str> = snapshot.visible_skills.iter().map(|s| s.as_str()).collect();
    assert_eq!(visible, vec!["a"]);
    assert!(!ctx.system_prompt.contains("never-imported"));
}
