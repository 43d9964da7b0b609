//! Skilldock
//!
//! Sandboxed skill bundles and per-turn session scoping for LLM agents.
//!
//! # Features
//!
//! - **Content Store**: zip import/export and node editing of skill
//!   directories, with every path resolved inside the skill's own sandbox
//! - **Metadata Cache**: process-wide, read-mostly slug metadata, rebuilt
//!   wholesale after each mutation
//! - **Dependency Resolver**: per-turn visible-skill closures over the
//!   skill-requires-skill graph, cycle-safe
//! - **Session Manager**: inject-once skills prompt, lazy tool withholding,
//!   activation via manifest reads
//! - **Routing Backend**: `/skills/` routed to a read-only, visibility-
//!   scoped view; everything else to normal session storage
//!
//! # Architecture
//!
//! ```text
//! Operator ──► Admin API ──► SkillStore ──► Repository (SQLite)
//!                                 │               │
//!                                 └──► MetadataCache ◄── rebuild
//!                                           │
//! Agent turn ──► Resolver ──► SessionManager ──► (prompt, tools)
//!                                  │
//!                             tool call ──► CompositeBackend
//!                                  │              ├── /skills/ (read-only)
//!                                  └──────────────┴── session storage
//! ```
//!
//! Core invariant: nothing is exposed to a turn unless explicitly visible —
//! no file access outside a skill's directory, no tool or integration
//! access undeclared by an activated skill.

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod store;
pub mod turn;

pub use backend::{CompositeBackend, FileBackend, SkillsReadonlyBackend, StateBackend};
pub use cache::{CacheEntry, MetadataCache, SkillOption};
pub use config::Config;
pub use error::SkillError;
pub use manifest::{
    DependencyDeclaration, IntegrationName, Manifest, SkillSlug, ToolName, MANIFEST_FILENAME,
};
pub use repository::{SkillRecord, SkillRepository, SqliteSkillRepository};
pub use resolver::{resolve, PromptEntry, SessionSnapshot};
pub use session::{
    DependencyBundle, ModelCallPlan, ReadDecision, SessionManager, SkillState,
};
pub use store::{NodeContent, SkillStore, TreeNode};
pub use turn::{IntegrationRegistry, StaticIntegrationRegistry, ToolDefinition, TurnContext};
