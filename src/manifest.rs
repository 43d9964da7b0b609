//! Skill Manifest
//!
//! Every skill directory carries a single `SKILL.md` at its root: a
//! `---`-delimited YAML frontmatter block (at least `name` and
//! `description`) followed by free-form markdown instructions.
//!
//! Raw manifest strings are validated into typed handles ([`SkillSlug`],
//! [`ToolName`], [`IntegrationName`]) immediately after parsing; strings
//! survive only at the storage/manifest boundary.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::error::{Result, SkillError};

/// Manifest filename, fixed at each skill root
pub const MANIFEST_FILENAME: &str = "SKILL.md";

/// Maximum slug length
pub const MAX_SLUG_LEN: usize = 128;

static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("slug pattern"));

static FRONTMATTER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A---[ \t]*\n(.*?)\n---[ \t]*\n").expect("frontmatter pattern"));

/// Validated skill slug: lowercase alphanumeric segments joined by single dashes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SkillSlug(String);

impl SkillSlug {
    /// Validate a raw string into a slug
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SkillError::validation("skill name must not be empty"));
        }
        if raw.len() > MAX_SLUG_LEN {
            return Err(SkillError::validation(format!(
                "skill name exceeds {} characters",
                MAX_SLUG_LEN
            )));
        }
        if !SLUG_PATTERN.is_match(raw) {
            return Err(SkillError::validation(format!(
                "skill name '{}' must be lowercase alphanumeric segments joined by single dashes",
                raw
            )));
        }
        Ok(SkillSlug(raw.to_string()))
    }

    /// Check validity without constructing
    pub fn is_valid(raw: &str) -> bool {
        let raw = raw.trim();
        !raw.is_empty() && raw.len() <= MAX_SLUG_LEN && SLUG_PATTERN.is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Virtual path of this skill's manifest as exposed to the agent
    pub fn manifest_path(&self) -> String {
        format!("/skills/{}/{}", self.0, MANIFEST_FILENAME)
    }
}

impl fmt::Display for SkillSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated tool name from a dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ToolName(String);

impl ToolName {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(SkillError::validation(format!(
                "tool name '{}' must be a non-empty token",
                raw
            )));
        }
        Ok(ToolName(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated integration name from a dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IntegrationName(String);

impl IntegrationName {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(SkillError::validation(format!(
                "integration name '{}' must be a non-empty token",
                raw
            )));
        }
        Ok(IntegrationName(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IntegrationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dependencies a skill declares in its frontmatter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DependencyDeclaration {
    /// Required base tool names
    pub tools: Vec<ToolName>,
    /// Required integration names
    pub integrations: Vec<IntegrationName>,
    /// Required skill slugs
    pub skills: Vec<SkillSlug>,
}

impl DependencyDeclaration {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.integrations.is_empty() && self.skills.is_empty()
    }
}

/// Parsed manifest: validated metadata plus the untouched body
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: SkillSlug,
    pub description: String,
    pub dependencies: DependencyDeclaration,
    pub body: String,
}

/// Parse and validate a SKILL.md document
pub fn parse_manifest(content: &str) -> Result<Manifest> {
    let (doc, body) = split_frontmatter(content)?;

    let mapping = doc
        .as_mapping()
        .ok_or_else(|| SkillError::validation("SKILL.md frontmatter must be a mapping"))?;

    let name_raw = mapping
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let name = SkillSlug::parse(name_raw)?;

    let description = mapping
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if description.is_empty() {
        return Err(SkillError::validation(
            "SKILL.md frontmatter is missing a description",
        ));
    }

    let dependencies = DependencyDeclaration {
        tools: string_list(mapping, "tools")?
            .iter()
            .map(|s| ToolName::parse(s))
            .collect::<Result<_>>()?,
        integrations: string_list(mapping, "integrations")?
            .iter()
            .map(|s| IntegrationName::parse(s))
            .collect::<Result<_>>()?,
        skills: string_list(mapping, "skills")?
            .iter()
            .map(|s| SkillSlug::parse(s))
            .collect::<Result<_>>()?,
    };

    Ok(Manifest {
        name,
        description,
        dependencies,
        body: body.to_string(),
    })
}

/// Rewrite the frontmatter `name` field, preserving the body verbatim
pub fn rewrite_frontmatter_name(content: &str, new_name: &str) -> Result<String> {
    let captures = FRONTMATTER_PATTERN
        .captures(content)
        .ok_or_else(|| SkillError::validation("SKILL.md is missing frontmatter (--- ... ---)"))?;

    let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let body = &content[captures.get(0).map(|m| m.end()).unwrap_or(0)..];

    let mut doc: serde_yaml::Value = serde_yaml::from_str(raw)
        .map_err(|e| SkillError::validation(format!("SKILL.md frontmatter is not valid YAML: {}", e)))?;
    let mapping = doc
        .as_mapping_mut()
        .ok_or_else(|| SkillError::validation("SKILL.md frontmatter must be a mapping"))?;
    mapping.insert(
        serde_yaml::Value::from("name"),
        serde_yaml::Value::from(new_name),
    );

    let dumped = serde_yaml::to_string(&doc)
        .map_err(|e| SkillError::validation(format!("failed to serialize frontmatter: {}", e)))?;
    Ok(format!("---\n{}---\n{}", dumped, body))
}

fn split_frontmatter(content: &str) -> Result<(serde_yaml::Value, &str)> {
    let captures = FRONTMATTER_PATTERN
        .captures(content)
        .ok_or_else(|| SkillError::validation("SKILL.md is missing frontmatter (--- ... ---)"))?;

    let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let body = &content[captures.get(0).map(|m| m.end()).unwrap_or(0)..];

    let doc: serde_yaml::Value = serde_yaml::from_str(raw)
        .map_err(|e| SkillError::validation(format!("SKILL.md frontmatter is not valid YAML: {}", e)))?;
    Ok((doc, body))
}

fn string_list(mapping: &serde_yaml::Mapping, key: &str) -> Result<Vec<String>> {
    match mapping.get(key) {
        None | Some(serde_yaml::Value::Null) => Ok(Vec::new()),
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    SkillError::validation(format!("frontmatter '{}' entries must be strings", key))
                })
            })
            .collect(),
        Some(_) => Err(SkillError::validation(format!(
            "frontmatter '{}' must be a list of strings",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_ok() {
        let content = "---\nname: demo-skill\ndescription: demo description\n---\n# Demo\n";
        let manifest = parse_manifest(content).unwrap();
        assert_eq!(manifest.name.as_str(), "demo-skill");
        assert_eq!(manifest.description, "demo description");
        assert!(manifest.dependencies.is_empty());
        assert_eq!(manifest.body, "# Demo\n");
    }

    #[test]
    fn test_parse_manifest_with_dependencies() {
        let content = "---\n\
                       name: research\n\
                       description: research helper\n\
                       tools:\n  - web_search\n  - fetch_url\n\
                       integrations:\n  - github\n\
                       skills:\n  - citation-style\n\
                       ---\nBody\n";
        let manifest = parse_manifest(content).unwrap();
        assert_eq!(manifest.dependencies.tools.len(), 2);
        assert_eq!(manifest.dependencies.tools[0].as_str(), "web_search");
        assert_eq!(manifest.dependencies.integrations[0].as_str(), "github");
        assert_eq!(manifest.dependencies.skills[0].as_str(), "citation-style");
    }

    #[test]
    fn test_parse_manifest_requires_frontmatter() {
        let err = parse_manifest("# missing").unwrap_err();
        assert!(err.to_string().contains("frontmatter"));
    }

    #[test]
    fn test_parse_manifest_requires_description() {
        let content = "---\nname: demo\ndescription: \"\"\n---\nbody\n";
        assert!(parse_manifest(content).is_err());
    }

    #[test]
    fn test_slug_validation() {
        assert!(SkillSlug::is_valid("demo"));
        assert!(SkillSlug::is_valid("demo-v2"));
        assert!(SkillSlug::is_valid("a1-b2-c3"));
        assert!(!SkillSlug::is_valid(""));
        assert!(!SkillSlug::is_valid("Demo"));
        assert!(!SkillSlug::is_valid("demo--skill"));
        assert!(!SkillSlug::is_valid("-demo"));
        assert!(!SkillSlug::is_valid("demo-"));
        assert!(!SkillSlug::is_valid("demo skill"));
        assert!(!SkillSlug::is_valid(&"a".repeat(129)));
    }

    #[test]
    fn test_rewrite_frontmatter_name_preserves_body() {
        let content = "---\nname: demo\ndescription: this is demo\n---\n# Demo\n\nSome body text.\n";
        let rewritten = rewrite_frontmatter_name(content, "demo-v2").unwrap();
        assert!(rewritten.contains("name: demo-v2"));
        assert!(rewritten.contains("description: this is demo"));
        assert!(rewritten.ends_with("# Demo\n\nSome body text.\n"));

        let reparsed = parse_manifest(&rewritten).unwrap();
        assert_eq!(reparsed.name.as_str(), "demo-v2");
    }

    #[test]
    fn test_manifest_path() {
        let slug = SkillSlug::parse("demo").unwrap();
        assert_eq!(slug.manifest_path(), "/skills/demo/SKILL.md");
    }
}
