//! Template files: loading, analysis and discovery.
//!
//! Templates are JSON or YAML documents holding a `TemplateDefinition`.
//! JSON files may be gzip compressed; compression is detected from the
//! magic bytes, not the extension.

use crate::milestones::{duplicate_milestone_ids, task_counts};
use crate::roles::Role;
use crate::schedule::{dependency_edges, find_dependency_cycles};
use crate::tree::{build_task_tree, validate_hierarchy};
use crate::types::TemplateDefinition;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::warn;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Metadata about a template, extracted during analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub id: String,
    pub name: String,

    /// Source file path the template was loaded from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    /// Root task ids, in display order.
    pub roots: Vec<String>,

    pub milestone_count: usize,
    pub task_count: usize,

    /// Tasks scheduled off another task.
    pub dependency_count: usize,

    /// Deepest level in the hierarchy (roots are 0).
    pub max_depth: u32,

    /// Roles referenced anywhere in the template.
    pub roles: Vec<Role>,

    /// Tasks per milestone, in milestone order.
    pub tasks_per_milestone: Vec<(String, usize)>,

    /// Whether the template would instantiate without errors.
    pub valid: bool,
}

/// Read a template definition from a file.
pub fn load_template(path: &Path) -> Result<TemplateDefinition> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read template file: {:?}", path))?;
    parse_template(&bytes, path)
}

/// Parse template bytes. YAML is chosen by extension; everything else is JSON.
pub fn parse_template(bytes: &[u8], path: &Path) -> Result<TemplateDefinition> {
    let bytes = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(bytes)
            .read_to_end(&mut decoded)
            .with_context(|| format!("Failed to decompress template: {:?}", path))?;
        decoded
    } else {
        bytes.to_vec()
    };

    let definition = if is_yaml(path) {
        serde_yaml::from_slice(&bytes)
            .with_context(|| format!("Invalid YAML template: {:?}", path))?
    } else {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid JSON template: {:?}", path))?
    };

    Ok(definition)
}

fn is_yaml(path: &Path) -> bool {
    let name = path.to_string_lossy();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.ends_with(".yaml") || name.ends_with(".yml")
}

fn is_template_file(path: &Path) -> bool {
    let name = path.to_string_lossy();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.ends_with(".json") || name.ends_with(".yaml") || name.ends_with(".yml")
}

/// Summarize a template without modifying it.
pub fn analyze_template(
    definition: &TemplateDefinition,
    source_path: Option<&str>,
) -> Result<TemplateMetadata> {
    if definition.tasks.is_empty() {
        return Err(anyhow!("Template {} contains no tasks", definition.template.id));
    }

    let forest = build_task_tree(&definition.tasks);
    let roots = forest.iter().map(|root| root.task.id.clone()).collect();

    let mut max_depth = 0;
    for root in &forest {
        root.walk(&mut |node| max_depth = max_depth.max(node.depth));
    }

    let roles: BTreeSet<Role> = definition
        .tasks
        .iter()
        .flat_map(|t| t.assigned_to_roles.iter().copied())
        .collect();

    let counts = task_counts(&definition.tasks);
    let tasks_per_milestone = crate::milestones::ordered(&definition.milestones)
        .into_iter()
        .map(|m| (m.id.clone(), counts.get(&m.id).copied().unwrap_or(0)))
        .collect();

    let milestone_ids: HashSet<&str> = definition.milestones.iter().map(|m| m.id.as_str()).collect();
    let valid = duplicate_milestone_ids(&definition.milestones).is_empty()
        && validate_hierarchy(&definition.tasks, &milestone_ids).is_empty()
        && find_dependency_cycles(&definition.tasks).is_empty();

    Ok(TemplateMetadata {
        id: definition.template.id.clone(),
        name: definition.template.name.clone(),
        source_path: source_path.map(String::from),
        roots,
        milestone_count: definition.milestones.len(),
        task_count: definition.tasks.len(),
        dependency_count: dependency_edges(&definition.tasks).len(),
        max_depth,
        roles: roles.into_iter().collect(),
        tasks_per_milestone,
        valid,
    })
}

/// List all template files in a directory.
///
/// Files that fail to load or analyze are skipped with a warning.
pub fn list_templates(templates_dir: &Path) -> Result<Vec<TemplateMetadata>> {
    let mut templates = Vec::new();

    if !templates_dir.exists() {
        return Ok(templates);
    }

    let entries = std::fs::read_dir(templates_dir)
        .with_context(|| format!("Failed to read templates directory: {:?}", templates_dir))?;

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || !is_template_file(&path) {
            continue;
        }

        match load_template(&path) {
            Ok(definition) => match analyze_template(&definition, path.to_str()) {
                Ok(metadata) => templates.push(metadata),
                Err(e) => warn!(path = ?path, error = %e, "Template has invalid structure"),
            },
            Err(e) => warn!(path = ?path, error = %e, "Failed to load template"),
        }
    }

    templates.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    const REVIEW_JSON: &str = r#"{
        "id": "annual-review",
        "name": "Annual Review",
        "milestones": [
            {"id": "prep", "title": "Preparation", "sort_order": 1},
            {"id": "follow", "title": "Follow-up", "sort_order": 2}
        ],
        "tasks": [
            {"id": "gather", "title": "Gather statements", "milestone_id": "prep",
             "schedule": {"kind": "offset", "days_from_meeting": -14},
             "assigned_to_roles": ["paraplanner"]},
            {"id": "agenda", "title": "Draft agenda", "parent_task_id": "gather",
             "schedule": {"kind": "dependent", "depends_on_task_id": "gather"},
             "assigned_to_roles": ["advisor", "paraplanner"]},
            {"id": "notes", "title": "Send notes", "milestone_id": "follow",
             "schedule": {"kind": "offset", "days_from_meeting": 2}}
        ]
    }"#;

    const REVIEW_YAML: &str = r#"
id: onboarding
name: Client Onboarding
milestones:
  - id: kickoff
    title: Kickoff
tasks:
  - id: welcome
    title: Welcome call
    milestone_id: kickoff
    schedule:
      kind: dependent
      depends_on_task_id: paperwork
      policy:
        kind: days_after
        days: 3
  - id: paperwork
    title: Paperwork
    milestone_id: kickoff
    schedule:
      kind: offset
      days_from_meeting: -5
"#;

    #[test]
    fn test_analyze_template() {
        let definition: TemplateDefinition = serde_json::from_str(REVIEW_JSON).unwrap();
        let metadata = analyze_template(&definition, None).unwrap();

        assert_eq!(metadata.roots, vec!["gather", "notes"]);
        assert_eq!(metadata.task_count, 3);
        assert_eq!(metadata.dependency_count, 1);
        assert_eq!(metadata.max_depth, 1);
        assert_eq!(metadata.roles, vec![Role::Advisor, Role::Paraplanner]);
        assert_eq!(
            metadata.tasks_per_milestone,
            vec![("prep".to_string(), 2), ("follow".to_string(), 1)]
        );
        assert!(metadata.valid);
    }

    #[test]
    fn test_duplicate_ids_make_template_invalid() {
        let mut definition: TemplateDefinition = serde_json::from_str(REVIEW_JSON).unwrap();
        let copy = definition.tasks[2].clone();
        definition.tasks.push(copy);
        assert!(!analyze_template(&definition, None).unwrap().valid);

        let mut definition: TemplateDefinition = serde_json::from_str(REVIEW_JSON).unwrap();
        let copy = definition.milestones[0].clone();
        definition.milestones.push(copy);
        assert!(!analyze_template(&definition, None).unwrap().valid);
    }

    #[test]
    fn test_load_yaml_and_gzip() {
        let dir = TempDir::new().unwrap();

        let yaml_path = dir.path().join("onboarding.yaml");
        std::fs::write(&yaml_path, REVIEW_YAML).unwrap();
        let yaml = load_template(&yaml_path).unwrap();
        assert_eq!(yaml.template.name, "Client Onboarding");
        assert_eq!(yaml.tasks[0].schedule.depends_on(), Some("paperwork"));

        let gz_path = dir.path().join("review.json.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(REVIEW_JSON.as_bytes()).unwrap();
        std::fs::write(&gz_path, encoder.finish().unwrap()).unwrap();
        let gz = load_template(&gz_path).unwrap();
        assert_eq!(gz.template.id, "annual-review");
    }

    #[test]
    fn test_list_templates_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("review.json"), REVIEW_JSON).unwrap();
        std::fs::write(dir.path().join("onboarding.yml"), REVIEW_YAML).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let templates = list_templates(dir.path()).unwrap();
        let ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["annual-review", "onboarding"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let templates = list_templates(Path::new("/definitely/not/here")).unwrap();
        assert!(templates.is_empty());
    }
}
