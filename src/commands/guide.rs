//! Discussion guide import
//!
//! Guides are plain text: lines starting with `#` open a section, every
//! other non-blank line is one question in the current section. Importing
//! replaces the project's existing guide wholesale.

use crate::error::{Error, Result};
use crate::store::{GuideQuestion, Project, Store};
use std::path::Path;
use tracing::info;

/// Parse guide text into (section, question) pairs in guide order
pub fn parse_guide(text: &str) -> Vec<(Option<String>, String)> {
    let mut questions = Vec::new();
    let mut section: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let header = header.trim_start_matches('#').trim();
            section = if header.is_empty() {
                None
            } else {
                Some(header.to_string())
            };
            continue;
        }
        questions.push((section.clone(), line.to_string()));
    }

    questions
}

/// Import a guide file, replacing the project's existing questions
pub async fn cmd_import_guide(store: &Store, project: &Project, path: &Path) -> Result<usize> {
    if !path.is_file() {
        return Err(Error::InvalidPath(path.display().to_string()));
    }

    let text = std::fs::read_to_string(path)?;
    let parsed = parse_guide(&text);

    store.delete_guide_questions(&project.id).await?;
    for (position, (section, prompt)) in parsed.iter().enumerate() {
        store
            .insert_guide_question(&GuideQuestion::new(
                project.id.clone(),
                section.clone(),
                prompt.clone(),
                position as i64,
            ))
            .await?;
    }

    info!(project_id = %project.id, questions = parsed.len(), "Imported guide");
    Ok(parsed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cmd_create_project;
    use crate::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_parse_guide_sections_and_questions() {
        let text = "\
# Onboarding

How did you first hear about the product?
What was the setup like?

## Daily use
What does a typical session look like?
";
        let parsed = parse_guide(text);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].0.as_deref(), Some("Onboarding"));
        assert_eq!(parsed[1].1, "What was the setup like?");
        assert_eq!(parsed[2].0.as_deref(), Some("Daily use"));
    }

    #[test]
    fn test_parse_guide_no_sections() {
        let parsed = parse_guide("First question?\nSecond question?");
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].0.is_none());
    }

    #[tokio::test]
    async fn test_import_replaces_existing_guide() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");
        let store = Store::connect(&config).await.unwrap();
        store.init_schema().await.unwrap();
        let project = cmd_create_project(&store, "study").await.unwrap();

        let file = tmp.path().join("guide.txt");
        std::fs::write(&file, "# A\nQ1?\nQ2?").unwrap();
        assert_eq!(cmd_import_guide(&store, &project, &file).await.unwrap(), 2);

        std::fs::write(&file, "Only one now?").unwrap();
        assert_eq!(cmd_import_guide(&store, &project, &file).await.unwrap(), 1);

        let questions = store.list_guide_questions(&project.id).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].prompt, "Only one now?");
        assert_eq!(questions[0].position, 0);
    }
}
