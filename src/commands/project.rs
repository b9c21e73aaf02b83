//! Project management commands

use crate::error::{Error, Result};
use crate::store::{Project, Store};

/// Create a new project
pub async fn cmd_create_project(store: &Store, name: &str) -> Result<Project> {
    if name.trim().is_empty() {
        return Err(Error::Config("Project name cannot be empty".to_string()));
    }
    let project = Project::new(name.trim().to_string());
    store.insert_project(&project).await?;
    Ok(project)
}

/// List all projects
pub async fn cmd_list_projects(store: &Store) -> Result<Vec<Project>> {
    store.list_projects().await
}

/// Resolve a project by id, falling back to an exact name match
pub async fn resolve_project(store: &Store, reference: &str) -> Result<Project> {
    if let Some(project) = store.get_project(reference).await? {
        return Ok(project);
    }
    store
        .get_project_by_name(reference)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(reference.to_string()))
}

pub fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects. Create one with 'curator project create <name>'.");
        return;
    }
    for project in projects {
        println!("{}  {}  ({})", project.id, project.name, project.created_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    async fn setup() -> (Store, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");
        let store = Store::connect(&config).await.unwrap();
        store.init_schema().await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let (store, _tmp) = setup().await;
        let project = cmd_create_project(&store, "Diary study").await.unwrap();

        let by_id = resolve_project(&store, &project.id).await.unwrap();
        assert_eq!(by_id.id, project.id);

        let by_name = resolve_project(&store, "Diary study").await.unwrap();
        assert_eq!(by_name.id, project.id);

        assert!(resolve_project(&store, "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (store, _tmp) = setup().await;
        assert!(cmd_create_project(&store, "   ").await.is_err());
    }
}
