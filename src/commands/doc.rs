//! Document management commands

use crate::error::{Error, Result};
use crate::store::{Document, Project, Store};
use std::path::Path;
use tracing::info;

/// Add a local file as a project document (content stored inline)
pub async fn cmd_add_document(
    store: &Store,
    project: &Project,
    path: &Path,
) -> Result<Document> {
    if !path.is_file() {
        return Err(Error::InvalidPath(path.display().to_string()));
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?
        .to_string();
    let content = std::fs::read_to_string(path)?;

    let doc = Document::new(project.id.clone(), name, Some(content));
    store.insert_document(&doc).await?;
    info!(document_id = %doc.id, project_id = %project.id, "Added document");
    Ok(doc)
}

/// List a project's documents
pub async fn cmd_list_documents(store: &Store, project: &Project) -> Result<Vec<Document>> {
    store.list_documents(&project.id).await
}

pub fn print_documents(docs: &[Document]) {
    if docs.is_empty() {
        println!("No documents.");
        return;
    }
    for doc in docs {
        let source = if doc.content.is_some() {
            "inline"
        } else if doc.storage_path.is_some() {
            "blob"
        } else {
            "empty"
        };
        println!("{}  {}  [{}]", doc.id, doc.name, source);
    }
}
