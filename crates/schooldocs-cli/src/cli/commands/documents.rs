//! Document command handlers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use schooldocs_core::api::PortalApi;
use schooldocs_core::format;
use schooldocs_core::http::Blob;

use crate::cli::render;

/// Set to skip launching the system viewer (tests, headless shells).
const NO_OPEN_ENV: &str = "SCHOOLDOCS_NO_OPEN";

pub async fn list(api: &PortalApi) -> Result<()> {
    let documents = api.my_documents().await.context("list documents")?;
    if documents.is_empty() {
        println!("No documents uploaded yet.");
    } else {
        println!("{}", render::documents_table(&documents));
    }
    Ok(())
}

pub async fn view(api: &PortalApi, id: i64) -> Result<()> {
    let blob = api
        .view_document(id)
        .await
        .with_context(|| format!("fetch document {id}"))?;

    let dir = std::env::temp_dir().join("schooldocs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{id}-{}", file_name(&blob, id)));
    write_blob(&path, &blob)?;

    println!("Saved to {}", path.display());
    if std::env::var_os(NO_OPEN_ENV).is_none() {
        open::that(&path).with_context(|| format!("open {}", path.display()))?;
    }
    Ok(())
}

pub async fn download(api: &PortalApi, id: i64, output: Option<&Path>) -> Result<()> {
    let blob = api
        .download_document(id)
        .await
        .with_context(|| format!("download document {id}"))?;

    let name = file_name(&blob, id);
    let path = match output {
        Some(out) if out.is_dir() => out.join(name),
        Some(out) => out.to_path_buf(),
        None => PathBuf::from(name),
    };
    write_blob(&path, &blob)?;

    println!(
        "✓ Saved {} to {}",
        format::file_size(Some(blob.bytes.len() as u64)),
        path.display()
    );
    Ok(())
}

/// Portal-suggested filename reduced to its last component.
fn file_name(blob: &Blob, id: i64) -> String {
    blob.filename
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .map_or_else(
            || format!("document-{id}"),
            |name| name.to_string_lossy().into_owned(),
        )
}

fn write_blob(path: &Path, blob: &Blob) -> Result<()> {
    fs::write(path, &blob.bytes).with_context(|| format!("Failed to write {}", path.display()))
}
