//! Content catalog loaded once at startup.

use std::path::Path;

use edufin_common::ContentItem;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid catalog {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Read a JSON array of content items. No path means an empty catalog.
pub fn load_catalog(path: Option<&str>) -> Result<Vec<ContentItem>, CatalogError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| CatalogError::Read {
        path: path.to_string(),
        source,
    })?;
    let items: Vec<ContentItem> = serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
        path: path.to_string(),
        source,
    })?;

    tracing::info!("Loaded {} content items from {}", items.len(), path);
    Ok(items)
}
