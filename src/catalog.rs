//! Cached catalog file.
//!
//! The catalog is the authoritative list of resources that can currently be
//! grabbed. Fetching it from the backend is someone else's job; this module
//! only reads and writes the local YAML copy used to rehydrate the queue.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::domain::{Resource, ResourceId};
use crate::error::Result;

/// Load the catalog at `path`. A missing file is an empty catalog.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<Resource>> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No catalog at {}, starting with an empty one", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let resources: Vec<Resource> = serde_yaml::from_str(&content)?;
    log::debug!("Loaded {} catalog entries from {}", resources.len(), path.display());
    Ok(resources)
}

/// Write `resources` to `path`, creating parent directories as needed.
pub fn save(path: impl AsRef<Path>, resources: &[Resource]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_yaml::to_string(resources)?)?;
    Ok(())
}

/// Find a resource by id
pub fn find(catalog: &[Resource], id: ResourceId) -> Option<&Resource> {
    catalog.iter().find(|r| r.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GrabError;
    use tempfile::TempDir;

    #[test]
    fn test_missing_catalog_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load(temp_dir.path().join("catalog.yml")).unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("catalog.yml");
        let resources = vec![
            Resource::new(101, "Linear Algebra", "MATH201"),
            Resource::new(102, "Signals", "EE210"),
        ];

        save(&path, &resources).unwrap();
        assert_eq!(load(&path).unwrap(), resources);
    }

    #[test]
    fn test_load_hand_written_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.yml");
        fs::write(
            &path,
            r#"
- id: 7
  name: Compilers
  code: CS401
- id: 8
"#,
        )
        .unwrap();

        let catalog = load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[1], Resource::new(8, "", ""));
        assert_eq!(find(&catalog, ResourceId(7)).unwrap().code, "CS401");
        assert!(find(&catalog, ResourceId(9)).is_none());
    }

    #[test]
    fn test_malformed_catalog_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.yml");
        fs::write(&path, "- id: [not a number").unwrap();
        assert!(matches!(load(&path), Err(GrabError::Yaml(_))));
    }
}
