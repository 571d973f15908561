use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::Deserialize;

/// Name and version of the package whose image is being managed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Reads the variables `npm run` exports for the current package.
    pub fn from_env() -> Option<Self> {
        let name = std::env::var("npm_package_name").ok()?;
        let version = std::env::var("npm_package_version").ok()?;
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self { name, version })
    }

    pub fn from_package_json(root: &Path) -> anyhow::Result<Self> {
        let path = root.join("package.json");
        let data = fs::read_to_string(&path)
            .with_context(|| format!("reading package manifest at {}", path.display()))?;
        let info: PackageInfo = serde_json::from_str(&data)
            .with_context(|| format!("parsing package manifest at {}", path.display()))?;
        if info.name.trim().is_empty() || info.version.trim().is_empty() {
            return Err(anyhow!(
                "package manifest at {} has an empty name or version",
                path.display()
            ));
        }
        Ok(info)
    }

    /// `{organization}/{name}:{version}`
    pub fn tag(&self, organization: &str) -> String {
        format!("{organization}/{}:{}", self.name, self.version)
    }
}
