//! Dockerfile and `.dockerignore` generation for a single service image.

use std::path::Path;

use thiserror::Error;

use crate::config::{DockerSection, HydraSection};

pub const DOCKERFILE: &str = "Dockerfile";
pub const DOCKERIGNORE: &str = ".dockerignore";
pub const DEFAULT_DOCKERIGNORE: &str = "node_modules/\n*.log\n";

const SERVICE_SUFFIX: &str = "-service";
const LOGGER_PLUGIN_PACKAGE: &str = "hydra-plugin-hls";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
}

impl PackageManager {
    /// Yarn when the project carries a `yarn.lock`, npm otherwise.
    pub fn detect(root: &Path) -> Self {
        if root.join("yarn.lock").exists() {
            PackageManager::Yarn
        } else {
            PackageManager::Npm
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
        }
    }
}

#[derive(Debug, Error)]
#[error("config.json docker section is missing '{0}', needed to generate a Dockerfile")]
pub struct MissingTemplateField(pub &'static str);

/// Everything the Dockerfile template is parameterized by.
#[derive(Debug, Clone)]
pub struct DockerfileTemplate {
    pub base_image: String,
    pub author: String,
    pub email: String,
    pub expose_port: u16,
    pub entry_point: String,
    pub package_manager: PackageManager,
    pub healthcheck: bool,
    pub logger_plugin: bool,
}

impl DockerfileTemplate {
    pub fn new(
        docker: &DockerSection,
        hydra: &HydraSection,
        package_manager: PackageManager,
    ) -> Result<Self, MissingTemplateField> {
        let required = |value: &Option<String>, field| {
            value.clone().ok_or(MissingTemplateField(field))
        };

        Ok(Self {
            base_image: required(&docker.base_image, "baseImage")?,
            author: required(&docker.author, "author")?,
            email: required(&docker.email, "email")?,
            expose_port: hydra.service_port,
            entry_point: hydra.service_name.clone(),
            package_manager,
            healthcheck: docker.include_healthcheck,
            logger_plugin: docker
                .logger_plugin
                .unwrap_or_else(|| hydra.plugins.logger_enabled()),
        })
    }

    /// Raw template text, before [`reformat`].
    pub fn render(&self) -> String {
        let port = self.expose_port;
        let pm = self.package_manager.as_str();
        let healthcheck = if self.healthcheck {
            format!(
                "HEALTHCHECK --interval=30s --timeout=3s CMD curl -f http://localhost:{port}/v1/{}/health || exit 1",
                health_route(&self.entry_point)
            )
        } else {
            String::new()
        };
        let logger = if self.logger_plugin {
            format!("RUN {pm} install {LOGGER_PLUGIN_PACKAGE}")
        } else {
            String::new()
        };

        format!(
            r#"
            FROM {base_image}
            MAINTAINER {author} {email}
            EXPOSE {port}
            ARG NPM_TOKEN
            RUN mkdir -p /usr/src/app
            {healthcheck}
            WORKDIR /usr/src/app
            ADD . /usr/src/app
            RUN echo "//registry.npmjs.org/:_authToken=${{NPM_TOKEN}}" > .npmrc
            RUN {pm} install --production
            {logger}
            RUN rm -f .npmrc
            ENTRYPOINT ["node", "{entry_point}"]
            "#,
            base_image = self.base_image,
            author = self.author,
            email = self.email,
            entry_point = self.entry_point,
        )
    }

    /// The text written to disk.
    pub fn generate(&self) -> String {
        reformat(&self.render())
    }
}

/// Trims every line and drops the empty ones.
pub fn reformat(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Route segment served by the entry point: everything before the first
/// `-service`, or nothing when the suffix is absent.
pub fn health_route(entry_point: &str) -> &str {
    entry_point
        .find(SERVICE_SUFFIX)
        .map(|end| &entry_point[..end])
        .unwrap_or("")
}
