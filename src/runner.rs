use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{ConfigError, ConfigLoader, ConfigSource, DockerSection};
use crate::dockerfile::{
    DEFAULT_DOCKERIGNORE, DOCKERFILE, DOCKERIGNORE, DockerfileTemplate, MissingTemplateField,
    PackageManager,
};
use crate::mode::{Invocation, Mode, UnknownMode};
use crate::package::PackageInfo;
use crate::process::{Launcher, SystemLauncher};

/// Location of the project configuration, relative to the working directory.
pub const CONFIG_PATH: &str = "config/config.json";

/// Failures of a run. Everything except [`RunError::UnknownMode`] is fatal and
/// ends the process with a non-zero exit code; the exit code of the docker
/// child itself is only ever reported, never turned into an error.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    UnknownMode(#[from] UnknownMode),
    #[error("config/config.json must exist to run docker scripts")]
    ConfigFileMissing { path: PathBuf },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("config.json missing docker section")]
    MissingDockerSection,
    #[error("config.json missing hydra section, needed to generate a Dockerfile")]
    MissingHydraSection,
    #[error(transparent)]
    IncompleteDockerSection(#[from] MissingTemplateField),
    #[error("unable to determine package name and version: {0:#}")]
    MissingPackageInfo(anyhow::Error),
    #[error("Error writing Dockerfile {path}: {source}")]
    DockerfileWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Error writing .dockerignore {path}: {source}")]
    DockerignoreWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RunError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RunError::UnknownMode(_))
    }
}

/// What a completed run dispatched.
#[derive(Debug)]
pub struct Dispatch {
    pub mode: Mode,
    pub invocation: Invocation,
    pub generated_dockerfile: bool,
    /// `None` when the child could not be started or ended by signal.
    pub exit_code: Option<i32>,
}

pub struct ScriptRunner<L = SystemLauncher> {
    root: PathBuf,
    package: Option<PackageInfo>,
    npm_token: Option<String>,
    launcher: L,
}

impl ScriptRunner<SystemLauncher> {
    /// Runner for the current process: package info and registry token come
    /// from the environment.
    pub fn from_env(root: impl Into<PathBuf>) -> Self {
        ScriptRunner::new(root, PackageInfo::from_env(), SystemLauncher::from_env())
            .with_npm_token(std::env::var("NPM_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}

impl<L: Launcher> ScriptRunner<L> {
    pub fn new(root: impl Into<PathBuf>, package: Option<PackageInfo>, launcher: L) -> Self {
        Self {
            root: root.into(),
            package,
            npm_token: None,
            launcher,
        }
    }

    pub fn with_npm_token(mut self, npm_token: Option<String>) -> Self {
        self.npm_token = npm_token;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run(&self, mode: &str) -> Result<Dispatch, RunError> {
        let mode: Mode = mode.parse()?;

        let config_path = self.root.join(CONFIG_PATH);
        if !config_path.exists() {
            return Err(RunError::ConfigFileMissing { path: config_path });
        }

        let config = ConfigLoader::new(&self.root).resolve(Some(ConfigSource::File(
            PathBuf::from(".").join(CONFIG_PATH),
        )))?;
        let docker = config.docker()?.ok_or(RunError::MissingDockerSection)?;

        let mut generated_dockerfile = false;
        if mode == Mode::Build {
            if docker.include_dockerignore {
                self.ensure_dockerignore()?;
            }

            let dockerfile = self.root.join(DOCKERFILE);
            if dockerfile.exists() {
                println!("Dockerfile already exists, running docker build...");
            } else {
                println!("No Dockerfile found, loading config.json and generating one...");
                let hydra = config.hydra()?.ok_or(RunError::MissingHydraSection)?;
                let text = DockerfileTemplate::new(
                    &docker,
                    &hydra,
                    PackageManager::detect(&self.root),
                )?
                .generate();
                fs::write(&dockerfile, text).map_err(|source| RunError::DockerfileWrite {
                    path: dockerfile.clone(),
                    source,
                })?;
                println!("Wrote Dockerfile");
                generated_dockerfile = true;
            }
        }

        let invocation = self.invocation(mode, &docker)?;
        let exit_code = self.dispatch(mode, &invocation);

        Ok(Dispatch {
            mode,
            invocation,
            generated_dockerfile,
            exit_code,
        })
    }

    fn ensure_dockerignore(&self) -> Result<(), RunError> {
        let path = self.root.join(DOCKERIGNORE);
        if path.exists() {
            return Ok(());
        }
        fs::write(&path, DEFAULT_DOCKERIGNORE).map_err(|source| RunError::DockerignoreWrite {
            path: path.clone(),
            source,
        })?;
        println!("wrote .dockerignore");
        Ok(())
    }

    fn package(&self) -> Result<PackageInfo, RunError> {
        match &self.package {
            Some(info) => Ok(info.clone()),
            None => PackageInfo::from_package_json(&self.root).map_err(RunError::MissingPackageInfo),
        }
    }

    fn invocation(&self, mode: Mode, docker: &DockerSection) -> Result<Invocation, RunError> {
        let tag = self.package()?.tag(&docker.organization);
        Ok(mode.invocation(&tag, &self.root, self.npm_token.as_deref()))
    }

    /// Child failures are logged and otherwise swallowed.
    fn dispatch(&self, mode: Mode, invocation: &Invocation) -> Option<i32> {
        println!("Running '{}'", invocation.command_line());
        match self.launcher.launch(invocation) {
            Ok(code) => {
                match code {
                    Some(code) => println!("docker {mode} exited with code {code}"),
                    None => println!("docker {mode} was terminated by a signal"),
                }
                code
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(mode = %mode, error = %message, "docker failed to start");
                println!("docker {mode} failed to start: {err:#}");
                None
            }
        }
    }
}
