use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

pub const DOCKER: &str = "docker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Build,
    Run,
    Up,
    Push,
}

#[derive(Debug, Error)]
#[error("No such mode '{mode}'. Available modes: {}.", Mode::names())]
pub struct UnknownMode {
    pub mode: String,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Build, Mode::Run, Mode::Up, Mode::Push];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Build => "build",
            Mode::Run => "run",
            Mode::Up => "up",
            Mode::Push => "push",
        }
    }

    /// Comma separated list of every valid mode, in dispatch table order.
    pub fn names() -> String {
        Mode::ALL
            .iter()
            .map(|mode| mode.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The `docker` invocation this mode maps to.
    pub fn invocation(self, tag: &str, context: &Path, npm_token: Option<&str>) -> Invocation {
        let (args, stdio) = match self {
            Mode::Build => {
                let mut args = vec!["build".to_string()];
                if let Some(token) = npm_token {
                    args.push("--build-arg".to_string());
                    args.push(format!("NPM_TOKEN={token}"));
                }
                args.push("-t".to_string());
                args.push(tag.to_string());
                args.push(context.display().to_string());
                (args, StdioMode::Inherit)
            }
            Mode::Run => (
                vec!["run".to_string(), "-it".to_string(), tag.to_string()],
                StdioMode::Inherit,
            ),
            Mode::Up => (
                vec!["run".to_string(), "-d".to_string(), tag.to_string()],
                StdioMode::Detached,
            ),
            Mode::Push => (vec!["push".to_string(), tag.to_string()], StdioMode::Default),
        };

        Invocation {
            program: DOCKER.to_string(),
            args,
            stdio,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == raw)
            .ok_or_else(|| UnknownMode {
                mode: raw.to_string(),
            })
    }
}

/// How the child's standard streams relate to ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    Inherit,
    /// Own process group, no stdin, output captured.
    Detached,
    /// Leave the platform defaults alone.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdio: StdioMode,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
