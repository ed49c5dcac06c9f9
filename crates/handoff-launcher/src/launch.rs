use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use handoff_types::ConnectionPayload;
use tokio::process::{Child, Command};

pub const DEFAULT_CONSOLE_PATH: &str =
    r"C:\Program Files (x86)\CheckPoint\SmartConsole\R82\PROGRAM\SmartConsole.exe";
pub const DEFAULT_CONSOLE_DIR: &str =
    r"C:\Program Files (x86)\CheckPoint\SmartConsole\R82\PROGRAM";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Prefills `-u` and `-s` only; the password never goes on the command line.
pub fn console_command(
    program: PathBuf,
    cwd: Option<PathBuf>,
    payload: &ConnectionPayload,
    pass_args: bool,
) -> LaunchPlan {
    let mut args = Vec::new();
    if pass_args {
        if let Some(username) = payload.username.as_deref().filter(|v| !v.is_empty()) {
            args.push("-u".to_string());
            args.push(username.to_string());
        }
        if let Some(target) = payload.target_ip.as_deref().filter(|v| !v.is_empty()) {
            args.push("-s".to_string());
            args.push(target.to_string());
        }
    }
    LaunchPlan {
        program,
        args,
        cwd: cwd.filter(|dir| !dir.as_os_str().is_empty()),
    }
}

impl LaunchPlan {
    pub fn program_exists(&self) -> bool {
        self.program.exists()
    }

    pub fn spawn(&self) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command
            .spawn()
            .with_context(|| format!("failed to start {}", self.program.display()))
    }
}
