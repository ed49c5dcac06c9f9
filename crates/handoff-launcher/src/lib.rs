pub mod autofill;
pub mod bootstrap;
pub mod client;
pub mod identity;
pub mod launch;
pub mod run;

pub use client::{fetch_url, polls_once, FetchOutcome, LauncherClient};
pub use launch::{console_command, LaunchPlan};
pub use run::{run, LauncherOptions, EXIT_FAILED, EXIT_OK};
