use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// A managed target the operator can connect to.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ip", &self.ip)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<set>"))
            .finish()
    }
}

fn demo(id: &str, name: &str, ip: &str, user: &str) -> Target {
    Target {
        id: id.to_string(),
        name: name.to_string(),
        ip: ip.to_string(),
        user: user.to_string(),
        password: None,
    }
}

pub fn demo_catalog() -> Vec<Target> {
    vec![
        demo("cust_1", "Acme Corp (Firewall A)", "10.0.1.5", "admin"),
        demo("cust_2", "Globex Inc (Firewall B)", "192.168.10.20", "admin"),
        demo("cust_3", "Soylent Corp (Firewall C)", "172.16.0.5", "readonly"),
    ]
}

pub fn load_catalog(path: &Path) -> anyhow::Result<Vec<Target>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    let targets: Vec<Target> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing catalog {}", path.display()))?;
    let mut seen = std::collections::HashSet::new();
    for target in &targets {
        if target.id.trim().is_empty() {
            anyhow::bail!("catalog {} has a target without an id", path.display());
        }
        if !seen.insert(target.id.as_str()) {
            anyhow::bail!("catalog {} repeats target id `{}`", path.display(), target.id);
        }
    }
    Ok(targets)
}

pub fn find_target<'a>(catalog: &'a [Target], id: &str) -> Option<&'a Target> {
    catalog.iter().find(|t| t.id == id)
}
