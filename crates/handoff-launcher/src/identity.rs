use std::time::Duration;

use tokio::process::Command;

const WHOAMI_TIMEOUT: Duration = Duration::from_secs(5);

/// Session user id: `whoami /upn`, then `USERNAME`, then `USER`, then `"unknown"`.
pub async fn detect_user_id() -> String {
    match whoami_upn().await {
        Some(upn) => {
            tracing::info!("detected user id via whoami /upn: {}", upn);
            upn
        }
        None => {
            let fallback = fallback_user_id(
                std::env::var("USERNAME").ok(),
                std::env::var("USER").ok(),
            );
            tracing::info!("detected user id via fallback: {}", fallback);
            fallback
        }
    }
}

async fn whoami_upn() -> Option<String> {
    let output = Command::new("whoami")
        .arg("/upn")
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(WHOAMI_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {
            let upn = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!upn.is_empty()).then_some(upn)
        }
        Ok(Ok(output)) => {
            tracing::info!("whoami /upn exited with {}", output.status);
            None
        }
        Ok(Err(err)) => {
            tracing::info!("whoami /upn failed: {}", err);
            None
        }
        Err(_) => {
            tracing::info!("whoami /upn timed out after {:?}", WHOAMI_TIMEOUT);
            None
        }
    }
}

pub fn fallback_user_id(username: Option<String>, user: Option<String>) -> String {
    [username, user]
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `--override-user` wins when it is not blank.
pub async fn resolve_user_id(override_user: Option<&str>) -> String {
    if let Some(user) = override_user.map(str::trim).filter(|v| !v.is_empty()) {
        tracing::info!("using overridden user id: {}", user);
        return user.to_string();
    }
    detect_user_id().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_prefers_username_then_user() {
        assert_eq!(
            fallback_user_id(Some("ops".to_string()), Some("root".to_string())),
            "ops"
        );
        assert_eq!(
            fallback_user_id(Some("  ".to_string()), Some("root".to_string())),
            "root"
        );
        assert_eq!(fallback_user_id(None, None), "unknown");
    }

    #[tokio::test]
    async fn override_user_is_trimmed_and_wins() {
        assert_eq!(
            resolve_user_id(Some("  ops@example.com ")).await,
            "ops@example.com"
        );
    }
}
