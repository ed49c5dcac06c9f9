/// Canonical form of a user id used as the mailbox key.
///
/// UPNs compare case-insensitively, and `whoami /upn` inside the desktop session
/// does not always match the casing the identity provider hands the portal.
pub fn normalize_user_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}
