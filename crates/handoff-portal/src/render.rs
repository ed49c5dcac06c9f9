use std::fmt::Write as _;

use crate::catalog::Target;
use crate::history::HistoryEntry;
use crate::session::Flash;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

pub struct DashboardView<'a> {
    pub user_id: &'a str,
    pub display_name: Option<&'a str>,
    pub signed_in: bool,
    pub targets: &'a [Target],
    pub history: &'a [HistoryEntry],
    pub flashes: &'a [Flash],
}

const STYLE: &str = "body{font-family:sans-serif;margin:2rem;}\
table{border-collapse:collapse;margin-bottom:1.5rem;}\
td,th{border:1px solid #ccc;padding:.4rem .8rem;text-align:left;}\
.flash{padding:.5rem 1rem;margin-bottom:.5rem;}\
.flash.success{background:#e3f7e3;}.flash.error{background:#fbe3e3;}";

pub fn dashboard(view: &DashboardView<'_>) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Handoff Portal</title>\
         <style>{STYLE}</style></head><body><h1>Handoff Portal</h1>"
    );

    let who = view.display_name.unwrap_or(view.user_id);
    let _ = write!(html, "<p>Signed in as <strong>{}</strong>", escape_html(who));
    if view.signed_in {
        html.push_str(" &middot; <a href=\"/logout\">Sign out</a>");
    }
    html.push_str("</p>");

    for flash in view.flashes {
        let _ = write!(
            html,
            "<div class=\"flash {}\">{}</div>",
            flash.kind.as_str(),
            escape_html(&flash.message)
        );
    }

    html.push_str("<h2>Targets</h2><table><tr><th>Name</th><th>Address</th><th>User</th><th></th></tr>");
    for target in view.targets {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>\
             <form method=\"post\" action=\"/connect/{}\"><button type=\"submit\">Connect</button></form>\
             </td></tr>",
            escape_html(&target.name),
            escape_html(&target.ip),
            escape_html(&target.user),
            escape_html(&target.id)
        );
    }
    html.push_str("</table>");

    html.push_str("<h2>Recent requests</h2>");
    if view.history.is_empty() {
        html.push_str("<p>No requests yet.</p>");
    } else {
        html.push_str("<table><tr><th>Time</th><th>Target</th><th>Status</th></tr>");
        for entry in view.history {
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&entry.timestamp),
                escape_html(&entry.target_name),
                escape_html(&entry.status)
            );
        }
        html.push_str("</table>");
    }
    html.push_str(
        "<form method=\"post\" action=\"/reset\"><button type=\"submit\">Reset history</button></form>\
         </body></html>",
    );
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::demo_catalog;
    use crate::session::FlashKind;

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn dashboard_lists_targets_history_and_flashes() {
        let targets = demo_catalog();
        let history = vec![HistoryEntry {
            target_name: "Acme <Corp>".to_string(),
            timestamp: "12:00:00".to_string(),
            status: "SENT (201 OK)".to_string(),
        }];
        let flashes = vec![Flash {
            kind: FlashKind::Error,
            message: "Error from queue API: <boom>".to_string(),
        }];
        let html = dashboard(&DashboardView {
            user_id: "ops@example.com",
            display_name: None,
            signed_in: false,
            targets: &targets,
            history: &history,
            flashes: &flashes,
        });
        assert!(html.contains("action=\"/connect/cust_3\""));
        assert!(html.contains("Acme &lt;Corp&gt;"));
        assert!(html.contains("flash error"));
        assert!(html.contains("&lt;boom&gt;"));
        assert!(!html.contains("/logout"));
    }
}
