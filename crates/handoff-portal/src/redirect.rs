use reqwest::Url;

pub const DEFAULT_WEB_CLIENT_URL: &str =
    "https://client.wvd.microsoft.com/arm/webclient/index.html";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VdiConfig {
    pub web_client_url: Option<String>,
    pub workspace_id: Option<String>,
    pub resource_id: Option<String>,
}

/// Where the browser goes after a request has been queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdiRedirect {
    /// `ms-avd:connect` URI handled by the installed desktop client.
    ConnectUri {
        workspace_id: String,
        resource_id: String,
    },
    WebClient(String),
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn web_client_url(base: Option<&str>) -> String {
    base.map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_WEB_CLIENT_URL)
        .to_string()
}

pub fn avd_connect_uri(workspace_id: &str, resource_id: &str, username: &str) -> String {
    // `Url` does not serialize query pairs for cannot-be-a-base schemes, so build by hand.
    let query = Url::parse("http://placeholder/")
        .map(|mut url| {
            url.query_pairs_mut()
                .append_pair("workspaceid", workspace_id)
                .append_pair("resourceid", resource_id)
                .append_pair("username", username)
                .append_pair("version", "0");
            url.query().unwrap_or_default().to_string()
        })
        .unwrap_or_default();
    format!("ms-avd:connect?{query}")
}

impl VdiRedirect {
    pub fn from_config(config: &VdiConfig) -> Option<Self> {
        if let (Some(workspace_id), Some(resource_id)) =
            (non_blank(&config.workspace_id), non_blank(&config.resource_id))
        {
            return Some(VdiRedirect::ConnectUri {
                workspace_id: workspace_id.to_string(),
                resource_id: resource_id.to_string(),
            });
        }
        let base = non_blank(&config.web_client_url)?;
        Url::parse(base).ok()?;
        Some(VdiRedirect::WebClient(web_client_url(Some(base))))
    }

    pub fn location(&self, user_id: &str) -> String {
        match self {
            VdiRedirect::ConnectUri {
                workspace_id,
                resource_id,
            } => avd_connect_uri(workspace_id, resource_id, user_id),
            VdiRedirect::WebClient(url) => url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_uri_encodes_parameters() {
        assert_eq!(
            avd_connect_uri("ws-1", "res 2", "ops@example.com"),
            "ms-avd:connect?workspaceid=ws-1&resourceid=res+2&username=ops%40example.com&version=0"
        );
    }

    #[test]
    fn from_config_prefers_connect_uri() {
        let config = VdiConfig {
            web_client_url: Some(DEFAULT_WEB_CLIENT_URL.to_string()),
            workspace_id: Some("ws".to_string()),
            resource_id: Some("res".to_string()),
        };
        let redirect = VdiRedirect::from_config(&config).expect("redirect");
        assert!(redirect.location("u@x").starts_with("ms-avd:connect?"));

        let config = VdiConfig {
            resource_id: Some(" ".to_string()),
            ..config
        };
        assert_eq!(
            VdiRedirect::from_config(&config),
            Some(VdiRedirect::WebClient(DEFAULT_WEB_CLIENT_URL.to_string()))
        );

        assert_eq!(VdiRedirect::from_config(&VdiConfig::default()), None);
        assert_eq!(
            VdiRedirect::from_config(&VdiConfig {
                web_client_url: Some("not a url".to_string()),
                ..VdiConfig::default()
            }),
            None
        );
    }

    #[test]
    fn web_client_url_defaults() {
        assert_eq!(web_client_url(None), DEFAULT_WEB_CLIENT_URL);
        assert_eq!(web_client_url(Some("  ")), DEFAULT_WEB_CLIENT_URL);
        assert_eq!(web_client_url(Some("https://vdi.example.com")), "https://vdi.example.com");
    }
}
