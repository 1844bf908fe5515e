//! Header names read from inbound requests.

use serde::{Deserialize, Serialize};

/// Header names consulted while capturing an event.
///
/// All names are matched case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    /// Forwarded-address header. The first comma separated entry wins; when the
    /// header is unset or missing the peer socket address is used.
    #[serde(default = "default_remote_addr")]
    pub remote_addr: Option<String>,

    #[serde(default = "default_browser")]
    pub browser: String,

    #[serde(default = "default_platform")]
    pub platform: String,

    #[serde(default = "default_operating_system")]
    pub operating_system: String,

    /// Presence of this header marks a request as frontend originated (CORS path).
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// HTTP method the frontend reports for the CORS event.
    #[serde(default = "default_frontend_method")]
    pub frontend_method: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            remote_addr: default_remote_addr(),
            browser: default_browser(),
            platform: default_platform(),
            operating_system: default_operating_system(),
            frontend_url: default_frontend_url(),
            frontend_method: default_frontend_method(),
        }
    }
}

fn default_remote_addr() -> Option<String> {
    Some("x-forwarded-for".to_string())
}

fn default_browser() -> String {
    "sec-ch-ua".to_string()
}

fn default_platform() -> String {
    "sec-ch-ua-platform".to_string()
}

fn default_operating_system() -> String {
    "gnome-shell-session-mode".to_string()
}

fn default_frontend_url() -> String {
    "x-frontend-url".to_string()
}

fn default_frontend_method() -> String {
    "x-url-method".to_string()
}
