use config_derive::FromYaml;
use std::collections::HashMap;
use crate::config::parser::FromYaml; // Import trait
use crate::router::RoutingError;

// --- Constants ---
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";
pub const DEFAULT_READ_BUF_CAP: usize = 5000;
pub const DEFAULT_CGI_LIMIT: usize = 32;

#[derive(Debug, Clone, FromYaml)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub redirect_code: Option<u16>,
    pub root: String,
    pub default_file: String,
    pub cgi_ext: Option<String>,
    pub cgi_path: Option<String>,
    pub upload_dir: String,
    pub autoindex: bool,
    /// HTTP Basic auth gate for this route (spec 6: `Authorization`/401).
    /// `None` leaves the route open.
    pub auth: Option<AuthConfig>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            redirection: None,
            redirect_code: None,
            root: DEFAULT_ROOT.to_string(),
            default_file: DEFAULT_FILE.to_string(),
            cgi_ext: None,
            cgi_path: None,
            upload_dir: String::new(),
            autoindex: false,
            auth: None,
        }
    }
}

/// Plaintext HTTP Basic credentials for a single route. No htpasswd/crypt
/// support -- nothing in this stack brings a hashing crate, so the password
/// is compared as given.
#[derive(Debug, Clone, FromYaml)]
pub struct AuthConfig {
    pub realm: String,
    pub username: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            realm: "restricted".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// A single throttle band: requests whose URL matches `pattern` (a shell
/// glob, see `core::throttle::glob_match`) share a combined bandwidth budget
/// between `min_limit` and `max_limit` bytes/sec.
#[derive(Debug, Clone, FromYaml)]
pub struct ThrottleConfig {
    pub pattern: String,
    pub min_limit: usize,
    pub max_limit: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            pattern: "*".to_string(),
            min_limit: 0,
            max_limit: usize::MAX,
        }
    }
}

/// Hand-rolled bitfield mirroring the original server's per-vhost option
/// flags (kept as a plain `u8` rather than pulling in `bitflags`, matching
/// the rest of this config stack's preference for hand-rolled structures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerOptions(pub u8);

impl ServerOptions {
    pub const NO_LOG: u8 = 0b001;
    pub const PKS_ADD_MERGE_ONLY: u8 = 0b010;
    pub const VIRTUAL_HOST: u8 = 0b100;

    pub fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub root: String,
    pub error_pages: HashMap<u16, String>,
    pub client_max_body_size: usize,
    pub routes: Vec<RouteConfig>,
    pub throttles: Vec<ThrottleConfig>,
    pub cgi_limit: usize,
    pub sign_exclude: Option<String>,
    pub fastcgi_upstream: Option<String>,
    /// External OpenPGP engine invoked by `core::signing`/`handlers::pks` for
    /// "sign this byte range" / "import this byte range" (spec 1, 4.9):
    /// `{pgp_engine} sign <path>` and `{pgp_engine} import`/`lookup <search>`.
    /// `None` disables response signing and the `/pks/*` endpoints entirely.
    pub pgp_engine: Option<String>,
    pub pks_add_merge_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            root: DEFAULT_ROOT.to_string(),
            error_pages: HashMap::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            routes: Vec::new(),
            throttles: Vec::new(),
            cgi_limit: DEFAULT_CGI_LIMIT,
            sign_exclude: None,
            fastcgi_upstream: None,
            pgp_engine: None,
            pks_add_merge_only: false,
        }
    }
}

impl ServerConfig {
    /// Resolves the first route whose `path` prefixes the request URL,
    /// longest match first, rejecting methods the route doesn't list.
    pub fn find_route(&self, url: &str, method: &crate::http::Method) -> Result<&RouteConfig, RoutingError> {
        let mut candidates: Vec<&RouteConfig> = self
            .routes
            .iter()
            .filter(|r| url.starts_with(r.path.as_str()))
            .collect();
        candidates.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        let route = candidates.first().copied().ok_or(RoutingError::NotFound)?;
        let method_str = method.to_string();
        if !route.methods.iter().any(|m| m == &method_str) {
            return Err(RoutingError::MethodNotAllowed);
        }
        Ok(route)
    }

    pub fn options(&self) -> ServerOptions {
        let mut bits = 0u8;
        if self.server_name != "_" {
            bits |= ServerOptions::VIRTUAL_HOST;
        }
        if self.pks_add_merge_only {
            bits |= ServerOptions::PKS_ADD_MERGE_ONLY;
        }
        ServerOptions(bits)
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
    pub pid_file: Option<String>,
    pub log_file: Option<String>,
    pub read_buf_cap: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            pid_file: None,
            log_file: None,
            read_buf_cap: DEFAULT_READ_BUF_CAP,
        }
    }
}
