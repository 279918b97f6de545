//! Core context (spec 3/9): the single owner of every collection a connection
//! might need. Kept under the name `Server` -- most of this module tree was
//! written against `&mut Server`, and a rename would only be cosmetic.

use crate::core::children::ChildTable;
use crate::core::slots::SlotTable;
use crate::core::throttle::ThrottleTable;
use crate::core::timers::TimerWheel;
use crate::prelude::*;
use std::net::SocketAddr;

/// Connection-slot tokens occupy `CONN_TOKEN_BASE..CONN_TOKEN_BASE + MAX_CONNECTIONS`.
pub const MAX_CONNECTIONS: usize = 1024;
/// Listener tokens occupy the low, reserved range below everything else.
pub const LISTENER_TOKEN_BASE: usize = 0;
pub const MAX_LISTENERS: usize = 16;
/// Reserved sentinel for the signal self-pipe, see `core::signals`.
pub const SIGNAL_TOKEN: Token = Token(MAX_LISTENERS);
pub const CONN_TOKEN_BASE: usize = SIGNAL_TOKEN.0 + 1;
/// CGI pipe tokens (stdin/stdout of a spawned child) are handed out above
/// this from `next_token`, never colliding with a listener or a slot.
pub const DYNAMIC_TOKEN_BASE: usize = CONN_TOKEN_BASE + MAX_CONNECTIONS;
/// Sentinel token for the recurring OCCASIONAL watchdog timer -- never
/// matched against a real connection or listener, only against its
/// `TimerKind`.
pub const WATCHDOG_TOKEN: Token = Token(usize::MAX);

const DEFAULT_SESSION_TTL: u64 = 3600;

pub struct Listener {
    pub socket: TcpListener,
    pub configs: Vec<Arc<ServerConfig>>,
    pub token: Token,
}

pub struct Server {
    pub app_config: AppConfig,
    pub listeners: Vec<Listener>,
    pub connections: SlotTable,
    pub cgi_to_client: HashMap<Token, Token>,
    pub next_token: usize,
    pub session_store: SessionStore,
    pub throttles: ThrottleTable,
    pub timers: TimerWheel,
    pub children: ChildTable,
    pub reload_requested: bool,
    pub graceful_stop: bool,
    pub shutting_down: bool,
    /// Set by the OCCASIONAL timer, cleared by each SIGALRM. If SIGALRM ever
    /// finds it still clear, the event loop has missed a full cycle and the
    /// process aborts (spec 5).
    pub watchdog_alive: bool,
}

impl Server {
    /// Groups server configs by `(host, port)`, binding one listener per
    /// distinct pair (the spec's virtual-hosting model: many `ServerConfig`s
    /// can share a single listening socket). Throttle groups and the CGI
    /// concurrency ceiling are aggregated globally rather than per-listener,
    /// since both throttling and reaping operate across the whole table.
    pub fn new(app_config: AppConfig, poll: &Poll) -> Result<Self> {
        let mut by_addr: HashMap<(String, u16), Vec<Arc<ServerConfig>>> = HashMap::new();
        let mut order: Vec<(String, u16)> = Vec::new();

        for cfg in &app_config.servers {
            let cfg = Arc::new(cfg.clone());
            for &port in &cfg.ports {
                let key = (cfg.host.clone(), port);
                if !by_addr.contains_key(&key) {
                    order.push(key.clone());
                }
                by_addr.entry(key).or_default().push(Arc::clone(&cfg));
            }
        }

        let mut listeners = Vec::new();
        for (idx, key) in order.iter().enumerate() {
            if idx >= MAX_LISTENERS {
                return Err("too many distinct (host, port) pairs for the reserved listener token range".into());
            }
            let addr: SocketAddr = format!("{}:{}", key.0, key.1).parse()?;
            let mut socket = TcpListener::bind(addr)?;
            let token = Token(LISTENER_TOKEN_BASE + idx);
            poll.registry()
                .register(&mut socket, token, Interest::READABLE)?;
            info!("listening on {}", addr);
            listeners.push(Listener {
                socket,
                configs: by_addr.remove(key).unwrap_or_default(),
                token,
            });
        }

        let all_throttles: Vec<ThrottleConfig> = app_config
            .servers
            .iter()
            .flat_map(|s| s.throttles.clone())
            .collect();
        let cgi_limit = app_config
            .servers
            .iter()
            .map(|s| s.cgi_limit)
            .max()
            .unwrap_or(crate::config::types::DEFAULT_CGI_LIMIT);

        Ok(Server {
            app_config,
            listeners,
            connections: SlotTable::with_capacity(MAX_CONNECTIONS, CONN_TOKEN_BASE),
            cgi_to_client: HashMap::new(),
            next_token: DYNAMIC_TOKEN_BASE,
            session_store: SessionStore::new(DEFAULT_SESSION_TTL),
            throttles: ThrottleTable::from_configs(&all_throttles),
            timers: TimerWheel::new(),
            children: ChildTable::new(cgi_limit),
            reload_requested: false,
            graceful_stop: false,
            shutting_down: false,
            watchdog_alive: true,
        })
    }

    pub fn listener_for(&self, token: Token) -> Option<&Listener> {
        self.listeners.iter().find(|l| l.token == token)
    }

    pub fn is_listener_token(&self, token: Token) -> bool {
        token.0 < LISTENER_TOKEN_BASE + MAX_LISTENERS && token != SIGNAL_TOKEN
    }

    pub fn is_connection_token(&self, token: Token) -> bool {
        token.0 >= CONN_TOKEN_BASE && token.0 < DYNAMIC_TOKEN_BASE
    }

    /// Graceful stop step 7: deregister and drop every listening socket so
    /// the mainloop stops accepting, while already-open connections keep
    /// draining. Idempotent -- a second call just finds nothing left.
    pub fn close_listeners(&mut self, poll: &Poll) {
        for mut listener in self.listeners.drain(..) {
            let _ = poll.registry().deregister(&mut listener.socket);
        }
    }
}
