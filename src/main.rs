use gatekeepd::config;
use gatekeepd::config::parser::FromYaml;
use gatekeepd::core::context::Server;
use gatekeepd::core::mainloop;
use gatekeepd::core::signals::SignalPipe;
use gatekeepd::prelude::*;

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| format!("reading {}: {}", config_path, e))?;
    let mut app_config = AppConfig::from_str(&content)?;
    app_config.servers = config::validate_configs(app_config.servers);

    if let Some(log_file) = &app_config.log_file {
        proxy_log::use_file(log_file)?;
    }

    config::display_config(&app_config.servers);

    if let Some(pid_file) = &app_config.pid_file {
        std::fs::write(pid_file, std::process::id().to_string())?;
    }

    let mut poll = Poll::new()?;
    let mut signals = SignalPipe::register(&poll)?;
    let mut server = Server::new(app_config, &poll)?;

    info!("gatekeepd started, pid {}", std::process::id());
    mainloop::run(&mut server, &mut poll, &mut signals)
}
