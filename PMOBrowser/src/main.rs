//! PMOBrowser : navigation dans les serveurs multimédia du réseau local.

mod ui;

use std::env;
use std::path::Path;
use std::process;

use anyhow::{Context, Result, anyhow, bail};
use pmobrowser::logging::{init_tracing, resolve_log_file};
use pmobrowser::{
    ContentDirectoryClient, DesktopLauncher, DiscoverySettings, NavigationEngine, SsdpDiscovery,
};
use tracing::info;

use crate::ui::{App, restore_terminal, run_app};

const DEFAULT_LOG_FILE: &str = "pmobrowser.log";

struct AppOptions {
    config_dir: Option<String>,
    log_file: Option<String>,
}

fn main() -> Result<()> {
    // Install panic handler to restore terminal even on panic
    std::panic::set_hook(Box::new(|panic_info| {
        restore_terminal();
        eprintln!("\n\nPMOBrowser panicked: {:?}", panic_info);
        eprintln!("Terminal has been restored.");
    }));

    let options = resolve_options()?;
    let config = pmoconfig::init_config(options.config_dir.as_deref().unwrap_or(""))
        .context("Impossible de charger la configuration")?;

    let log_file = resolve_log_file(options.log_file, config.get_log_file()).unwrap_or_else(|| {
        Path::new(config.dir())
            .join(DEFAULT_LOG_FILE)
            .to_string_lossy()
            .to_string()
    });
    init_tracing(&config.get_log_min_level(), Some(&log_file));
    info!(
        config_dir = %config.dir(),
        log_file = %log_file,
        "Démarrage de PMOBrowser"
    );

    let discovery = SsdpDiscovery::new(DiscoverySettings::from_config(&config));
    let devices = discovery.receiver();
    let engine = NavigationEngine::new(
        ContentDirectoryClient::new(config.get_http_timeout()),
        discovery,
        DesktopLauncher::from_config(&config),
    );

    let mut app = App::new(engine, devices);
    app.start_discovery();
    run_app(app)
}

fn resolve_options() -> Result<AppOptions> {
    let mut args = env::args().skip(1);
    let mut options = AppOptions {
        config_dir: None,
        log_file: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requiert une valeur"))?;
                options.config_dir = Some(value);
            }
            "--log-file" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--log-file requiert une valeur"))?;
                options.log_file = Some(value);
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => bail!("Argument inconnu: {other}. Utilise --help pour l'aide."),
        }
    }
    Ok(options)
}

fn print_usage() {
    println!("Usage: PMOBrowser [--config <dir>] [--log-file <path>]");
    println!("Variables d'environnement:");
    println!("  PMOBROWSER_CONFIG  Répertoire de configuration (par défaut ./.pmobrowser puis ~/.pmobrowser)");
    println!("  PMOBROWSER_CONFIG__SECTION__KEY=valeur  Surcharge une valeur de config.yaml");
    println!(
        "  PMOBROWSER_LOG_FILE  Écrit les logs tracing dans ce fichier (append), par défaut {DEFAULT_LOG_FILE} dans le répertoire de configuration"
    );
    println!("  RUST_LOG  Filtre tracing (par défaut host.logger.min_level)");
}
