//! `keystoned` -- the DNSSEC key lifecycle manager and zone signer
//! coordination daemon. See `spec.md` §§4-6.

use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{crate_authors, crate_version};
use keystoned::api;
use keystoned::center::Center;
use keystoned::clock::SystemClock;
use keystoned::config::Config;
use keystoned::contracts::dshook::ShellDsHook;
use keystoned::error::ExitError;
use keystoned::log::Logger;
use keystoned::scheduler::task::{Task, TaskKind};
use keystoned::scheduler::worker_pool;
use tracing::{error, info};

fn main() -> ExitCode {
    let cmd = clap::Command::new("keystoned")
        .version(crate_version!())
        .author(crate_authors!())
        .next_line_help(true)
        .arg(
            clap::Arg::new("config")
                .long("config")
                .short('c')
                .default_value("/etc/keystoned/keystoned.toml")
                .help("Path to the daemon's TOML configuration file"),
        )
        .arg(
            clap::Arg::new("check_config")
                .long("check-config")
                .action(clap::ArgAction::SetTrue)
                .help("Check the configuration and exit"),
        );
    let matches = cmd.get_matches();
    let config_path = Utf8PathBuf::from(matches.get_one::<String>("config").unwrap());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("keystoned couldn't be configured: {error}");
            return ExitCode::from(78);
        }
    };

    if matches.get_flag("check_config") {
        return ExitCode::SUCCESS;
    }

    let logger = match Logger::launch(&config.logging) {
        Ok(logger) => logger,
        Err(error) => {
            eprintln!("keystoned couldn't set up logging: {error}");
            return ExitCode::from(78);
        }
    };
    let _ = logger;

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Couldn't start Tokio: {error}");
            return ExitCode::from(74);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err.message);
            ExitCode::from(err.code)
        }
    }
}

async fn run(config: Config) -> Result<(), ExitError> {
    let num_workers = config.daemon.num_workers;
    let http_listen = config.daemon.http_listen;
    let base_dir = config.daemon.base_dir.clone();
    let ds_hook_config = config.ds_hook.clone();

    #[cfg(feature = "test-fakes")]
    let (persistence, keystore): (
        Arc<dyn keystoned::contracts::Persistence>,
        Arc<dyn keystoned::contracts::Keystore>,
    ) = (
        Arc::new(keystoned::contracts::fakes::FakePersistence::new()),
        Arc::new(keystoned::contracts::fakes::FakeKeystore::new()),
    );
    #[cfg(not(feature = "test-fakes"))]
    compile_error!(
        "keystoned has no real Keystore/Persistence backend yet (spec.md §1 \"Out of scope\"); \
         build with the default `test-fakes` feature, or link in real adaptors"
    );

    let ds_hook = Arc::new(ShellDsHook {
        submit_command: ds_hook_config.submit_command.as_ref().map(|p| p.resolve(&base_dir)),
        retract_command: ds_hook_config.retract_command.as_ref().map(|p| p.resolve(&base_dir)),
    });

    let center = Center::new(config, Arc::new(SystemClock), persistence, keystore, ds_hook);

    bootstrap_zone_tasks(&center).await?;

    let workers = worker_pool::spawn_pool(center.clone(), num_workers);

    let listener = tokio::net::TcpListener::bind(http_listen)
        .await
        .map_err(|e| ExitError::new(format!("binding control API to {http_listen}: {e}"), 74))?;
    info!(%http_listen, "control API listening");
    let router = api::router(center.clone());
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                return Err(ExitError::new(format!("listening for SIGINT failed: {err}"), 74));
            }
            info!("shutting down");
        }
        res = server => {
            match res {
                Ok(Err(err)) => return Err(ExitError::new(format!("control API server failed: {err}"), 74)),
                Err(err) => return Err(ExitError::new(format!("control API task panicked: {err}"), 74)),
                Ok(Ok(())) => {}
            }
        }
    }

    center.begin_shutdown();
    for worker in workers {
        let _ = worker.await;
    }

    Ok(())
}

/// Ensures every persisted zone has an `enforce` task scheduled, so a
/// freshly-started daemon picks up zones left pending from a previous run
/// (`spec.md` §4.2).
async fn bootstrap_zone_tasks(center: &Arc<Center>) -> Result<(), ExitError> {
    let names = center
        .persistence
        .zone_names()
        .await
        .map_err(|e| ExitError::new(format!("listing zones: {e}"), 69))?;
    for name in names {
        let task = Task::whenever(name, TaskKind::Enforce);
        if let Err(err) = center.schedule.push(task).await {
            error!(%err, "failed to schedule bootstrap enforce task");
        }
    }
    Ok(())
}
