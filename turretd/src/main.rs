// SPDX-License-Identifier: BSD-3-Clause

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};

use bunker::unlock::NoConsole;
use turretd::{Config, State, Supervisor};

#[derive(Debug, Parser)]
struct Cli {
    /// Directory holding bunker.age, host.identity, the two sockets, and
    /// the pid file.
    #[arg(long, default_value = "/var/lib/turretd")]
    state_dir: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fire up and engage: decrypt the bunker, bind both sockets, run until
    /// signaled.
    Start,
    /// Disengage a running turretd.
    Stop,
    /// Report whether a turretd is running against this state directory.
    Status,
}

fn main() {
    env_logger::init();
    let args = Cli::parse();
    let config = Config::new(args.state_dir);

    let result = match args.command {
        Command::Start => start(config),
        Command::Stop => stop(config),
        Command::Status => status(config),
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn start(config: Config) -> Result<(), turretd::TurretError> {
    let supervisor = Arc::new(Mutex::new(Supervisor::new(config)));

    supervisor.lock().unwrap().fire_up(&NoConsole)?;
    supervisor.lock().unwrap().engage()?;

    {
        let supervisor = Arc::clone(&supervisor);
        ctrlc::set_handler(move || {
            log::info!("signal received, disengaging");
            supervisor.lock().unwrap().disengage();
            std::process::exit(0);
        })
        .expect("failed to install signal handler");
    }

    log::info!("turretd engaged");
    loop {
        std::thread::park();
    }
}

fn stop(config: Config) -> Result<(), turretd::TurretError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid_text = std::fs::read_to_string(&config.pid_file_path)?;
    let pid: i32 = pid_text.trim().parse().unwrap_or(0);
    if pid <= 0 {
        println!("no turretd pid on record at {:?}", config.pid_file_path);
        return Ok(());
    }

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => println!("sent SIGTERM to turretd (pid {pid})"),
        Err(e) => println!("no running turretd with pid {pid} ({e})"),
    }
    Ok(())
}

fn status(config: Config) -> Result<(), turretd::TurretError> {
    match std::fs::read_to_string(&config.pid_file_path) {
        Ok(pid_text) => println!("turretd {:?} (pid file present, pid {})", State::Engaged, pid_text.trim()),
        Err(_) => println!("turretd {:?} (no pid file at {:?})", State::Cold, config.pid_file_path),
    }
    Ok(())
}
