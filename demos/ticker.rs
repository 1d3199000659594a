//! A ticker daemon controlled through its PID file.
//!
//! ```text
//! cargo run --example ticker -- start
//! cargo run --example ticker -- stop
//! ```

use std::env;
use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use daemon_context::{DaemonContext, DaemonError, Detachment, SignalAction, SignalMap};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let pwd = env::current_dir()?;
    let log_path = pwd.join("ticker.log");
    let pid_path = pwd.join("ticker.pid");

    let term = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&term);
    let mut signals = SignalMap::default();
    signals.insert(
        libc::SIGTERM,
        SignalAction::handler(move || flag.store(true, Ordering::Relaxed)),
    );

    let log = OpenOptions::new().create(true).append(true).open(&log_path)?;
    let mut ctx = DaemonContext::new()
        .pidfile(&pid_path)
        .working_directory(Some(&pwd))
        .stdout(log.try_clone()?)
        .stderr(log)
        .signal_map(signals);

    match env::args().nth(1).as_deref() {
        Some("start") => {
            println!("Launching ticker, logging to {}", log_path.display());
            if ctx.start()? != Detachment::Daemon {
                return Ok(());
            }

            println!("[Ticker] started, pid {}", std::process::id());
            let mut i = 0u64;
            while !term.load(Ordering::Relaxed) {
                println!("[Ticker] ping #{i}");
                i += 1;
                thread::sleep(Duration::from_secs(3));
            }

            println!("[Ticker] stop requested, shutting down");
            // `ticker stop` may already have removed the pidfile.
            match ctx.stop() {
                Ok(()) | Err(DaemonError::NotRunning { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Some("stop") => match ctx.terminate_recorded()? {
            Some(pid) => println!("stopped ticker (pid {pid})"),
            None => println!("ticker pidfile vanished before it could be read"),
        },
        _ => {
            eprintln!("usage: ticker start|stop");
            std::process::exit(2);
        }
    }
    Ok(())
}
