//! Entry point for `linelogd`, the append-and-replay server.
//!
//! Responsibilities, in order:
//!
//! 1. **Configuration**: load and validate [`Settings`].
//! 2. **Logging**: `env_logger` on stderr, `RUST_LOG` overriding the
//!    configured default level.
//! 3. **Daemonisation**: any positional argument other than `"d"` detaches
//!    the server (fork, parent exits 0, child continues in a new session).
//!    The fork happens before the tokio runtime exists, while the process
//!    is still single-threaded.
//! 4. **Serving**: build the runtime, install the signal-driven shutdown
//!    flag, bind, and run the accept loop until shutdown.
//!
//! Initialisation failures are logged and exit non-zero; a signal-driven
//! shutdown exits 0.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use linelog::config::Settings;
use linelog::network::server::{shutdown_signal, Server};

#[derive(Parser)]
#[command(name = "linelogd")]
#[command(about = "Line-oriented append-and-replay TCP service", long_about = None)]
struct Cli {
    /// Run detached from the terminal unless this is exactly "d"
    daemon: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new(None).context("invalid configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.clone()),
    )
    .init();

    if cli.daemon.as_deref().is_some_and(|arg| arg != "d") {
        daemonize().context("failed to daemonise")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let outcome = runtime.block_on(async {
        let shutdown = shutdown_signal()?;
        let server = Server::bind(&settings)?;
        server.run(shutdown).await
    });

    if let Err(err) = &outcome {
        error!("server failed: {:#}", err);
    } else {
        info!("clean shutdown");
    }
    outcome
}

/// Forks into the background: the parent exits 0, the child continues in a
/// new session.
fn daemonize() -> Result<()> {
    // SAFETY: called before the runtime starts, while the process is still
    // single-threaded; fork/setsid have no other threads to corrupt.
    #[allow(unsafe_code)]
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(std::io::Error::last_os_error()).context("fork"),
        0 => {
            #[allow(unsafe_code)]
            let sid = unsafe { libc::setsid() };
            if sid == -1 {
                return Err(std::io::Error::last_os_error()).context("setsid");
            }
            Ok(())
        }
        _ => std::process::exit(0),
    }
}
