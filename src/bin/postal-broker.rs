#[macro_use]
extern crate lazy_static;

#[cfg(feature = "daemonize")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

use std::sync::atomic;
use std::time::Duration;

use chrono::prelude::*;
use clap::Parser;
use colored::Colorize;
use log::{error, info, trace, Level, LevelFilter};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;

use postal::Config;

static SERVER_ACTIVE: atomic::AtomicBool = atomic::AtomicBool::new(true);

lazy_static! {
    static ref PID_FILE: Mutex<Option<String>> = Mutex::new(None);
}

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let s = format!(
                "{}  {}",
                Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
                record.args()
            );
            println!(
                "{}",
                match record.level() {
                    Level::Trace => s.black().dimmed(),
                    Level::Debug => s.dimmed(),
                    Level::Warn => s.yellow().bold(),
                    Level::Error => s.red(),
                    Level::Info => s.normal(),
                }
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: SimpleLogger = SimpleLogger;

fn set_verbose_logger(filter: LevelFilter) {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(filter))
        .unwrap();
}

#[derive(Parser)]
#[command(name = "postal-broker", about = "In-memory publish/subscribe message broker")]
struct Opts {
    /// Address to listen on, e.g. 0.0.0.0:8080
    #[arg(short = 'B', long = "bind", default_value = "0.0.0.0:8080")]
    bind: String,
    #[arg(short = 'P', long = "pid-file")]
    pid_file: Option<String>,
    /// Verbose (trace-level) logging
    #[arg(short = 'v')]
    verbose: bool,
    #[cfg(feature = "daemonize")]
    #[arg(short = 'D')]
    daemonize: bool,
    #[cfg(feature = "daemonize")]
    #[arg(long = "log-syslog")]
    log_syslog: bool,
    #[arg(short = 'w', default_value_t = 4)]
    workers: usize,
    #[arg(long = "buf-size", default_value_t = 16384)]
    buf_size: usize,
    #[arg(long = "unacked-timeout-secs", default_value_t = 5)]
    unacked_timeout_secs: u64,
    #[arg(long = "unacked-scan-interval-secs", default_value_t = 3)]
    unacked_scan_interval_secs: u64,
}

async fn terminate(allow_log: bool) {
    if let Some(f) = PID_FILE.lock().await.as_ref() {
        if allow_log {
            trace!("removing pid file {f}");
        }
        let _r = std::fs::remove_file(f);
    }
    if allow_log {
        info!("terminating");
    }
    SERVER_ACTIVE.store(false, atomic::Ordering::SeqCst);
}

macro_rules! handle_term_signal {
    ($kind: expr, $allow_log: expr) => {
        tokio::spawn(async move {
            trace!("starting handler for {:?}", $kind);
            loop {
                match signal($kind) {
                    Ok(mut v) => {
                        v.recv().await;
                    }
                    Err(e) => {
                        error!("unable to bind to signal {:?}: {}", $kind, e);
                        break;
                    }
                }
                if $allow_log {
                    trace!("got termination signal");
                }
                terminate($allow_log).await
            }
        });
    };
}

fn main() {
    let opts = Opts::parse();

    #[cfg(feature = "daemonize")]
    let use_syslog = (opts.daemonize
        && std::env::var("DISABLE_SYSLOG").unwrap_or_else(|_| "0".to_owned()) != "1")
        || opts.log_syslog;
    #[cfg(not(feature = "daemonize"))]
    let use_syslog = false;

    if opts.verbose {
        set_verbose_logger(LevelFilter::Trace);
    } else if !use_syslog {
        set_verbose_logger(LevelFilter::Info);
    } else {
        #[cfg(feature = "daemonize")]
        {
            let formatter = syslog::Formatter3164 {
                facility: syslog::Facility::LOG_USER,
                hostname: None,
                process: "postal-broker".into(),
                pid: 0,
            };
            match syslog::unix(formatter) {
                Ok(logger) => {
                    log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
                        .map(|()| log::set_max_level(LevelFilter::Info))
                        .unwrap();
                }
                Err(_) => set_verbose_logger(LevelFilter::Info),
            }
        }
    }

    let listen_addr = opts.bind.parse().unwrap_or_else(|e| {
        eprintln!("invalid bind address {:?}: {e}", opts.bind);
        std::process::exit(1);
    });

    let config = Config {
        listen_addr,
        unacked_scan_interval: Duration::from_secs(opts.unacked_scan_interval_secs),
        unacked_timeout: Duration::from_secs(opts.unacked_timeout_secs),
        buf_size: opts.buf_size,
        consumer_queue_size: 1,
    };

    info!(
        "starting postal broker, {} workers, buf size: {}, unacked timeout: {:?}",
        opts.workers, config.buf_size, config.unacked_timeout
    );

    #[cfg(feature = "daemonize")]
    if opts.daemonize {
        if let Ok(fork::Fork::Child) = fork::daemon(true, false) {
            std::process::exit(0);
        }
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(opts.workers)
        .enable_all()
        .build()
        .unwrap();

    let exit_code = rt.block_on(async move {
        if let Some(pid_file) = opts.pid_file {
            let pid = std::process::id().to_string();
            if let Err(e) = tokio::fs::write(&pid_file, pid).await {
                error!("unable to write pid file {pid_file}: {e}");
                return 1;
            }
            info!("created pid file {pid_file}");
            PID_FILE.lock().await.replace(pid_file);
        }

        handle_term_signal!(SignalKind::interrupt(), false);
        handle_term_signal!(SignalKind::terminate(), true);

        let _server = match postal::serve(config).await {
            Ok(v) => v,
            Err(e) => {
                error!("unable to start broker: {e}");
                return 1;
            }
        };

        info!("postal broker started");
        let sleep_step = Duration::from_millis(100);
        while SERVER_ACTIVE.load(atomic::Ordering::SeqCst) {
            tokio::time::sleep(sleep_step).await;
        }
        0
    });

    std::process::exit(exit_code);
}
