use env_logger::Env;

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => (
        {
            info!($($arg)*);
        }
    );
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => (
        {
            debug!($($arg)*);
        }
    );
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => (
        {
            error!($($arg)*);
        }
    );
}

/// Install an `env_logger` backend. When `verbose` is set and `RUST_LOG` is
/// not, logging defaults to the info level. Calling it more than once is a
/// no-op.
pub fn init(verbose: bool) {
    let env = if verbose {
        Env::default().default_filter_or("info")
    } else {
        Env::default()
    };
    let _ = env_logger::Builder::from_env(env).try_init();
}
