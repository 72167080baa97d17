//! Logger installation.
//!
//! Everything in the crate logs through the `log` facade; this module only picks
//! a backend for the host platform.

use log::LevelFilter;

/// Installs the platform logger with `level` as the default maximum level.
///
/// On Android this is `android_logger` (visible in logcat under the `VncSink`
/// tag). Everywhere else `env_logger` is used, so `RUST_LOG` overrides `level`.
/// Calling this more than once is harmless.
#[cfg(target_os = "android")]
pub fn init(level: LevelFilter) {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag("VncSink"),
    );
}

#[cfg(not(target_os = "android"))]
pub fn init(level: LevelFilter) {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str()),
    )
    .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init(LevelFilter::Debug);
        init(LevelFilter::Info);
        log::debug!("logger initialised");
    }
}
