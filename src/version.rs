/// Version reported by `--version` and the startup log. A build can pin it
/// through the `UIDWATCH_VERSION` environment variable.
pub const VERSION: &str = match option_env!("UIDWATCH_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
