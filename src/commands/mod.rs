use std::path::PathBuf;

use launchpad::Environment;

pub type CmdResult<T> = launchpad::Result<(T, i32)>;

pub struct GlobalArgs {
    /// Explicit configuration file, overriding the default lookup.
    pub config: Option<PathBuf>,
}

pub mod deploy;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($environment:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($environment, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (launchpad::Result<serde_json::Value>, i32) {
    crate::tty::status("launchpad is working...");

    match command {
        crate::Commands::Production => dispatch!(Environment::Production, global, deploy),
        crate::Commands::Staging => dispatch!(Environment::Staging, global, deploy),
        crate::Commands::Development => dispatch!(Environment::Development, global, deploy),
    }
}
