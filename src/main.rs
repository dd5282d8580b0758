use labgate::argv::ArgVector;
use labgate::config::Config;
use labgate::dispatch::RouteTable;
use labgate::logging;
use tracing::{debug, warn};

fn main() {
    // Quiet unless asked: the dispatcher's stderr belongs to the entrypoint
    logging::init("warn");

    let argv = ArgVector::from_env().normalize();
    let routes = route_table();

    debug!(
        program = ?argv.program(),
        args = ?argv.user_args(),
        routes = ?routes.keywords().collect::<Vec<_>>(),
        "Dispatching"
    );

    routes.select(argv).transfer()
}

/// Routes from the configuration file, or the built-in table if there is none
/// or it cannot be loaded
fn route_table() -> RouteTable {
    let Some(path) = Config::discover() else {
        return RouteTable::builtin();
    };

    match Config::load(&path) {
        Ok(config) => config.dispatch.route_table(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unusable configuration, using built-in routes");
            RouteTable::builtin()
        }
    }
}
