use daemonsupervisor::cli::Cli;
use daemonsupervisor::logging::Logging;
use daemonsupervisor::Supervisor;

fn main() {
    let cli = Cli::init();

    if let Err(err) = Logging::try_init() {
        eprintln!("failed to initialize logging: {err}");
    }

    if cli.print_debug_info() {
        println!("daemonsupervisord {}", env!("CARGO_PKG_VERSION"));
        println!("config path: {}", cli.config_path().display());
        return;
    }

    let mut supervisor = match Supervisor::start(cli.config_path()) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            tracing::error!(%err, "startup failed");
            std::process::exit(1);
        }
    };

    supervisor.run();
    supervisor.shutdown();
}
