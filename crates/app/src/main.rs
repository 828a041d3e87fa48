use std::process;

mod headless;
mod logging;
mod plan;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let level = match logging::level_from_args(&args) {
        Ok(level) => level,
        Err(err) => {
            eprintln!("voxdraw: {err}");
            process::exit(1);
        }
    };
    logging::setup_tracing(level);

    tracing::info!("voxdraw starting");

    if let Err(err) = headless::run(&args) {
        eprintln!("voxdraw error: {err}");
        process::exit(1);
    }
}
