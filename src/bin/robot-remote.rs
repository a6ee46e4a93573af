use clap::Parser;
use log::info;
use msgbox::IconType;
use robot_remote::{init_logging, run};
use robot_remote::cli::Args;
use robot_remote::error::{error_msgbox, AppRunError, ConfigError};

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!(concat!("Robot Remote ", env!("CARGO_PKG_VERSION")));

    let headless = args.command.is_some();

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) if !headless => {
            msgbox::create(
                concat!("Robot Remote ", env!("CARGO_PKG_VERSION")),
                "This application has already been started",
                IconType::Error,
            ).expect("Could not create msgbox");
            Ok(())
        },
        Err(err) if headless => Err(err),
        Err(err) => {
            error_msgbox("Unexpected error", &err);
            Err(err)
        }
        Ok(_) => Ok(())
    }
}
