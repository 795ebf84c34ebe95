use std::process::ExitCode;

use clap::Parser;

use crate::app::{build_plan, exit_code, print_report, run_local};
use crate::args::LoadsimArgs;
use crate::config::{apply_config, load_config};
use crate::error::AppResult;
use crate::shutdown::shutdown_channel;

/// Exit code for invalid arguments, config or internal failures.
const EXIT_ERROR: u8 = 1;

pub(crate) fn run() -> ExitCode {
    let args = match LoadsimArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_ERROR } else { 0 };
            if let Err(io_err) = err.print() {
                eprintln!("{}", io_err);
            }
            return ExitCode::from(code);
        }
    };

    crate::logger::init_logging(args.verbose);

    match run_with_args(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run_with_args(mut args: LoadsimArgs) -> AppResult<u8> {
    if let Some(config) = load_config(args.config.as_deref())? {
        apply_config(&mut args, &config)?;
    }
    let plan = build_plan(&args)?;
    let output_format = plan.output_format;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(async {
        let (shutdown_tx, _shutdown_rx) = shutdown_channel();
        run_local(plan, &shutdown_tx).await
    })?;

    print_report(&report, output_format)?;
    Ok(exit_code(&report))
}
