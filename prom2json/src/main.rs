use std::env;
use std::io;
use std::process;

use getopts::Options;
use log::{debug, error, LevelFilter};

use prom2json::cli::{options, parse, settings, usage};
use prom2json::{convert, write_json, Acquisition, Error, UsageError};

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    pretty_env_logger::formatted_builder().filter_level(level).init();
}

fn usage_failure(opts: &Options, program: &str, e: UsageError) -> ! {
    let e = Error::from(e);
    error!("{e}");
    eprint!("{}", usage(opts, program));
    process::exit(e.exit_code());
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("prom2json");
    let opts = options();

    let matches = match parse(&opts, args.get(1..).unwrap_or_default()) {
        Ok(m) => m,
        Err(e) => {
            init_logging(false);
            usage_failure(&opts, program, e);
        }
    };

    init_logging(matches.opt_present("verbose"));

    if matches.opt_present("help") {
        print!("{}", usage(&opts, program));
        return;
    }

    let settings = match settings(&matches) {
        Ok(settings) => settings,
        Err(e) => usage_failure(&opts, program, e),
    };
    debug!("resolved source: {}", settings.source);

    let acquisition = Acquisition::new(settings.source).with_timeout(settings.timeout);
    let result = convert(acquisition).and_then(|families| write_json(io::stdout().lock(), &families));
    if let Err(e) = result {
        error!("{e}");
        process::exit(e.exit_code());
    }
}
