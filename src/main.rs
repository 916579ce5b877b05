fn main() {
    use clap::Parser;
    use std::error::Error;
    let args = moodle_book_sync::cli::Args::parse();
    let level = if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    if let Err(e) = moodle_book_sync::cli::run(&args) {
        eprintln!("Error: {}", e);
        if args.verbose {
            let mut source = e.source();
            while let Some(s) = source {
                eprintln!("  cause: {}", s);
                source = s.source();
            }
        }
        std::process::exit(e.exit_code());
    }
}
