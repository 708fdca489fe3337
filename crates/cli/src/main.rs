fn main() {
    inkleaf_cli::init_tracing();
    if let Err(error) = inkleaf_cli::run(std::env::args_os()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}
