fn main() {
    if let Err(err) = mijn_liander::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
