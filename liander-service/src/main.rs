fn main() {
    if let Err(err) = mijn_liander::app::run_service() {
        eprintln!("service startup failed: {err}");
        std::process::exit(1);
    }
}
