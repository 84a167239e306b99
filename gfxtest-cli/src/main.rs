fn main() {
    if let Err(e) = gfxtest_cli::run() {
        eprintln!("gfxtest: error: {e:#}");
        std::process::exit(1);
    }
}
