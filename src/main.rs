fn main() {
    if let Err(e) = intercept::run() {
        intercept::report_error(&e);
        std::process::exit(1);
    }
}
