//! CLI binary. All logic is in the library; main only maps the result to a
//! process exit code (the bitmask described in the checker).

fn main() {
    let code = honesty::cli::run();
    if code != 0 {
        std::process::exit(code);
    }
}
