#![forbid(unsafe_code)]

fn main() {
    fw_shell::logging::init();
    if let Err(error) = fw_shell::run_from_env() {
        eprintln!("fieldwatch-shell: {error}");
        std::process::exit(error.exit_code());
    }
}
