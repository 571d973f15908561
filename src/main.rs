use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let code = docker_scripts::run_cli();
    if code != 0 {
        std::process::exit(code);
    }
}
