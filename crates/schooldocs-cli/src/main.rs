mod cli;

fn main() {
    if let Err(e) = cli::run() {
        if !e.is::<cli::Reported>() {
            eprintln!("{e:#}"); // full anyhow chain
        }
        std::process::exit(1);
    }
}
