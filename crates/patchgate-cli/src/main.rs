use patchgate_cli::{cli, commands, logging};

#[tokio::main]
async fn main() {
    let matches = cli::command().get_matches();
    logging::init(matches.get_count("verbose"));

    let code = match commands::dispatch(&matches).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            commands::exit_code_for(&err)
        }
    };
    std::process::exit(code);
}
