use std::path::PathBuf;

use reelfeed::app::RunOptions;

const HELP: &str = "reelfeed - Scroll a vertical short-video feed from the terminal.

  --version, -V        Show version and exit
  --help,    -h        Show this help message
  --mock               Use the built-in sample feed instead of the backend
  --config <path>      Read settings from <path> instead of ~/.config/reelfeed/config.yaml";

enum Cli {
    Exit,
    Run(RunOptions),
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Exit) => return,
        Ok(Cli::Run(options)) => options,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = reelfeed::app::run_with(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut options = RunOptions::default();
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("reelfeed {}", reelfeed::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Cli::Exit);
            }
            "--mock" => options.mock = true,
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config needs a path".to_string())?;
                options.config_file = Some(PathBuf::from(path));
            }
            other => return Err(format!("unknown argument {other:?}")),
        }
    }
    Ok(Cli::Run(options))
}
