use std::path::PathBuf;

use reddit_stream::app::RunOptions;

enum Cli {
    Exit,
    Run(RunOptions),
}

fn main() {
    let opts = match handle_cli_flags() {
        Ok(Cli::Exit) => return,
        Ok(Cli::Run(opts)) => opts,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(2);
        }
    };

    if let Err(err) = reddit_stream::run(opts) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> Result<Cli, String> {
    let mut saw_flag = false;
    let mut opts = RunOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("reddit-stream {}", reddit_stream::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "reddit-stream - follow live Reddit comment threads from the terminal.\n\n  --config <path>      Read configuration from <path>\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --check-updates      Check for updates and exit"
                );
                saw_flag = true;
            }
            "--check-updates" => {
                saw_flag = true;
                if let Err(err) = check_updates_once() {
                    eprintln!("Update check failed: {err:?}");
                    std::process::exit(1);
                }
            }
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config requires a path".to_string())?;
                opts.config_file = Some(PathBuf::from(path));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    opts.config_file = Some(PathBuf::from(path));
                } else {
                    return Err(format!("unknown argument {other:?} (see --help)"));
                }
            }
        }
    }
    Ok(if saw_flag { Cli::Exit } else { Cli::Run(opts) })
}

fn check_updates_once() -> anyhow::Result<()> {
    use semver::Version;

    let skip_env = reddit_stream::update::SKIP_UPDATE_ENV;
    if std::env::var(skip_env).is_ok() {
        println!("Update check skipped: {skip_env} is set.");
        return Ok(());
    }

    let current = Version::parse(reddit_stream::VERSION)?;
    match reddit_stream::update::check_for_update(&current)? {
        Some(reddit_stream::update::UpdateInfo { version, url }) => {
            println!("Update available: {current} -> {version}\n{url}");
        }
        None => {
            println!("reddit-stream {current} is up to date.");
        }
    }
    Ok(())
}
