use std::path::PathBuf;

#[derive(Debug, Default)]
struct CliArgs {
    playlist: Option<PathBuf>,
    add: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;
    minipod::app::run(minipod::app::StartupOptions {
        playlist: args.playlist,
        add: args.add,
    })
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--playlist" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--playlist requires a file path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--playlist cannot be empty");
                }
                out.playlist = Some(PathBuf::from(value.trim()));
            }
            "--add" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--add requires a file or folder path");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--add cannot be empty");
                }
                out.add.push(PathBuf::from(value.trim()));
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("minipod");
    println!("  --playlist <file.m3u>   Load a playlist file at startup");
    println!("  --add <path>            Add a track or folder at startup (repeatable)");
}
