// # ReplicaDB driver
//
// Feeds a scripted workload — one command line per logical tick — into the
// simulator and prints the engine's report lines. Reads a script file when
// given one, otherwise runs interactively on stdin.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use replicadb::execution::{Database, LineResult};
use replicadb::{Config, Result};

#[derive(Parser, Debug)]
#[command(name = "replicadb", version, about = "Replicated database simulator")]
struct Args {
    /// Increase output verbosity (-v annotates read values with their
    /// origin, -vv adds debug logs)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Workload script; reads stdin when omitted
    infile: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_max_level(level)
        .init();

    let config = Config {
        show_read_origin: args.verbose > 0,
    };
    let mut db = Database::with_config(&config);

    match args.infile {
        Some(path) => {
            let script = fs::read_to_string(&path)?;
            for line in script.lines() {
                let result = db.execute_line(line);
                flush_output(&mut db);
                if result == LineResult::Quit {
                    break;
                }
            }
        }
        None => {
            let stdin = io::stdin();
            let interactive = stdin.is_terminal();
            let mut input = String::new();
            loop {
                if interactive {
                    print!("adb > ");
                    io::stdout().flush()?;
                }
                input.clear();
                if stdin.lock().read_line(&mut input)? == 0 {
                    break;
                }
                let result = db.execute_line(&input);
                flush_output(&mut db);
                if result == LineResult::Quit {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn flush_output(db: &mut Database) {
    for line in db.drain_output() {
        println!("{line}");
    }
}
