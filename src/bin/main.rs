//! This is the main entry point for the XFS forensics tool.
//!
//! The program provides an interactive command-line interface for analyzing XFS images.
//! An image given on the command line is opened right away.

use clap::{ArgAction, Parser};
use log::{error, info, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use xfs_forensics::commands::Command;
use xfs_forensics::session::{Session, SessionConfig};

/// Interactive reader for XFS images
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Raise the log verbosity, once per occurrence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Byte offset of the volume inside the image
    #[arg(short, long, default_value_t = 0)]
    offset: i64,
    /// Image to open, followed by its other segments if it is split
    image: Vec<PathBuf>,
}

/// Represents the runtime state of the program.
struct RunState {
    /// Registered images, the open volume and the settings of the next commands.
    session: Session,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = stderrlog::new()
        .module(module_path!())
        .module("xfs_forensics")
        .verbosity(usize::from(cli.verbose) + 1)
        .init()
    {
        eprintln!("Unable to initialise logging: {err}");
    }

    let config = SessionConfig {
        offset: cli.offset,
        ..SessionConfig::default()
    };
    let mut run_state = RunState {
        session: Session::new(config),
    };
    if !cli.image.is_empty() {
        if let Err(err) = run_state.session.open_segments(&cli.image) {
            error!("{err}");
        }
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut s = String::new();
        match stdin.read_line(&mut s) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                error!("Failed to read command: {err}");
                break;
            }
        }

        match Command::from_string(&s) {
            Command::Quit => break,
            Command::Unknown(s) => error!("Unknown command: {s:?}"),
            Command::Invalid(s) => error!("{s}"),
            Command::Empty => {}
            cmd => run_command(&mut run_state, cmd),
        }
    }

    if let Err(err) = run_state.session.close() {
        error!("{err}");
    }
}

fn run_command(run_state: &mut RunState, cmd: Command) {
    let session = &mut run_state.session;
    let mut stdout = io::stdout().lock();
    let result = match cmd {
        Command::Open(paths) => {
            let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
            session.open_segments(&paths)
        }
        Command::Volume => session.print_volume_info(&mut stdout),
        Command::Layout => session.print_layout(&mut stdout),
        Command::Hierarchy => session.print_hierarchy(&mut stdout),
        Command::Entry(inode_number) => session
            .print_file_entry_by_identifier(inode_number, &mut stdout)
            .map(|found| {
                if !found {
                    warn!("Inode {inode_number} could not be read");
                }
            }),
        Command::Entries => session
            .print_file_entries(&mut stdout)
            .map(|printed| info!("Printed {printed} file entries")),
        Command::Path(path) => session
            .print_file_entry_by_path(&path, &mut stdout)
            .map(|found| {
                if !found {
                    warn!("No file entry at {path}");
                }
            }),
        Command::Bodyfile(path) => session.set_bodyfile(Path::new(&path)),
        Command::Offset(offset) => {
            session.config_mut().offset = offset;
            Ok(())
        }
        Command::Size(size) => {
            session.config_mut().size = size;
            Ok(())
        }
        Command::Skip => {
            session.config_mut().validate = false;
            Ok(())
        }
        Command::Mount {
            label,
            path,
            offset,
            size,
        } => session.mount(&label, Path::new(&path), offset, size),
        Command::Use(label) => session.use_label(&label),
        Command::Labels => {
            for label in session.registry().labels() {
                println!("{label}");
            }
            Ok(())
        }
        Command::Close => session.close(),
        Command::Quit | Command::Unknown(_) | Command::Invalid(_) | Command::Empty => Ok(()),
    };

    if let Err(err) = result {
        error!("{err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_verbose_flags_add_up() {
        let cli = Cli::try_parse_from(["main", "-vvvv", "-v", "img.raw"]).unwrap();
        assert_eq!(cli.verbose, 5);
        assert_eq!(cli.image, vec![PathBuf::from("img.raw")]);
    }

    #[test]
    fn split_image_and_offset() {
        let cli = Cli::try_parse_from(["main", "-o", "1048576", "disk.001", "disk.002"]).unwrap();
        assert_eq!(cli.offset, 1 << 20);
        assert_eq!(cli.image.len(), 2);
        assert!(Cli::try_parse_from(["main"]).unwrap().image.is_empty());
    }

    #[test]
    fn unknown_flag_is_a_usage_error() {
        assert!(Cli::try_parse_from(["main", "--frobnicate"]).is_err());
        assert!(Cli::try_parse_from(["main", "-o", "lots"]).is_err());
    }
}
