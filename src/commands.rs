//! This module defines the `Command` enum and its associated methods for parsing
//! and handling user commands in the XFS forensics tool.
//!
//! The `Command` enum represents the commands a user can type at the prompt,
//! such as opening an image, printing the hierarchy or a single inode, or
//! changing the settings of the next open.

/// Represents a user command in the XFS forensics tool.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Command to quit the program.
    Quit,
    /// Open an image, encapsulating the path of each of its segments.
    Open(Vec<String>),
    /// Print the format version and label of the volume.
    Volume,
    /// Print the allocation group layout.
    Layout,
    /// Print the whole directory tree.
    Hierarchy,
    /// Print the entry of one inode.
    Entry(u64),
    /// Print every allocated inode.
    Entries,
    /// Print the entry at an absolute path.
    Path(String),
    /// Write entries to a bodyfile instead of the text listing.
    Bodyfile(String),
    /// Byte offset of the volume inside the next opened image.
    Offset(i64),
    /// Size of the volume inside the next opened image, 0 for the rest.
    Size(u64),
    /// Skip the superblock validation
    Skip,
    /// Register a labelled image range.
    Mount {
        label: String,
        path: String,
        offset: i64,
        size: u64,
    },
    /// Open the volume registered under a label.
    Use(String),
    /// List the registered labels.
    Labels,
    /// Close the open volume.
    Close,
    /// Command for an unknown input, encapsulating the raw input as a `String`.
    Unknown(String),
    /// Command for invalid input, encapsulating an error message as a `String`.
    Invalid(String),
    /// Command for an empty input.
    Empty,
}

/// Parses an optional numeric argument, `Ok(default)` when missing.
fn parse_or<T: std::str::FromStr>(
    arg: Option<&str>,
    default: T,
    cmd: &str,
    expected: &str,
) -> Result<T, Command> {
    match arg {
        None => Ok(default),
        Some(arg) => arg.parse::<T>().map_err(|_| {
            Command::Invalid(format!("Arg parsing error: '{cmd}' expects {expected}."))
        }),
    }
}

/// Parses a mandatory numeric argument.
fn parse_required<T: std::str::FromStr>(
    arg: Option<&str>,
    cmd: &str,
    expected: &str,
) -> Result<T, Command> {
    match arg {
        None => Err(Command::Invalid(format!(
            "Missing arg: '{cmd}' expects {expected}."
        ))),
        Some(arg) => arg.parse::<T>().map_err(|_| {
            Command::Invalid(format!("Arg parsing error: '{cmd}' expects {expected}."))
        }),
    }
}

impl Command {
    /// Parses a string into a `Command` instance.
    ///
    /// # Parameters
    /// - `s`: A string slice representing the user input.
    ///
    /// # Returns
    /// - `Command::Quit` if the input is "quit".
    /// - `Command::Open` with the file paths if the input starts with "open" followed by
    ///   one path, or the paths of the segments of a split image.
    /// - `Command::Entry` if the input is "entry" followed by an inode number.
    /// - `Command::Mount` if the input is "mount <label> <image> [offset] [size]".
    /// - `Command::Unknown` if the input does not match any known command.
    /// - `Command::Invalid` if a required argument is missing or malformed.
    /// - `Command::Empty` if the input is empty or contains only whitespace.
    /// - the matching argument-less variant for the other keywords.
    pub fn from_string(s: &str) -> Self {
        let mut parts = s.split_whitespace();
        let parsed = match parts.next() {
            Some("quit") => Ok(Command::Quit),
            Some("open") => {
                let paths: Vec<String> = parts.map(str::to_string).collect();
                if paths.is_empty() {
                    Err(Command::Invalid(String::from(
                        "Missing arg: 'open' expects the path to an image file.",
                    )))
                } else {
                    Ok(Command::Open(paths))
                }
            }
            Some("volume") => Ok(Command::Volume),
            Some("layout") => Ok(Command::Layout),
            Some("hierarchy") => Ok(Command::Hierarchy),
            Some("entry") => {
                parse_required(parts.next(), "entry", "an inode number").map(Command::Entry)
            }
            Some("entries") => Ok(Command::Entries),
            Some("path") => match parts.next() {
                Some(arg) => Ok(Command::Path(arg.to_string())),
                None => Err(Command::Invalid(String::from(
                    "Missing arg: 'path' expects an absolute path.",
                ))),
            },
            Some("bodyfile") => match parts.next() {
                Some(arg) => Ok(Command::Bodyfile(arg.to_string())),
                None => Err(Command::Invalid(String::from(
                    "Missing arg: 'bodyfile' expects the path of the output file.",
                ))),
            },
            Some("offset") => {
                parse_required(parts.next(), "offset", "a byte offset").map(Command::Offset)
            }
            Some("size") => parse_required(parts.next(), "size", "a size in bytes").map(Command::Size),
            Some("skip") => Ok(Command::Skip),
            Some("mount") => match (parts.next(), parts.next()) {
                (Some(label), Some(path)) => {
                    let label = label.to_string();
                    let path = path.to_string();
                    parse_or(parts.next(), 0i64, "mount", "a byte offset").and_then(|offset| {
                        parse_or(parts.next(), 0u64, "mount", "a size in bytes").map(|size| {
                            Command::Mount {
                                label,
                                path,
                                offset,
                                size,
                            }
                        })
                    })
                }
                _ => Err(Command::Invalid(String::from(
                    "Missing arg: 'mount' expects a label and the path to an image file.",
                ))),
            },
            Some("use") => match parts.next() {
                Some(arg) => Ok(Command::Use(arg.to_string())),
                None => Err(Command::Invalid(String::from(
                    "Missing arg: 'use' expects a label.",
                ))),
            },
            Some("labels") => Ok(Command::Labels),
            Some("close") => Ok(Command::Close),
            Some(other) => Ok(Command::Unknown(other.to_string())),
            None => Ok(Command::Empty),
        };
        parsed.unwrap_or_else(|invalid| invalid)
    }
}
