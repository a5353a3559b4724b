//! Filename sources for batch commands

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal};
use std::path::Path;

/// One filename per line; blank lines and `#` comments are skipped
pub fn read_filenames<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut filenames = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        filenames.push(trimmed.to_string());
    }
    Ok(filenames)
}

/// Gather filenames from positional arguments plus `--input`.
///
/// `--input -` reads stdin. With neither arguments nor `--input`, stdin is
/// read when it is not a terminal.
pub fn collect_filenames(args: &[String], input: Option<&Path>) -> io::Result<Vec<String>> {
    let mut filenames: Vec<String> = args.to_vec();

    match input {
        Some(path) if path == Path::new("-") => {
            filenames.extend(read_filenames(io::stdin().lock())?);
        }
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
            })?;
            filenames.extend(read_filenames(BufReader::new(file))?);
        }
        None if args.is_empty() && !io::stdin().is_terminal() => {
            filenames.extend(read_filenames(io::stdin().lock())?);
        }
        None => {}
    }

    Ok(filenames)
}
