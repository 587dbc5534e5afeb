use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

const READ_BUFFER: usize = 256 * 1024;

/// Opens a dump as a sequential byte stream.
///
/// `-` reads stdin, `*.bz2` is decompressed (multistream aware), anything else
/// is read as plain XML. Other compressions can be piped through stdin.
pub fn open_dump(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        return Ok(Box::new(BufReader::with_capacity(READ_BUFFER, io::stdin())));
    }

    let file = File::open(path).with_context(|| format!("Failed to open dump: {}", path))?;
    let is_bz2 = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"));

    if is_bz2 {
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER,
            MultiBzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(READ_BUFFER, file)))
    }
}
