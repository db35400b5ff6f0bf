//! Hex dumps of received frames
//!
//! Demodulators like [rs1729/RS][1] can print every frame as a line of hex,
//! followed by the result of their own integrity check:
//!
//! ```plain
//! 86 35 f4 40 93 df 1a 60 ... [OK]
//! 8635f44093df1a60... [NO]
//! ```
//!
//! Only frames marked `[OK]` are read.
//!
//! [1]: https://github.com/rs1729/RS

use std::{
    fs::File,
    io::{
        BufRead,
        BufReader,
        Read,
    },
    path::Path,
};

use libflate::gzip;

/// Marker of a frame that passed the demodulator's check
pub const OK_MARKER: &str = "[OK]";

#[derive(Debug, thiserror::Error)]
#[error("could not read hex dump")]
pub enum Error {
    Io(#[from] std::io::Error),
}

/// Parses a single line of a dump.
///
/// Returns `None` for lines without an `[OK]` marker. Hex digits may be
/// separated by whitespace.
pub fn parse_line(line: &str) -> Option<Result<Vec<u8>, hex::FromHexError>> {
    let (data, _) = line.split_once(OK_MARKER)?;
    let hex: String = data.split_whitespace().collect();
    Some(hex::decode(hex))
}

/// Reads all frames from a dump. Lines with invalid hex are skipped.
pub fn read_frames<R: BufRead>(reader: R) -> Result<Vec<Vec<u8>>, Error> {
    let mut frames = vec![];

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_line(&line) {
            Some(Ok(frame)) => frames.push(frame),
            Some(Err(error)) => {
                tracing::warn!(line = line_number + 1, %error, "skipping invalid hex");
            }
            None => {}
        }
    }

    tracing::debug!(num_frames = frames.len(), "read hex dump");

    Ok(frames)
}

/// Reads all frames from a dump file, decompressing it if its name ends in
/// `.gz`.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Vec<u8>>, Error> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), "reading hex dump");

    let reader = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(gzip::Decoder::new(reader)?)
    }
    else {
        Box::new(reader)
    };

    read_frames(BufReader::new(reader))
}
