use std::{
    io::{
        Stdout,
        Write,
    },
    path::PathBuf,
};

use clap::{
    Parser,
    ValueEnum,
};
use color_eyre::eyre::Error;
use sonde_decode::{
    Record,
    Session,
    Sonde,
    autorx::{
        LogLine,
        LogWriter,
    },
    lms6::Lms6,
    rs41::Rs41,
    source::dump,
};
use tracing::Level;

fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let frames = dump::read_file(&args.file)?;
    tracing::debug!(file = %args.file.display(), num_frames = frames.len(), "read frames");

    let mut output = if args.csv {
        Output::Csv(LogWriter::new(std::io::stdout()))
    }
    else {
        Output::Json(std::io::stdout())
    };

    match args.sonde_type {
        SondeType::Rs41 => run::<Rs41>(&frames, &mut output)?,
        SondeType::Lms6 => run::<Lms6>(&frames, &mut output)?,
    }

    output.flush()?;

    Ok(())
}

/// Decodes RS41 and LMS6-403 radiosonde frames from a hex dump.
///
/// The dump has one frame per line, as hex. A trailing `[OK]` marker is
/// ignored.
#[derive(Debug, Parser)]
pub struct Args {
    /// Frame dump, optionally gzip-compressed
    file: PathBuf,

    #[clap(long = "type", env = "SONDE_TYPE", value_enum, default_value_t = SondeType::Rs41)]
    sonde_type: SondeType,

    /// Output radiosonde_auto_rx log lines instead of JSON
    #[clap(long)]
    csv: bool,

    #[clap(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SondeType {
    Rs41,
    Lms6,
}

enum Output {
    Json(Stdout),
    Csv(LogWriter<Stdout>),
}

impl Output {
    fn write(&mut self, record: &Record) -> Result<(), Error> {
        match self {
            Self::Json(stdout) => {
                let mut stdout = stdout.lock();
                serde_json::to_writer(&mut stdout, record)?;
                writeln!(stdout)?;
            }
            Self::Csv(writer) => {
                match LogLine::from_record(record) {
                    Ok(line) => writer.write(&line)?,
                    Err(error) => tracing::warn!(%error, "skipping log line"),
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        match self {
            Self::Json(stdout) => stdout.flush()?,
            Self::Csv(writer) => writer.flush()?,
        }
        Ok(())
    }
}

fn run<S: Sonde>(frames: &[Vec<u8>], output: &mut Output) -> Result<(), Error> {
    let mut session = Session::<S>::new();

    for raw in frames {
        let record = match session.try_add_frame(raw) {
            Ok(record) => Some(record),
            Err(sonde_decode::Error::SerialMismatch { expected, received }) => {
                tracing::info!(%expected, %received, "sonde changed, starting new session");
                session = Session::new();
                session.add_frame(raw)
            }
            Err(error) => {
                tracing::error!(sonde = S::NAME, %error, "error processing frame");
                None
            }
        };

        if let Some(record) = record {
            output.write(&record)?;
        }
    }

    Ok(())
}
