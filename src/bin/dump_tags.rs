use autotag_rs::audiotags::{audio_format, extract_identifier, AudioFormat, IdKind};
use autotag_rs::common::{initialize_logging, LogOutput};
use autotag_rs::config::Config;
use autotag_rs::tagwriter::{FormatAdapter, TagWriter};
use autotag_rs::tools::SystemCommandRunner;
use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <audio_file>", args[0]);
        process::exit(1);
    }

    // The config is optional here; without one the tool falls back to quiet logging and tools on PATH.
    let config = Config::parse(None).ok();
    let level = config.as_ref().map_or("warn", |c| c.log_level.as_str());
    if let Err(e) = initialize_logging(LogOutput::Stderr, level) {
        eprintln!("{e}");
    }
    let tools = config.map(|c| c.tools).unwrap_or_default();

    let path = Path::new(&args[1]);
    let format = match audio_format(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    println!("Format: {}", match format {
        AudioFormat::Vorbis => "FLAC (Vorbis comments)",
        AudioFormat::Frame => "MP3 (ID3v2)",
    });

    println!("\nIdentifiers:");
    for kind in IdKind::ALL {
        match extract_identifier(path, kind) {
            Ok(v) => println!("  {kind:?}: {v:?}"),
            Err(e) => println!("  {kind:?}: error: {e}"),
        }
    }

    let writer = TagWriter::new(Arc::new(SystemCommandRunner), &tools);
    match writer.adapter(format).read_existing(path) {
        Ok(tags) => {
            println!("\nAll tags:");
            for (k, values) in tags {
                println!("  {k}: {values:?}");
            }
        }
        Err(e) => {
            eprintln!("Failed to read tags: {e}");
            process::exit(1);
        }
    }
}
