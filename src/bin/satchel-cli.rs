use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use satchel::{Metadata, segment_codec};

fn main() -> Result<()> {
    satchel::logging::init();
    match Params::parse().command {
        Command::Pack {
            audio,
            transcript,
            metadata,
            password,
            out,
        } => cmd_pack(&audio, transcript.as_deref(), metadata.as_deref(), password.as_deref(), &out),
        Command::Unpack {
            bundle,
            password,
            out_dir,
        } => cmd_unpack(&bundle, password.as_deref(), &out_dir),
        Command::Info { bundle } => cmd_info(&bundle),
    }
}

#[derive(Parser, Debug)]
#[command(name = "satchel")]
#[command(about = "Pack, unpack, and inspect audio/transcript bundles")]
struct Params {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bundle an audio file, an optional JSONL transcript, and optional
    /// metadata into one archive.
    Pack {
        #[arg(short = 'a', long = "audio")]
        audio: String,

        #[arg(short = 't', long = "transcript")]
        transcript: Option<String>,

        /// Path to a JSON object to store as bundle metadata.
        #[arg(short = 'm', long = "metadata")]
        metadata: Option<String>,

        /// Seal the bundle's payload entries with this password.
        #[arg(short = 'p', long = "password")]
        password: Option<String>,

        #[arg(short = 'o', long = "out")]
        out: String,
    },
    /// Extract a bundle's parts into a directory.
    Unpack {
        #[arg(short = 'b', long = "bundle")]
        bundle: String,

        #[arg(short = 'p', long = "password")]
        password: Option<String>,

        #[arg(short = 'o', long = "out-dir", default_value = ".")]
        out_dir: String,
    },
    /// Show what a bundle holds without opening its payloads.
    Info {
        #[arg(short = 'b', long = "bundle")]
        bundle: String,
    },
}

fn cmd_pack(
    audio: &str,
    transcript: Option<&str>,
    metadata: Option<&str>,
    password: Option<&str>,
    out: &str,
) -> Result<()> {
    let audio_bytes =
        fs::read(audio).with_context(|| format!("failed to read audio file '{audio}'"))?;

    let transcript_text = match transcript {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read transcript file '{path}'"))?,
        None => String::new(),
    };

    let metadata_map = match metadata {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read metadata file '{path}'"))?;
            let map: Metadata = serde_json::from_str(&text)
                .with_context(|| format!("metadata file '{path}' must hold a JSON object"))?;
            Some(map)
        }
        None => None,
    };

    let archive = satchel::pack(
        &audio_bytes,
        &transcript_text,
        metadata_map.as_ref(),
        password,
    )?;
    fs::write(out, &archive).with_context(|| format!("failed to write bundle '{out}'"))?;
    eprintln!("wrote {out} ({} bytes)", archive.len());
    Ok(())
}

fn cmd_unpack(bundle: &str, password: Option<&str>, out_dir: &str) -> Result<()> {
    let archive =
        fs::read(bundle).with_context(|| format!("failed to read bundle '{bundle}'"))?;
    let loaded = satchel::open(&archive, password)?;

    for warning in &loaded.warnings {
        eprintln!("warning: {warning}");
    }

    let dir = Path::new(out_dir);
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{out_dir}'"))?;

    fs::write(dir.join("audio.bin"), &loaded.audio_bytes)?;
    if !loaded.segments.is_empty() {
        fs::write(
            dir.join("transcript.jsonl"),
            segment_codec::encode(&loaded.segments)?,
        )?;
    }
    if !loaded.metadata.is_empty() {
        fs::write(
            dir.join("metadata.json"),
            serde_json::to_vec_pretty(&loaded.metadata)?,
        )?;
    }

    eprintln!(
        "unpacked {} segment(s), {} metadata key(s) into {out_dir}",
        loaded.segments.len(),
        loaded.metadata.len()
    );
    Ok(())
}

fn cmd_info(bundle: &str) -> Result<()> {
    let archive =
        fs::read(bundle).with_context(|| format!("failed to read bundle '{bundle}'"))?;
    let info = satchel::inspect(&archive)?;

    println!("format version: {}", info.format_version);
    println!("encrypted:      {}", yn(info.encrypted));
    println!("transcript:     {}", yn(info.has_transcript));
    println!("metadata:       {}", yn(info.has_metadata));
    println!("entries:");
    for entry in &info.entries {
        println!("  {entry}");
    }
    Ok(())
}

fn yn(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
