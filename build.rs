use std::env;
use std::fs;

use anyhow::Result;
use chrono::TimeZone;
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    // Generate git information
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let gitcl_res = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = gitcl_res {
        eprintln!("error occurred while generating instructions: {e:?}");
        Emitter::default().idempotent().fail_on_error().emit()?;
    }

    // Add build timestamp
    let now = match env::var("SOURCE_DATE_EPOCH") {
        Ok(val) => chrono::Utc.timestamp_opt(val.parse::<i64>()?, 0).unwrap(),
        Err(_) => chrono::Utc::now(),
    };

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );

    // Embed the decoder library version
    let timecode_version =
        read_timecode_version().unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=TIMECODE_VERSION={timecode_version}");

    println!("cargo:rerun-if-changed=timecode/Cargo.toml");

    Ok(())
}

/// Read the library version from the workspace member's manifest.
fn read_timecode_version() -> Result<String> {
    let toml_content = fs::read_to_string("timecode/Cargo.toml")?;

    for line in toml_content.lines() {
        let line = line.trim();
        if line.starts_with("version") && line.contains('=') {
            if let Some(equals_pos) = line.find('=') {
                let version = line[equals_pos + 1..].trim().trim_matches('"');
                return Ok(version.to_string());
            }
        }
    }

    anyhow::bail!("Could not find version in timecode/Cargo.toml");
}
