use std::time::Instant;

use anyhow::Result;

use timecode::format::{definitions, find_definition};

use super::command::FormatsArgs;

pub fn cmd_formats(args: &FormatsArgs) -> Result<()> {
    println!("Supported timecode definitions");
    println!("==============================");
    println!();
    println!(
        "{:<16} {:>5} {:>5} {:>9} {:>9}  {}",
        "name", "res", "bits", "length", "safe", "description"
    );

    for def in definitions() {
        println!(
            "{:<16} {:>5} {:>5} {:>9} {:>9}  {}",
            def.name, def.resolution, def.bits, def.length, def.safe, def.desc
        );
    }
    println!();

    if let Some(name) = &args.build {
        let start = Instant::now();
        let format = find_definition(name)?;

        println!(
            "Built lookup table for {} ({} states) in {:.3}s",
            format.def().name,
            format.def().length,
            start.elapsed().as_secs_f64()
        );
    }

    Ok(())
}
