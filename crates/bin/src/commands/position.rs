//! Position key generation command.

use rand::{SeedableRng, rngs::StdRng};
use wavestate::{PositionConfig, list::position::string_between};

use crate::cli::PositionArgs;
use crate::output::{OutputFormat, print_json, print_table, printable_key};

/// Run the position command
pub fn run(args: &PositionArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let config = PositionConfig::default().with_chance(args.chance);
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut keys = (0..args.count)
        .map(|_| string_between(args.min.as_deref(), args.max.as_deref(), &config, &mut rng))
        .collect::<Result<Vec<_>, _>>()?;
    keys.sort();

    match format {
        OutputFormat::Human => {
            let rows: Vec<Vec<String>> = keys
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    vec![
                        i.to_string(),
                        printable_key(key),
                        key.chars().count().to_string(),
                    ]
                })
                .collect();
            print_table(&["#", "KEY", "LEN"], &rows);
        }
        OutputFormat::Json => print_json(&keys)?,
    }

    Ok(())
}
