use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use p4gsave::Result;
use p4gsave::convert::{self, Options};
use p4gsave::formats::archive::Difficulty;
use p4gsave::manifest::write_manifest_for_dir;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    /// PC directory -> portable directory.
    Portable,
    /// Portable directory -> PC directory, plus remotecache.vdf.
    Pc,
}

/// Convert a save directory into `<save_dir>_conv`.
#[derive(Debug, Parser)]
struct Args {
    /// Layout to convert into.
    #[arg(long, value_enum)]
    to: Target,
    /// Toggle the custom difficulty menu (`enable` or `disable`).
    #[arg(long)]
    custom_diff: Option<Difficulty>,
    save_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut output = args.save_dir.clone().into_os_string();
    output.push("_conv");
    let output = PathBuf::from(output);
    fs::create_dir_all(&output)?;

    let options = Options {
        difficulty: args.custom_diff,
    };
    let report = match args.to {
        Target::Portable => convert::pc_to_portable(&args.save_dir, &output, &options)?,
        Target::Pc => {
            let report = convert::portable_to_pc(&args.save_dir, &output, &options)?;
            let vdf = output
                .parent()
                .unwrap_or(Path::new("."))
                .join("remotecache.vdf");
            write_manifest_for_dir(&vdf, &output)?;
            report
        }
    };

    println!(
        "wrote {} files, skipped slots {:?}",
        report.written.len(),
        report.skipped
    );
    Ok(())
}
