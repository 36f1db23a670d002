//! Seal Paillier prime factors into a VitalGuard key file.
//!
//! Key generation happens elsewhere; this tool only wraps the factors it is
//! given.
//!
//! ```bash
//! cargo run --bin seal_keyfile -- --in <factors.json> --out <keyfile> [--force]
//! ```
//!
//! `<factors.json>` is `{"p": "<decimal>", "q": "<decimal>"}`. The password is
//! taken from the same sources the service reads it from at load time.
//! The output file is written with 0600 permissions and only the public
//! fingerprint is printed.

use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use zeroize::Zeroizing;

use vitalguard::adapters::keyfile::{key_password, seal_keypair, PrimeFactors};

const USAGE: &str = "Usage: seal_keyfile --in <factors.json> --out <keyfile> [--force]";

struct Args {
    input: PathBuf,
    output: PathBuf,
    force: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = std::env::args().skip(1);
    let mut input = None;
    let mut output = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--in" => input = args.next().filter(|p| !p.is_empty()).map(PathBuf::from),
            "--out" => output = args.next().filter(|p| !p.is_empty()).map(PathBuf::from),
            "--force" => force = true,
            "-h" | "--help" => return Ok(None),
            other => bail!("Unknown arg: {other}\n{USAGE}"),
        }
    }

    match (input, output) {
        (Some(input), Some(output)) => Ok(Some(Args {
            input,
            output,
            force,
        })),
        _ => bail!("{USAGE}"),
    }
}

fn main() -> Result<ExitCode> {
    let Some(args) = parse_args()? else {
        println!("{USAGE}\n\nSeals the prime factors in <factors.json> into a key file readable by vitalguard.");
        return Ok(ExitCode::SUCCESS);
    };

    if args.output.exists() && !args.force {
        eprintln!("Refusing to overwrite existing file {:?}. Use --force.", args.output);
        return Ok(ExitCode::from(3));
    }

    let plaintext = Zeroizing::new(
        std::fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?,
    );
    let factors = PrimeFactors::from_json(&plaintext)?;
    let password = key_password()?;

    let key_file = seal_keypair(&factors, password.as_str())?;
    let fingerprint = key_file.public_key()?.fingerprint().to_string();

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }
    let mut file = opts
        .open(&args.output)
        .with_context(|| format!("opening {}", args.output.display()))?;
    file.write_all(key_file.to_json_pretty()?.as_bytes())?;
    file.write_all(b"\n")?;

    println!("Wrote sealed key file to {:?}", args.output);
    println!("Key fingerprint: {fingerprint}");
    Ok(ExitCode::SUCCESS)
}
