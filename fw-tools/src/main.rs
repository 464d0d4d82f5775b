// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    colored::Colorize,
    rand::{rngs::OsRng, RngCore},
    std::{
        ffi::OsString,
        io::{Read, Write},
    },
    tracing_subscriber::{fmt, prelude::*, EnvFilter},
};

mod args;
mod package;
mod update;

#[cfg(test)]
mod tests;

fn main() -> std::process::ExitCode {
    // Progress goes to stderr, RUST_LOG overrides the default level.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    main_args(
        std::env::args_os(),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .into()
}

fn main_args<I, T>(args: I, stdout: impl Write, mut stderr: impl Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match run(args, stdout) {
        Ok(()) => ExitCode(0),
        Err(Error::Args(e @ args::Error::Cli(_))) => {
            // Clap already does the "error: {}" formatting, and prints help
            // and version the same way.
            let _ = writeln!(stderr, "{e}");
            match e {
                args::Error::Cli(e) if !e.use_stderr() => ExitCode(0),
                _ => ExitCode(1),
            }
        }
        Err(e) => {
            let _ = writeln!(stderr, "{} {e}", "error:".bold().red());
            ExitCode(1)
        }
    }
}

fn run<I, T>(args: I, mut stdout: impl Write) -> Result<(), Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match args::args(args)? {
        args::Args::Keygen { output, force } => {
            args::Secrets::generate(&mut OsRng).save(&output, force)?;
            writeln!(&mut stdout, "{} {}", "created".bold(), output.display()).map_err(Error::Stdout)?;
        }
        args::Args::Protect {
            secrets,
            input,
            output,
            version,
            frame_size,
        } => {
            let firmware = read_file(&input)?;
            let mut iv = [0; boot_core::update_protocol::IV_SIZE];
            OsRng.fill_bytes(&mut iv);
            let package = package::Package::protect(&secrets, version, &firmware, iv, frame_size)?;
            std::fs::write(&output, package.to_bytes()).map_err(Error::WriteOutputFile)?;
            writeln!(
                &mut stdout,
                "{} version {} ({} bytes encrypted, {} frames) to {}",
                "protected".bold(),
                package.metadata.version,
                package.metadata.size,
                package.frames.len(),
                output.display()
            )
            .map_err(Error::Stdout)?;
        }
        args::Args::Dump { input, secrets } => {
            let package = package::Package::parse(&read_file(&input)?)?;
            dump(&package, &mut stdout).map_err(Error::Stdout)?;
            if let Some(secrets) = secrets {
                package.verify(&secrets.key_material())?;
                writeln!(&mut stdout, "{:12} {}", "tags".bold(), "valid".green()).map_err(Error::Stdout)?;
            }
        }
        args::Args::Update {
            port,
            baudrate,
            input,
            timeout,
            boot,
        } => {
            let package = package::Package::parse(&read_file(&input)?)?;
            let mut serial = serialport::new(&port, baudrate)
                .timeout(timeout)
                .open()
                .map_err(Error::OpenPort)?;
            tracing::info!("Opened {port} at {baudrate} baud");
            update::upload(&mut serial, &package)?;
            if boot {
                update::boot(&mut serial)?;
            }
            writeln!(&mut stdout, "{}", "update complete".bold().green()).map_err(Error::Stdout)?;
        }
    }
    Ok(())
}

fn dump(package: &package::Package, mut stdout: impl Write) -> std::io::Result<()> {
    let version = match package.metadata.version {
        0 => "0 (keep installed)".to_owned(),
        v => v.to_string(),
    };
    writeln!(&mut stdout, "{:12} {version}", "version".bold())?;
    writeln!(&mut stdout, "{:12} {}", "size".bold(), package.metadata.size)?;
    let largest = package.frames.iter().map(|f| f.body.len()).max().unwrap_or(0);
    writeln!(
        &mut stdout,
        "{:12} {} (up to {largest} bytes each)",
        "frames".bold(),
        package.frames.len()
    )?;
    writeln!(&mut stdout, "{:12} {}", "meta tag".bold(), hex::encode(package.metadata_tag))?;
    let (first, second) = package.half_tags.split_at(package.half_tags.len() / 2);
    writeln!(&mut stdout, "{:12} {}", "half tag 1".bold(), hex::encode(first))?;
    writeln!(&mut stdout, "{:12} {}", "half tag 2".bold(), hex::encode(second))?;
    writeln!(&mut stdout, "{:12} {}", "tag of tags".bold(), hex::encode(package.tag_of_tags))?;
    Ok(())
}

fn read_file(path: &std::path::Path) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    std::fs::File::open(path)
        .map_err(Error::OpenInputFile)?
        .read_to_end(&mut buf)
        .map_err(Error::ReadInputFile)?;
    Ok(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitCode(u8);

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        code.0.into()
    }
}

#[derive(Debug)]
enum Error {
    Args(args::Error),
    OpenInputFile(std::io::Error),
    OpenPort(serialport::Error),
    Package(package::Error),
    ReadInputFile(std::io::Error),
    Secrets(args::ConfigError),
    Stdout(std::io::Error),
    Update(update::Error),
    WriteOutputFile(std::io::Error),
}

impl From<args::Error> for Error {
    fn from(e: args::Error) -> Self {
        Error::Args(e)
    }
}

impl From<args::ConfigError> for Error {
    fn from(e: args::ConfigError) -> Self {
        Error::Secrets(e)
    }
}

impl From<package::Error> for Error {
    fn from(e: package::Error) -> Self {
        Error::Package(e)
    }
}

impl From<update::Error> for Error {
    fn from(e: update::Error) -> Self {
        Error::Update(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Args(e) => write!(f, "{e}"),
            Error::OpenInputFile(e) => write!(f, "failed to open input file: {e}"),
            Error::OpenPort(e) => write!(f, "failed to open serial port: {e}"),
            Error::Package(e) => write!(f, "{e}"),
            Error::ReadInputFile(e) => write!(f, "failed to read input file: {e}"),
            Error::Secrets(e) => write!(f, "{e}"),
            Error::Stdout(e) => write!(f, "failed to write to stdout: {e}"),
            Error::Update(e) => write!(f, "{e}"),
            Error::WriteOutputFile(e) => write!(f, "failed to write to output file: {e}"),
        }
    }
}

impl std::error::Error for Error {}
