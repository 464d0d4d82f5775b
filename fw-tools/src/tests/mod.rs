// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

use {
    crate::{
        args::Secrets,
        package::{self, Package, Step, Tagged},
        update, ExitCode,
    },
    boot_core::{
        update_protocol::{FirmwareMetadata, Status, IV_SIZE, TAG_SIZE},
        Error as BootError, Outcome,
    },
    std::io::Write,
};


const IV: [u8; IV_SIZE] = [0x5A; IV_SIZE];

fn secrets() -> Secrets {
    Secrets {
        hmac_key: [0x42; 32],
        cbc_key: [0x24; 16],
    }
}

fn firmware(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// PKCS#7 padding as applied before encryption.
fn padded(firmware: &[u8]) -> Vec<u8> {
    let pad = 16 - firmware.len() % 16;
    let mut out = firmware.to_vec();
    out.resize(firmware.len() + pad, pad as u8);
    out
}

/// Generate keys, then refuse to overwrite them unless forced.
#[test]
fn keygen_creates_secrets_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.toml");
    let path_str = path.to_str().unwrap();

    let output = test(["keygen", "-o", path_str]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("created"));
    let first = Secrets::load(&path).unwrap();

    let output = test(["keygen", "-o", path_str]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("already exists"));
    assert_eq!(Secrets::load(&path).unwrap(), first);

    let output = test(["keygen", "-o", path_str, "--force"]);
    assert_eq!(output.exit_code, ExitCode(0));
    // Fresh random keys.
    assert_ne!(Secrets::load(&path).unwrap(), first);
}

/// Keys of the wrong length or encoding are refused.
#[test]
fn secrets_file_validation() {
    let good = secrets().to_toml().unwrap();
    assert_eq!(Secrets::from_toml(&good).unwrap(), secrets());

    let short = format!("hmac_key = \"{}\"\ncbc_key = \"{}\"\n", "00".repeat(31), "00".repeat(16));
    let e = Secrets::from_toml(&short).unwrap_err().to_string();
    assert!(e.contains("hmac_key must be 32 bytes, found 31"), "{e}");

    let bad_hex = format!("hmac_key = \"{}\"\ncbc_key = \"zz\"\n", "00".repeat(32));
    let e = Secrets::from_toml(&bad_hex).unwrap_err().to_string();
    assert!(e.contains("cbc_key is not valid hex"), "{e}");

    assert!(Secrets::from_toml("hmac_key = 1").is_err());
}

/// Protect a binary, then dump and check it with the same keys.
#[test]
fn protect_then_dump() {
    let secrets_file = create_file(secrets().to_toml().unwrap().as_bytes());
    let input = create_file(&firmware(100));
    let output_file = tempfile::NamedTempFile::new().unwrap();
    let output_path = output_file.path().to_str().unwrap();

    let output = test([
        "protect",
        "-s",
        secrets_file.path().to_str().unwrap(),
        "-i",
        input.path().to_str().unwrap(),
        "-o",
        output_path,
        "--firmware-version",
        "7",
    ]);
    assert_eq!(output.exit_code, ExitCode(0));
    // 100 bytes pad to 112, plus the IV makes 128 bytes in 4 frames of 32.
    assert!(output.stdout.contains("version 7 (112 bytes encrypted, 4 frames)"));

    let output = test(["dump", "-i", output_path, "-s", secrets_file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("7"));
    assert!(output.stdout.contains("112"));
    assert!(output.stdout.contains("4 (up to 32 bytes each)"));
    assert!(output.stdout.contains("valid"));
    assert!(output.stderr.is_empty());
}

/// Dump without keys only shows the structure.
#[test]
fn dump_without_secrets() {
    let package = Package::protect(&secrets(), 0, &firmware(40), IV, 64).unwrap();
    let file = create_file(&package.to_bytes());
    let output = test(["dump", "-i", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stdout.contains("0 (keep installed)"));
    assert!(output.stdout.contains(&hex::encode(package.tag_of_tags)));
    assert!(!output.stdout.contains("valid"));
}

/// A tampered image is reported by dump when keys are given.
#[test]
fn dump_detects_tampering() {
    let mut package = Package::protect(&secrets(), 3, &firmware(80), IV, 32).unwrap();
    package.frames[1].body[0] ^= 1;
    let file = create_file(&package.to_bytes());
    let secrets_file = create_file(secrets().to_toml().unwrap().as_bytes());
    let output = test([
        "dump",
        "-i",
        file.path().to_str().unwrap(),
        "-s",
        secrets_file.path().to_str().unwrap(),
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("tag of frame 1 does not verify"));
}

/// Truncated images cannot be parsed.
#[test]
fn dump_truncated_image() {
    let package = Package::protect(&secrets(), 3, &firmware(80), IV, 32).unwrap();
    let mut bytes = package.to_bytes();
    bytes.truncate(bytes.len() - 1);
    let file = create_file(&bytes);
    let output = test(["dump", "-i", file.path().to_str().unwrap()]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("truncated"));
}

#[test]
fn parse_rejects_bytes_after_trailer() {
    let package = Package::protect(&secrets(), 3, &firmware(80), IV, 32).unwrap();
    let mut bytes = package.to_bytes();
    bytes.extend_from_slice(&[0xAA; 5]);
    assert!(matches!(Package::parse(&bytes), Err(package::Error::TrailingBytes(5))));
}

#[test]
fn protect_rejects_bad_frame_size() {
    let secrets_file = create_file(secrets().to_toml().unwrap().as_bytes());
    let input = create_file(&firmware(10));
    let output = test([
        "protect",
        "-s",
        secrets_file.path().to_str().unwrap(),
        "-i",
        input.path().to_str().unwrap(),
        "-o",
        "unused.bin",
        "--firmware-version",
        "1",
        "--frame-size",
        "0",
    ]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("invalid frame size 0"));
}

#[test]
fn missing_subcommand_is_a_cli_error() {
    let output = test([]);
    assert_eq!(output.exit_code, ExitCode(1));
    assert!(output.stderr.contains("Usage"));

    let output = test(["--version"]);
    assert_eq!(output.exit_code, ExitCode(0));
    assert!(output.stderr.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn package_layout() {
    let package = Package::protect(&secrets(), 2, &firmware(64), IV, 48).unwrap();
    // 64 bytes gain a full padding block.
    assert_eq!(package.metadata, FirmwareMetadata::new(2, 80));
    assert_eq!(package.payload().len(), 80 + IV_SIZE);
    assert_eq!(&package.payload()[80..], &IV);
    assert_eq!(
        package.frames.iter().map(|f| f.body.len()).collect::<Vec<_>>(),
        [48, 48]
    );
    assert_eq!(Package::parse(&package.to_bytes()).unwrap(), package);
    package.verify(&secrets().key_material()).unwrap();

    let steps = package.steps();
    assert_eq!(steps.len(), 2 + 3);
    assert_eq!(steps[0].1.len(), 4 + TAG_SIZE);
    assert_eq!(steps[1].1[..2], [0, 48 + TAG_SIZE as u8]);
    assert_eq!(steps[3], (Step::HalfTags, [&[0, 0][..], &package.half_tags[..]].concat()));
    assert_eq!(steps[4], (Step::TagOfTags, package.tag_of_tags.to_vec()));
}

#[test]
fn package_limits() {
    assert!(matches!(
        Package::protect(&secrets(), 1, &[], IV, 32),
        Err(package::Error::EmptyFirmware)
    ));
    let max = package::max_firmware_size();
    assert!(matches!(
        Package::protect(&secrets(), 1, &firmware(max), IV, 256),
        Err(package::Error::FirmwareTooLarge { .. })
    ));
    let package = Package::protect(&secrets(), 1, &firmware(max - 1), IV, 256).unwrap();
    assert_eq!(usize::from(package.metadata.size), max);

    let other = Secrets {
        hmac_key: [0x43; 32],
        cbc_key: [0x24; 16],
    };
    assert!(matches!(
        package.verify(&other.key_material()),
        Err(package::Error::TagMismatch(Tagged::Metadata))
    ));
}

/// Full upload against the bootloader: every step acknowledged, the padded
/// plaintext lands in flash and the store holds the new metadata.
#[test]
fn upload_installs_firmware() {
    let firmware = firmware(5000);
    let package = Package::protect(&secrets(), 4, &firmware, IV, 256).unwrap();
    let session = device::install(&secrets(), &package, Some(FirmwareMetadata::new(3, 0x100)));

    session.upload.as_ref().unwrap();
    let expected = FirmwareMetadata::new(4, 5008);
    assert_eq!(session.outcome, Outcome::Updated(expected));
    assert_eq!(session.installed(), expected);
    assert_eq!(session.firmware(5008), &padded(&firmware)[..]);
}

#[test]
fn upload_stale_version_is_refused() {
    let package = Package::protect(&secrets(), 2, &firmware(100), IV, 32).unwrap();
    let session = device::install(&secrets(), &package, Some(FirmwareMetadata::new(3, 0x100)));

    let e = session.upload.as_ref().unwrap_err();
    assert!(matches!(e, update::Error::Rejected(Step::Metadata, Status::MetadataRejected)));
    assert!(e.to_string().contains("version is wrong"));
    assert_eq!(session.outcome, Outcome::Reset(BootError::MetadataRejected));
    assert_eq!(session.installed(), FirmwareMetadata::new(3, 0x100));
}

#[test]
fn upload_with_wrong_keys_is_refused() {
    let package = Package::protect(&secrets(), 5, &firmware(100), IV, 32).unwrap();
    let device_keys = Secrets {
        hmac_key: [0x99; 32],
        cbc_key: [0x24; 16],
    };
    let session = device::install(&device_keys, &package, None);

    let e = session.upload.unwrap_err();
    assert!(matches!(e, update::Error::Rejected(Step::Metadata, Status::AuthenticationFailed)));
    assert!(e.to_string().contains("HMAC is not verifiable"));
}

#[test]
fn upload_tampered_frame_is_refused() {
    let mut package = Package::protect(&secrets(), 5, &firmware(200), IV, 64).unwrap();
    package.frames[2].tag[0] ^= 0x80;
    let session = device::install(&secrets(), &package, Some(FirmwareMetadata::new(1, 0x10)));

    assert!(matches!(
        session.upload,
        Err(update::Error::Rejected(Step::Frame(2), Status::AuthenticationFailed))
    ));
    assert_eq!(session.outcome, Outcome::Reset(BootError::AuthenticationFailed));
}

/// The device must echo the command before anything else is sent.
#[test]
fn upload_requires_echo() {
    let (mut host, mut device) = device::pipe();
    std::io::Write::write_all(&mut device, b"X").unwrap();
    let package = Package::protect(&secrets(), 1, &firmware(16), IV, 32).unwrap();
    assert!(matches!(
        update::upload(&mut host, &package),
        Err(update::Error::UnexpectedEcho {
            sent: b'U',
            received: b'X'
        })
    ));

    // Nobody left to receive the command.
    drop(device);
    assert!(matches!(update::boot(&mut host), Err(update::Error::Write(_))));
}

fn test<const N: usize>(args: [&str; N]) -> Output {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = crate::main_args(
        std::iter::once("fw-tools").chain(args),
        &mut stdout,
        &mut stderr,
    );
    println!("* args: {:?}", args);
    println!("* exit_code: {:?}", exit_code);
    println!("* stdout:\n{}", String::from_utf8_lossy(&stdout));
    println!("* stderr:\n{}", String::from_utf8_lossy(&stderr));
    Output {
        exit_code,
        stdout: String::from_utf8(stdout).unwrap(),
        stderr: String::from_utf8(stderr).unwrap(),
    }
}

#[derive(Debug)]
struct Output {
    exit_code: ExitCode,
    stdout: String,
    stderr: String,
}

fn create_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file
}
