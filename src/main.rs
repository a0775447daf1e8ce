//! Command-line wrapper around the split-key engine.
//!
//! The key-derivation key is fixed inside the binary; the secrecy of a
//! deployment rests on the key file, whose raw bytes are the source
//! material for key derivation.

use std::io::Read;
use std::path::PathBuf;
use std::process;

use structopt::clap::ErrorKind;
use structopt::StructOpt;

use splitkey::SplitKey;

// Built-in key-derivation key. Not a secret on its own: without the key
// file it derives nothing useful.
const KDK: [u8; 32] = [
    0x0B, 0x51, 0xFA, 0x44, 0x91, 0x3D, 0xA8, 0x0C, 0xE7, 0x22, 0x6E, 0xD9, 0x35, 0xC1, 0x4F,
    0x82, 0x1C, 0x6B, 0xD3, 0x70, 0x58, 0xAE, 0x07, 0xE5, 0x99, 0x40, 0xBC, 0x16, 0xF2, 0x8D,
    0x2A, 0x63,
];

const MAX_STDIN_BYTES: u64 = 50_000_000;

const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;


#[derive(StructOpt)]
#[structopt(name = "splitkey", about = "Encrypt short secrets into printable tokens")]
enum Command {
    /// Encrypt an item into a token
    Encrypt(OperationArgs),
    /// Decrypt a token back into the item
    Decrypt(OperationArgs),
}

#[derive(StructOpt)]
struct OperationArgs {
    /// Key file; its raw bytes are the key derivation source material
    #[structopt(parse(from_os_str))]
    key_file: PathBuf,
    /// `[subject] <item>`; the item may be `-` to read standard input
    #[structopt(required = true, max_values = 2)]
    rest: Vec<String>,
}

impl OperationArgs {
    /// Splits the trailing positional arguments into subject and item.
    fn subject_and_item(&self) -> (&str, &str) {
        match self.rest.as_slice() {
            [item] => ("", item.as_str()),
            [subject, item] => (subject.as_str(), item.as_str()),
            _ => unreachable!("clap enforces one or two trailing arguments"),
        }
    }
}


fn main() {
    let command = match Command::from_args_safe() {
        Ok(command) => command,
        Err(error) => match error.kind {
            ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => {
                println!("{}", error.message);
                process::exit(0);
            }
            _ => {
                eprintln!("{}", error.message);
                process::exit(EXIT_USAGE);
            }
        },
    };

    match run(&command) {
        Ok(output) => println!("{output}"),
        Err(message) => {
            eprintln!("splitkey: {message}");
            process::exit(EXIT_FAILURE);
        }
    }
}


fn run(command: &Command) -> Result<String, String> {
    let (encrypting, args) = match command {
        Command::Encrypt(args) => (true, args),
        Command::Decrypt(args) => (false, args),
    };
    let (subject, item) = args.subject_and_item();

    let key_bytes = std::fs::read(&args.key_file)
        .map_err(|e| format!("cannot read key file {}: {e}", args.key_file.display()))?;

    let item = if item == "-" { read_stdin_item()? } else { item.to_string() };

    let engine = SplitKey::try_new(&KDK, &[&key_bytes]).map_err(|e| e.to_string())?;
    let result = if encrypting {
        engine.try_encrypt(&item, subject).map_err(|e| e.to_string())
    } else {
        engine
            .try_decrypt(&item, subject)
            .map(|plain| plain.to_string())
            .map_err(|e| e.to_string())
    };
    engine.destroy();
    result
}


fn read_stdin_item() -> Result<String, String> {
    let mut raw = Vec::new();
    std::io::stdin()
        .lock()
        .take(MAX_STDIN_BYTES + 1)
        .read_to_end(&mut raw)
        .map_err(|e| format!("cannot read standard input: {e}"))?;
    if raw.len() as u64 > MAX_STDIN_BYTES {
        return Err(format!("standard input exceeds {MAX_STDIN_BYTES} bytes"));
    }
    let text = String::from_utf8(raw).map_err(|_| "standard input is not valid UTF-8".to_string())?;
    Ok(text.trim_end_matches(&['\r', '\n'][..]).to_string())
}
