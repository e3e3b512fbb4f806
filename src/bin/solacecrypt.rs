//! solacecrypt CLI - Passphrase-based file encryption
//!
//! Command-line interface for encrypting and decrypting files using
//! AES-256-GCM with PBKDF2-HMAC-SHA256 key derivation.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

use solacecrypt::config::{CryptConfig, PBKDF2_ITERATIONS, WIPE_PASSES};
use solacecrypt::error::{ErrorCategory, ErrorKind, SolaceError};
use solacecrypt::file_ops;
use solacecrypt::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};

#[derive(Parser)]
#[command(name = "solacecrypt")]
#[command(version)]
#[command(about = "Passphrase-based file encryption.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// PBKDF2 iteration count; decryption must use the value used to encrypt
    #[arg(long, value_name = "N", default_value_t = PBKDF2_ITERATIONS, global = true)]
    kdf_iterations: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the encrypted file to [default: INPUT.enc]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Securely overwrite and remove the input after encrypting
        #[arg(long)]
        delete_original: bool,

        /// Number of random overwrite passes used by --delete-original
        #[arg(long, value_name = "N", default_value_t = WIPE_PASSES)]
        wipe_passes: u32,
    },

    /// Decrypt a file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the file whose contents is to be decrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the decrypted file to [default: INPUT without its last extension]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CryptConfig::default().with_kdf_iterations(cli.kdf_iterations);
    let mut reader = get_passphrase_reader(cli.passphrase_stdin);

    let result = match cli.command {
        Commands::Encrypt {
            input,
            output,
            delete_original,
            wipe_passes,
        } => {
            let config = config.with_wipe_passes(wipe_passes);
            let output = output.unwrap_or_else(|| file_ops::default_encrypt_output(&input));
            reader.read_passphrase().and_then(|passphrase| {
                file_ops::encrypt_file_with(&config, &input, &output, passphrase, delete_original)
                    .map(|()| format!("File encrypted successfully: {}", output.display()))
            })
        }
        Commands::Decrypt { input, output } => {
            let output = output.unwrap_or_else(|| file_ops::default_decrypt_output(&input));
            if file_ops::same_file(&input, &output) {
                Err(SolaceError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::InvalidConfig,
                    "refusing to decrypt onto the encrypted input; choose a different --output",
                ))
            } else {
                reader.read_passphrase().and_then(|passphrase| {
                    file_ops::decrypt_file_with(&config, &input, &output, passphrase)
                        .map(|()| format!("File decrypted successfully: {}", output.display()))
                })
            }
        }
    };

    match result {
        Ok(message) => println!("{}", message),
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            process::exit(1);
        }
    }
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader::new())
    }
}

/// Install a stderr logger. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("solacecrypt={}", default_level)));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    // Logging is a convenience; run without it rather than refuse to work.
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Unable to set global default subscriber");
    }
}

/// Render an error and its sources as `outer: inner: innermost`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
