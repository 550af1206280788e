//! Filvault - command line front end for the key vault

use std::io::{self, BufRead, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use filvault::{group_by_owner, AddressRole, FileStore, KeyFormat, Session, Vault, VaultConfig};
use filvault_core::{Address, DerivationScheme, Signature};

/// Environment variable holding the vault password
const PASSWORD_ENV: &str = "FILVAULT_PASSWORD";

/// Filvault - password-protected HD wallet keys
#[derive(Parser)]
#[command(name = "filvault")]
#[command(about = "Password-protected HD key vault for secp256k1 and BLS addresses")]
#[command(
    after_help = "The password is read from FILVAULT_PASSWORD, or from the first line of stdin. Stdin input is not masked, so pipe it rather than typing it."
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository directory (defaults to $FILVAULT_PATH, then ~/.filvault)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a mnemonic into the vault and create the first address
    Init {
        /// File containing the mnemonic phrase
        #[arg(long)]
        key_file: PathBuf,

        /// Overwrite an existing mnemonic (drops all address records)
        #[arg(long)]
        force: bool,
    },

    /// Derive and register the next address
    NewAddress {
        /// Create a BLS address instead of secp256k1
        #[arg(long)]
        bls: bool,

        /// Owning miner actor ID (e.g. f01234)
        #[arg(long)]
        miner_id: Option<String>,

        /// Role for the owning miner: owner, worker or post
        #[arg(long = "type")]
        role: Option<String>,
    },

    /// List known addresses grouped by miner and role
    List {
        /// Only show addresses of this miner
        #[arg(long)]
        miner_id: Option<String>,
    },

    /// Change the miner and role recorded for an address
    Modify {
        #[arg(long)]
        addr: String,

        #[arg(long)]
        miner: String,

        #[arg(long = "type")]
        role: String,
    },

    /// Print the private key of an address as hex-lotus
    Export {
        #[arg(long)]
        address: String,
    },

    /// Import an external private key
    Import {
        /// Input format: hex-lotus, json-lotus or gfc-json
        #[arg(long, default_value = "hex-lotus")]
        format: String,

        /// Key file; reads stdin when omitted or '-'
        path: Option<PathBuf>,
    },

    /// Sign hex-encoded bytes with an address
    Sign {
        #[arg(long)]
        address: String,

        #[arg(long)]
        message_hex: String,
    },

    /// Check a signature against an address
    Verify {
        #[arg(long)]
        address: String,

        #[arg(long)]
        message_hex: String,

        /// Hex of the type byte followed by the signature
        #[arg(long)]
        signature: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filvault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let repo = VaultConfig::resolve_repo_path(cli.repo);
    let config = VaultConfig::load(&repo)?;

    match cli.command {
        Commands::Init { key_file, force } => {
            let phrase = Zeroizing::new(
                std::fs::read_to_string(&key_file)
                    .with_context(|| format!("reading mnemonic from {}", key_file.display()))?,
            );
            let vault = Vault::open(config)?;
            let password = read_password()?;
            let session = vault.initialize(&phrase, &password, force)?;
            for record in session.list_addresses(None)? {
                println!("{}", record.address);
            }
            info!(repo = %vault.config().repo_path.display(), "Mnemonic stored");
        }

        Commands::NewAddress {
            bls,
            miner_id,
            role,
        } => {
            let role = role.as_deref().map(str::parse::<AddressRole>).transpose()?;
            let scheme = if bls {
                DerivationScheme::Bls
            } else {
                DerivationScheme::Secp256k1
            };
            let vault = Vault::open(config)?;
            let session = unlock(&vault)?;
            let record = session.derive_and_register_new_address(scheme, miner_id, role)?;
            println!("{}", record.address);
        }

        Commands::List { miner_id } => {
            let vault = Vault::open(config)?;
            let session = unlock(&vault)?;
            let records = session.list_addresses(miner_id.as_deref())?;
            for (owner, roles) in group_by_owner(&records) {
                println!("{}:", owner.as_deref().unwrap_or("-"));
                for (role, records) in roles {
                    println!("    {}:", role.map(|r| r.as_str()).unwrap_or("-"));
                    for record in records {
                        println!("        {} - {}", record.index.to_wire(), record.address);
                    }
                }
            }
        }

        Commands::Modify { addr, miner, role } => {
            let address: Address = addr.parse()?;
            let role: AddressRole = role.parse()?;
            let vault = Vault::open(config)?;
            let session = unlock(&vault)?;
            let record = session.update_metadata(&address, Some(miner), Some(role))?;
            println!("{}", record.address);
        }

        Commands::Export { address } => {
            let address: Address = address.parse()?;
            let vault = Vault::open(config)?;
            let session = unlock(&vault)?;
            let key_info = session.export_private_key(&address)?;
            println!("{}", key_info.to_hex()?.as_str());
        }

        Commands::Import { format, path } => {
            let format: KeyFormat = format.parse()?;
            let vault = Vault::open(config)?;
            let session = unlock(&vault)?;

            let input = Zeroizing::new(match path {
                Some(path) if path.as_os_str() != "-" => std::fs::read(&path)
                    .with_context(|| format!("reading key from {}", path.display()))?,
                _ => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            });
            let key_info = format.parse(&input)?;
            let address = session.import_private_key(&key_info)?;
            println!("{}", address);
        }

        Commands::Sign {
            address,
            message_hex,
        } => {
            let address: Address = address.parse()?;
            let message = hex::decode(&message_hex).context("message is not hex")?;
            let vault = Vault::open(config)?;
            let session = unlock(&vault)?;
            let signature = session.sign(&address, &message)?;
            println!("{}", signature.to_hex());
        }

        // Verification needs no secrets
        Commands::Verify {
            address,
            message_hex,
            signature,
        } => {
            let address: Address = address.parse()?;
            let message = hex::decode(&message_hex).context("message is not hex")?;
            let signature = Signature::from_hex(&signature)?;
            signature.verify(&address, &message)?;
            println!("valid");
        }
    }

    Ok(())
}

fn unlock(vault: &Vault<FileStore>) -> anyhow::Result<Session<'_, FileStore>> {
    let password = read_password()?;
    Ok(vault.unlock(&password)?)
}

/// Password from `FILVAULT_PASSWORD`, else the first line of stdin.
///
/// Stdin is meant to be a pipe; typing at a terminal echoes the password.
fn read_password() -> anyhow::Result<Zeroizing<Vec<u8>>> {
    if let Some(password) = std::env::var_os(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password.to_string_lossy().into_owned().into_bytes()));
    }

    if io::stdin().is_terminal() {
        warn!(
            "Password input will be echoed; set {} or pipe the password on stdin",
            PASSWORD_ENV
        );
    }
    eprint!("Password: ");
    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("no password given (set {} or pipe it on stdin)", PASSWORD_ENV);
    }
    Ok(Zeroizing::new(password.as_bytes().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_explains_password_input() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains(PASSWORD_ENV));
        assert!(help.contains("not masked"));
    }
}
