//! Rollet CLI - Main entry point

use clap::{Parser, Subcommand};
use rollet_certs::HouseCertificate;
use rollet_core::PublicKey;
use rollet_house::commands::{self, IssueCertOptions};
use rollet_house::config::ENV_HOUSE_KEY;
use rollet_house::{HouseConfig, HouseContext};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollet")]
#[command(about = "Rollet - Offline trust layer for the house device", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory path (overrides config and ROLLET_DATA_DIR)
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new Ed25519 key
    Keygen {
        /// Output file path
        #[arg(long, default_value = "house.key")]
        output: PathBuf,
    },

    /// Issue a house certificate with the root key (offline)
    IssueCert {
        /// Root key seed file
        #[arg(long)]
        root_key: PathBuf,
        #[arg(long)]
        house_id: String,
        /// House public key (hex)
        #[arg(long)]
        public_key: String,
        /// Validity in days
        #[arg(long, default_value = "365")]
        days: i64,
        /// Capability (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        #[arg(long, default_value = "house-cert.pem")]
        output: PathBuf,
        /// Write PEM instead of raw JSON
        #[arg(long)]
        pem: bool,
        /// Also add the certificate to this allow-list
        #[arg(long)]
        allow_list: Option<PathBuf>,
    },

    /// Check a house certificate against the root key
    VerifyCert {
        cert: PathBuf,
        /// Root public key (hex); defaults to the configured one
        #[arg(long)]
        root_public_key: Option<String>,
        #[arg(long)]
        allow_list: Option<PathBuf>,
    },

    /// Audit the ledger (verify hash chain)
    Audit {
        /// Also verify house signatures on entries
        #[arg(long)]
        verify_signatures: bool,
    },

    /// Show ledger and session status
    Status,

    /// Push unsynced entries to the authority
    Sync,

    /// Export unsynced entries with their Merkle root
    Export {
        #[arg(long, default_value = "export.json")]
        output: PathBuf,
    },

    /// Print the spend code of a receipt file
    SpendCode {
        receipt: PathBuf,
        /// Defaults to the configured house certificate's id
        #[arg(long)]
        house_id: Option<String>,
    },

    /// Redeem a receipt file or a typed spend code
    Spend {
        receipt_or_code: String,
    },

    /// Print the current TOTP code for a paired secret
    Totp {
        /// Pairing secret (base64url)
        #[arg(long)]
        secret: String,
        #[arg(long)]
        round: String,
        #[arg(long)]
        nonce: String,
    },
}

fn configured_cert(config: &HouseConfig) -> anyhow::Result<HouseCertificate> {
    let text = std::fs::read_to_string(&config.house_cert_path)?;
    Ok(HouseCertificate::import(&text)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = HouseConfig::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data_dir = data;
    }

    match cli.command {
        Commands::Keygen { output } => {
            commands::keygen(&output, ENV_HOUSE_KEY)?;
        }

        Commands::IssueCert {
            root_key,
            house_id,
            public_key,
            days,
            capabilities,
            output,
            pem,
            allow_list,
        } => {
            commands::issue_cert(IssueCertOptions {
                root_key_path: &root_key,
                house_id: &house_id,
                house_public_key: &public_key,
                days,
                capabilities,
                output: &output,
                pem,
                allow_list: allow_list.as_deref(),
            })?;
        }

        Commands::VerifyCert {
            cert,
            root_public_key,
            allow_list,
        } => {
            let root_hex = root_public_key
                .or_else(|| config.root_public_key.clone())
                .ok_or_else(|| anyhow::anyhow!("root public key required (--root-public-key)"))?;
            let root = PublicKey::from_hex(root_hex.trim())?;
            let allow_list = allow_list.or_else(|| config.allow_list_path.clone());
            commands::verify_cert(&cert, &root, allow_list.as_deref())?;
        }

        Commands::Audit { verify_signatures } => {
            let signer = if verify_signatures {
                Some(*configured_cert(&config)?.public_key())
            } else {
                None
            };
            commands::audit(&config.data_dir, signer.as_ref())?;
        }

        Commands::Status => {
            let ctx = HouseContext::open(config)?;
            commands::status(&ctx)?;
        }

        Commands::Sync => {
            let ctx = HouseContext::open(config)?;
            commands::sync(&ctx).await?;
        }

        Commands::Export { output } => {
            let mut ctx = HouseContext::open(config)?;
            commands::export(&mut ctx, &output)?;
        }

        Commands::SpendCode { receipt, house_id } => {
            let house_id = match house_id {
                Some(id) => id,
                None => configured_cert(&config)?.house_id().to_string(),
            };
            commands::spend_code(&receipt, &house_id)?;
        }

        Commands::Spend { receipt_or_code } => {
            let mut ctx = HouseContext::open(config)?;
            commands::spend(&mut ctx, &receipt_or_code)?;
        }

        Commands::Totp {
            secret,
            round,
            nonce,
        } => {
            commands::totp(&secret, &round, &nonce, config.totp_step())?;
        }
    }

    Ok(())
}
