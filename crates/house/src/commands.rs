//! CLI commands

use chrono::Duration;
use rollet_certs::house::{self, HouseCertificatePayload};
use rollet_certs::{spend_code, totp, transport, AllowList, BankReceipt, HouseCertificate};
use rollet_core::encoding::base64url_decode;
use rollet_core::{time, Keypair, PublicKey};
use rollet_ledger::{signature::verify_signatures, verify_chain, Ledger};
use std::path::Path;

use crate::context::HouseContext;

/// Generate an Ed25519 keypair and save the seed
pub fn keygen(output: &Path, env_var: &str) -> Result<Keypair, anyhow::Error> {
    let key = Keypair::generate();
    let seed = key.seed_hex();

    std::fs::write(output, &seed)?;
    println!("✅ Generated key");
    println!("   Private key saved to: {}", output.display());
    println!("   Public key: {}", key.public_key());
    println!("   Key id: {}", key.public_key().key_id());
    println!();
    println!("To use: export {}={}", env_var, seed);
    Ok(key)
}

/// Options for offline certificate issuance
pub struct IssueCertOptions<'a> {
    pub root_key_path: &'a Path,
    pub house_id: &'a str,
    pub house_public_key: &'a str,
    pub days: i64,
    pub capabilities: Vec<String>,
    pub output: &'a Path,
    pub pem: bool,
    /// Also record the certificate in this allow-list file
    pub allow_list: Option<&'a Path>,
}

/// Root authority: sign a house certificate
pub fn issue_cert(opts: IssueCertOptions<'_>) -> Result<HouseCertificate, anyhow::Error> {
    let root_seed = std::fs::read_to_string(opts.root_key_path)?;
    let root_key = Keypair::from_hex(root_seed.trim())?;
    let public_key = PublicKey::from_hex(opts.house_public_key.trim())?;

    let now = time::now();
    let cert = house::issue(
        HouseCertificatePayload {
            house_id: opts.house_id.to_string(),
            public_key,
            not_before: now,
            not_after: now + Duration::days(opts.days),
            capabilities: opts.capabilities,
        },
        &root_key,
    );

    let text = if opts.pem {
        cert.to_pem()
    } else {
        transport::encode(&cert)?
    };
    std::fs::write(opts.output, text)?;

    println!("✅ Issued house certificate for {}", cert.house_id());
    println!("   Key id: {}", cert.key_id());
    println!("   Valid until: {}", cert.payload.not_after);
    println!("   Saved to: {}", opts.output.display());

    if let Some(path) = opts.allow_list {
        let mut allow_list = if path.exists() {
            AllowList::from_file(path)?
        } else {
            AllowList::default()
        };
        allow_list.authorize(&cert);
        std::fs::write(path, serde_json::to_string_pretty(&allow_list)?)?;
        println!("   Authorized in: {} ({} entries)", path.display(), allow_list.len());
    }

    Ok(cert)
}

/// Inspect a certificate file against the root key
pub fn verify_cert(
    cert_path: &Path,
    root_public_key: &PublicKey,
    allow_list: Option<&Path>,
) -> Result<bool, anyhow::Error> {
    let cert = HouseCertificate::import(&std::fs::read_to_string(cert_path)?)?;

    println!("House: {}", cert.house_id());
    println!("Key id: {}", cert.key_id());
    println!(
        "Window: {} .. {}",
        cert.payload.not_before, cert.payload.not_after
    );
    println!("Capabilities: {}", cert.payload.capabilities.join(", "));

    if let Err(e) = house::check(&cert, root_public_key, time::now()) {
        println!("❌ Certificate rejected: {}", e);
        return Ok(false);
    }
    if let Some(path) = allow_list {
        if !AllowList::from_file(path)?.is_authorized(&cert) {
            println!("❌ Certificate valid but not on the allow-list");
            return Ok(false);
        }
    }

    println!("✅ Certificate valid");
    Ok(true)
}

/// Verify the hash chain and, optionally, entry signatures
pub fn audit(
    data_dir: &Path,
    signer: Option<&PublicKey>,
) -> Result<bool, anyhow::Error> {
    let ledger = Ledger::open_dir(data_dir)?;
    let entries = ledger.entries()?;

    match verify_chain(&entries) {
        Ok(()) => {
            println!("✅ Hash chain verified ({} entries)", entries.len());
        }
        Err(e) => {
            println!("❌ Hash chain broken: {}", e);
            return Ok(false);
        }
    }

    if let Some(public_key) = signer {
        match verify_signatures(&entries, public_key) {
            Ok((signed, unsigned)) => {
                println!(
                    "✅ Signatures verified: {} signed, {} unsigned",
                    signed, unsigned
                );
            }
            Err(e) => {
                println!("❌ Signature verification failed: {}", e);
                return Ok(false);
            }
        }
    }

    Ok(true)
}

pub fn status(ctx: &HouseContext) -> Result<(), anyhow::Error> {
    let status = ctx.status()?;

    println!("House: {} (key {})", status.house_id, status.key_id);
    println!("Ledger: {} entries, watermark {}", status.last_seq, status.watermark);
    println!("Unsynced: {}", status.unsynced);
    println!("Open rounds: {}", status.open_rounds);
    println!("Outstanding receipts: {}", status.receipts_outstanding);
    println!(
        "Sync mode: {}",
        if status.offline { "offline" } else { "authority" }
    );
    Ok(())
}

pub async fn sync(ctx: &HouseContext) -> Result<(), anyhow::Error> {
    let report = ctx.sync().await?;

    if report.offline {
        println!(
            "⚠️  Offline: marked {} entries as synced locally (watermark {})",
            report.synced, report.watermark
        );
    } else {
        println!(
            "✅ Synced {} entries (watermark {})",
            report.synced, report.watermark
        );
    }
    Ok(())
}

/// Write the unsynced batch to `output`
pub fn export(ctx: &mut HouseContext, output: &Path) -> Result<(), anyhow::Error> {
    let batch = ctx.export()?;
    std::fs::write(output, serde_json::to_string_pretty(&batch)?)?;

    match &batch.merkle_root {
        Some(root) => println!(
            "✅ Exported {} entries to {} (merkle root {})",
            batch.entries.len(),
            output.display(),
            root
        ),
        None => println!("Nothing to export"),
    }
    Ok(())
}

/// Print the spend code of a receipt file
pub fn spend_code(receipt_path: &Path, house_id: &str) -> Result<String, anyhow::Error> {
    let receipt: BankReceipt = transport::parse(&std::fs::read_to_string(receipt_path)?)?;
    let code = spend_code::compute(&receipt, house_id);
    println!("{}", code);
    Ok(code)
}

/// Redeem a receipt given as a file or a typed spend code
pub fn spend(ctx: &mut HouseContext, receipt_or_code: &str) -> Result<(), anyhow::Error> {
    let path = Path::new(receipt_or_code);
    let spent = if path.is_file() {
        let receipt: BankReceipt = transport::parse(&std::fs::read_to_string(path)?)?;
        ctx.spend(&receipt)?
    } else {
        ctx.spend_by_code(receipt_or_code)?
    };

    println!(
        "✅ Spent receipt {} ({} credits to {})",
        spent.receipt_id, spent.value, spent.player
    );
    Ok(())
}

/// Current TOTP code for a paired secret (base64url)
pub fn totp(
    secret: &str,
    round: &str,
    nonce: &str,
    step: Duration,
) -> Result<String, anyhow::Error> {
    let secret = base64url_decode(secret.trim())?;
    let code = totp::generate(&secret, round, nonce, time::now(), step);
    println!("{}", code);
    Ok(code)
}
