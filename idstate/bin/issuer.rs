/// # idstate issuer walkthrough
///
/// Creates an issuer identity, issues a KYC age credential to a holder by
/// signature and then by inclusion, and publishes the resulting state
/// transition to an in-memory state registry. Every artefact is printed as
/// JSON.
///
/// ```bash
/// idstate-issuer --seed issuer-demo --birthday 19960424
/// ```
use std::process;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idstate::auth::resolver::InMemoryStateRegistry;
use idstate::claim::codec::{Claim, ClaimFields};
use idstate::claim::schema::SchemaHash;
use idstate::utils::time::now;
use idstate::zk::{TransparentProver, TransparentVerifier};
use idstate::{FieldElement, Holder, Issuer, KeyPair, Result};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Entropy for the issuer key; a random key is used when absent
    #[arg(long)]
    seed: Option<String>,

    /// Entropy for the holder key; a random key is used when absent
    #[arg(long)]
    holder_seed: Option<String>,

    /// Revocation nonce of the issuer's auth claim
    #[arg(long, default_value_t = 1)]
    auth_nonce: u64,

    /// Birthday as YYYYMMDD
    #[arg(long, default_value_t = 19960424)]
    birthday: u64,

    #[arg(long, default_value_t = 1)]
    document_type: u64,

    /// Revocation nonce of the issued claim
    #[arg(long, default_value_t = 1909830690)]
    nonce: u64,

    /// Expiration as unix seconds (2361-03-21T12:25:21Z)
    #[arg(long, default_value_t = 12345654321)]
    expiration: u64,
}

fn key(seed: &Option<String>) -> KeyPair {
    match seed {
        Some(seed) => KeyPair::from_entropy(seed.as_bytes()),
        None => KeyPair::generate(),
    }
}

fn print_json<T: Serialize>(label: &str, value: &T) -> Result<()> {
    println!("{}:\n{}", label, serde_json::to_string_pretty(value)?);
    Ok(())
}

fn age_claim(cli: &Cli, holder: &Holder, nonce: u64) -> Result<Claim> {
    Claim::encode(
        &ClaimFields::new(SchemaHash::KYC_AGE)
            .with_index_id(holder.id())
            .with_index_data(
                FieldElement::from_u64(cli.birthday),
                FieldElement::from_u64(cli.document_type),
            )
            .with_expiration(cli.expiration)
            .with_revocation_nonce(nonce),
    )
}

fn run(cli: &Cli) -> Result<()> {
    let issuer = Issuer::new(key(&cli.seed), cli.auth_nonce)?;
    let holder = Holder::new(key(&cli.holder_seed), 1)?;

    print_json("issuer public key", &issuer.public_key())?;
    print_json("issuer auth claim", &issuer.auth_claim())?;
    print_json("issuer genesis state", &issuer.genesis_state())?;
    println!("issuer id: {}", issuer.id());
    println!("holder id: {}", holder.id());

    let signed = issuer.issue_by_signature(age_claim(cli, &holder, cli.nonce)?)?;
    signed.verify()?;
    print_json("credential issued by signature", &signed)?;

    let included = issuer.issue_by_inclusion(
        age_claim(cli, &holder, cli.nonce.wrapping_add(1))?,
        &TransparentProver,
    )?;
    included.credential.verify_inclusion()?;
    print_json("credential issued by inclusion", &included.credential)?;
    print_json("state transition", &included.state_transition.transition)?;

    let registry = InMemoryStateRegistry::new();
    registry.transit_state(&included.state_transition.proof, &TransparentVerifier, now())?;
    info!(
        issuer = %issuer.id(),
        state = ?registry.latest(&issuer.id()),
        "published issuer state"
    );
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!(error = %e, "issuer walkthrough failed");
        process::exit(1);
    }
}
