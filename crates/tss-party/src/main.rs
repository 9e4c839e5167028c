//! TSS Party CLI
//!
//! Runs every peer of a protocol inside one process over the in-memory
//! transport:
//! - LISS key generation
//! - Threshold ECDSA signing
//! - Password-authenticated share recovery

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tss_core::birkhoff::{deal_shares, shamir_parameters, BkParameter};
use tss_core::homo::{HomoCrypto, Paillier};
use tss_core::keygen::{GroupConfigs, Liss, LissMessage};
use tss_core::message::{MessageMain, StateWatcher};
use tss_core::mpc::{spawn_delivery, MemoryNetwork};
use tss_core::password::{self, PasswordMessage, PasswordServer, PasswordVerifier};
use tss_core::sign::{SignMessage, Signer};
use tss_core::types::encode_point;
use tss_core::{PeerId, State};

/// TSS Party - in-process MPC simulation
#[derive(Parser)]
#[command(name = "tss-party")]
#[command(about = "Round-based MPC protocols over an in-memory network")]
#[command(version)]
struct Cli {
    /// Peer identities (comma-separated)
    #[arg(short, long, env = "TSS_PEERS", default_value = "p0,p1,p2", value_delimiter = ',')]
    peers: Vec<PeerId>,

    /// Seconds to wait for every peer to finish
    #[arg(long, env = "TSS_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Directory for per-peer results
    #[arg(short, long, env = "DEST")]
    dest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run LISS key generation
    Liss {
        /// Group configurations as JSON
        #[arg(short, long, env = "TSS_GROUPS", default_value = r#"[{"users":3,"threshold":2}]"#)]
        groups: String,
    },

    /// Deal a fresh key and sign a message with a subset of the peers
    Sign {
        /// Message to sign (UTF-8, hashed with SHA-256)
        #[arg(short, long)]
        message: String,

        /// Shares needed to sign
        #[arg(short, long, default_value_t = tss_core::DEFAULT_THRESHOLD)]
        threshold: usize,

        /// Paillier modulus size in bits (even, 1024 to 2048)
        #[arg(long, default_value_t = 2048)]
        paillier_bits: u64,
    },

    /// Enroll a password, then verify an attempt against it
    Password {
        /// Enrolled password
        #[arg(short, long, env = "TSS_PASSWORD")]
        password: String,

        /// Password presented at verification (defaults to the enrolled one)
        #[arg(short, long)]
        attempt: Option<String>,
    },
}

#[derive(Serialize)]
struct SignatureOutput {
    public_key: String,
    signers: Vec<PeerId>,
    r: String,
    s: String,
    recovery_id: u8,
    der: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Some(dest) = &cli.dest {
        std::fs::create_dir_all(dest)?;
    }

    match cli.command {
        Commands::Liss { ref groups } => run_liss(&cli, groups).await,
        Commands::Sign {
            ref message,
            threshold,
            paillier_bits,
        } => run_sign(&cli, message, threshold, paillier_bits).await,
        Commands::Password {
            ref password,
            ref attempt,
        } => run_password(&cli, password, attempt.as_deref().unwrap_or(password)).await,
    }
}

/// Pump every inbox until each party is terminal; fails unless all are Done
async fn drive<M>(
    cli: &Cli,
    network: &MemoryNetwork,
    parties: Vec<(PeerId, Arc<dyn MessageMain<M>>, Arc<StateWatcher>)>,
) -> Result<()>
where
    M: DeserializeOwned + Send + 'static,
{
    let mut pumps = Vec::with_capacity(parties.len());
    for (id, target, _) in &parties {
        let inbox = network
            .take_inbox(id)
            .ok_or_else(|| anyhow!("inbox of {} already taken", id))?;
        pumps.push(spawn_delivery(inbox, target.clone()));
    }

    let waits = parties.iter().map(|(_, _, watcher)| watcher.wait_terminal());
    let states = tokio::time::timeout(Duration::from_secs(cli.timeout), join_all(waits)).await;
    for pump in pumps {
        pump.abort();
    }
    let states = states.context("protocol timed out")?;

    for ((id, _, watcher), state) in parties.iter().zip(states) {
        if state != State::Done {
            let reason = watcher
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no error reported".into());
            bail!("{} ended {}: {}", id, state, reason);
        }
    }
    Ok(())
}

fn save<T: Serialize>(cli: &Cli, name: &str, value: &T) -> Result<()> {
    if let Some(dest) = &cli.dest {
        let path = dest.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        info!(path = ?path, "Result saved");
    }
    Ok(())
}

async fn run_liss(cli: &Cli, groups: &str) -> Result<()> {
    let configs = GroupConfigs::from_json(groups)?;
    info!(peers = ?cli.peers, groups = configs.len(), "Starting LISS");

    let network = MemoryNetwork::new(cli.peers.clone());
    let mut instances = Vec::with_capacity(cli.peers.len());
    for id in &cli.peers {
        let watcher = Arc::new(StateWatcher::new());
        let liss = Liss::new(
            network.peer_manager::<LissMessage>(id)?,
            configs.clone(),
            watcher.clone(),
        )?;
        instances.push((id.clone(), Arc::new(liss), watcher));
    }
    for (_, liss, _) in &instances {
        liss.start()?;
    }

    let parties = instances
        .iter()
        .map(|(id, liss, watcher)| {
            let target: Arc<dyn MessageMain<LissMessage>> = liss.clone();
            (id.clone(), target, watcher.clone())
        })
        .collect();
    drive(cli, &network, parties).await?;

    let mut public_key = None;
    for (id, liss, _) in &instances {
        let result = liss.result()?;
        save(cli, &format!("liss.{}.json", id), &result)?;
        public_key = Some(result.public_key);
    }
    let public_key = public_key.ok_or_else(|| anyhow!("no peers"))?;

    info!("LISS completed");
    println!("Public Key: {}", hex::encode(public_key.0.to_bytes_be()));
    Ok(())
}

async fn run_sign(cli: &Cli, message: &str, threshold: usize, paillier_bits: u64) -> Result<()> {
    let secret = Scalar::random(&mut OsRng);
    let public_key = ProjectivePoint::GENERATOR * secret;
    let all_bks = shamir_parameters(cli.peers.len());
    let shares = deal_shares(&mut OsRng, &secret, &all_bks, threshold)?;

    let signers: Vec<PeerId> = cli.peers.iter().take(threshold).cloned().collect();
    let bks: BTreeMap<PeerId, BkParameter> = signers
        .iter()
        .cloned()
        .zip(all_bks.iter().copied())
        .collect();
    info!(signers = ?signers, threshold, "Starting signing");

    let network = MemoryNetwork::new(signers.clone());
    let mut instances = Vec::with_capacity(signers.len());
    for (id, share) in signers.iter().zip(&shares) {
        let homo: Arc<dyn HomoCrypto> = Arc::new(Paillier::new(&mut OsRng, paillier_bits)?);
        let watcher = Arc::new(StateWatcher::new());
        let signer = Signer::new(
            network.peer_manager::<SignMessage>(id)?,
            public_key,
            homo,
            *share,
            bks.clone(),
            message.as_bytes(),
            watcher.clone(),
        )?;
        instances.push((id.clone(), Arc::new(signer), watcher));
    }
    for (_, signer, _) in &instances {
        signer.start()?;
    }

    let parties = instances
        .iter()
        .map(|(id, signer, watcher)| {
            let target: Arc<dyn MessageMain<SignMessage>> = signer.clone();
            (id.clone(), target, watcher.clone())
        })
        .collect();
    drive(cli, &network, parties).await?;

    let (_, first, _) = instances.first().ok_or_else(|| anyhow!("no signers"))?;
    let signature = first.result()?;
    let output = SignatureOutput {
        public_key: hex::encode(encode_point(&public_key)),
        signers,
        r: hex::encode(signature.r),
        s: hex::encode(signature.s),
        recovery_id: signature.recovery_id,
        der: hex::encode(signature.to_der()?),
    };
    save(cli, "signature.json", &output)?;

    info!(r = %output.r, s = %output.s, "Signature generated");
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_password(cli: &Cli, password: &str, attempt: &str) -> Result<()> {
    let (user, server) = match cli.peers.as_slice() {
        [user, server, ..] => (user.clone(), server.clone()),
        _ => bail!("password verification needs two peers"),
    };
    let enrollment = password::enroll(&mut OsRng, password.as_bytes(), &user, &server)?;
    info!(user = %user, server = %server, "Password enrolled");

    let network = MemoryNetwork::new([user.clone(), server.clone()]);
    let user_watcher = Arc::new(StateWatcher::new());
    let server_watcher = Arc::new(StateWatcher::new());
    let verifier = Arc::new(PasswordVerifier::new(
        network.peer_manager::<PasswordMessage>(&user)?,
        enrollment.public_key,
        enrollment.bks.clone(),
        attempt.as_bytes(),
        user_watcher.clone(),
    )?);
    let password_server = Arc::new(PasswordServer::new(
        network.peer_manager::<PasswordMessage>(&server)?,
        enrollment.public_key,
        enrollment.bks.clone(),
        enrollment.oprf_key,
        enrollment.server_share,
        server_watcher.clone(),
    )?);
    password_server.start()?;
    verifier.start()?;

    let user_target: Arc<dyn MessageMain<PasswordMessage>> = verifier.clone();
    let server_target: Arc<dyn MessageMain<PasswordMessage>> = password_server.clone();
    drive(
        cli,
        &network,
        vec![
            (user, user_target, user_watcher),
            (server, server_target, server_watcher),
        ],
    )
    .await?;

    let recovered = verifier.result()?;
    let verified = password_server.result()?;
    println!("Password accepted");
    println!(
        "  User share point: {}",
        hex::encode(encode_point(&verified.user_share_point))
    );
    println!(
        "  Matches recovered share: {}",
        ProjectivePoint::GENERATOR * recovered.share == verified.user_share_point
    );
    Ok(())
}
