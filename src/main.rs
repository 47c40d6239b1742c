//! RPS Wager Server
//!
//! Runs the WebSocket gateway in front of an in-memory execution host.
//! `--demo` instead plays one settled and one forfeited round and exits.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rps_wager::{
    game::{events::GameEventData, machine::CreateGame},
    network::{AuthConfig, Authenticator, Gateway, ServerConfig},
    proof::{
        public_inputs::ProofPublicInputs, CommitmentPreimage, DigestProofVerifier, Reveal,
    },
    Address, Clock, Host, HostHandle, InMemoryLedger, ManualClock, Move, ProtocolConfig,
    SystemClock, TokenLedger, Transaction, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("RPS Wager Server v{}", VERSION);

    if std::env::args().any(|a| a == "--demo") {
        return demo();
    }

    serve().await
}

fn init_tracing() {
    let default_level = if cfg!(feature = "debug-tracing") { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Parse `RPS_GENESIS` ("sub=amount,sub=amount") into funded addresses.
fn genesis_accounts(entries: &str) -> Result<Vec<(Address, u128)>> {
    entries.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (sub, amount) = entry
                .split_once('=')
                .with_context(|| format!("genesis entry {entry:?} is not sub=amount"))?;
            let amount = amount
                .trim()
                .parse()
                .with_context(|| format!("genesis amount for {sub:?}"))?;
            Ok((Address::derive(sub.trim()), amount))
        })
        .collect()
}

async fn serve() -> Result<()> {
    let protocol = ProtocolConfig::from_env();
    let server = ServerConfig::from_env();

    let token = match std::env::var("RPS_TOKEN") {
        Ok(hex) => Address::from_hex(&hex).with_context(|| format!("RPS_TOKEN {hex:?} is not an address"))?,
        Err(_) => Address::derive("rps-token"),
    };
    let accounts = genesis_accounts(&std::env::var("RPS_GENESIS").unwrap_or_default())?;
    let ledger = InMemoryLedger::with_genesis(&token, &accounts)?;

    let auth_config = AuthConfig::from_env();
    let auth = if auth_config.is_configured() {
        Some(Authenticator::new(&auth_config)?)
    } else {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set; all clients will be refused");
        None
    };

    warn!("Using digest proof verifier; reveal proofs are not zero-knowledge");
    info!(
        token = %token,
        accounts = accounts.len(),
        min_timeout = protocol.timeout.min_secs,
        max_timeout = protocol.timeout.max_secs,
        "Starting host"
    );

    let host = Host::new(protocol, ledger, DigestProofVerifier, SystemClock);
    let (handle, host_task) = HostHandle::spawn(host);

    let gateway = Gateway::new(server, handle, auth);
    tokio::select! {
        result = gateway.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            gateway.shutdown();
        }
    }

    drop(gateway);
    let host = host_task.await?;
    info!(events = host.events().len(), games = host.book().len(), "Host stopped");
    Ok(())
}

/// Play two rounds against an in-memory host with a manual clock.
fn demo() -> Result<()> {
    info!("=== Starting Demo ===");

    let token = Address::derive("demo-token");
    let alice = Address::derive("alice");
    let bob = Address::derive("bob");
    let keeper = Address::derive("keeper");

    let clock = ManualClock::new(1_700_000_000);
    let ledger = InMemoryLedger::with_genesis(&token, &[(alice, 1_000), (bob, 1_000)])?;
    let mut host = Host::new(ProtocolConfig::default(), ledger, DigestProofVerifier, clock.clone());
    host.approve(alice, token, 1_000);
    host.approve(bob, token, 1_000);

    // Round 1: alice commits scissors, bob plays paper, alice reveals.
    let secret = CommitmentPreimage::generate(Move::Scissors);
    let create = |preimage: &CommitmentPreimage| {
        Transaction::CreateGame(CreateGame {
            token,
            stake: 100,
            commitment: preimage.commitment(),
            timeout_secs: 600,
        })
    };

    let game_id = host.execute(alice, create(&secret))?.game_id();
    info!("Game {} created, commitment {}", game_id, secret.commitment().to_hex());

    clock.advance(30);
    host.execute(bob, Transaction::JoinGame { id: game_id, player_move: Move::Paper })?;

    clock.advance(120);
    let outcome = rps_wager::game::resolve(secret.player_move, Move::Paper);
    let reveal = Reveal {
        player_move: secret.player_move,
        salt: secret.salt,
        proof: DigestProofVerifier::prove(ProofPublicInputs::from_round(secret.player_move, Move::Paper, outcome)),
    };
    let receipt = host.execute(alice, Transaction::RevealAndSettle { id: game_id, reveal })?;
    match receipt.event.data {
        GameEventData::GameSettled { winner, .. } => info!("Game {} settled, winner {:?}", game_id, winner),
        other => bail!("unexpected event {}", other.name()),
    }
    host.execute(alice, Transaction::Withdraw { id: game_id })?;

    // Round 2: bob commits, alice joins, bob never reveals.
    let silent = CommitmentPreimage::generate(Move::Rock);
    let game_id = host.execute(bob, create(&silent))?.game_id();
    host.execute(alice, Transaction::JoinGame { id: game_id, player_move: Move::Paper })?;

    let deadline = host
        .game(game_id)
        .and_then(|g| g.reveal_deadline())
        .context("joined game has a deadline")?;
    if let Err(err) = host.execute(keeper, Transaction::Forfeit { id: game_id }) {
        info!("Early forfeit refused: {}", err);
    }

    clock.set(deadline + 1);
    host.execute(keeper, Transaction::Forfeit { id: game_id })?;
    host.execute(alice, Transaction::Withdraw { id: game_id })?;
    info!("Game {} forfeited at {}, joiner paid", game_id, clock.now());

    info!("=== Event Log ===");
    for event in host.events() {
        info!("#{} t={} {} game={}", event.sequence, event.timestamp, event.data.name(), event.game_id());
    }

    info!("=== Balances ===");
    for (name, who) in [("alice", alice), ("bob", bob)] {
        info!("{}: {}", name, host.ledger().balance_of(&token, &who));
    }
    info!("escrow: {}", host.ledger().escrowed(&token));

    Ok(())
}
