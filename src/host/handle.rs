//! Async Host Handle
//!
//! Runs a [`Host`] on its own task and serializes every transaction through
//! one mpsc queue. Callers get a cloneable handle; committed events fan out
//! over a broadcast channel.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::clock::Clock;
use crate::core::ids::{Address, GameId};
use crate::error::GameError;
use crate::game::events::GameEvent;
use crate::game::state::Game;
use crate::host::executor::{Host, Receipt, Transaction};
use crate::ledger::TokenLedger;
use crate::proof::verify::ProofVerifier;

/// Queue depth for pending commands.
const COMMAND_CAPACITY: usize = 256;

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// Handle errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Host task has exited.
    #[error("host stopped")]
    Stopped,

    /// Transaction reverted.
    #[error(transparent)]
    Game(#[from] GameError),
}

enum Command {
    Execute {
        caller: Address,
        tx: Transaction,
        reply: oneshot::Sender<Result<Receipt, GameError>>,
    },
    Approve {
        owner: Address,
        token: Address,
        amount: u128,
        reply: oneshot::Sender<()>,
    },
    Game {
        id: GameId,
        reply: oneshot::Sender<Option<Game>>,
    },
    Events {
        id: GameId,
        reply: oneshot::Sender<Vec<GameEvent>>,
    },
    Balance {
        token: Address,
        owner: Address,
        reply: oneshot::Sender<(u128, u128)>,
    },
}

/// Cloneable handle to a running host.
#[derive(Clone)]
pub struct HostHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<GameEvent>,
}

impl HostHandle {
    /// Move `host` onto a new task.
    ///
    /// The task ends once every handle is dropped and returns the host.
    pub fn spawn<L, V, C>(host: Host<L, V, C>) -> (Self, JoinHandle<Host<L, V, C>>)
    where
        L: TokenLedger + Send + 'static,
        V: ProofVerifier + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let task = tokio::spawn(Self::run(host, rx, events.clone()));
        (Self { commands, events }, task)
    }

    async fn run<L, V, C>(
        mut host: Host<L, V, C>,
        mut rx: mpsc::Receiver<Command>,
        events: broadcast::Sender<GameEvent>,
    ) -> Host<L, V, C>
    where
        L: TokenLedger,
        V: ProofVerifier,
        C: Clock,
    {
        info!("Host task started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Execute { caller, tx, reply } => {
                    let result = host.execute(caller, tx);
                    if let Ok(receipt) = &result {
                        // No subscribers is fine
                        let _ = events.send(receipt.event.clone());
                    }
                    let _ = reply.send(result);
                }
                Command::Approve { owner, token, amount, reply } => {
                    host.approve(owner, token, amount);
                    let _ = reply.send(());
                }
                Command::Game { id, reply } => {
                    let _ = reply.send(host.game(id).cloned());
                }
                Command::Events { id, reply } => {
                    let _ = reply.send(host.events_for(id).cloned().collect());
                }
                Command::Balance { token, owner, reply } => {
                    let ledger = host.ledger();
                    let _ = reply.send((ledger.balance_of(&token, &owner), ledger.allowance(&token, &owner)));
                }
            }
        }

        debug!(events = host.events().len(), "Host task stopping");
        host
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, HostError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| HostError::Stopped)?;
        rx.await.map_err(|_| HostError::Stopped)
    }

    /// Submit a transaction and wait for its receipt.
    pub async fn execute(&self, caller: Address, tx: Transaction) -> Result<Receipt, HostError> {
        let result = self
            .request(|reply| Command::Execute { caller, tx, reply })
            .await?;
        Ok(result?)
    }

    /// Set `owner`'s escrow allowance for `token`.
    pub async fn approve(&self, owner: Address, token: Address, amount: u128) -> Result<(), HostError> {
        self.request(|reply| Command::Approve { owner, token, amount, reply }).await
    }

    /// Snapshot of one game.
    pub async fn game(&self, id: GameId) -> Result<Option<Game>, HostError> {
        self.request(|reply| Command::Game { id, reply }).await
    }

    /// Committed events for one game.
    pub async fn events(&self, id: GameId) -> Result<Vec<GameEvent>, HostError> {
        self.request(|reply| Command::Events { id, reply }).await
    }

    /// `(balance, allowance)` of `owner` in `token`.
    pub async fn balance(&self, token: Address, owner: Address) -> Result<(u128, u128), HostError> {
        self.request(|reply| Command::Balance { token, owner, reply }).await
    }

    /// Subscribe to events committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::game::events::GameEventData;
    use crate::game::machine::{CreateGame, ProtocolConfig};
    use crate::game::moves::Move;
    use crate::game::state::GameState;
    use crate::ledger::InMemoryLedger;
    use crate::proof::commitment::CommitmentPreimage;
    use crate::proof::verify::DigestProofVerifier;

    fn token() -> Address { Address::derive("token") }
    fn alice() -> Address { Address::derive("alice") }
    fn bob() -> Address { Address::derive("bob") }

    fn spawn() -> (HostHandle, JoinHandle<Host<InMemoryLedger, DigestProofVerifier, ManualClock>>) {
        let ledger = InMemoryLedger::with_genesis(&token(), &[(alice(), 100), (bob(), 100)]).unwrap();
        let host = Host::new(ProtocolConfig::default(), ledger, DigestProofVerifier, ManualClock::new(5_000));
        HostHandle::spawn(host)
    }

    fn create_tx() -> Transaction {
        Transaction::CreateGame(CreateGame {
            token: token(),
            stake: 10,
            commitment: CommitmentPreimage::generate(Move::Rock).commitment(),
            timeout_secs: 120,
        })
    }

    #[tokio::test]
    async fn test_execute_and_broadcast() {
        let (handle, _task) = spawn();
        let mut events = handle.subscribe();

        handle.approve(alice(), token(), 10).await.unwrap();
        let receipt = handle.execute(alice(), create_tx()).await.unwrap();
        assert_eq!(receipt.game_id(), 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event, receipt.event);
        assert!(matches!(event.data, GameEventData::GameCreated { id: 1, .. }));

        let game = handle.game(1).await.unwrap().unwrap();
        assert_eq!(game.state(), GameState::AwaitingJoin);
        assert_eq!(handle.balance(token(), alice()).await.unwrap(), (90, 0));
    }

    #[tokio::test]
    async fn test_reverted_transaction_not_broadcast() {
        let (handle, _task) = spawn();
        let mut events = handle.subscribe();

        let err = handle.execute(alice(), create_tx()).await.unwrap_err();
        match err {
            HostError::Game(game_err) => assert_eq!(game_err.kind(), ErrorKind::InsufficientAllowance),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(events.try_recv().is_err());
        assert!(handle.game(1).await.unwrap().is_none());
        assert!(handle.events(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_returns_host_when_handles_drop() {
        let (handle, task) = spawn();
        handle.approve(bob(), token(), 10).await.unwrap();
        handle.execute(bob(), create_tx()).await.unwrap();
        drop(handle);

        let host = task.await.unwrap();
        assert_eq!(host.events().len(), 1);
        assert_eq!(host.ledger().escrowed(&token()), 10);
    }
}
