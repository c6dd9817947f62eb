//! Command protocol between a host and the process running the session.
//!
//! Requests and responses are JSON-serializable and correlated by a
//! monotonically increasing id. The id is the only correlation mechanism:
//! it guarantees a response is attributed to the request that caused it,
//! but gives no ordering guarantee among multiple in-flight requests.

use std::{collections::HashMap, fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::timeout;
use tracing::instrument;

use quoin_crypto::types;

use crate::{
    net::{oracle::RandomnessOracle, store::SnapshotStore},
    protocol::{
        session::GameSession,
        settlement::{FetchError, SettlementLayer},
    },
};

/// The closed set of operations a host may invoke.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "fn", content = "args", rename_all = "camelCase")]
pub enum WorkerCommand {
    Ping,
    FetchAccount { address: String },
    LoadBalances { addresses: Vec<String> },
    Deposit { amount: u64 },
    Withdraw,
    FlipCoin { wager: u64 },
    NetBalance,
    FlushStore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerRequest {
    pub id: u64,
    #[serde(flatten)]
    pub command: WorkerCommand,
}

/// Tagged outcome of one command, checked exhaustively by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerResult {
    Ok { data: Value },
    Err { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResponse {
    pub id: u64,
    #[serde(flatten)]
    pub result: WorkerResult,
}

#[derive(Debug)]
pub enum WorkerError {
    /// The worker side of the channel has gone away
    Disconnected,
}

impl Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Disconnected => write!(f, "Worker channel disconnected"),
        }
    }
}

/// Serve commands against `session` until the request channel closes or the
/// stop signal fires. One request is processed at a time, which is what
/// keeps the single-writer-per-account assumption honest.
#[instrument(skip_all)]
pub async fn serve_worker<S, O, T>(
    mut session: GameSession<S, O, T>,
    requests: flume::Receiver<WorkerRequest>,
    responses: flume::Sender<WorkerResponse>,
    stop_signal: Option<flume::Receiver<()>>,
) where
    S: SettlementLayer + Send,
    O: RandomnessOracle + Send,
    T: SnapshotStore + Send,
{
    loop {
        if let Some(signal) = &stop_signal {
            if signal.try_recv().is_ok() {
                tracing::debug!("Worker stopping on signal");
                return;
            }
        }
        let request = match timeout(Duration::from_millis(200), requests.recv_async()).await {
            Ok(Ok(request)) => request,
            Ok(Err(_)) => {
                tracing::debug!("Request channel closed, worker stopping");
                return;
            }
            Err(_) => continue, // timeout, check the stop signal again
        };
        tracing::debug!("Serving request {} ({:?})", request.id, request.command);
        let result = dispatch(&mut session, request.command).await;
        if responses
            .send(WorkerResponse {
                id: request.id,
                result,
            })
            .is_err()
        {
            tracing::debug!("Response channel closed, worker stopping");
            return;
        }
    }
}

async fn dispatch<S, O, T>(
    session: &mut GameSession<S, O, T>,
    command: WorkerCommand,
) -> WorkerResult
where
    S: SettlementLayer + Send,
    O: RandomnessOracle + Send,
    T: SnapshotStore + Send,
{
    match command {
        WorkerCommand::Ping => WorkerResult::Ok {
            data: json!("pong"),
        },
        WorkerCommand::FetchAccount { address } => {
            let address = match types::from_hex(&address) {
                Ok(address) => address,
                Err(e) => {
                    return WorkerResult::Err {
                        message: e.to_string(),
                    };
                }
            };
            match session.fetch_account(&address).await {
                Ok(account) => WorkerResult::Ok {
                    data: json!({
                        "balance": account.balance.to_string(),
                        "nonce": account.nonce,
                        "ledgerRoot": account.ledger_root.map(|r| types::to_hex(&r)),
                    }),
                },
                Err(FetchError::AccountNotFound) => WorkerResult::Err {
                    message: "Account not found".to_string(),
                },
                Err(FetchError::Transport(reason)) => WorkerResult::Err { message: reason },
            }
        }
        WorkerCommand::LoadBalances { addresses } => {
            let mut parsed = Vec::with_capacity(addresses.len());
            for address in &addresses {
                match types::from_hex(address) {
                    Ok(address) => parsed.push(address),
                    Err(e) => {
                        return WorkerResult::Err {
                            message: e.to_string(),
                        };
                    }
                }
            }
            match session.load_balances(&parsed).await {
                Ok(balances) => WorkerResult::Ok {
                    data: json!(
                        balances
                            .iter()
                            .map(|b| b.to_string())
                            .collect::<Vec<String>>()
                    ),
                },
                Err(e) => WorkerResult::Err {
                    message: e.to_string(),
                },
            }
        }
        WorkerCommand::Deposit { amount } => match session.deposit(amount).await {
            Ok(tx) => WorkerResult::Ok {
                data: json!({ "tx": types::to_hex(&tx) }),
            },
            Err(e) => WorkerResult::Err {
                message: e.to_string(),
            },
        },
        WorkerCommand::Withdraw => match session.withdraw().await {
            Ok(tx) => WorkerResult::Ok {
                data: json!({ "tx": types::to_hex(&tx) }),
            },
            Err(e) => WorkerResult::Err {
                message: e.to_string(),
            },
        },
        WorkerCommand::FlipCoin { wager } => match session.flip_coin(wager).await {
            Ok(result) => WorkerResult::Ok {
                data: json!({
                    "tx": types::to_hex(&result.tx),
                    "outcome": result.outcome,
                }),
            },
            Err(e) => WorkerResult::Err {
                message: e.to_string(),
            },
        },
        WorkerCommand::NetBalance => match session.current_net_balance() {
            Ok(balance) => WorkerResult::Ok {
                data: json!(balance.to_string()),
            },
            Err(e) => WorkerResult::Err {
                message: e.to_string(),
            },
        },
        WorkerCommand::FlushStore => match session.flush_store().await {
            Ok(()) => WorkerResult::Ok { data: json!("ok") },
            Err(e) => WorkerResult::Err {
                message: e.to_string(),
            },
        },
    }
}

/// Host-side handle. Each call gets the next id; responses are paired to
/// their request by id, with stray responses buffered until their caller
/// shows up.
pub struct WorkerHandle {
    requests: flume::Sender<WorkerRequest>,
    responses: flume::Receiver<WorkerResponse>,
    next_id: u64,
    pending: HashMap<u64, WorkerResult>,
}

impl WorkerHandle {
    pub fn new(
        requests: flume::Sender<WorkerRequest>,
        responses: flume::Receiver<WorkerResponse>,
    ) -> Self {
        WorkerHandle {
            requests,
            responses,
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Send one command and wait for the response that carries its id.
    pub async fn call(&mut self, command: WorkerCommand) -> Result<WorkerResult, WorkerError> {
        let id = self.next_id;
        self.next_id += 1;
        self.requests
            .send_async(WorkerRequest { id, command })
            .await
            .map_err(|_| WorkerError::Disconnected)?;
        if let Some(result) = self.pending.remove(&id) {
            return Ok(result);
        }
        loop {
            let response = self
                .responses
                .recv_async()
                .await
                .map_err(|_| WorkerError::Disconnected)?;
            if response.id == id {
                return Ok(response.result);
            }
            // a response for some other in-flight request; hold it
            self.pending.insert(response.id, response.result);
        }
    }
}

/// Wire a session to a background worker task, returning the host handle
/// and the stop sender.
pub fn spawn_worker<S, O, T>(
    session: GameSession<S, O, T>,
) -> (WorkerHandle, flume::Sender<()>, tokio::task::JoinHandle<()>)
where
    S: SettlementLayer + Send + Sync + 'static,
    O: RandomnessOracle + Send + Sync + 'static,
    T: SnapshotStore + Send + Sync + 'static,
{
    let (request_sender, request_receiver) = flume::unbounded();
    let (response_sender, response_receiver) = flume::unbounded();
    let (stop_sender, stop_receiver) = flume::bounded(1);
    let handle = tokio::spawn(serve_worker(
        session,
        request_receiver,
        response_sender,
        Some(stop_receiver),
    ));
    (
        WorkerHandle::new(request_sender, response_receiver),
        stop_sender,
        handle,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoin_crypto::signing::{DefaultSigner, SigFunction, SigVerFunction};
    use quoin_crypto::types::StdByteArray;

    use crate::{
        accounting::wallet::Wallet,
        ledger::sync::LedgerSync,
        net::{
            oracle::{OracleError, OracleResult},
            store::MemoryStore,
        },
        protocol::settlement::LocalSettlement,
    };

    const CONTRACT: StdByteArray = [9u8; 32];

    struct NoDraws;

    impl RandomnessOracle for NoDraws {
        async fn random_number(&self, _executor: &str) -> Result<OracleResult, OracleError> {
            Err(OracleError::Transport("no oracle in this test".to_string()))
        }
    }

    async fn open_session(funding: u64) -> GameSession<LocalSettlement, NoDraws, MemoryStore> {
        let executor = DefaultSigner::generate_random();
        let executor_key = executor.get_verifying_function().to_bytes();
        let mut settlement = LocalSettlement::new(CONTRACT, executor_key);
        let wallet = Wallet::generate_random();
        settlement.fund_account(wallet.address, funding);
        GameSession::init(
            wallet,
            executor,
            CONTRACT,
            "local".to_string(),
            LedgerSync::new(MemoryStore::new()),
            NoDraws,
            settlement,
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_request_wire_shape() {
        let request = WorkerRequest {
            id: 3,
            command: WorkerCommand::Deposit { amount: 1000 },
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({"id": 3, "fn": "deposit", "args": {"amount": 1000}})
        );
        let decoded: WorkerRequest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_unit_command_wire_shape() {
        let request = WorkerRequest {
            id: 0,
            command: WorkerCommand::Withdraw,
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded, json!({"id": 0, "fn": "withdraw"}));
    }

    #[test]
    fn test_response_wire_shape() {
        let response = WorkerResponse {
            id: 7,
            result: WorkerResult::Err {
                message: "Account not found".to_string(),
            },
        };
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(
            encoded,
            json!({"id": 7, "status": "err", "message": "Account not found"})
        );
    }

    #[tokio::test]
    async fn test_worker_serves_commands_end_to_end() {
        let session = open_session(5_000).await;
        let player = session.wallet().address;
        let (mut handle, stop, task) = spawn_worker(session);

        let pong = handle.call(WorkerCommand::Ping).await.unwrap();
        assert_eq!(pong, WorkerResult::Ok { data: json!("pong") });

        let deposited = handle
            .call(WorkerCommand::Deposit { amount: 1_000 })
            .await
            .unwrap();
        assert!(matches!(deposited, WorkerResult::Ok { .. }));

        let net = handle.call(WorkerCommand::NetBalance).await.unwrap();
        assert_eq!(net, WorkerResult::Ok { data: json!("1000") });

        let balances = handle
            .call(WorkerCommand::LoadBalances {
                addresses: vec![types::to_hex(&player)],
            })
            .await
            .unwrap();
        assert_eq!(
            balances,
            WorkerResult::Ok {
                data: json!(["4000"])
            }
        );

        let fetched = handle
            .call(WorkerCommand::FetchAccount {
                address: types::to_hex(&CONTRACT),
            })
            .await
            .unwrap();
        match fetched {
            WorkerResult::Ok { data } => {
                assert_eq!(data["balance"], json!("1000"));
                assert!(data["ledgerRoot"].is_string());
            }
            WorkerResult::Err { message } => panic!("Expected account, got error: {message}"),
        }

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_surfaces_operation_errors() {
        let session = open_session(0).await;
        let (mut handle, stop, task) = spawn_worker(session);

        // withdraw before any deposit: the channel is unbound
        let result = handle.call(WorkerCommand::Withdraw).await.unwrap();
        assert!(matches!(result, WorkerResult::Err { .. }));

        let result = handle
            .call(WorkerCommand::FetchAccount {
                address: types::to_hex(&[42u8; 32]),
            })
            .await
            .unwrap();
        assert_eq!(
            result,
            WorkerResult::Err {
                message: "Account not found".to_string()
            }
        );

        stop.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_matches_responses_by_id_not_order() {
        let (request_sender, request_receiver) = flume::unbounded();
        let (response_sender, response_receiver) = flume::unbounded();
        let mut handle = WorkerHandle::new(request_sender, response_receiver);

        // a responder that interleaves a stray late response before the
        // answer the caller is waiting on
        tokio::spawn(async move {
            let request = request_receiver.recv_async().await.unwrap();
            response_sender
                .send(WorkerResponse {
                    id: 77,
                    result: WorkerResult::Ok {
                        data: json!("stale"),
                    },
                })
                .unwrap();
            response_sender
                .send(WorkerResponse {
                    id: request.id,
                    result: WorkerResult::Ok {
                        data: json!("fresh"),
                    },
                })
                .unwrap();
        });

        let result = handle.call(WorkerCommand::Ping).await.unwrap();
        assert_eq!(result, WorkerResult::Ok { data: json!("fresh") });
        // the stray response was buffered, not dropped on the floor
        assert!(handle.pending.contains_key(&77));
    }

    #[tokio::test]
    async fn test_worker_stops_on_signal() {
        let session = open_session(100).await;
        let (_handle, stop, task) = spawn_worker(session);
        let now = std::time::Instant::now();
        stop.send(()).unwrap();
        task.await.unwrap();
        assert!(now.elapsed().as_secs() < 3, "Worker did not stop in time");
    }
}
