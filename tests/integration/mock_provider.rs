//! In-memory wallet provider for integration tests
//!
//! Holds accounts, chain, balances and sale figures in memory, answers
//! `eth_call`s for the sale and reward-token selectors, and applies a
//! confirmed `buyTokens()` to the figures. Reads and sends can be gated so a
//! test can hold a call in flight while it changes the wallet underneath.

#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use avalon_sale_sdk::protocols::evm::contracts::{IAvalonSale, IERC20};
use avalon_sale_sdk::wallet::EventEmitter;
use avalon_sale_sdk::{
    ProviderError, ProviderEvent, SaleDeployment, TransactionRequest, TxReceiptSummary,
    WalletProvider,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

pub const BASE_SEPOLIA: u64 = 84532;
pub const ACCOUNT_A: Address = Address::new([0xab; 20]);
pub const ACCOUNT_B: Address = Address::new([0xbc; 20]);
pub const SALE_ADDRESS: Address = Address::new([0x5a; 20]);
pub const REWARD_TOKEN: Address = Address::new([0x7e; 20]);

/// `n` whole units in 18-decimal base units
pub fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

pub fn deployment() -> SaleDeployment {
    SaleDeployment::new(BASE_SEPOLIA, SALE_ADDRESS, REWARD_TOKEN)
}

/// On-chain sale figures, in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleFigures {
    pub rate: U256,
    pub hard_cap: U256,
    pub total_raised: U256,
    pub min_contribution: U256,
}

impl SaleFigures {
    /// rate 1000, cap 150000, nothing raised, minimum 1
    pub fn avalon() -> Self {
        Self {
            rate: units(1000),
            hard_cap: units(150_000),
            total_raised: U256::ZERO,
            min_contribution: units(1),
        }
    }
}

/// A one-shot pause point
#[derive(Debug, Default)]
pub struct Gate {
    entered: Notify,
    released: Notify,
}

impl Gate {
    /// Resolves once a call has reached the gate
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.released.notified().await;
    }
}

#[derive(Debug, Clone)]
pub enum ReceiptOutcome {
    Confirm,
    Revert(String),
    Fail(ProviderError),
}

#[derive(Debug)]
struct MockState {
    authorized: Vec<Address>,
    /// Accounts handed out when the user approves a connection prompt
    approvable: Vec<Address>,
    reject_prompt: bool,
    chain_id: u64,
    balances: HashMap<Address, U256>,
    sales: HashMap<Address, SaleFigures>,
    reward_tokens: HashMap<Address, Address>,
    reward_balances: HashMap<(Address, Address), U256>,
    balance_error: Option<ProviderError>,
    call_error: Option<ProviderError>,
    send_error: Option<ProviderError>,
    receipts: VecDeque<ReceiptOutcome>,
    sent: Vec<(B256, TransactionRequest)>,
    balance_gates: HashMap<Address, Arc<Gate>>,
    reward_gates: HashMap<Address, Arc<Gate>>,
    send_gate: Option<Arc<Gate>>,
    receipt_gate: Option<Arc<Gate>>,
}

pub struct MockProvider {
    state: Mutex<MockState>,
    events: EventEmitter,
    send_count: AtomicUsize,
    receipt_waits: AtomicUsize,
}

impl MockProvider {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                authorized: Vec::new(),
                approvable: Vec::new(),
                reject_prompt: false,
                chain_id,
                balances: HashMap::new(),
                sales: HashMap::new(),
                reward_tokens: HashMap::new(),
                reward_balances: HashMap::new(),
                balance_error: None,
                call_error: None,
                send_error: None,
                receipts: VecDeque::new(),
                sent: Vec::new(),
                balance_gates: HashMap::new(),
                reward_gates: HashMap::new(),
                send_gate: None,
                receipt_gate: None,
            }),
            events: EventEmitter::new(),
            send_count: AtomicUsize::new(0),
            receipt_waits: AtomicUsize::new(0),
        }
    }

    /// Base Sepolia with the AVALON sale deployed and `account` funded
    pub fn avalon(account: Address) -> Self {
        let mock = Self::new(BASE_SEPOLIA);
        mock.deploy_sale(SALE_ADDRESS, REWARD_TOKEN, SaleFigures::avalon());
        mock.set_balance(account, units(10));
        mock.approve_accounts(vec![account]);
        mock
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn deploy_sale(&self, sale: Address, reward_token: Address, figures: SaleFigures) {
        let mut state = self.lock();
        state.sales.insert(sale, figures);
        state.reward_tokens.insert(sale, reward_token);
    }

    pub fn set_figures(&self, sale: Address, figures: SaleFigures) {
        self.lock().sales.insert(sale, figures);
    }

    pub fn figures(&self, sale: Address) -> Option<SaleFigures> {
        self.lock().sales.get(&sale).copied()
    }

    pub fn set_balance(&self, account: Address, balance: U256) {
        self.lock().balances.insert(account, balance);
    }

    pub fn set_reward_balance(&self, token: Address, holder: Address, balance: U256) {
        self.lock().reward_balances.insert((token, holder), balance);
    }

    /// Accounts already authorized (visible without a prompt)
    pub fn authorize(&self, accounts: Vec<Address>) {
        self.lock().authorized = accounts;
    }

    /// Accounts granted when a connection prompt is approved
    pub fn approve_accounts(&self, accounts: Vec<Address>) {
        self.lock().approvable = accounts;
    }

    pub fn reject_prompts(&self) {
        self.lock().reject_prompt = true;
    }

    pub fn set_chain(&self, chain_id: u64) {
        self.lock().chain_id = chain_id;
    }

    pub fn fail_balance_reads(&self, error: Option<ProviderError>) {
        self.lock().balance_error = error;
    }

    /// Fail every `eth_call` (sale figures and reward balance) with `error`
    pub fn fail_calls(&self, error: Option<ProviderError>) {
        self.lock().call_error = error;
    }

    pub fn fail_sends(&self, error: ProviderError) {
        self.lock().send_error = Some(error);
    }

    /// Queue the outcome of the next `wait_for_receipt`. Defaults to confirm.
    pub fn push_receipt(&self, outcome: ReceiptOutcome) {
        self.lock().receipts.push_back(outcome);
    }

    /// Hold the next native balance read for `account`
    pub fn gate_balance_read(&self, account: Address) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock().balance_gates.insert(account, gate.clone());
        gate
    }

    /// Hold the next reward-token `balanceOf(account)`, the last read of a snapshot
    pub fn gate_reward_read(&self, account: Address) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock().reward_gates.insert(account, gate.clone());
        gate
    }

    /// Hold the next `send_transaction`
    pub fn gate_send(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock().send_gate = Some(gate.clone());
        gate
    }

    /// Hold the next `wait_for_receipt`
    pub fn gate_receipt(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.lock().receipt_gate = Some(gate.clone());
        gate
    }

    /// Number of `wait_for_receipt` calls made
    pub fn receipt_waits(&self) -> usize {
        self.receipt_waits.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.lock().sent.iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Switch the authorized account and notify subscribers
    pub fn switch_account(&self, account: Address) {
        self.authorize(vec![account]);
        self.events.emit(ProviderEvent::AccountsChanged(vec![account]));
    }

    pub fn disconnect(&self) {
        self.authorize(Vec::new());
        self.events.emit(ProviderEvent::AccountsChanged(Vec::new()));
    }

    pub fn switch_chain(&self, chain_id: u64) {
        self.set_chain(chain_id);
        self.events.emit(ProviderEvent::ChainChanged(chain_id));
    }

    async fn pass_balance_gate(&self, account: Address) {
        let gate = self.lock().balance_gates.remove(&account);
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }

    async fn pass_reward_gate(&self, account: Address) {
        let gate = self.lock().reward_gates.remove(&account);
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }

    fn answer_call(&self, to: Address, data: &[u8]) -> Result<Bytes, ProviderError> {
        let state = self.lock();
        if let Some(figures) = state.sales.get(&to) {
            let selector: [u8; 4] = data
                .get(..4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| ProviderError::new(-32602, "missing selector"))?;
            let value = if selector == IAvalonSale::rateCall::SELECTOR {
                figures.rate
            } else if selector == IAvalonSale::hardCapCall::SELECTOR {
                figures.hard_cap
            } else if selector == IAvalonSale::totalRaisedCall::SELECTOR {
                figures.total_raised
            } else if selector == IAvalonSale::minContributionCall::SELECTOR {
                figures.min_contribution
            } else {
                return Err(ProviderError::new(3, "execution reverted"));
            };
            return Ok(encode_word(value));
        }

        if state.reward_tokens.values().any(|token| *token == to) {
            let call = IERC20::balanceOfCall::abi_decode(data, true)
                .map_err(|e| ProviderError::new(-32602, e.to_string()))?;
            let balance = state
                .reward_balances
                .get(&(to, call.account))
                .copied()
                .unwrap_or(U256::ZERO);
            return Ok(encode_word(balance));
        }

        Err(ProviderError::new(-32000, format!("no contract at {:#x}", to)))
    }

    /// Apply a confirmed `buyTokens()` and build its event log
    fn settle(&self, tx: &TransactionRequest) -> Vec<Log> {
        let mut state = self.lock();
        let Some(figures) = state.sales.get_mut(&tx.to) else {
            return Vec::new();
        };
        figures.total_raised += tx.value;
        let reward = tx.value * figures.rate / units(1);

        if let Some(token) = state.reward_tokens.get(&tx.to).copied() {
            *state.reward_balances.entry((token, tx.from)).or_default() += reward;
        }
        if let Some(balance) = state.balances.get_mut(&tx.from) {
            *balance = balance.saturating_sub(tx.value);
        }

        let event = IAvalonSale::TokensPurchased {
            purchaser: tx.from,
            nativeAmountIn: tx.value,
            rewardAmountOut: reward,
        };
        vec![Log {
            address: tx.to,
            data: event.encode_log_data(),
        }]
    }
}

fn encode_word(value: U256) -> Bytes {
    Bytes::from(value.to_be_bytes::<32>().to_vec())
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.lock().authorized.clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let mut state = self.lock();
        if state.reject_prompt {
            return Err(ProviderError::user_rejected());
        }
        if state.authorized.is_empty() {
            state.authorized = state.approvable.clone();
        }
        Ok(state.authorized.clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.lock().chain_id)
    }

    async fn native_balance(&self, address: Address) -> Result<U256, ProviderError> {
        self.pass_balance_gate(address).await;
        let state = self.lock();
        if let Some(error) = state.balance_error.clone() {
            return Err(error);
        }
        Ok(state.balances.get(&address).copied().unwrap_or(U256::ZERO))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        if data.starts_with(&IERC20::balanceOfCall::SELECTOR) {
            if let Ok(call) = IERC20::balanceOfCall::abi_decode(&data, true) {
                self.pass_reward_gate(call.account).await;
            }
        }
        if let Some(error) = self.lock().call_error.clone() {
            return Err(error);
        }
        self.answer_call(to, &data)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ProviderError> {
        let gate = self.lock().send_gate.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let mut state = self.lock();
        if let Some(error) = state.send_error.clone() {
            return Err(error);
        }
        if tx.chain_id != state.chain_id {
            return Err(ProviderError::internal("chain mismatch"));
        }
        let n = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        let tx_hash = B256::with_last_byte(n as u8);
        state.sent.push((tx_hash, tx));
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceiptSummary, ProviderError> {
        self.receipt_waits.fetch_add(1, Ordering::SeqCst);
        let gate = self.lock().receipt_gate.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        let (outcome, tx) = {
            let mut state = self.lock();
            let tx = state
                .sent
                .iter()
                .find(|(hash, _)| *hash == tx_hash)
                .map(|(_, tx)| tx.clone())
                .ok_or_else(|| ProviderError::internal("unknown transaction"))?;
            let outcome = state.receipts.pop_front().unwrap_or(ReceiptOutcome::Confirm);
            (outcome, tx)
        };

        match outcome {
            ReceiptOutcome::Confirm => Ok(TxReceiptSummary {
                tx_hash,
                success: true,
                block_number: Some(100),
                gas_used: Some(60_000),
                logs: self.settle(&tx),
                revert_reason: None,
            }),
            ReceiptOutcome::Revert(reason) => Ok(TxReceiptSummary {
                tx_hash,
                success: false,
                block_number: Some(100),
                gas_used: Some(30_000),
                logs: Vec::new(),
                revert_reason: Some(reason),
            }),
            ReceiptOutcome::Fail(error) => Err(error),
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        self.events.subscribe()
    }
}
