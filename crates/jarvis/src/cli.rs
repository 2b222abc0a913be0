//! Command line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use jarvis_core::{AccountKind, TxOptions};

pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

#[derive(Debug, Parser)]
#[command(name = "jarvis", version = crate::VERSION, about = "Compose, sign and inspect EVM transactions")]
pub struct Cli {
    /// Network name or alias
    #[arg(short, long, global = true, default_value = "mainnet", env = "JARVIS_NETWORK")]
    pub network: String,

    /// Print the final result as JSON on stdout
    #[arg(long, global = true)]
    pub json_output: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Native or ERC-20 transfer
    Send(SendArgs),
    #[command(subcommand)]
    Contract(ContractCommand),
    /// Gnosis classic multisig workflows
    #[command(subcommand)]
    Msig(MsigCommand),
    /// Analyze a transaction by hash
    Info { tx_hash: String },
    /// Search the address book
    Addr {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Describe an address
    Whois { address: String },
    #[command(subcommand)]
    Wallet(WalletCommand),
    #[command(subcommand)]
    Network(NetworkCommand),
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Recipient address or address book query
    #[arg(long)]
    pub to: String,
    /// `1.5`, `1.5 KNC` or `ALL`
    #[arg(long)]
    pub amount: String,
    #[command(flatten)]
    pub tx: TxArgs,
}

#[derive(Debug, Subcommand)]
pub enum ContractCommand {
    /// Call a state changing method
    Tx(ContractArgs),
    /// Call a view method
    Read(ContractArgs),
}

#[derive(Debug, Args)]
pub struct ContractArgs {
    /// Contract address or address book query
    pub contract: String,
    #[command(flatten)]
    pub call: CallArgs,
    #[command(flatten)]
    pub tx: TxArgs,
}

#[derive(Debug, Subcommand)]
pub enum MsigCommand {
    /// Submit a new multisig transaction
    Init {
        /// Multisig address or query
        msig: String,
        /// Contract the multisig will call
        #[arg(long)]
        msig_to: String,
        #[command(flatten)]
        call: CallArgs,
        #[command(flatten)]
        tx: TxArgs,
    },
    /// Confirm a pending multisig transaction
    Approve {
        msig: String,
        tx_id: String,
        #[command(flatten)]
        tx: TxArgs,
    },
    /// Revoke a confirmation
    Revoke {
        msig: String,
        tx_id: String,
        #[command(flatten)]
        tx: TxArgs,
    },
}

/// Method selection and argument values for contract calls.
#[derive(Debug, Args)]
pub struct CallArgs {
    /// Index into the listed methods
    #[arg(short = 'm', long)]
    pub method_index: Option<usize>,
    /// Method name or signature
    #[arg(long, conflicts_with = "method_index")]
    pub method: Option<String>,
    /// Pipe separated arguments, `?` prompts for that one
    #[arg(short = 'P', long)]
    pub prefills: Option<String>,
    /// Native value for payable methods
    #[arg(long)]
    pub value: Option<String>,
    /// Use the ERC-20 ABI instead of fetching one
    #[arg(long)]
    pub erc20_abi: bool,
    /// Use an ABI JSON file instead of fetching one
    #[arg(long, conflicts_with = "erc20_abi")]
    pub custom_abi: Option<PathBuf>,
}

/// Fee, gas and flow flags shared by every write action.
#[derive(Debug, Args, Clone)]
pub struct TxArgs {
    /// Sender wallet address or query
    #[arg(short, long)]
    pub from: Option<String>,
    /// Gas price in gwei (max fee for dynamic-fee transactions)
    #[arg(long)]
    pub gas_price: Option<f64>,
    /// Gwei added on top of the gas price
    #[arg(long, default_value_t = 0.0)]
    pub extra_gas_price: f64,
    /// Priority fee in gwei; requests a dynamic-fee transaction
    #[arg(long)]
    pub tip: Option<f64>,
    #[arg(long)]
    pub gas_limit: Option<u64>,
    #[arg(long, default_value_t = 0)]
    pub extra_gas_limit: u64,
    #[arg(long)]
    pub nonce: Option<u64>,
    /// Show the transaction without signing or broadcasting
    #[arg(long)]
    pub dry_run: bool,
    /// Return after broadcasting
    #[arg(long)]
    pub no_wait: bool,
    /// Re-send the signed transaction when no node accepts it
    #[arg(long)]
    pub retry_broadcast: bool,
    #[arg(long)]
    pub force_legacy: bool,
}

impl TxArgs {
    pub fn options(&self) -> TxOptions {
        TxOptions {
            gas_price_gwei: self.gas_price,
            extra_gas_price_gwei: self.extra_gas_price,
            tip_gwei: self.tip,
            gas_limit: self.gas_limit,
            extra_gas_limit: self.extra_gas_limit,
            nonce: self.nonce,
            dry_run: self.dry_run,
            no_wait: self.no_wait,
            retry_broadcast: self.retry_broadcast,
            force_legacy: self.force_legacy,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum WalletCommand {
    /// Register a keystore or hardware wallet
    Add {
        #[arg(long)]
        address: String,
        #[arg(long, value_enum)]
        kind: WalletKind,
        /// Keystore file, for `keystore` wallets
        #[arg(long)]
        keypath: Option<PathBuf>,
        /// Derivation path, for hardware wallets
        #[arg(long)]
        derpath: Option<String>,
        #[arg(long, default_value = "")]
        desc: String,
    },
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WalletKind {
    Keystore,
    Ledger,
    LedgerLive,
    Trezor,
}

impl From<WalletKind> for AccountKind {
    fn from(kind: WalletKind) -> Self {
        match kind {
            WalletKind::Keystore => AccountKind::Keystore,
            WalletKind::Ledger => AccountKind::Ledger,
            WalletKind::LedgerLive => AccountKind::LedgerLive,
            WalletKind::Trezor => AccountKind::Trezor,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum NetworkCommand {
    /// Register a network from a descriptor file
    Add { descriptor: PathBuf },
    List,
}
