pub mod abis;
pub mod context;
pub mod decoder;
pub mod domain;
pub mod metadata;
pub mod network;
pub mod nonce;
pub mod orchestrator;
pub mod params;
pub mod ports;
pub mod proxy;
pub mod state_machine;
pub mod tx;

pub use context::Context;
pub use decoder::{Decoder, GnosisClassicDetector, WrapperDetector, MAX_DECODE_DEPTH};
pub use domain::{
    AccountDescriptor, AccountKind, AddressBookEntry, AddressMatch, BroadcastOutcome, CallRequest,
    DecodedLog, DecodedParam, FunctionCall, GasInfo, Network, NodeFailure, ParamValue, RpcHeader,
    RpcLog, RpcReceipt, RpcTransaction, TxInfo, TxStatus,
};
pub use metadata::MetadataService;
pub use network::NetworkRegistry;
pub use orchestrator::{
    AbiSource, ActionOutcome, ContractCallRequest, MethodChoice, MonitorSettings,
    MsigInitRequest, MsigVote, Orchestrator, SendRequest, TxOptions,
};
pub use ports::{
    AbiProvider, ActionObserver, AddressResolver, ChainBackend, ChainReader, ClockPort,
    ExplorerPort, KvCache, NoopObserver, PortError, Prompter, SignerFactory, TxBroadcaster,
    WalletSigner,
};
pub use state_machine::{action_transition, ActionEvent, ActionState, StateTransition};
pub use tx::{assemble_signed, FeeMode, SignedTx, TypedUnsigned, UnsignedTx};
