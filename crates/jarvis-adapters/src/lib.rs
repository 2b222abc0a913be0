pub mod accounts;
pub mod backend;
pub mod broadcaster;
pub mod cache;
pub mod clock;
pub mod config;
pub mod explorer;
pub mod index;
pub mod networks;
pub mod prompt;
pub mod reader;
pub mod resolver;
pub mod rpc;
pub mod signers;

pub use accounts::AccountStore;
pub use backend::HttpChainBackend;
pub use broadcaster::FanoutBroadcaster;
pub use cache::FileCache;
pub use clock::SystemClock;
pub use config::AdapterConfig;
pub use explorer::EtherscanExplorer;
pub use index::AddressIndex;
pub use networks::{builtin_networks, NetworkStore};
pub use prompt::InquirePrompter;
pub use reader::FanoutReader;
pub use resolver::FileResolver;
pub use rpc::{HttpNode, RpcNode};
pub use signers::{DeviceSignerFactory, HardwareDevice, HardwareSigner, KeystoreSigner};
