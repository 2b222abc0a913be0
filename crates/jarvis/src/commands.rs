use std::fs;

use alloy::primitives::{B256, U256};
use tracing::info;

use jarvis_core::abis::parse_abi;
use jarvis_core::params::parse_address_hex;
use jarvis_core::{
    AbiSource, AccountDescriptor, ActionOutcome, AddressResolver, ContractCallRequest,
    MethodChoice, MsigInitRequest, MsigVote, Network, PortError, SendRequest,
};

use crate::app::App;
use crate::cli::{
    CallArgs, Command, ContractCommand, MsigCommand, NetworkCommand, WalletCommand,
    DEFAULT_DERIVATION_PATH,
};
use crate::render::render_outcome;

/// Runs one command and returns the process exit code.
pub fn run(app: &App, network: &str, command: Command) -> Result<i32, PortError> {
    match command {
        Command::Send(args) => {
            let from = args.tx.from.clone().ok_or_else(|| {
                PortError::UserInput("send needs --from (wallet or multisig)".to_owned())
            })?;
            let req = SendRequest {
                from,
                to: args.to,
                amount: args.amount,
            };
            let outcome = app.orchestrator(network)?.send(&req, &args.tx.options())?;
            emit(app, &outcome)
        }
        Command::Contract(ContractCommand::Tx(args)) => {
            let req = call_request(args.contract, args.tx.from.clone(), &args.call)?;
            let outcome = app
                .orchestrator(network)?
                .contract_tx(&req, &args.tx.options())?;
            emit(app, &outcome)
        }
        Command::Contract(ContractCommand::Read(args)) => {
            let req = call_request(args.contract, args.tx.from.clone(), &args.call)?;
            let outcome = app.orchestrator(network)?.contract_read(&req)?;
            emit(app, &outcome)
        }
        Command::Msig(MsigCommand::Init {
            msig,
            msig_to,
            call,
            tx,
        }) => {
            let req = MsigInitRequest {
                from: tx.from.clone(),
                msig,
                target: call_request(msig_to, None, &call)?,
            };
            let outcome = app.orchestrator(network)?.msig_init(&req, &tx.options())?;
            emit(app, &outcome)
        }
        Command::Msig(MsigCommand::Approve { msig, tx_id, tx }) => {
            let outcome = app.orchestrator(network)?.msig_vote(
                &msig,
                parse_tx_id(&tx_id)?,
                MsigVote::Approve,
                tx.from.as_deref(),
                &tx.options(),
            )?;
            emit(app, &outcome)
        }
        Command::Msig(MsigCommand::Revoke { msig, tx_id, tx }) => {
            let outcome = app.orchestrator(network)?.msig_vote(
                &msig,
                parse_tx_id(&tx_id)?,
                MsigVote::Revoke,
                tx.from.as_deref(),
                &tx.options(),
            )?;
            emit(app, &outcome)
        }
        Command::Info { tx_hash } => {
            let hash: B256 = tx_hash
                .trim()
                .parse()
                .map_err(|e| PortError::UserInput(format!("invalid tx hash {tx_hash}: {e}")))?;
            let outcome = app.orchestrator(network)?.info(hash)?;
            emit(app, &outcome)
        }
        Command::Addr { query } => addr(app, &query.join(" ")),
        Command::Whois { address } => whois(app, &address),
        Command::Wallet(cmd) => wallet(app, cmd),
        Command::Network(cmd) => network_cmd(app, cmd),
    }
}

fn call_request(
    contract: String,
    from: Option<String>,
    call: &CallArgs,
) -> Result<ContractCallRequest, PortError> {
    let method = match (call.method_index, &call.method) {
        (Some(index), _) => MethodChoice::Index(index),
        (None, Some(name)) => MethodChoice::Name(name.clone()),
        (None, None) => MethodChoice::Prompt,
    };
    let abi = match (&call.custom_abi, call.erc20_abi) {
        (Some(path), _) => {
            let raw = fs::read_to_string(path).map_err(|e| {
                PortError::UserInput(format!("cannot read ABI file {}: {e}", path.display()))
            })?;
            AbiSource::Custom(parse_abi(&raw)?)
        }
        (None, true) => AbiSource::Erc20,
        (None, false) => AbiSource::Fetch,
    };
    Ok(ContractCallRequest {
        from,
        contract,
        method,
        prefills: call.prefills.clone(),
        value: call.value.clone(),
        abi,
    })
}

fn parse_tx_id(raw: &str) -> Result<U256, PortError> {
    raw.trim()
        .parse::<U256>()
        .map_err(|e| PortError::UserInput(format!("invalid multisig tx id {raw}: {e}")))
}

fn emit(app: &App, outcome: &ActionOutcome) -> Result<i32, PortError> {
    if app.json_output {
        let json = serde_json::to_string_pretty(outcome)
            .map_err(|e| PortError::Validation(format!("cannot serialize outcome: {e}")))?;
        println!("{json}");
    } else {
        print!("{}", render_outcome(outcome));
    }
    Ok(outcome.exit_code())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), PortError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| PortError::Validation(format!("cannot serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}

fn addr(app: &App, query: &str) -> Result<i32, PortError> {
    let matches = app.resolver().search(query);
    if matches.is_empty() {
        return Err(PortError::NotFound(format!("no address matches '{query}'")));
    }
    if app.json_output {
        print_json(&matches)?;
    } else {
        for m in matches.iter().take(10) {
            println!("{}  {}  ({:.1})", m.address.to_checksum(None), m.description, m.score);
        }
    }
    Ok(0)
}

fn whois(app: &App, input: &str) -> Result<i32, PortError> {
    let address = parse_address_hex(input)?;
    let desc = app.resolver().describe(address);
    if app.json_output {
        print_json(&serde_json::json!({ "address": address, "description": desc }))?;
    } else {
        println!(
            "{}  {}",
            address.to_checksum(None),
            desc.as_deref().unwrap_or("unknown")
        );
    }
    Ok(if desc.is_some() { 0 } else { 1 })
}

fn wallet(app: &App, cmd: WalletCommand) -> Result<i32, PortError> {
    match cmd {
        WalletCommand::Add {
            address,
            kind,
            keypath,
            derpath,
            desc,
        } => {
            let kind = kind.into();
            let keypath = keypath
                .map(|p| {
                    fs::canonicalize(&p).map_err(|e| {
                        PortError::UserInput(format!("keystore {}: {e}", p.display()))
                    })
                })
                .transpose()?;
            let derpath = match kind {
                jarvis_core::AccountKind::Keystore => derpath,
                _ => Some(derpath.unwrap_or_else(|| DEFAULT_DERIVATION_PATH.to_owned())),
            };
            let account = AccountDescriptor {
                address: parse_address_hex(&address)?,
                kind,
                keypath,
                derpath,
                desc,
            };
            let path = app.accounts.add(&account)?;
            info!(path = %path.display(), "wallet registered");
            println!("added {} ({:?})", account.address.to_checksum(None), account.kind);
            Ok(0)
        }
        WalletCommand::List => {
            let accounts = app.accounts.list();
            if app.json_output {
                print_json(&accounts)?;
            } else {
                for a in &accounts {
                    println!("{}  {:<11}  {}", a.address.to_checksum(None), format!("{:?}", a.kind), a.desc);
                }
            }
            Ok(0)
        }
    }
}

fn network_cmd(app: &App, cmd: NetworkCommand) -> Result<i32, PortError> {
    match cmd {
        NetworkCommand::Add { descriptor } => {
            let raw = fs::read(&descriptor).map_err(|e| {
                PortError::UserInput(format!("cannot read {}: {e}", descriptor.display()))
            })?;
            let network: Network = serde_json::from_slice(&raw)
                .map_err(|e| PortError::UserInput(format!("invalid network descriptor: {e}")))?;
            let path = app.networks.add(&network)?;
            info!(path = %path.display(), "network registered");
            println!("added {} (chain id {})", network.name, network.chain_id);
            Ok(0)
        }
        NetworkCommand::List => {
            let registry = app.networks.registry()?;
            if app.json_output {
                print_json(&registry.list())?;
            } else {
                for n in registry.list() {
                    let nodes: Vec<&str> = n.default_nodes.keys().map(String::as_str).collect();
                    println!(
                        "{:<12} {:>10}  aliases [{}]  nodes [{}]",
                        n.name,
                        n.chain_id,
                        n.alternative_names.join(", "),
                        nodes.join(", ")
                    );
                }
            }
            Ok(0)
        }
    }
}
