use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, info, warn, LevelFilter};
use networkchain::network::codec::{Ping, TxPayload};
use networkchain::{
    send_message, start_node, Block, ChainStore, Command, Config, Ledger, Message, Opt,
    SledStore, TcpTransport, Transaction,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;

fn main() {
    // Info by default, RUST_LOG still wins
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::new()?,
    };
    Ok(config)
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(opt.config.as_ref())?;

    match opt.command {
        Command::StartNode {
            address,
            bootstrap,
            data_dir,
            read_timeout,
        } => {
            config.node_address = address;
            if let Some(bootstrap) = bootstrap {
                config.bootstrap_address = bootstrap;
            }
            if data_dir.is_some() {
                config.data_dir = data_dir;
            }
            if read_timeout.is_some() {
                config.read_timeout_secs = read_timeout;
            }
            if config.is_bootstrap_node() {
                println!("Starting bootstrap node on {}", config.node_address);
            } else {
                println!(
                    "Starting node on {}, bootstrap node is {}",
                    config.node_address, config.bootstrap_address
                );
            }
            start_node(&config)?;
        }
        Command::SendTx { data, node } => {
            let target = node.unwrap_or_else(|| config.bootstrap_address.clone());
            let tx = Transaction::new(data.into_bytes());
            let message = Message::Tx(TxPayload {
                addr_from: config.node_address.clone(),
                transaction: tx.serialize()?,
            });
            let transport = TcpTransport::new(config.connect_timeout());
            send_message(&transport, &target, &message)?;
            println!("Sent transaction {} to {target}", tx.id_hex());
        }
        Command::Ping { address } => {
            let nonce = rand::random::<i64>();
            let message = Message::Ping(Ping {
                addr_from: config.node_address.clone(),
                nonce,
            });
            let transport = TcpTransport::new(config.connect_timeout());
            send_message(&transport, &address, &message)?;
            println!("Sent ping {nonce} to {address}, pong goes to {}", config.node_address);
        }
        Command::PrintChain {
            data_dir,
            node,
            json,
        } => {
            if data_dir.is_some() {
                config.data_dir = data_dir;
            }
            if let Some(node) = node {
                config.node_address = node;
            }
            print_chain(&config, json)?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct BlockView {
    height: usize,
    hash: String,
    previous_hash: String,
    timestamp: i64,
    payload: String,
    transactions: Vec<String>,
}

impl BlockView {
    fn new(height: usize, block: &Block) -> BlockView {
        let transactions = if block.is_genesis() {
            Vec::new()
        } else {
            Transaction::deserialize_set(block.get_payload())
                .map(|txs| txs.iter().map(Transaction::id_hex).collect())
                .unwrap_or_default()
        };
        BlockView {
            height,
            hash: block.hash_hex(),
            previous_hash: HEXLOWER.encode(block.get_previous_hash()),
            timestamp: block.get_timestamp(),
            payload: String::from_utf8_lossy(block.get_payload()).into_owned(),
            transactions,
        }
    }
}

fn print_chain(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config
        .node_db_path()
        .ok_or("printchain needs a data dir (--data-dir or DATA_DIR)")?;
    let store = SledStore::open(&path)?;
    let blocks = match store.load()? {
        Some(blocks) => blocks,
        None => {
            println!("No chain stored at {}", path.display());
            return Ok(());
        }
    };
    if let Err(e) = Ledger::validate_chain(&blocks) {
        warn!("Stored chain does not validate: {e}");
    }
    info!("Read {} blocks from {}", blocks.len(), path.display());

    let views: Vec<BlockView> = blocks
        .iter()
        .enumerate()
        .map(|(height, block)| BlockView::new(height, block))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }
    for view in views {
        println!("Height: {}", view.height);
        println!("Pre block hash: {}", view.previous_hash);
        println!("Cur block hash: {}", view.hash);
        println!("Cur block Timestamp: {}", view.timestamp);
        if view.transactions.is_empty() {
            println!("- Payload: {}", view.payload);
        }
        for txid_hex in view.transactions {
            println!("- Transaction txid_hex: {txid_hex}");
        }
        println!();
    }
    Ok(())
}
