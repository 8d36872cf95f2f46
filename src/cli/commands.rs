use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "networkchain", about = "A minimal peer-to-peer blockchain node")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a node listening on ADDRESS")]
    StartNode {
        #[arg(help = "Address to listen on, e.g. localhost:3001")]
        address: String,
        #[arg(long = "bootstrap", help = "Bootstrap node address")]
        bootstrap: Option<String>,
        #[arg(long = "data-dir", help = "Directory for the chain database")]
        data_dir: Option<PathBuf>,
        #[arg(long = "read-timeout", help = "Seconds to wait for an inbound frame")]
        read_timeout: Option<u64>,
    },
    #[command(name = "sendtx", about = "Send a transaction carrying DATA to a node")]
    SendTx {
        #[arg(help = "Transaction payload")]
        data: String,
        #[arg(long = "node", help = "Node to send to (defaults to the bootstrap node)")]
        node: Option<String>,
    },
    #[command(name = "ping", about = "Send a ping to a node")]
    Ping {
        #[arg(help = "Node address")]
        address: String,
    },
    #[command(name = "printchain", about = "Print all blocks in a stored chain")]
    PrintChain {
        #[arg(long = "data-dir", help = "Directory for the chain database")]
        data_dir: Option<PathBuf>,
        #[arg(long = "node", help = "Node address whose database to read")]
        node: Option<String>,
        #[arg(long = "json", help = "Print the chain as JSON")]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_startnode() {
        let opt = Opt::parse_from([
            "networkchain",
            "startnode",
            "localhost:3001",
            "--bootstrap",
            "localhost:3000",
            "--data-dir",
            "/tmp/nodes",
        ]);
        match opt.command {
            Command::StartNode {
                address,
                bootstrap,
                data_dir,
                read_timeout,
            } => {
                assert_eq!(address, "localhost:3001");
                assert_eq!(bootstrap.as_deref(), Some("localhost:3000"));
                assert_eq!(data_dir, Some(PathBuf::from("/tmp/nodes")));
                assert_eq!(read_timeout, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_config_and_sendtx() {
        let opt = Opt::parse_from(["networkchain", "sendtx", "hello", "--config", "node.toml"]);
        assert_eq!(opt.config, Some(PathBuf::from("node.toml")));
        assert!(matches!(opt.command, Command::SendTx { ref data, node: None } if data == "hello"));
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Opt::try_parse_from(["networkchain"]).is_err());
    }
}
